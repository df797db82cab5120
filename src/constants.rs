/// Source tag constants, shared by connectors, normalizer defaults and CLI help.

// Connector ids (used in CLI `--sources` and as source tags)
pub const OPENCORPORATES_SOURCE: &str = "opencorporates";
pub const STATE_MANUAL_SOURCE: &str = "state_manual";
pub const NPPES_SOURCE: &str = "nppes";
pub const SAM_GOV_SOURCE: &str = "sam.gov";
pub const SAM_GOV_MOCK_SOURCE: &str = "sam.gov (mock)";
pub const GRANTS_GOV_SOURCE: &str = "grants.gov";

// Normalizer fallbacks
pub const UNKNOWN_SOURCE: &str = "unknown";
pub const UNKNOWN_COMPANY: &str = "Unknown";
pub const UNTITLED_NOTICE: &str = "Untitled";
pub const DEFAULT_COUNTRY: &str = "US";

/// Separator for the merged `source` set on canonical business records.
pub const SOURCE_SEPARATOR: char = ';';

// Request bounds
pub const DEFAULT_LIMIT: usize = 500;
pub const MAX_BUSINESS_LIMIT: usize = 2_000_000;
pub const MAX_RFP_LIMIT: usize = 10_000;
pub const MAX_PREVIEW_PAGE_SIZE: usize = 200;

/// The 50 states plus DC.
pub const VALID_STATES: [&str; 51] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY", "DC",
];

pub fn is_valid_state(code: &str) -> bool {
    VALID_STATES.contains(&code)
}

/// Get all supported business connector ids
pub fn get_business_sources() -> Vec<&'static str> {
    vec![OPENCORPORATES_SOURCE, NPPES_SOURCE, STATE_MANUAL_SOURCE]
}

/// Get all supported solicitation connector ids
pub fn get_rfp_sources() -> Vec<&'static str> {
    vec![SAM_GOV_SOURCE, GRANTS_GOV_SOURCE]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_set_has_fifty_one_codes() {
        let mut codes = VALID_STATES.to_vec();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 51);
        assert!(is_valid_state("DC"));
        assert!(!is_valid_state("PR"));
        assert!(!is_valid_state("ca"));
    }
}
