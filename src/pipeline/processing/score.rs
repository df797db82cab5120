use crate::domain::CanonicalBusinessRecord;

const MISSING_DOMAIN: u8 = 20;
const MISSING_PHONE: u8 = 10;
const MISSING_ADDRESS: u8 = 10;
const MISSING_NAICS: u8 = 10;
const MISSING_EMAIL: u8 = 5;

/// Completeness score: 100 minus a fixed deduction per missing contact field.
pub fn quality_score(record: &CanonicalBusinessRecord) -> u8 {
    let deductions = [
        (record.domain.is_none(), MISSING_DOMAIN),
        (record.phone.is_none(), MISSING_PHONE),
        (record.address_line1.is_none(), MISSING_ADDRESS),
        (record.naics_code.is_none(), MISSING_NAICS),
        (record.email.is_none(), MISSING_EMAIL),
    ];
    let missing: u32 = deductions
        .iter()
        .filter(|(absent, _)| *absent)
        .map(|(_, points)| u32::from(*points))
        .sum();
    100u32.saturating_sub(missing) as u8
}

/// Copy of `record` carrying its recomputed score.
pub fn score(record: &CanonicalBusinessRecord) -> CanonicalBusinessRecord {
    CanonicalBusinessRecord {
        quality_score: quality_score(record),
        ..record.clone()
    }
}

pub fn score_all(records: Vec<CanonicalBusinessRecord>) -> Vec<CanonicalBusinessRecord> {
    records
        .into_iter()
        .map(|mut record| {
            record.quality_score = quality_score(&record);
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_missing_everything_scores_45() {
        let record = CanonicalBusinessRecord::new("Bare", "CA", "test", Utc::now());
        assert_eq!(quality_score(&record), 45);
    }

    #[test]
    fn test_complete_record_scores_100() {
        let mut record = CanonicalBusinessRecord::new("Full", "CA", "test", Utc::now());
        record.domain = Some("full.com".into());
        record.phone = Some("+15551234567".into());
        record.address_line1 = Some("1 Main St".into());
        record.naics_code = Some("541511".into());
        record.email = Some("hi@full.com".into());
        assert_eq!(quality_score(&record), 100);

        record.email = None;
        record.phone = None;
        assert_eq!(quality_score(&record), 85);
    }

    #[test]
    fn test_score_returns_new_record() {
        let mut record = CanonicalBusinessRecord::new("Bare", "CA", "test", Utc::now());
        record.quality_score = 99;
        let scored = score(&record);
        assert_eq!(scored.quality_score, 45);
        assert_eq!(record.quality_score, 99);
    }
}
