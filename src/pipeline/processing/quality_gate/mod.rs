//! QA checkpoint over a final batch.
//!
//! Violations are collected as messages; they never block the batch. A
//! report with no violations has `passed = true`.

use std::collections::HashSet;

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::is_valid_state;
use crate::domain::{CanonicalBusinessRecord, CanonicalRfpRecord, QaReport};
use crate::observability;

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?\d{10,11}$").expect("valid phone regex"));
static FIPS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").expect("valid fips regex"));

/// Allowed drift between `years_in_business` and the value implied by
/// `founded_year` at `last_verified`.
const YEARS_TOLERANCE: i32 = 1;

/// Trait for batch quality checks
pub trait QualityGate<R> {
    fn assess(&self, records: &[R]) -> QaReport;
}

/// Business batch checks. County FIPS is only checked when geocoding was
/// requested upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusinessQualityGate {
    geocode_enabled: bool,
}

impl BusinessQualityGate {
    pub fn new(geocode_enabled: bool) -> Self {
        Self { geocode_enabled }
    }

    fn violations_for(&self, record: &CanonicalBusinessRecord, violations: &mut Vec<String>) {
        if !is_valid_state(&record.state.to_uppercase()) {
            violations.push(format!("Invalid state {}", record.state));
        }

        if let Some(phone) = &record.phone {
            if !PHONE_PATTERN.is_match(&phone.replace('+', "")) {
                violations.push(format!("Bad phone {phone}"));
            }
        }

        if self.geocode_enabled {
            if let Some(fips) = &record.county_fips {
                if !FIPS_PATTERN.is_match(fips) {
                    violations.push(format!("Invalid county_fips {fips}"));
                }
            }
        }

        if let (Some(founded), Some(years)) = (record.founded_year, record.years_in_business) {
            if founded != 0 {
                let expected = (record.last_verified.year() - founded).max(0);
                if (expected - years).abs() > YEARS_TOLERANCE {
                    violations.push(format!(
                        "years_in_business mismatch for {}",
                        record.company_name
                    ));
                }
            }
        }
    }
}

impl QualityGate<CanonicalBusinessRecord> for BusinessQualityGate {
    fn assess(&self, records: &[CanonicalBusinessRecord]) -> QaReport {
        let mut violations = Vec::new();
        for record in records {
            self.violations_for(record, &mut violations);
        }

        // Deduplication already happened in the reconciler
        let report = QaReport::from_violations(records.len(), 0, violations);
        observability::quality_gate::batch_assessed("business", &report);
        report
    }
}

/// Solicitation batch checks: `notice_id` must be unique.
#[derive(Debug, Clone, Copy, Default)]
pub struct RfpQualityGate;

impl QualityGate<CanonicalRfpRecord> for RfpQualityGate {
    fn assess(&self, records: &[CanonicalRfpRecord]) -> QaReport {
        let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
        let mut violations = Vec::new();
        for record in records {
            if !seen.insert(record.notice_id.as_str()) {
                violations.push(format!("Duplicate notice_id {}", record.notice_id));
            }
        }

        let report = QaReport::from_violations(records.len(), records.len() - seen.len(), violations);
        observability::quality_gate::batch_assessed("rfp", &report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn business(name: &str, state: &str) -> CanonicalBusinessRecord {
        CanonicalBusinessRecord::new(name, state, "test", Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())
    }

    fn rfp(notice_id: &str) -> CanonicalRfpRecord {
        CanonicalRfpRecord {
            notice_id: notice_id.to_string(),
            title: "Notice".to_string(),
            agency: None,
            naics: None,
            solicitation_number: None,
            notice_type: None,
            posted_date: None,
            close_date: None,
            place_of_performance_state: None,
            description: None,
            url: None,
            contact_name: None,
            contact_email: None,
            estimated_value: None,
            source: "sam.gov".to_string(),
            last_checked: Utc::now(),
        }
    }

    #[test]
    fn test_one_invalid_state_yields_one_violation() {
        let report = BusinessQualityGate::new(false).assess(&[business("Good", "CA"), business("Bad", "ZZ")]);
        assert!(!report.passed);
        assert_eq!(report.violations, vec!["Invalid state ZZ".to_string()]);
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.dupes, 0);
    }

    #[test]
    fn test_all_valid_batch_passes() {
        let mut a = business("A", "NY");
        a.phone = Some("+15551234567".into());
        a.founded_year = Some(2020);
        a.years_in_business = Some(5);
        let report = BusinessQualityGate::new(true).assess(&[a, business("B", "DC")]);
        assert!(report.passed);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_phone_fips_and_years_checks() {
        let mut record = business("Acme", "TX");
        record.phone = Some("12345".into());
        record.county_fips = Some("123".into());
        record.founded_year = Some(2010);
        record.years_in_business = Some(3);

        let without_geo = BusinessQualityGate::new(false).assess(&[record.clone()]);
        assert_eq!(
            without_geo.violations,
            vec!["Bad phone 12345".to_string(), "years_in_business mismatch for Acme".to_string()]
        );

        let with_geo = BusinessQualityGate::new(true).assess(&[record]);
        assert_eq!(with_geo.violations.len(), 3);
        assert!(with_geo.violations.contains(&"Invalid county_fips 123".to_string()));
    }

    #[test]
    fn test_years_within_tolerance_pass() {
        let mut record = business("Acme", "TX");
        record.founded_year = Some(2015);
        record.years_in_business = Some(9);
        assert!(BusinessQualityGate::new(false).assess(&[record]).passed);
    }

    #[test]
    fn test_rfp_duplicates_counted() {
        let report = RfpQualityGate.assess(&[rfp("a"), rfp("b"), rfp("a"), rfp("a")]);
        assert!(!report.passed);
        assert_eq!(report.dupes, 2);
        assert_eq!(report.violations, vec!["Duplicate notice_id a", "Duplicate notice_id a"]);

        let clean = RfpQualityGate.assess(&[rfp("a"), rfp("b")]);
        assert!(clean.passed);
        assert_eq!(clean.dupes, 0);
    }
}
