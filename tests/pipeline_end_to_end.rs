use dataforge::domain::{BusinessSize, PullCriteria};
use dataforge::types::{raw_record, RawRecord};
use dataforge::{reconcile_business_batch, reconcile_rfp_batch};
use serde_json::json;

fn criteria() -> PullCriteria {
    PullCriteria {
        states: vec!["CA".to_string()],
        ..PullCriteria::default()
    }
}

fn acme_pair() -> Vec<RawRecord> {
    vec![
        raw_record(json!({
            "company_name": "Acme Corporation",
            "postal_code": "12345",
            "state": "ca",
            "source": "opencorporates",
            "last_verified": "2025-01-01T00:00:00Z"
        })),
        raw_record(json!({
            "company_name": "Acme Corp",
            "postal_code": "12345",
            "state": "ca",
            "source": "state_manual:CA",
            "email": "info@acme.test",
            "last_verified": "2025-03-01T00:00:00Z"
        })),
    ]
}

#[test]
fn test_fuzzy_name_pair_reconciles_to_one_clean_record() {
    let (records, report) = reconcile_business_batch(&acme_pair(), &criteria());

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.state, "CA");
    assert_eq!(record.company_name, "Acme Corporation");
    assert_eq!(record.source, "opencorporates;state_manual:CA");
    assert_eq!(record.email.as_deref(), Some("info@acme.test"));
    assert_eq!(record.last_verified.to_rfc3339(), "2025-03-01T00:00:00+00:00");

    let report = report.expect("non-empty batch has a report");
    assert!(report.passed);
    assert!(report.violations.is_empty());
    assert_eq!(report.total_rows, 1);
    assert_eq!(report.dupes, 0);
}

#[test]
fn test_merge_order_keeps_sources_and_latest_verification() {
    let forward = acme_pair();
    let mut backward = acme_pair();
    backward.reverse();

    let (a, _) = reconcile_business_batch(&forward, &criteria());
    let (b, _) = reconcile_business_batch(&backward, &criteria());

    assert_eq!(a[0].source, b[0].source);
    assert_eq!(a[0].last_verified, b[0].last_verified);
    // first seen wins the conflicting name; the email only one side has survives either way
    assert_eq!(a[0].company_name, "Acme Corporation");
    assert_eq!(b[0].company_name, "Acme Corp");
    assert_eq!(a[0].email, b[0].email);
}

#[test]
fn test_different_postal_codes_never_fuzzy_merge() {
    let mut raw = acme_pair();
    raw[1].insert("postal_code".to_string(), json!("67890"));
    let (records, _) = reconcile_business_batch(&raw, &criteria());
    assert_eq!(records.len(), 2);
}

#[test]
fn test_filters_limit_and_scores() {
    let raw = vec![
        raw_record(json!({"company_name": "Tiny Telehealth", "state": "CA", "employee_count": 4, "industry": "Telehealth services"})),
        raw_record(json!({"company_name": "Mid Telehealth", "state": "CA", "employee_count": 120, "industry": "Telehealth"})),
        raw_record(json!({"company_name": "Big Box Retail", "state": "CA", "employee_count": 900, "industry": "Retail"})),
    ];
    let criteria = PullCriteria {
        keywords: vec!["telehealth".to_string()],
        ..criteria()
    };

    let (records, report) = reconcile_business_batch(&raw, &criteria);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].business_size, Some(BusinessSize::Micro));
    assert_eq!(records[1].business_size, Some(BusinessSize::Medium));
    // missing domain, phone, address, naics and email
    assert!(records.iter().all(|r| r.quality_score == 45));
    assert!(report.unwrap().passed);

    let small_only = PullCriteria {
        small_business_only: true,
        ..criteria.clone()
    };
    let (records, _) = reconcile_business_batch(&raw, &small_only);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].company_name, "Tiny Telehealth");

    let limited = PullCriteria { limit: 1, ..criteria };
    let (records, report) = reconcile_business_batch(&raw, &limited);
    assert_eq!(records.len(), 1);
    assert_eq!(report.unwrap().total_rows, 1);
}

#[test]
fn test_invalid_state_fails_qa_with_one_violation() {
    let raw = vec![
        raw_record(json!({"company_name": "Good Co", "state": "CA"})),
        raw_record(json!({"company_name": "Bad Co", "state": "ZZ"})),
    ];
    let (records, report) = reconcile_business_batch(&raw, &criteria());
    assert_eq!(records.len(), 2);
    let report = report.unwrap();
    assert!(!report.passed);
    assert_eq!(report.violations, vec!["Invalid state ZZ"]);
}

#[test]
fn test_empty_batches_have_no_report() {
    assert!(reconcile_business_batch(&[], &criteria()).1.is_none());
    assert!(reconcile_rfp_batch(&[]).1.is_none());
}

#[test]
fn test_rfp_batch_counts_duplicate_notices() {
    let raw = vec![
        raw_record(json!({"notice_id": "n-1", "title": "Cloud hosting", "posted_date": "2025-09-01"})),
        raw_record(json!({"notice_id": "n-1", "title": "Cloud hosting (amended)"})),
        raw_record(json!({"notice_id": "n-2"})),
    ];
    let (records, report) = reconcile_rfp_batch(&raw);

    assert_eq!(records.len(), 3);
    assert_eq!(records[2].title, "Untitled");
    assert_eq!(records[0].source, "sam.gov");
    let report = report.unwrap();
    assert!(!report.passed);
    assert_eq!(report.dupes, 1);
    assert_eq!(report.violations, vec!["Duplicate notice_id n-1"]);
}
