use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::domain::{BusinessSize, CanonicalBusinessRecord};

const MICRO_MAX_EMPLOYEES: i64 = 9;
const SMALL_MAX_EMPLOYEES: i64 = 49;
const MEDIUM_MAX_EMPLOYEES: i64 = 249;

const MICRO_MAX_REVENUE: i64 = 1_000_000;
const SMALL_MAX_REVENUE: i64 = 10_000_000;
const MEDIUM_MAX_REVENUE: i64 = 50_000_000;

/// SBA-style employee ceilings under which a NAICS code still counts as small.
static NAICS_SMALL_CEILINGS: Lazy<HashMap<&'static str, i64>> = Lazy::new(|| {
    [
        // Computer systems design
        "541511", "541512", "541513", "541519",
        // Ambulatory health care
        "621111", "621112", "621210", "621310", "621320", "621330", "621340", "621391", "621399",
        // Management consulting
        "541611", "541612", "541613", "541614", "541618", "541690",
        // Advertising and related services
        "541810", "541820", "541830", "541840", "541850", "541860", "541870", "541890",
        // Other professional services
        "541910", "541920", "541930", "541940", "541990",
    ]
    .into_iter()
    .map(|code| (code, 1500))
    .collect()
});

/// Employee ceiling for "small" under the given NAICS code, if the code has one.
pub fn naics_small_ceiling(naics: &str) -> Option<i64> {
    NAICS_SMALL_CEILINGS.get(naics.trim()).copied()
}

/// Trait for assigning size tiers to business records
pub trait Classifier {
    fn classify(&self, record: CanonicalBusinessRecord) -> CanonicalBusinessRecord;
}

/// Employee count first, revenue as fallback, NAICS ceilings on top.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeClassifier;

impl SizeClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Size tier and small-business flag for the record's figures, or `None`
    /// when neither employee count nor revenue is known.
    pub fn size_of(&self, record: &CanonicalBusinessRecord) -> Option<(BusinessSize, bool)> {
        if let Some(employees) = record.employee_count {
            let ceiling = record.naics_code.as_deref().and_then(naics_small_ceiling);
            return Some(match ceiling {
                Some(ceiling) => by_employees_with_ceiling(employees, ceiling),
                None => by_employees(employees),
            });
        }
        record.annual_revenue_usd.map(by_revenue)
    }
}

impl Classifier for SizeClassifier {
    fn classify(&self, mut record: CanonicalBusinessRecord) -> CanonicalBusinessRecord {
        if let Some((size, is_small)) = self.size_of(&record) {
            record.business_size = Some(size);
            record.is_small_business = Some(is_small);
        }
        record
    }
}

fn by_employees(employees: i64) -> (BusinessSize, bool) {
    if employees <= MICRO_MAX_EMPLOYEES {
        (BusinessSize::Micro, true)
    } else if employees <= SMALL_MAX_EMPLOYEES {
        (BusinessSize::Small, true)
    } else if employees <= MEDIUM_MAX_EMPLOYEES {
        (BusinessSize::Medium, false)
    } else {
        (BusinessSize::Large, false)
    }
}

fn by_employees_with_ceiling(employees: i64, ceiling: i64) -> (BusinessSize, bool) {
    if employees <= MICRO_MAX_EMPLOYEES {
        (BusinessSize::Micro, true)
    } else if employees <= SMALL_MAX_EMPLOYEES || employees <= ceiling {
        // still small by the NAICS standard
        (BusinessSize::Small, true)
    } else if employees <= MEDIUM_MAX_EMPLOYEES {
        (BusinessSize::Medium, false)
    } else {
        (BusinessSize::Large, false)
    }
}

fn by_revenue(revenue: i64) -> (BusinessSize, bool) {
    if revenue <= MICRO_MAX_REVENUE {
        (BusinessSize::Micro, true)
    } else if revenue <= SMALL_MAX_REVENUE {
        (BusinessSize::Small, true)
    } else if revenue <= MEDIUM_MAX_REVENUE {
        (BusinessSize::Medium, false)
    } else {
        (BusinessSize::Large, false)
    }
}
