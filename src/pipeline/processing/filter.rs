use crate::domain::{CanonicalBusinessRecord, PullCriteria};

/// Conjunction of the criteria predicates over reconciled business records.
/// Bounds only constrain values that are known; absent values pass.
#[derive(Debug, Clone)]
pub struct RecordFilter<'a> {
    criteria: &'a PullCriteria,
    keywords: Vec<String>,
}

impl<'a> RecordFilter<'a> {
    pub fn new(criteria: &'a PullCriteria) -> Self {
        // NAICS codes double as free-text keywords
        let mut keywords: Vec<String> = criteria
            .keywords
            .iter()
            .chain(criteria.naics.iter())
            .filter(|k| !k.is_empty())
            .map(|k| k.to_lowercase())
            .collect();
        keywords.sort();
        keywords.dedup();
        Self { criteria, keywords }
    }

    pub fn matches(&self, record: &CanonicalBusinessRecord) -> bool {
        let c = self.criteria;

        if !c.naics.is_empty() {
            if let Some(code) = &record.naics_code {
                if !c.naics.contains(code) {
                    return false;
                }
            }
        }

        if !self.keywords.is_empty() && !self.matches_keywords(record) {
            return false;
        }

        let years = record.years_in_business.map(i64::from);
        if !within(years, c.min_years.map(i64::from), c.max_years.map(i64::from)) {
            return false;
        }
        if !within(record.employee_count, to_i64(c.min_emp), to_i64(c.max_emp)) {
            return false;
        }
        if !within(record.annual_revenue_usd, to_i64(c.min_rev), to_i64(c.max_rev)) {
            return false;
        }

        if c.small_business_only && record.is_small_business != Some(true) {
            return false;
        }
        if let Some(size) = c.business_size {
            if record.business_size != Some(size) {
                return false;
            }
        }
        true
    }

    /// Order-preserving subset of `records` that passes every predicate.
    pub fn apply(&self, records: Vec<CanonicalBusinessRecord>) -> Vec<CanonicalBusinessRecord> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }

    fn matches_keywords(&self, record: &CanonicalBusinessRecord) -> bool {
        let haystack = [
            Some(record.company_name.as_str()),
            record.industry.as_deref(),
            record.domain.as_deref(),
            record.naics_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }
}

fn to_i64(bound: Option<u64>) -> Option<i64> {
    bound.map(|b| i64::try_from(b).unwrap_or(i64::MAX))
}

fn within(value: Option<i64>, min: Option<i64>, max: Option<i64>) -> bool {
    let Some(value) = value else {
        return true;
    };
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}
