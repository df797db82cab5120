//! Canonical record shapes shared by every layer.

pub mod request;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::SOURCE_SEPARATOR;

pub use request::{BusinessPullRequest, PullCriteria, RfpCriteria, RfpPullRequest};

/// Business-size tier assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessSize {
    Micro,
    Small,
    Medium,
    Large,
}

impl BusinessSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessSize::Micro => "micro",
            BusinessSize::Small => "small",
            BusinessSize::Medium => "medium",
            BusinessSize::Large => "large",
        }
    }
}

impl fmt::Display for BusinessSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusinessSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "micro" => Ok(BusinessSize::Micro),
            "small" => Ok(BusinessSize::Small),
            "medium" => Ok(BusinessSize::Medium),
            "large" => Ok(BusinessSize::Large),
            other => Err(format!(
                "business_size must be one of: micro, small, medium, large (got '{other}')"
            )),
        }
    }
}

/// A business entity after normalization.
///
/// Merged records carry every contributing source tag in `source`
/// (sorted, de-duplicated, `;`-joined) and the latest `last_verified`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalBusinessRecord {
    pub company_name: String,
    pub domain: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: String,
    pub postal_code: Option<String>,
    pub country: String,
    pub county: Option<String>,
    pub county_fips: Option<String>,
    pub naics_code: Option<String>,
    pub industry: Option<String>,
    pub founded_year: Option<i32>,
    pub years_in_business: Option<i32>,
    pub employee_count: Option<i64>,
    pub annual_revenue_usd: Option<i64>,
    pub business_size: Option<BusinessSize>,
    pub is_small_business: Option<bool>,
    pub source: String,
    pub last_verified: DateTime<Utc>,
    pub quality_score: u8,
}

impl CanonicalBusinessRecord {
    /// Minimal record; every optional field absent.
    pub fn new(company_name: &str, state: &str, source: &str, last_verified: DateTime<Utc>) -> Self {
        Self {
            company_name: company_name.to_string(),
            domain: None,
            phone: None,
            email: None,
            address_line1: None,
            city: None,
            state: state.to_string(),
            postal_code: None,
            country: crate::constants::DEFAULT_COUNTRY.to_string(),
            county: None,
            county_fips: None,
            naics_code: None,
            industry: None,
            founded_year: None,
            years_in_business: None,
            employee_count: None,
            annual_revenue_usd: None,
            business_size: None,
            is_small_business: None,
            source: source.to_string(),
            last_verified,
            quality_score: 0,
        }
    }

    /// Individual tags of the `source` set.
    pub fn source_tags(&self) -> impl Iterator<Item = &str> {
        self.source
            .split(SOURCE_SEPARATOR)
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
    }

    /// Lower-cased domain, the key of the reconciler's first tier.
    pub fn domain_key(&self) -> Option<String> {
        self.domain.as_ref().map(|d| d.to_lowercase())
    }
}

/// A government solicitation after normalization. Never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRfpRecord {
    pub notice_id: String,
    pub title: String,
    pub agency: Option<String>,
    pub naics: Option<String>,
    pub solicitation_number: Option<String>,
    pub notice_type: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
    pub place_of_performance_state: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub estimated_value: Option<String>,
    pub source: String,
    pub last_checked: DateTime<Utc>,
}

/// Outcome of the QA validator for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaReport {
    pub passed: bool,
    pub total_rows: usize,
    pub dupes: usize,
    pub violations: Vec<String>,
}

impl QaReport {
    pub fn from_violations(total_rows: usize, dupes: usize, violations: Vec<String>) -> Self {
        Self {
            passed: violations.is_empty(),
            total_rows,
            dupes,
            violations,
        }
    }
}

/// Response shape returned by the pull use cases (CLI and HTTP).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub ok: bool,
    pub message: Option<String>,
    pub export_path: Option<String>,
    pub qa_report: Option<QaReport>,
}
