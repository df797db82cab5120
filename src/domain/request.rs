//! Requester-supplied pull parameters and their boundary validation.
//!
//! The wire types (`*PullRequest`) are what the CLI and HTTP surface accept;
//! `validate` turns them into the read-only criteria consumed by the pipeline.
//! Everything rejected here never reaches the core.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::{is_valid_state, DEFAULT_LIMIT, MAX_BUSINESS_LIMIT, MAX_RFP_LIMIT};
use crate::domain::BusinessSize;
use crate::error::{DataForgeError, Result};

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessPullRequest {
    pub states: Vec<String>,
    #[serde(default)]
    pub naics: Option<Vec<String>>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub min_emp: Option<u64>,
    #[serde(default)]
    pub max_emp: Option<u64>,
    #[serde(default)]
    pub min_rev: Option<u64>,
    #[serde(default)]
    pub max_rev: Option<u64>,
    #[serde(default)]
    pub min_years: Option<u32>,
    #[serde(default)]
    pub max_years: Option<u32>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub enable_geocoder: Option<bool>,
    #[serde(default)]
    pub small_business_only: Option<bool>,
    #[serde(default)]
    pub business_size: Option<String>,
}

/// Validated business filter/limit parameters. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullCriteria {
    pub states: Vec<String>,
    pub naics: Vec<String>,
    pub keywords: Vec<String>,
    pub min_emp: Option<u64>,
    pub max_emp: Option<u64>,
    pub min_rev: Option<u64>,
    pub max_rev: Option<u64>,
    pub min_years: Option<u32>,
    pub max_years: Option<u32>,
    pub limit: usize,
    pub enable_geocoder: bool,
    pub small_business_only: bool,
    pub business_size: Option<BusinessSize>,
}

impl Default for PullCriteria {
    fn default() -> Self {
        Self {
            states: Vec::new(),
            naics: Vec::new(),
            keywords: Vec::new(),
            min_emp: None,
            max_emp: None,
            min_rev: None,
            max_rev: None,
            min_years: None,
            max_years: None,
            limit: DEFAULT_LIMIT,
            enable_geocoder: false,
            small_business_only: false,
            business_size: None,
        }
    }
}

impl BusinessPullRequest {
    /// Minimal request for the given states, everything else defaulted.
    pub fn for_states(states: &[&str]) -> Self {
        Self {
            states: states.iter().map(|s| s.to_string()).collect(),
            naics: None,
            keywords: None,
            min_emp: None,
            max_emp: None,
            min_rev: None,
            max_rev: None,
            min_years: None,
            max_years: None,
            limit: DEFAULT_LIMIT,
            enable_geocoder: None,
            small_business_only: None,
            business_size: None,
        }
    }

    /// Validate the request. `geocoder_default` applies when the request
    /// does not say whether geocoding is wanted.
    pub fn validate(&self, geocoder_default: bool) -> Result<PullCriteria> {
        let states = validate_states(&self.states)?;
        validate_limit(self.limit, MAX_BUSINESS_LIMIT)?;
        validate_range("emp", self.min_emp, self.max_emp)?;
        validate_range("rev", self.min_rev, self.max_rev)?;
        validate_range("years", self.min_years, self.max_years)?;

        let business_size = match &self.business_size {
            Some(raw) if !raw.trim().is_empty() => {
                Some(raw.parse::<BusinessSize>().map_err(DataForgeError::InvalidRequest)?)
            }
            _ => None,
        };

        Ok(PullCriteria {
            states,
            naics: clean_list(self.naics.as_deref()),
            keywords: clean_list(self.keywords.as_deref()),
            min_emp: self.min_emp,
            max_emp: self.max_emp,
            min_rev: self.min_rev,
            max_rev: self.max_rev,
            min_years: self.min_years,
            max_years: self.max_years,
            limit: self.limit,
            enable_geocoder: self.enable_geocoder.unwrap_or(geocoder_default),
            small_business_only: self.small_business_only.unwrap_or(false),
            business_size,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfpPullRequest {
    pub states: Vec<String>,
    #[serde(default)]
    pub naics: Option<Vec<String>>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub posted_from: Option<NaiveDate>,
    #[serde(default)]
    pub posted_to: Option<NaiveDate>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Validated solicitation pull parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfpCriteria {
    pub states: Vec<String>,
    pub naics: Vec<String>,
    pub keywords: Vec<String>,
    pub posted_from: Option<NaiveDate>,
    pub posted_to: Option<NaiveDate>,
    pub limit: usize,
}

impl RfpPullRequest {
    pub fn validate(&self) -> Result<RfpCriteria> {
        let states = validate_states(&self.states)?;
        validate_limit(self.limit, MAX_RFP_LIMIT)?;
        if let (Some(from), Some(to)) = (self.posted_from, self.posted_to) {
            if to < from {
                return Err(DataForgeError::invalid(
                    "posted_to must be greater than or equal to posted_from",
                ));
            }
        }

        Ok(RfpCriteria {
            states,
            naics: clean_list(self.naics.as_deref()),
            keywords: clean_list(self.keywords.as_deref()),
            posted_from: self.posted_from,
            posted_to: self.posted_to,
            limit: self.limit,
        })
    }
}

fn validate_states(states: &[String]) -> Result<Vec<String>> {
    let upper: Vec<String> = states.iter().map(|s| s.trim().to_uppercase()).collect();
    let invalid: Vec<&str> = upper
        .iter()
        .map(String::as_str)
        .filter(|s| !is_valid_state(s))
        .collect();
    if !invalid.is_empty() {
        return Err(DataForgeError::invalid(format!(
            "Invalid state codes: {}",
            invalid.join(", ")
        )));
    }
    Ok(upper)
}

fn validate_limit(limit: usize, max: usize) -> Result<()> {
    if limit == 0 || limit > max {
        return Err(DataForgeError::invalid(format!(
            "limit must be between 1 and {max} (got {limit})"
        )));
    }
    Ok(())
}

fn validate_range<T: PartialOrd + std::fmt::Display>(name: &str, min: Option<T>, max: Option<T>) -> Result<()> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(DataForgeError::invalid(format!(
                "min_{name} ({min}) must not exceed max_{name} ({max})"
            )));
        }
    }
    Ok(())
}

fn clean_list(values: Option<&[String]>) -> Vec<String> {
    values
        .unwrap_or_default()
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
