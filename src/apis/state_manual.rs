//! Local CSV drops of state business registries.
//!
//! Files live in the configured directory and are picked up when their name
//! contains the state code. Each state needs a column mapper at
//! `mappers/<state>_mapper.toml` naming the CSV header for each field.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::constants::{DEFAULT_COUNTRY, STATE_MANUAL_SOURCE};
use crate::error::Result;
use crate::types::{RawRecord, RecordKind, SourceConnector, SourceQuery};

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Maps business fields to the CSV column that holds them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnMapper {
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naics_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub founded_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual_revenue_usd: Option<String>,
}

impl ColumnMapper {
    pub fn sample() -> Self {
        Self {
            company_name: Some("Company Name".into()),
            domain: Some("Website".into()),
            phone: Some("Phone".into()),
            email: Some("Email".into()),
            address_line1: Some("Address".into()),
            city: Some("City".into()),
            postal_code: Some("Zip Code".into()),
            naics_code: Some("NAICS".into()),
            industry: Some("Industry".into()),
            founded_year: Some("Founded Year".into()),
            employee_count: Some("Employees".into()),
            ..Self::default()
        }
    }

    /// (field, column) pairs for every mapped field.
    pub fn columns(&self) -> Vec<(&'static str, &str)> {
        [
            ("company_name", &self.company_name),
            ("domain", &self.domain),
            ("phone", &self.phone),
            ("email", &self.email),
            ("address_line1", &self.address_line1),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("postal_code", &self.postal_code),
            ("county", &self.county),
            ("naics_code", &self.naics_code),
            ("industry", &self.industry),
            ("founded_year", &self.founded_year),
            ("employee_count", &self.employee_count),
            ("annual_revenue_usd", &self.annual_revenue_usd),
        ]
        .into_iter()
        .filter_map(|(field, column)| column.as_deref().map(|c| (field, c)))
        .collect()
    }
}

pub struct StateManualConnector {
    data_dir: PathBuf,
}

impl StateManualConnector {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn mappers_dir(&self) -> PathBuf {
        self.data_dir.join("mappers")
    }

    fn mapper_path(&self, state: &str) -> PathBuf {
        self.mappers_dir()
            .join(format!("{}_mapper.toml", state.to_lowercase()))
    }

    pub fn load_mapper(&self, state: &str) -> Result<Option<ColumnMapper>> {
        let path = self.mapper_path(state);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        Ok(Some(toml::from_str(&text)?))
    }

    /// Write the sample mapper for `state` and return its path.
    pub fn create_sample_mapper(&self, state: &str) -> Result<PathBuf> {
        fs::create_dir_all(self.mappers_dir())?;
        let path = self.mapper_path(state);
        fs::write(&path, toml::to_string(&ColumnMapper::sample())?)?;
        info!(path = %path.display(), "Created sample mapper for {}", state.to_uppercase());
        Ok(path)
    }

    /// CSV files whose name mentions the state code, in name order.
    fn csv_files(&self, state: &str) -> Result<Vec<PathBuf>> {
        if !self.data_dir.is_dir() {
            return Ok(Vec::new());
        }
        let needle = state.to_lowercase();
        let mut files: Vec<PathBuf> = fs::read_dir(&self.data_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
                    && path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .is_some_and(|s| s.to_lowercase().contains(&needle))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn read_file(
        &self,
        path: &Path,
        mapper: &ColumnMapper,
        state: &str,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<RawRecord>> {
        let bytes = fs::read(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(sniff_delimiter(&bytes))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes.as_slice());

        let headers = reader.headers()?.clone();
        let columns = mapper.columns();
        let mut records = Vec::new();

        for row in reader.records() {
            if records.len() >= limit {
                break;
            }
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable CSV row");
                    continue;
                }
            };

            let mut record = RawRecord::new();
            for (field, column) in &columns {
                let value = headers
                    .iter()
                    .position(|h| h == *column)
                    .and_then(|i| row.get(i))
                    .filter(|v| !v.is_empty())
                    .map(|v| Value::String(v.to_string()))
                    .unwrap_or(Value::Null);
                record.insert(field.to_string(), value);
            }
            if !record.get("company_name").is_some_and(|v| v.is_string()) {
                continue;
            }
            if !keywords.is_empty() && !mentions_keyword(&record, keywords) {
                continue;
            }

            record.insert(
                "source".into(),
                Value::String(format!("{STATE_MANUAL_SOURCE}:{}", state.to_uppercase())),
            );
            record.entry("country").or_insert_with(|| DEFAULT_COUNTRY.into());
            if record.get("state").map_or(true, Value::is_null) {
                record.insert("state".into(), Value::String(state.to_uppercase()));
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn mentions_keyword(record: &RawRecord, keywords: &[String]) -> bool {
    let text = ["company_name", "industry", "naics_code"]
        .iter()
        .filter_map(|k| record.get(*k).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    keywords.iter().any(|k| text.contains(&k.to_lowercase()))
}

/// Pick the candidate delimiter that occurs most in the header line.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let header = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .max_by_key(|d| header.iter().filter(|b| *b == d).count())
        .filter(|d| header.contains(d))
        .unwrap_or(b',')
}

#[async_trait]
impl SourceConnector for StateManualConnector {
    fn source_id(&self) -> &'static str {
        STATE_MANUAL_SOURCE
    }

    fn kind(&self) -> RecordKind {
        RecordKind::Business
    }

    #[instrument(skip(self, query), fields(dir = %self.data_dir.display()))]
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();

        for state in &query.states {
            let mapper = match self.load_mapper(state) {
                Ok(Some(mapper)) => mapper,
                Ok(None) => {
                    info!(state = %state, "No mapper for state, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(state = %state, error = %e, "Unreadable mapper, skipping state");
                    continue;
                }
            };

            for file in self.csv_files(state)? {
                let remaining = query.limit.saturating_sub(records.len());
                if remaining == 0 {
                    break;
                }
                match self.read_file(&file, &mapper, state, &query.keywords, remaining) {
                    Ok(batch) => records.extend(batch),
                    Err(e) => warn!(file = %file.display(), error = %e, "Failed to read CSV drop"),
                }
            }
        }

        records.truncate(query.limit);
        info!(count = records.len(), "State manual search completed");
        Ok(records)
    }
}
