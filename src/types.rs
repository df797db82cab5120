use crate::domain::{PullCriteria, RfpCriteria};
use crate::error::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw record as returned from an external source: an untyped mapping of
/// string keys to primitive values. Schema varies per source.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// What a connector is asked for. Built from validated criteria.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceQuery {
    pub states: Vec<String>,
    pub naics: Vec<String>,
    pub keywords: Vec<String>,
    pub posted_from: Option<NaiveDate>,
    pub posted_to: Option<NaiveDate>,
    pub limit: usize,
}

impl From<&PullCriteria> for SourceQuery {
    fn from(criteria: &PullCriteria) -> Self {
        Self {
            states: criteria.states.clone(),
            naics: criteria.naics.clone(),
            keywords: criteria.keywords.clone(),
            posted_from: None,
            posted_to: None,
            limit: criteria.limit,
        }
    }
}

impl From<&RfpCriteria> for SourceQuery {
    fn from(criteria: &RfpCriteria) -> Self {
        Self {
            states: criteria.states.clone(),
            naics: criteria.naics.clone(),
            keywords: criteria.keywords.clone(),
            posted_from: criteria.posted_from,
            posted_to: criteria.posted_to,
            limit: criteria.limit,
        }
    }
}

/// Which pipeline a connector feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Business,
    Rfp,
}

/// Core trait that all record sources must implement
#[async_trait::async_trait]
pub trait SourceConnector: Send + Sync {
    /// Unique identifier for this connector, also its default source tag
    fn source_id(&self) -> &'static str;

    /// Which kind of record this connector yields
    fn kind(&self) -> RecordKind;

    /// Fetch raw records matching the query. Retry/backoff is the connector's
    /// own business; the pipeline only sees the final list.
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawRecord>>;
}

/// Turn a JSON object into a raw record; anything else yields an empty one.
pub fn raw_record(value: serde_json::Value) -> RawRecord {
    match value {
        serde_json::Value::Object(map) => map,
        _ => RawRecord::new(),
    }
}
