// Pipeline ingestion: fan-in over source connectors and deterministic ordering

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};

use crate::observability;
use crate::types::{RawRecord, SourceConnector, SourceQuery};

/// Runs every configured connector in turn and concatenates their records.
/// A failing connector is logged and contributes nothing.
#[derive(Clone, Default)]
pub struct Ingestor {
    connectors: Vec<Arc<dyn SourceConnector>>,
}

impl Ingestor {
    pub fn new(connectors: Vec<Arc<dyn SourceConnector>>) -> Self {
        Self { connectors }
    }

    pub fn source_ids(&self) -> Vec<&'static str> {
        self.connectors.iter().map(|c| c.source_id()).collect()
    }

    pub async fn collect(&self, query: &SourceQuery) -> Vec<RawRecord> {
        let mut records = Vec::new();
        for connector in &self.connectors {
            let source_id = connector.source_id();
            let started = Instant::now();
            match connector.fetch(query).await {
                Ok(batch) => {
                    info!(source = source_id, count = batch.len(), "Fetched records");
                    observability::sources::fetch_success(source_id, batch.len());
                    records.extend(batch);
                }
                Err(e) => {
                    warn!(source = source_id, error = %e, "Source fetch failed, continuing without it");
                    observability::sources::fetch_error(source_id);
                }
            }
            observability::sources::fetch_duration(source_id, started.elapsed().as_secs_f64());
        }
        records
    }
}

/// Stable sort by a string field; missing values sort first.
pub fn sort_by_field(records: &mut [RawRecord], field: &str) {
    records.sort_by(|a, b| compare_field(a, b, field));
}

/// Business batches are ordered by company name before reconciliation.
pub fn sort_business(records: &mut [RawRecord]) {
    sort_by_field(records, "company_name");
}

/// Solicitation batches are ordered by notice id.
pub fn sort_rfp(records: &mut [RawRecord]) {
    sort_by_field(records, "notice_id");
}

fn compare_field(a: &RawRecord, b: &RawRecord, field: &str) -> Ordering {
    sort_key(a.get(field)).cmp(&sort_key(b.get(field)))
}

fn sort_key(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DataForgeError, Result};
    use crate::types::RecordKind;
    use async_trait::async_trait;
    use serde_json::json;

    struct Fixed(&'static str, Vec<RawRecord>);
    struct Broken;

    #[async_trait]
    impl SourceConnector for Fixed {
        fn source_id(&self) -> &'static str {
            self.0
        }
        fn kind(&self) -> RecordKind {
            RecordKind::Business
        }
        async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<RawRecord>> {
            Ok(self.1.clone())
        }
    }

    #[async_trait]
    impl SourceConnector for Broken {
        fn source_id(&self) -> &'static str {
            "broken"
        }
        fn kind(&self) -> RecordKind {
            RecordKind::Business
        }
        async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<RawRecord>> {
            Err(DataForgeError::connector("broken", "upstream returned 503"))
        }
    }

    fn named(name: &str) -> RawRecord {
        json!({"company_name": name}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_failed_connector_is_skipped() {
        let ingestor = Ingestor::new(vec![
            Arc::new(Fixed("a", vec![named("Zeta")])),
            Arc::new(Broken),
            Arc::new(Fixed("b", vec![named("Alpha")])),
        ]);
        let records = ingestor.collect(&SourceQuery::default()).await;
        assert_eq!(records.len(), 2);
        assert_eq!(ingestor.source_ids(), vec!["a", "broken", "b"]);
    }

    #[test]
    fn test_sort_business_by_name_missing_first() {
        let mut records = vec![named("Zeta"), named("Alpha"), json!({"x": 1}).as_object().cloned().unwrap()];
        sort_business(&mut records);
        let names: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.get("company_name").and_then(Value::as_str))
            .collect();
        assert_eq!(names, vec![None, Some("Alpha"), Some("Zeta")]);
    }
}
