use std::sync::Arc;

use tracing::{info, warn};

use crate::app::ports::{ExportPort, PreviewPort};
use crate::domain::{PullResponse, RfpCriteria};
use crate::error::Result;
use crate::pipeline::ingestion::{sort_rfp, Ingestor};
use crate::pipeline::reconcile_rfp_batch;
use crate::types::SourceQuery;

/// Pull solicitations, validate them, export the batch and keep it for preview.
pub struct RfpPullUseCase {
    ingestor: Ingestor,
    exporter: Arc<dyn ExportPort>,
    preview: Arc<dyn PreviewPort>,
}

impl RfpPullUseCase {
    pub fn new(ingestor: Ingestor, exporter: Arc<dyn ExportPort>, preview: Arc<dyn PreviewPort>) -> Self {
        Self {
            ingestor,
            exporter,
            preview,
        }
    }

    pub async fn execute(&self, criteria: &RfpCriteria) -> Result<PullResponse> {
        info!(
            states = ?criteria.states,
            sources = ?self.ingestor.source_ids(),
            limit = criteria.limit,
            "Starting RFP pull"
        );

        let mut raw = self.ingestor.collect(&SourceQuery::from(criteria)).await;
        sort_rfp(&mut raw);
        raw.truncate(criteria.limit);

        let (records, report) = reconcile_rfp_batch(&raw);
        let Some(report) = report else {
            info!("No RFP records found");
            return Ok(PullResponse {
                ok: true,
                message: Some("No RFP records found".to_string()),
                export_path: None,
                qa_report: None,
            });
        };

        let path = self.exporter.export_rfps(&records, criteria).await?;
        self.preview.save_rfps(&records).await?;

        if !report.passed {
            warn!(dupes = report.dupes, "Solicitation batch failed QA");
        }
        info!(records = records.len(), path = %path.display(), "RFP pull exported");

        Ok(PullResponse {
            ok: report.passed,
            message: Some(format!("Exported {} RFP records", records.len())),
            export_path: Some(path.display().to_string()),
            qa_report: Some(report),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CanonicalBusinessRecord, CanonicalRfpRecord, PullCriteria};
    use crate::storage::{InMemoryPreviewStore, PreviewStore};
    use crate::types::{raw_record, RawRecord, RecordKind, SourceConnector};
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FixedSource(Vec<RawRecord>);

    #[async_trait]
    impl SourceConnector for FixedSource {
        fn source_id(&self) -> &'static str {
            "fixed"
        }
        fn kind(&self) -> RecordKind {
            RecordKind::Rfp
        }
        async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<RawRecord>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingExporter {
        notice_ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExportPort for RecordingExporter {
        async fn export_business(
            &self,
            _records: &[CanonicalBusinessRecord],
            _criteria: &PullCriteria,
        ) -> Result<PathBuf> {
            unreachable!("RFP pull never exports businesses")
        }

        async fn export_rfps(&self, records: &[CanonicalRfpRecord], _criteria: &RfpCriteria) -> Result<PathBuf> {
            let mut ids = self.notice_ids.lock().unwrap();
            ids.extend(records.iter().map(|r| r.notice_id.clone()));
            Ok(PathBuf::from("/tmp/rfps.csv"))
        }
    }

    fn criteria(limit: usize) -> RfpCriteria {
        RfpCriteria {
            states: vec!["VA".into()],
            naics: Vec::new(),
            keywords: Vec::new(),
            posted_from: None,
            posted_to: None,
            limit,
        }
    }

    fn notice(id: &str) -> RawRecord {
        raw_record(json!({"notice_id": id, "title": format!("Notice {id}")}))
    }

    #[tokio::test]
    async fn test_sorted_truncated_and_exported() {
        let exporter = Arc::new(RecordingExporter::default());
        let preview = Arc::new(InMemoryPreviewStore::new(10));
        let source = FixedSource(vec![notice("c"), notice("a"), notice("b")]);
        let use_case = RfpPullUseCase::new(Ingestor::new(vec![Arc::new(source)]), exporter.clone(), preview.clone());

        let response = use_case.execute(&criteria(2)).await.unwrap();

        assert!(response.ok);
        assert_eq!(response.message.as_deref(), Some("Exported 2 RFP records"));
        assert_eq!(*exporter.notice_ids.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(preview.rfp_page(1, 10).await.unwrap().items[0].notice_id, "b");
    }

    #[tokio::test]
    async fn test_duplicate_notice_ids_fail_qa() {
        let exporter = Arc::new(RecordingExporter::default());
        let preview = Arc::new(InMemoryPreviewStore::new(10));
        let source = FixedSource(vec![notice("x"), notice("x")]);
        let use_case = RfpPullUseCase::new(Ingestor::new(vec![Arc::new(source)]), exporter, preview);

        let response = use_case.execute(&criteria(10)).await.unwrap();

        assert!(!response.ok);
        let report = response.qa_report.unwrap();
        assert_eq!(report.dupes, 1);
        assert_eq!(report.violations, vec!["Duplicate notice_id x"]);
    }

    #[tokio::test]
    async fn test_no_records() {
        let exporter = Arc::new(RecordingExporter::default());
        let preview = Arc::new(InMemoryPreviewStore::new(10));
        let use_case = RfpPullUseCase::new(Ingestor::new(vec![Arc::new(FixedSource(vec![]))]), exporter, preview);

        let response = use_case.execute(&criteria(10)).await.unwrap();
        assert!(response.ok);
        assert_eq!(response.message.as_deref(), Some("No RFP records found"));
        assert!(response.qa_report.is_none());
    }
}
