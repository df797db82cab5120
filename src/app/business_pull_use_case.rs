use std::sync::Arc;

use tracing::{info, warn};

use crate::app::ports::{ExportPort, PreviewPort};
use crate::domain::{PullCriteria, PullResponse};
use crate::error::Result;
use crate::pipeline::ingestion::{sort_business, Ingestor};
use crate::pipeline::BusinessPipeline;
use crate::types::SourceQuery;

/// Pull business records from every source, reconcile them, export the
/// batch and keep it for preview.
pub struct BusinessPullUseCase {
    ingestor: Ingestor,
    pipeline: BusinessPipeline,
    exporter: Arc<dyn ExportPort>,
    preview: Arc<dyn PreviewPort>,
}

impl BusinessPullUseCase {
    pub fn new(
        ingestor: Ingestor,
        pipeline: BusinessPipeline,
        exporter: Arc<dyn ExportPort>,
        preview: Arc<dyn PreviewPort>,
    ) -> Self {
        Self {
            ingestor,
            pipeline,
            exporter,
            preview,
        }
    }

    pub async fn execute(&self, criteria: &PullCriteria) -> Result<PullResponse> {
        info!(
            states = ?criteria.states,
            sources = ?self.ingestor.source_ids(),
            limit = criteria.limit,
            "Starting business pull"
        );

        let mut raw = self.ingestor.collect(&SourceQuery::from(criteria)).await;
        sort_business(&mut raw);

        // the geocoder uses a blocking client, so the core runs off the runtime
        let pipeline = self.pipeline.clone();
        let run_criteria = criteria.clone();
        let batch = tokio::task::spawn_blocking(move || pipeline.run(&raw, &run_criteria)).await?;

        let Some(report) = batch.report else {
            info!("No business records matched filters");
            return Ok(PullResponse {
                ok: true,
                message: Some("No records matched filters".to_string()),
                export_path: None,
                qa_report: None,
            });
        };

        let path = self.exporter.export_business(&batch.records, criteria).await?;
        self.preview.save_business(&batch.records).await?;

        if !report.passed {
            warn!(violations = report.violations.len(), "Business batch failed QA");
        }
        info!(
            records = batch.records.len(),
            path = %path.display(),
            "Business pull exported"
        );

        Ok(PullResponse {
            ok: report.passed,
            message: Some(format!("Exported {} business records", batch.records.len())),
            export_path: Some(path.display().to_string()),
            qa_report: Some(report),
        })
    }
}
