//! Metrics for the dataforge pipeline.
//!
//! Stage code records through the small per-phase modules below; names come
//! from `MetricName` so nothing outside this file spells a metric string.
//! Without an installed recorder every call is a no-op.

use std::fmt;

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Sources
    SourcesFetchSuccess,
    SourcesFetchError,
    SourcesRecordsFetched,
    SourcesFetchDuration,

    // Normalize
    NormalizeRecordsProcessed,

    // Enrich
    EnrichGeocodeLookups,

    // Conflation
    ConflationMerges,

    // Filter
    FilterRecordsExcluded,

    // Score
    ScoreQualityScore,

    // Quality gate
    QualityGateBatchesAssessed,
    QualityGateViolations,
    QualityGateDuplicates,

    // Pipeline
    PipelineRunDuration,

    // Export
    ExportFilesWritten,
    ExportRowsWritten,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourcesFetchSuccess => "dataforge_sources_fetch_success_total",
            MetricName::SourcesFetchError => "dataforge_sources_fetch_error_total",
            MetricName::SourcesRecordsFetched => "dataforge_sources_records_fetched_total",
            MetricName::SourcesFetchDuration => "dataforge_sources_fetch_duration_seconds",

            MetricName::NormalizeRecordsProcessed => "dataforge_normalize_records_processed_total",

            MetricName::EnrichGeocodeLookups => "dataforge_enrich_geocode_lookups_total",

            MetricName::ConflationMerges => "dataforge_conflation_merges_total",

            MetricName::FilterRecordsExcluded => "dataforge_filter_records_excluded_total",

            MetricName::ScoreQualityScore => "dataforge_score_quality_score",

            MetricName::QualityGateBatchesAssessed => "dataforge_quality_gate_batches_assessed_total",
            MetricName::QualityGateViolations => "dataforge_quality_gate_violations_total",
            MetricName::QualityGateDuplicates => "dataforge_quality_gate_duplicates_total",

            MetricName::PipelineRunDuration => "dataforge_pipeline_run_duration_seconds",

            MetricName::ExportFilesWritten => "dataforge_export_files_written_total",
            MetricName::ExportRowsWritten => "dataforge_export_rows_written_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus recorder. The handle renders the scrape body.
pub fn init() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    info!("Metrics system initialized");
    Ok(handle)
}

pub mod sources {
    use super::MetricName;

    pub fn fetch_success(source_id: &str, records: usize) {
        ::metrics::counter!(MetricName::SourcesFetchSuccess.as_str(), "source_id" => source_id.to_string())
            .increment(1);
        ::metrics::counter!(MetricName::SourcesRecordsFetched.as_str(), "source_id" => source_id.to_string())
            .increment(records as u64);
    }

    pub fn fetch_error(source_id: &str) {
        ::metrics::counter!(MetricName::SourcesFetchError.as_str(), "source_id" => source_id.to_string())
            .increment(1);
    }

    pub fn fetch_duration(source_id: &str, secs: f64) {
        ::metrics::histogram!(MetricName::SourcesFetchDuration.as_str(), "source_id" => source_id.to_string())
            .record(secs);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn records_processed(kind: &'static str, count: usize) {
        ::metrics::counter!(MetricName::NormalizeRecordsProcessed.as_str(), "kind" => kind)
            .increment(count as u64);
    }
}

pub mod enrich {
    use super::MetricName;

    /// `outcome` is one of `matched`, `no_match`, `error`.
    pub fn geocode_result(outcome: &'static str) {
        ::metrics::counter!(MetricName::EnrichGeocodeLookups.as_str(), "outcome" => outcome).increment(1);
    }
}

pub mod conflation {
    use super::MetricName;

    pub fn merged(tier: &'static str) {
        ::metrics::counter!(MetricName::ConflationMerges.as_str(), "tier" => tier).increment(1);
    }
}

pub mod filter {
    use super::MetricName;

    pub fn records_excluded(count: usize) {
        ::metrics::counter!(MetricName::FilterRecordsExcluded.as_str()).increment(count as u64);
    }
}

pub mod score {
    use super::MetricName;

    pub fn quality_score(score: u8) {
        ::metrics::histogram!(MetricName::ScoreQualityScore.as_str()).record(f64::from(score));
    }
}

pub mod quality_gate {
    use super::MetricName;
    use crate::domain::QaReport;

    pub fn batch_assessed(kind: &'static str, report: &QaReport) {
        let outcome = if report.passed { "passed" } else { "failed" };
        ::metrics::counter!(
            MetricName::QualityGateBatchesAssessed.as_str(),
            "kind" => kind,
            "outcome" => outcome
        )
        .increment(1);
        ::metrics::counter!(MetricName::QualityGateViolations.as_str(), "kind" => kind)
            .increment(report.violations.len() as u64);
        ::metrics::counter!(MetricName::QualityGateDuplicates.as_str(), "kind" => kind)
            .increment(report.dupes as u64);
    }
}

pub mod pipeline {
    use super::MetricName;

    pub fn run_duration(kind: &'static str, secs: f64) {
        ::metrics::histogram!(MetricName::PipelineRunDuration.as_str(), "kind" => kind).record(secs);
    }
}

pub mod export {
    use super::MetricName;

    pub fn file_written(kind: &'static str, rows: usize) {
        ::metrics::counter!(MetricName::ExportFilesWritten.as_str(), "kind" => kind).increment(1);
        ::metrics::counter!(MetricName::ExportRowsWritten.as_str(), "kind" => kind).increment(rows as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            MetricName::SourcesFetchSuccess,
            MetricName::ConflationMerges,
            MetricName::QualityGateViolations,
            MetricName::ExportRowsWritten,
        ] {
            assert!(name.as_str().starts_with("dataforge_"));
            assert_eq!(name.to_string(), name.as_str());
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        conflation::merged("domain");
        score::quality_score(45);
        sources::fetch_error("opencorporates");
    }
}
