//! Record reconciliation pipeline.
//!
//! Business batches run Normalizer, optional geocoding, Classifier,
//! Reconciler, Filter, Scorer, limit and Validator in that order. Solicitation
//! batches only run Normalizer and Validator. Both are synchronous and own all
//! of their state for the duration of one call.

pub mod ingestion;
pub mod processing;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::domain::{CanonicalBusinessRecord, CanonicalRfpRecord, PullCriteria, QaReport};
use crate::observability;
use crate::types::RawRecord;
use processing::classify::{Classifier, SizeClassifier};
use processing::conflation::Reconciler;
use processing::enrich::{enrich_county, Geocoder};
use processing::filter::RecordFilter;
use processing::normalize::{BusinessNormalizer, Normalizer, RfpNormalizer};
use processing::quality_gate::{BusinessQualityGate, QualityGate, RfpQualityGate};
use processing::score::score_all;

/// Record counts after each stage of one business run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub raw: usize,
    pub normalized: usize,
    pub geocoded: bool,
    pub survivors: usize,
    pub domain_merges: usize,
    pub phone_merges: usize,
    pub name_merges: usize,
    pub filtered: usize,
    pub returned: usize,
}

/// Output of one business run. `report` is absent when no records remain.
#[derive(Debug, Clone)]
pub struct BusinessBatch {
    pub records: Vec<CanonicalBusinessRecord>,
    pub report: Option<QaReport>,
    pub stats: PipelineStats,
}

/// Configured business pipeline. Holds collaborators only; every run builds
/// its own reconciliation state.
#[derive(Clone, Default)]
pub struct BusinessPipeline {
    geocoder: Option<Arc<dyn Geocoder>>,
    now: Option<DateTime<Utc>>,
}

impl BusinessPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Geocoder used when the criteria ask for enrichment.
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    /// Pin the normalizer clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn run(&self, raw: &[RawRecord], criteria: &PullCriteria) -> BusinessBatch {
        let run_id = Uuid::new_v4();
        let span = info_span!("business_batch", %run_id, raw = raw.len());
        let _guard = span.enter();
        let started = Instant::now();

        let mut stats = PipelineStats {
            raw: raw.len(),
            ..PipelineStats::default()
        };

        let normalizer = self.now.map_or_else(BusinessNormalizer::new, BusinessNormalizer::at);
        let mut records: Vec<CanonicalBusinessRecord> =
            raw.iter().map(|r| normalizer.normalize(r)).collect();
        stats.normalized = records.len();
        observability::normalize::records_processed("business", records.len());

        if criteria.enable_geocoder {
            if let Some(geocoder) = &self.geocoder {
                records = records
                    .into_iter()
                    .map(|r| enrich_county(geocoder.as_ref(), r))
                    .collect();
                stats.geocoded = true;
            } else {
                debug!("Geocoding requested but no geocoder configured");
            }
        }

        let classifier = SizeClassifier::new();
        let classified = records.into_iter().map(|r| classifier.classify(r));

        let (survivors, conflation) = Reconciler::reconcile(classified);
        stats.survivors = conflation.survivors;
        stats.domain_merges = conflation.domain_merges;
        stats.phone_merges = conflation.phone_merges;
        stats.name_merges = conflation.name_merges;

        let filtered = RecordFilter::new(criteria).apply(survivors);
        stats.filtered = filtered.len();
        observability::filter::records_excluded(stats.survivors - stats.filtered);

        let mut scored = score_all(filtered);
        scored.truncate(criteria.limit);
        stats.returned = scored.len();
        for record in &scored {
            observability::score::quality_score(record.quality_score);
        }

        let report = if scored.is_empty() {
            None
        } else {
            Some(BusinessQualityGate::new(criteria.enable_geocoder).assess(&scored))
        };

        info!(
            normalized = stats.normalized,
            survivors = stats.survivors,
            merges = conflation.input - conflation.survivors,
            filtered = stats.filtered,
            returned = stats.returned,
            passed = report.as_ref().map(|r| r.passed),
            "Business batch reconciled"
        );
        observability::pipeline::run_duration("business", started.elapsed().as_secs_f64());

        BusinessBatch {
            records: scored,
            report,
            stats,
        }
    }
}

/// Reconcile a business batch without enrichment.
///
/// The input order decides which record of a duplicate group is seen first;
/// callers sort before invoking.
pub fn reconcile_business_batch(
    raw: &[RawRecord],
    criteria: &PullCriteria,
) -> (Vec<CanonicalBusinessRecord>, Option<QaReport>) {
    let batch = BusinessPipeline::new().run(raw, criteria);
    (batch.records, batch.report)
}

/// Normalize and validate a solicitation batch. Records are never merged.
pub fn reconcile_rfp_batch(raw: &[RawRecord]) -> (Vec<CanonicalRfpRecord>, Option<QaReport>) {
    reconcile_rfp_batch_at(raw, Utc::now())
}

pub fn reconcile_rfp_batch_at(
    raw: &[RawRecord],
    now: DateTime<Utc>,
) -> (Vec<CanonicalRfpRecord>, Option<QaReport>) {
    let run_id = Uuid::new_v4();
    let span = info_span!("rfp_batch", %run_id, raw = raw.len());
    let _guard = span.enter();
    let started = Instant::now();

    let normalizer = RfpNormalizer::at(now);
    let records: Vec<CanonicalRfpRecord> = raw.iter().map(|r| normalizer.normalize(r)).collect();
    observability::normalize::records_processed("rfp", records.len());

    let report = if records.is_empty() {
        None
    } else {
        Some(RfpQualityGate.assess(&records))
    };

    info!(
        records = records.len(),
        dupes = report.as_ref().map(|r| r.dupes),
        "Solicitation batch validated"
    );
    observability::pipeline::run_duration("rfp", started.elapsed().as_secs_f64());

    (records, report)
}
