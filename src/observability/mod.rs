// Observability: Prometheus metrics, grouped by pipeline phase

pub mod metrics;

pub use metrics::{
    conflation, enrich, export, filter, init, normalize, pipeline, quality_gate, score, sources,
};
