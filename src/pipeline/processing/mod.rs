// Pipeline processing: the pure per-batch stages

pub mod classify;
pub mod conflation;
pub mod enrich;
pub mod filter;
pub mod normalize;
pub mod quality_gate;
pub mod score;
