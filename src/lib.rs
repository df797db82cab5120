pub mod apis;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod types;

// Layered boundaries: use cases and ports, and their adapters
pub mod app;
pub mod infra;

pub use error::{DataForgeError, Result};
pub use pipeline::{reconcile_business_batch, reconcile_rfp_batch, BusinessPipeline};
