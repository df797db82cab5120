use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::{CanonicalBusinessRecord, CanonicalRfpRecord, PullCriteria, RfpCriteria};
use crate::error::Result;

/// Where reconciled batches are written. Returns the path of the written file.
#[async_trait]
pub trait ExportPort: Send + Sync {
    async fn export_business(&self, records: &[CanonicalBusinessRecord], criteria: &PullCriteria) -> Result<PathBuf>;
    async fn export_rfps(&self, records: &[CanonicalRfpRecord], criteria: &RfpCriteria) -> Result<PathBuf>;
}

pub use crate::storage::PreviewStore as PreviewPort;
