use crate::constants::MAX_PREVIEW_PAGE_SIZE;
use crate::domain::{CanonicalBusinessRecord, CanonicalRfpRecord};
use crate::error::{DataForgeError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One page of previewed records, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewPage<T> {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub items: Vec<T>,
}

/// Storage for the most recent pull results
#[async_trait]
pub trait PreviewStore: Send + Sync {
    async fn save_business(&self, records: &[CanonicalBusinessRecord]) -> Result<()>;
    async fn save_rfps(&self, records: &[CanonicalRfpRecord]) -> Result<()>;

    async fn business_page(&self, page: usize, page_size: usize) -> Result<PreviewPage<CanonicalBusinessRecord>>;
    async fn rfp_page(&self, page: usize, page_size: usize) -> Result<PreviewPage<CanonicalRfpRecord>>;
}

/// Bounded in-memory preview buffers. Once full, the oldest records fall off.
#[derive(Clone)]
pub struct InMemoryPreviewStore {
    capacity: usize,
    business: Arc<Mutex<VecDeque<CanonicalBusinessRecord>>>,
    rfps: Arc<Mutex<VecDeque<CanonicalRfpRecord>>>,
}

impl InMemoryPreviewStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            business: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            rfps: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryPreviewStore {
    fn default() -> Self {
        Self::new(500)
    }
}

// A panic while holding the lock cannot leave a deque half-written, so the
// poisoned guard is still usable.
fn lock<T>(buffer: &Mutex<VecDeque<T>>) -> MutexGuard<'_, VecDeque<T>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn push_newest<T: Clone>(buffer: &Mutex<VecDeque<T>>, records: &[T], capacity: usize) {
    let mut buffer = lock(buffer);
    for record in records {
        buffer.push_front(record.clone());
        buffer.truncate(capacity);
    }
}

fn page_of<T: Clone>(buffer: &Mutex<VecDeque<T>>, page: usize, page_size: usize) -> Result<PreviewPage<T>> {
    if page < 1 {
        return Err(DataForgeError::invalid(format!("page must be at least 1 (got {page})")));
    }
    if !(1..=MAX_PREVIEW_PAGE_SIZE).contains(&page_size) {
        return Err(DataForgeError::invalid(format!(
            "page_size must be between 1 and {MAX_PREVIEW_PAGE_SIZE} (got {page_size})"
        )));
    }

    let buffer = lock(buffer);
    let items = buffer
        .iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .cloned()
        .collect();
    Ok(PreviewPage {
        page,
        page_size,
        total: buffer.len(),
        items,
    })
}

#[async_trait]
impl PreviewStore for InMemoryPreviewStore {
    async fn save_business(&self, records: &[CanonicalBusinessRecord]) -> Result<()> {
        push_newest(&self.business, records, self.capacity);
        debug!(count = records.len(), "Saved business records for preview");
        Ok(())
    }

    async fn save_rfps(&self, records: &[CanonicalRfpRecord]) -> Result<()> {
        push_newest(&self.rfps, records, self.capacity);
        debug!(count = records.len(), "Saved solicitation records for preview");
        Ok(())
    }

    async fn business_page(&self, page: usize, page_size: usize) -> Result<PreviewPage<CanonicalBusinessRecord>> {
        page_of(&self.business, page, page_size)
    }

    async fn rfp_page(&self, page: usize, page_size: usize) -> Result<PreviewPage<CanonicalRfpRecord>> {
        page_of(&self.rfps, page, page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn business(name: &str) -> CanonicalBusinessRecord {
        CanonicalBusinessRecord::new(name, "CA", "test", Utc::now())
    }

    #[tokio::test]
    async fn test_newest_first_and_bounded() {
        let store = InMemoryPreviewStore::new(3);
        store
            .save_business(&[business("a"), business("b")])
            .await
            .unwrap();
        store
            .save_business(&[business("c"), business("d")])
            .await
            .unwrap();

        let page = store.business_page(1, 10).await.unwrap();
        assert_eq!(page.total, 3);
        let names: Vec<&str> = page.items.iter().map(|r| r.company_name.as_str()).collect();
        assert_eq!(names, vec!["d", "c", "b"]);
    }

    #[tokio::test]
    async fn test_pagination() {
        let store = InMemoryPreviewStore::default();
        let records: Vec<_> = (0..5).map(|i| business(&format!("co{i}"))).collect();
        store.save_business(&records).await.unwrap();

        let second = store.business_page(2, 2).await.unwrap();
        assert_eq!(second.items.len(), 2);
        assert_eq!(second.items[0].company_name, "co2");

        let past_end = store.business_page(4, 2).await.unwrap();
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 5);
    }

    #[tokio::test]
    async fn test_page_bounds_are_caller_errors() {
        let store = InMemoryPreviewStore::default();
        assert!(store.rfp_page(0, 10).await.unwrap_err().is_caller_error());
        assert!(store.rfp_page(1, 0).await.unwrap_err().is_caller_error());
        assert!(store.rfp_page(1, 201).await.unwrap_err().is_caller_error());
        assert!(store.rfp_page(1, 200).await.is_ok());
    }
}
