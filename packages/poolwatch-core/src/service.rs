//! User-facing pool operations: list with summary, insert, delete, and
//! purpose edits. Liveness fields are never written here.

use crate::address;
use crate::error::Result;
use crate::pool::{EntryPatch, NewEntry, PoolEntry};
use crate::range::RangeSpec;
use crate::store::PoolStore;
use crate::summary::{self, CategorySummary};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolListing {
    /// Sorted by ordinal ascending
    pub entries: Vec<PoolEntry>,
    pub summary: Vec<CategorySummary>,
}

#[derive(Clone)]
pub struct PoolService {
    store: Arc<dyn PoolStore>,
}

fn normalize_purpose(purpose: Option<String>) -> Option<String> {
    purpose
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

impl PoolService {
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<PoolListing> {
        let entries = self.store.list_all().await?;
        let summary = summary::summarize_entries(&entries);
        Ok(PoolListing { entries, summary })
    }

    /// Insert a single address or a last-octet range.
    ///
    /// Ranges are inserted as one batch: if any address already exists
    /// nothing is created.
    pub async fn insert(
        &self,
        spec: &str,
        category: &str,
        purpose: Option<String>,
    ) -> Result<Vec<PoolEntry>> {
        let range = RangeSpec::parse(spec)?;
        tracing::debug!("'{}' expands to {} address(es)", spec, range.address_count());
        let category = category.trim().to_string();
        let purpose = normalize_purpose(purpose);

        let new_entry = |ordinal: u32| NewEntry {
            address: address::decode(ordinal),
            ordinal,
            category: category.clone(),
            purpose: purpose.clone(),
        };

        let created = match range {
            RangeSpec::Single(ordinal) => vec![self.store.create(new_entry(ordinal)).await?],
            RangeSpec::LastOctet { .. } => {
                let new_entries: Vec<NewEntry> = range.ordinals().map(new_entry).collect();
                self.store.create_batch(new_entries).await?
            }
        };

        tracing::info!(
            "Added {} address(es) to category '{}' from '{}'",
            created.len(),
            category,
            spec
        );
        Ok(created)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.store.delete_by_id(id).await?;
        tracing::info!("Deleted pool entry {}", id);
        Ok(())
    }

    pub async fn set_purpose(&self, id: Uuid, purpose: Option<String>) -> Result<()> {
        self.store
            .update_by_id(id, EntryPatch::purpose(normalize_purpose(purpose)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::pool::Usage;
    use crate::store::MemoryStore;

    fn service() -> PoolService {
        PoolService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_range_insert_creates_unknown_entries() {
        let svc = service();
        let created = svc
            .insert("10.0.0.5-10.0.0.8", "lab", Some("bench".into()))
            .await
            .unwrap();

        let addresses: Vec<&str> = created.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(addresses, vec!["10.0.0.5", "10.0.0.6", "10.0.0.7", "10.0.0.8"]);
        for entry in &created {
            assert_eq!(entry.in_use, Usage::Unknown);
            assert_eq!(entry.category, "lab");
            assert_eq!(entry.ordinal, address::encode(&entry.address).unwrap());
            assert!(entry.last_checked_at.is_none());
        }
    }

    #[tokio::test]
    async fn test_invalid_range_creates_nothing() {
        let svc = service();
        assert!(matches!(
            svc.insert("10.0-5.0.1", "lab", None).await,
            Err(PoolError::InvalidRangeSpec { .. })
        ));
        assert!(svc.list().await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_range_is_rejected_whole() {
        let svc = service();
        svc.insert("10.0.0.7", "lab", None).await.unwrap();
        assert!(matches!(
            svc.insert("10.0.0.5-9", "lab", None).await,
            Err(PoolError::DuplicateAddress(_))
        ));
        assert_eq!(svc.list().await.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_single_insert() {
        let svc = service();
        let created = svc.insert("10.0.0.7", "lab", Some("nas".into())).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].address, "10.0.0.7");
        assert_eq!(created[0].ordinal, address::encode("10.0.0.7").unwrap());
        assert_eq!(created[0].purpose.as_deref(), Some("nas"));

        assert!(matches!(
            svc.insert("10.0.0.7", "office", None).await,
            Err(PoolError::DuplicateAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_list_includes_summary() {
        let svc = service();
        svc.insert("10.0.0.9", "lab", None).await.unwrap();
        svc.insert("10.0.0.5-7", "lab", None).await.unwrap();
        svc.insert("192.168.1.1", "office", None).await.unwrap();

        let listing = svc.list().await.unwrap();
        assert_eq!(listing.entries.first().map(|e| e.address.as_str()), Some("10.0.0.5"));
        assert_eq!(
            listing.summary,
            vec![
                CategorySummary {
                    category: "lab".into(),
                    ranges: vec!["10.0.0.5-10.0.0.7".into(), "10.0.0.9".into()],
                },
                CategorySummary {
                    category: "office".into(),
                    ranges: vec!["192.168.1.1".into()],
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_purpose_edit_and_delete() {
        let svc = service();
        let created = svc.insert("10.0.0.5", "lab", None).await.unwrap();
        let id = created[0].id;

        svc.set_purpose(id, Some("  nas  ".into())).await.unwrap();
        let listing = svc.list().await.unwrap();
        assert_eq!(listing.entries[0].purpose.as_deref(), Some("nas"));

        svc.set_purpose(id, Some(String::new())).await.unwrap();
        assert!(svc.list().await.unwrap().entries[0].purpose.is_none());

        svc.delete(id).await.unwrap();
        assert!(matches!(svc.delete(id).await, Err(PoolError::NotFound(_))));
    }
}
