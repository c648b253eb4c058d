//! In-memory pool store

use super::PoolStore;
use crate::address;
use crate::error::{PoolError, Result};
use crate::pool::{EntryPatch, NewEntry, PoolEntry};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<Uuid, PoolEntry>,
    id_by_address: HashMap<String, Uuid>,
}

impl Entries {
    fn insert(&mut self, entry: PoolEntry) {
        self.id_by_address.insert(entry.address.clone(), entry.id);
        self.by_id.insert(entry.id, entry);
    }

    fn sorted(&self) -> Vec<PoolEntry> {
        let mut entries: Vec<PoolEntry> = self.by_id.values().cloned().collect();
        entries.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.address.cmp(&b.address)));
        entries
    }
}

fn materialize(entry: NewEntry) -> PoolEntry {
    PoolEntry {
        id: Uuid::new_v4(),
        address: entry.address,
        ordinal: entry.ordinal,
        category: entry.category,
        purpose: entry.purpose,
        in_use: Default::default(),
        last_checked_at: None,
        last_changed_at: None,
        created_at: Utc::now(),
    }
}

/// Pool store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted entries. Every entry's
    /// ordinal must match its address.
    pub fn from_entries(entries: Vec<PoolEntry>) -> Result<Self> {
        let mut state = Entries::default();
        for entry in entries {
            let ordinal = address::encode(&entry.address)?;
            if ordinal != entry.ordinal {
                return Err(PoolError::Storage(anyhow::anyhow!(
                    "entry {} has ordinal {} but its address encodes to {}",
                    entry.address,
                    entry.ordinal,
                    ordinal
                )));
            }
            if state.id_by_address.contains_key(&entry.address) {
                return Err(PoolError::DuplicateAddress(entry.address));
            }
            state.insert(entry);
        }
        Ok(Self {
            entries: RwLock::new(state),
        })
    }
}

#[async_trait]
impl PoolStore for MemoryStore {
    async fn list_all(&self) -> Result<Vec<PoolEntry>> {
        Ok(self.entries.read().await.sorted())
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<PoolEntry>> {
        let state = self.entries.read().await;
        Ok(state
            .id_by_address
            .get(address)
            .and_then(|id| state.by_id.get(id))
            .cloned())
    }

    async fn create(&self, entry: NewEntry) -> Result<PoolEntry> {
        let mut state = self.entries.write().await;
        if state.id_by_address.contains_key(&entry.address) {
            return Err(PoolError::DuplicateAddress(entry.address));
        }
        let entry = materialize(entry);
        state.insert(entry.clone());
        Ok(entry)
    }

    async fn create_batch(&self, entries: Vec<NewEntry>) -> Result<Vec<PoolEntry>> {
        let mut state = self.entries.write().await;

        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            if state.id_by_address.contains_key(&entry.address) || !seen.insert(&entry.address) {
                return Err(PoolError::DuplicateAddress(entry.address.clone()));
            }
        }

        let created: Vec<PoolEntry> = entries.into_iter().map(materialize).collect();
        for entry in &created {
            state.insert(entry.clone());
        }
        Ok(created)
    }

    async fn update_by_address(&self, address: &str, patch: EntryPatch) -> Result<()> {
        let mut state = self.entries.write().await;
        let id = *state
            .id_by_address
            .get(address)
            .ok_or_else(|| PoolError::NotFound(address.to_string()))?;
        if let Some(entry) = state.by_id.get_mut(&id) {
            patch.apply_to(entry);
        }
        Ok(())
    }

    async fn update_by_id(&self, id: Uuid, patch: EntryPatch) -> Result<()> {
        let mut state = self.entries.write().await;
        let entry = state
            .by_id
            .get_mut(&id)
            .ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        patch.apply_to(entry);
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<()> {
        let mut state = self.entries.write().await;
        let entry = state
            .by_id
            .remove(&id)
            .ok_or_else(|| PoolError::NotFound(id.to_string()))?;
        state.id_by_address.remove(&entry.address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Usage;

    fn new_entry(address: &str, category: &str) -> NewEntry {
        NewEntry {
            address: address.to_string(),
            ordinal: address::encode(address).unwrap(),
            category: category.to_string(),
            purpose: None,
        }
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_ordinal() {
        let store = MemoryStore::new();
        for address in ["10.0.0.20", "10.0.0.3", "9.255.255.255", "10.0.0.100"] {
            store.create(new_entry(address, "lab")).await.unwrap();
        }
        let listed: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.address)
            .collect();
        assert_eq!(listed, vec!["9.255.255.255", "10.0.0.3", "10.0.0.20", "10.0.0.100"]);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let store = MemoryStore::new();
        let created = store.create(new_entry("10.0.0.1", "lab")).await.unwrap();
        assert_eq!(created.in_use, Usage::Unknown);
        assert!(matches!(
            store.create(new_entry("10.0.0.1", "other")).await,
            Err(PoolError::DuplicateAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.create(new_entry("10.0.0.3", "lab")).await.unwrap();

        let batch = ["10.0.0.2", "10.0.0.3", "10.0.0.4"]
            .into_iter()
            .map(|a| new_entry(a, "lab"))
            .collect();
        assert!(matches!(
            store.create_batch(batch).await,
            Err(PoolError::DuplicateAddress(a)) if a == "10.0.0.3"
        ));
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    fn persisted(address: &str, ordinal: u32) -> PoolEntry {
        PoolEntry {
            ordinal,
            ..materialize(new_entry(address, "lab"))
        }
    }

    #[tokio::test]
    async fn test_from_entries_checks_stored_entries() {
        let good = persisted("10.0.0.5", address::encode("10.0.0.5").unwrap());
        let store = MemoryStore::from_entries(vec![good.clone()]).unwrap();
        assert_eq!(store.list_all().await.unwrap(), vec![good]);

        let skewed = persisted("10.0.0.5", address::encode("10.0.0.9").unwrap());
        assert!(matches!(
            MemoryStore::from_entries(vec![skewed]),
            Err(PoolError::Storage(_))
        ));

        let malformed = PoolEntry {
            address: "10.0.0".into(),
            ..persisted("10.0.0.5", address::encode("10.0.0.5").unwrap())
        };
        assert!(matches!(
            MemoryStore::from_entries(vec![malformed]),
            Err(PoolError::MalformedAddress(_))
        ));

        let first = persisted("10.0.0.5", address::encode("10.0.0.5").unwrap());
        let second = persisted("10.0.0.5", address::encode("10.0.0.5").unwrap());
        assert!(matches!(
            MemoryStore::from_entries(vec![first, second]),
            Err(PoolError::DuplicateAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update_by_address("10.0.0.1", EntryPatch::default()).await,
            Err(PoolError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_by_id(Uuid::new_v4()).await,
            Err(PoolError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_patch_leaves_other_fields() {
        let store = MemoryStore::new();
        let created = store.create(new_entry("10.0.0.1", "lab")).await.unwrap();
        store
            .update_by_id(created.id, EntryPatch::purpose(Some("printer".into())))
            .await
            .unwrap();
        store
            .update_by_address(
                "10.0.0.1",
                EntryPatch {
                    in_use: Some(Usage::InUse),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let entry = store.find_by_address("10.0.0.1").await.unwrap().unwrap();
        assert_eq!(entry.purpose.as_deref(), Some("printer"));
        assert_eq!(entry.in_use, Usage::InUse);
        assert_eq!(entry.category, "lab");

        store.delete_by_id(created.id).await.unwrap();
        assert!(store.find_by_address("10.0.0.1").await.unwrap().is_none());
    }
}
