//! JSON file backed pool store.
//!
//! The file is the only source of truth. The CLI and the daemon each open
//! their own store on the same path, so every operation reloads the pool
//! from disk. Mutations hold an exclusive lock on a sidecar `.lock` file
//! while they read, apply and rewrite the pool, and the new contents only
//! become visible through an atomic rename.

use super::{MemoryStore, PoolStore};
use crate::error::Result;
use crate::pool::{EntryPatch, NewEntry, PoolEntry};
use anyhow::Context;
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

const FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PoolFile {
    version: u32,
    entries: Vec<PoolEntry>,
}

/// Exclusive advisory lock on the pool's lock file, released on drop.
struct PoolFileLock(File);

impl Drop for PoolFileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.0) {
            tracing::warn!("Failed to release pool file lock: {}", e);
        }
    }
}

pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    // Serializes writers inside this process; the file lock covers the rest
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the pool file, creating parent directories. A missing file is an
    /// empty pool. An existing file is parsed once up front so a corrupt pool
    /// is reported at startup.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }

        let store = Self {
            lock_path: path.with_extension("json.lock"),
            path,
            write_lock: Mutex::new(()),
        };

        let count = store.load().await?.list_all().await?.len();
        tracing::info!("Opened pool file {:?} with {} entries", store.path, count);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn lock_file(&self) -> Result<PoolFileLock> {
        let lock_path = self.lock_path.clone();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .context("pool lock task panicked")?
        .with_context(|| format!("Failed to lock {:?}", self.lock_path))?;
        Ok(PoolFileLock(file))
    }

    /// Read the current pool from disk into a scratch memory store.
    async fn load(&self) -> Result<MemoryStore> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MemoryStore::new());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read pool file {:?}", self.path))
                    .into());
            }
        };
        let file: PoolFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pool file {:?}", self.path))?;
        MemoryStore::from_entries(file.entries)
    }

    async fn save(&self, pool: &MemoryStore) -> Result<()> {
        let file = PoolFile {
            version: FILE_VERSION,
            entries: pool.list_all().await?,
        };
        let content = serde_json::to_string_pretty(&file).context("Failed to serialize pool")?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace pool file {:?}", self.path))?;

        tracing::debug!("Saved {} pool entries", file.entries.len());
        Ok(())
    }
}

#[async_trait]
impl PoolStore for JsonFileStore {
    async fn list_all(&self) -> Result<Vec<PoolEntry>> {
        self.load().await?.list_all().await
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<PoolEntry>> {
        self.load().await?.find_by_address(address).await
    }

    async fn create(&self, entry: NewEntry) -> Result<PoolEntry> {
        let _guard = self.write_lock.lock().await;
        let _file_lock = self.lock_file().await?;
        let pool = self.load().await?;
        let created = pool.create(entry).await?;
        self.save(&pool).await?;
        Ok(created)
    }

    async fn create_batch(&self, entries: Vec<NewEntry>) -> Result<Vec<PoolEntry>> {
        let _guard = self.write_lock.lock().await;
        let _file_lock = self.lock_file().await?;
        let pool = self.load().await?;
        let created = pool.create_batch(entries).await?;
        self.save(&pool).await?;
        Ok(created)
    }

    async fn update_by_address(&self, address: &str, patch: EntryPatch) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let _file_lock = self.lock_file().await?;
        let pool = self.load().await?;
        pool.update_by_address(address, patch).await?;
        self.save(&pool).await
    }

    async fn update_by_id(&self, id: Uuid, patch: EntryPatch) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let _file_lock = self.lock_file().await?;
        let pool = self.load().await?;
        pool.update_by_id(id, patch).await?;
        self.save(&pool).await
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let _file_lock = self.lock_file().await?;
        let pool = self.load().await?;
        pool.delete_by_id(id).await?;
        self.save(&pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address;
    use crate::error::PoolError;
    use crate::pool::Usage;

    fn new_entry(address: &str, category: &str) -> NewEntry {
        NewEntry {
            address: address.to_string(),
            ordinal: address::encode(address).unwrap(),
            category: category.to_string(),
            purpose: None,
        }
    }

    fn addresses(entries: &[PoolEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.address.as_str()).collect()
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pool.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        let created = store
            .create(NewEntry {
                purpose: Some("router".into()),
                ..new_entry("10.1.2.3", "core")
            })
            .await
            .unwrap();
        store
            .update_by_id(
                created.id,
                EntryPatch {
                    in_use: Some(Usage::InUse),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let entries = reopened.list_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, created.id);
        assert_eq!(entries[0].in_use, Usage::InUse);
        assert_eq!(entries[0].purpose.as_deref(), Some("router"));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_pool() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("pool.json")).await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_two_stores_on_one_file_keep_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");

        // Long-lived store as the daemon holds it, opened before the others write
        let daemon = JsonFileStore::open(&path).await.unwrap();
        daemon.create(new_entry("10.0.0.5", "lab")).await.unwrap();

        let cli = JsonFileStore::open(&path).await.unwrap();
        let added = cli.create(new_entry("10.0.0.6", "lab")).await.unwrap();
        cli.update_by_id(added.id, EntryPatch::purpose(Some("printer".into())))
            .await
            .unwrap();

        daemon
            .update_by_address(
                "10.0.0.5",
                EntryPatch {
                    in_use: Some(Usage::InUse),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let seen_by_daemon = daemon.list_all().await.unwrap();
        assert_eq!(addresses(&seen_by_daemon), vec!["10.0.0.5", "10.0.0.6"]);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let entries = reopened.list_all().await.unwrap();
        assert_eq!(addresses(&entries), vec!["10.0.0.5", "10.0.0.6"]);
        assert_eq!(entries[0].in_use, Usage::InUse);
        assert_eq!(entries[1].purpose.as_deref(), Some("printer"));

        cli.delete_by_id(added.id).await.unwrap();
        assert!(daemon.find_by_address("10.0.0.6").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let a = std::sync::Arc::new(JsonFileStore::open(&path).await.unwrap());
        let b = std::sync::Arc::new(JsonFileStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..20u8 {
            let store = if i % 2 == 0 { a.clone() } else { b.clone() };
            handles.push(tokio::spawn(async move {
                store.create(new_entry(&format!("10.0.1.{}", i), "lab")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(a.list_all().await.unwrap().len(), 20);
        assert_eq!(b.list_all().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_pool_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let store = JsonFileStore::open(&path).await.unwrap();

        // A directory where the temp file goes makes the write fail
        let tmp = path.with_extension("json.tmp");
        std::fs::create_dir(&tmp).unwrap();

        assert!(matches!(
            store.create(new_entry("10.0.0.5", "lab")).await,
            Err(PoolError::Storage(_))
        ));
        assert!(store.list_all().await.unwrap().is_empty());

        std::fs::remove_dir(&tmp).unwrap();
        let created = store.create(new_entry("10.0.0.5", "lab")).await.unwrap();
        assert_eq!(created.address, "10.0.0.5");
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_update_is_not_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        store.create(new_entry("10.0.0.5", "lab")).await.unwrap();

        let tmp = path.with_extension("json.tmp");
        std::fs::create_dir(&tmp).unwrap();
        let patch = EntryPatch {
            in_use: Some(Usage::InUse),
            ..Default::default()
        };
        assert!(store.update_by_address("10.0.0.5", patch).await.is_err());

        let entry = store.find_by_address("10.0.0.5").await.unwrap().unwrap();
        assert_eq!(entry.in_use, Usage::Unknown);
    }

    #[tokio::test]
    async fn test_open_rejects_mismatched_ordinal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        store.create(new_entry("10.0.0.5", "lab")).await.unwrap();
        drop(store);

        let content = std::fs::read_to_string(&path).unwrap();
        let ordinal = address::encode("10.0.0.5").unwrap();
        let edited = content.replace(
            &format!("\"ordinal\": {}", ordinal),
            &format!("\"ordinal\": {}", ordinal + 1),
        );
        assert_ne!(content, edited);
        std::fs::write(&path, edited).unwrap();

        assert!(JsonFileStore::open(&path).await.is_err());
    }
}
