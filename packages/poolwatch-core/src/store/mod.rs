//! Pool persistence.
//!
//! The engine and the pool service only talk to [`PoolStore`]. Two
//! implementations ship with the crate:
//! - [`MemoryStore`] for tests and embedding
//! - [`JsonFileStore`] which keeps the pool in a JSON file shared across processes

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::pool::{EntryPatch, NewEntry, PoolEntry};
use async_trait::async_trait;
use uuid::Uuid;

/// Operations the core needs from a pool backend.
///
/// Updates are not compare-and-set; callers that read, decide, then write
/// must serialize those steps per address themselves.
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// All entries, sorted by ordinal ascending.
    async fn list_all(&self) -> Result<Vec<PoolEntry>>;

    async fn find_by_address(&self, address: &str) -> Result<Option<PoolEntry>>;

    /// Fails with `DuplicateAddress` if the address already exists.
    async fn create(&self, entry: NewEntry) -> Result<PoolEntry>;

    /// Insert all entries or none of them.
    async fn create_batch(&self, entries: Vec<NewEntry>) -> Result<Vec<PoolEntry>>;

    /// Fails with `NotFound` if the address does not exist.
    async fn update_by_address(&self, address: &str, patch: EntryPatch) -> Result<()>;

    async fn update_by_id(&self, id: Uuid, patch: EntryPatch) -> Result<()>;

    /// Fails with `NotFound` if the id does not exist.
    async fn delete_by_id(&self, id: Uuid) -> Result<()>;
}
