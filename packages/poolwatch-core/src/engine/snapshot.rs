//! Latest link-layer sweep result, shared with the echo cycle.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct LinkSighting {
    pub responding: HashSet<String>,
    /// `None` until the first successful sweep
    pub taken_at: Option<DateTime<Utc>>,
}

/// Cloneable handle to the most recent successful sweep.
///
/// Only the engine's link sweep replaces it; everything else reads.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySnapshot {
    inner: Arc<RwLock<LinkSighting>>,
}

impl DiscoverySnapshot {
    pub(crate) async fn replace(&self, responding: HashSet<String>, taken_at: DateTime<Utc>) {
        let mut sighting = self.inner.write().await;
        sighting.responding = responding;
        sighting.taken_at = Some(taken_at);
    }

    pub async fn contains(&self, address: &str) -> bool {
        self.inner.read().await.responding.contains(address)
    }

    pub async fn current(&self) -> LinkSighting {
        self.inner.read().await.clone()
    }
}
