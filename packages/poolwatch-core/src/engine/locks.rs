//! Per-address write serialization.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};

const STRIPES: usize = 64;

/// Striped async locks keyed by address.
///
/// Two cycles touching the same address always contend on the same stripe,
/// so a read-decide-write on one record never interleaves with another.
/// Unrelated addresses may share a stripe.
pub(crate) struct AddressLocks {
    stripes: Vec<Mutex<()>>,
}

impl AddressLocks {
    pub(crate) fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub(crate) async fn lock(&self, address: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        address.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.stripes.len();
        self.stripes[index].lock().await
    }
}
