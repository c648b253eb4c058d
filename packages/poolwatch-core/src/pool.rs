//! Pool entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tri-state liveness of a pool address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Usage {
    /// Never evaluated by a probe cycle
    #[default]
    Unknown,
    InUse,
    Free,
}

impl std::fmt::Display for Usage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Usage::Unknown => write!(f, "unknown"),
            Usage::InUse => write!(f, "in use"),
            Usage::Free => write!(f, "free"),
        }
    }
}

/// One managed address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntry {
    pub id: Uuid,
    pub address: String,
    /// Always `address::encode(address)`
    pub ordinal: u32,
    pub category: String,
    pub purpose: Option<String>,
    pub in_use: Usage,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating an entry. The store assigns `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub address: String,
    pub ordinal: u32,
    pub category: String,
    pub purpose: Option<String>,
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPatch {
    pub purpose: Option<Option<String>>,
    pub in_use: Option<Usage>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_changed_at: Option<DateTime<Utc>>,
}

impl EntryPatch {
    pub fn purpose(purpose: Option<String>) -> Self {
        Self {
            purpose: Some(purpose),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, entry: &mut PoolEntry) {
        if let Some(ref purpose) = self.purpose {
            entry.purpose = purpose.clone();
        }
        if let Some(in_use) = self.in_use {
            entry.in_use = in_use;
        }
        if let Some(checked) = self.last_checked_at {
            entry.last_checked_at = Some(checked);
        }
        if let Some(changed) = self.last_changed_at {
            entry.last_changed_at = Some(changed);
        }
    }
}
