//! Poolwatch Core Library
//!
//! Tracks which addresses of a managed IPv4 pool are in use:
//! - Address codec and bulk range specs
//! - Category range summarization for display
//! - Liveness reconciliation of ARP sweeps and ICMP echo probes
//! - Pool persistence (in-memory or JSON file)
//!
//! # Example
//!
//! ```no_run
//! use poolwatch_core::{config, engine, probe, store, PoolService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config()?;
//!     let store = Arc::new(store::JsonFileStore::open(&config.data_file).await?);
//!
//!     // Register a range of addresses
//!     let pool = PoolService::new(store.clone());
//!     pool.insert("10.0.0.5-10.0.0.8", "lab", None).await?;
//!
//!     // Reconcile once
//!     let engine = engine::ReconciliationEngine::new(
//!         store,
//!         config.discovery.link_sweep(),
//!         Arc::new(probe::SystemPing),
//!         config.engine,
//!     );
//!     engine.run_link_sweep().await?;
//!     engine.run_echo_sweep().await?;
//!
//!     for summary in pool.list().await?.summary {
//!         println!("{}: {}", summary.category, summary.ranges.join(", "));
//!     }
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod probe;
pub mod range;
pub mod service;
pub mod store;
pub mod summary;

// Re-export commonly used types
pub use engine::{CycleKind, CycleReport, EngineSettings, ReconciliationEngine};
pub use error::{PoolError, Result};
pub use pool::{PoolEntry, Usage};
pub use service::{PoolListing, PoolService};
pub use summary::CategorySummary;
