//! Liveness reconciliation engine.
//!
//! Two cycles run on independent timers against the same pool:
//! - link sweep (short interval): addresses seen at the link layer are
//!   promoted or confirmed; absence proves nothing and is ignored
//! - echo sweep (long interval): every pool address is pinged; replies
//!   promote or confirm, failures demote unless the latest link sweep saw
//!   the address
//!
//! Cycles may overlap. Every per-address read-decide-write runs under that
//! address's lock, and no cycle failure ever stops the scheduler.

mod locks;
mod snapshot;
pub mod transition;

pub use snapshot::{DiscoverySnapshot, LinkSighting};
pub use transition::{Signal, Transition, echo_signal, transition};

use crate::address;
use crate::error::Result;
use crate::pool::{PoolEntry, Usage};
use crate::probe::{EchoProbe, LinkLayerSweep, ProbeOutcome};
use crate::store::PoolStore;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use locks::AddressLocks;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, interval_at};

/// Slack on top of the probe's own timeout before the engine gives up on it.
const PROBE_GRACE: Duration = Duration::from_millis(250);

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub sweep_interval: Duration,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    /// Maximum echo probes in flight within one cycle
    pub probe_concurrency: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            probe_interval: Duration::from_secs(300),
            probe_timeout: Duration::from_millis(1000),
            probe_concurrency: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    LinkSweep,
    EchoSweep,
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleKind::LinkSweep => write!(f, "link sweep"),
            CycleKind::EchoSweep => write!(f, "echo sweep"),
        }
    }
}

/// Tally of one finished cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub kind: CycleKind,
    pub promoted: usize,
    pub demoted: usize,
    /// Evaluated with no state change
    pub confirmed: usize,
    /// Echo failures overridden by a link-layer sighting
    pub guarded: usize,
    /// Responding addresses that are not in the pool
    pub unmanaged: usize,
    /// Per-address store failures
    pub failed: usize,
    pub elapsed_secs: f64,
}

impl CycleReport {
    fn new(kind: CycleKind) -> Self {
        Self {
            kind,
            promoted: 0,
            demoted: 0,
            confirmed: 0,
            guarded: 0,
            unmanaged: 0,
            failed: 0,
            elapsed_secs: 0.0,
        }
    }

    pub fn evaluated(&self) -> usize {
        self.promoted + self.demoted + self.confirmed
    }

    fn record(&mut self, outcome: AddressOutcome) {
        match outcome {
            AddressOutcome::Applied(Transition::Changed(Usage::InUse)) => self.promoted += 1,
            AddressOutcome::Applied(Transition::Changed(_)) => self.demoted += 1,
            AddressOutcome::Applied(Transition::Checked) => self.confirmed += 1,
            AddressOutcome::Guarded => self.guarded += 1,
            AddressOutcome::Missing => self.unmanaged += 1,
            AddressOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum AddressOutcome {
    Applied(Transition),
    Guarded,
    Missing,
    Failed,
}

pub struct ReconciliationEngine {
    store: Arc<dyn PoolStore>,
    link: Arc<dyn LinkLayerSweep>,
    echo: Arc<dyn EchoProbe>,
    settings: EngineSettings,
    snapshot: DiscoverySnapshot,
    locks: AddressLocks,
    clock: Clock,
    link_in_flight: AtomicUsize,
    echo_in_flight: AtomicUsize,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn PoolStore>,
        link: Arc<dyn LinkLayerSweep>,
        echo: Arc<dyn EchoProbe>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            link,
            echo,
            settings,
            snapshot: DiscoverySnapshot::default(),
            locks: AddressLocks::new(),
            clock: Arc::new(Utc::now),
            link_in_flight: AtomicUsize::new(0),
            echo_in_flight: AtomicUsize::new(0),
        }
    }

    /// Replace the wall clock used for timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Read handle on the latest link-layer sweep.
    pub fn snapshot(&self) -> DiscoverySnapshot {
        self.snapshot.clone()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one link-layer sweep cycle.
    ///
    /// A discovery failure aborts the cycle before any write and keeps the
    /// previous snapshot.
    pub async fn run_link_sweep(&self) -> Result<CycleReport> {
        let start = Instant::now();
        let mut report = CycleReport::new(CycleKind::LinkSweep);

        let responding = self.link.sweep().await?;
        self.snapshot.replace(responding.clone(), (self.clock)()).await;

        let mut addresses: Vec<String> = responding.into_iter().collect();
        addresses.sort_by_key(|a| address::encode(a).unwrap_or(u32::MAX));

        for address in &addresses {
            let outcome = self.apply_signal(address, Signal::Alive).await;
            report.record(outcome);
        }

        report.elapsed_secs = start.elapsed().as_secs_f64();
        Ok(report)
    }

    /// Run one echo-probe cycle over the whole pool.
    ///
    /// Only a failure to list the pool aborts the cycle; per-address
    /// failures are logged and counted.
    pub async fn run_echo_sweep(&self) -> Result<CycleReport> {
        let start = Instant::now();
        let mut report = CycleReport::new(CycleKind::EchoSweep);

        let entries = self.store.list_all().await?;
        tracing::debug!("Echo probing {} pool addresses", entries.len());

        let concurrency = self.settings.probe_concurrency.max(1);
        let mut outcomes = futures::stream::iter(entries)
            .map(|entry| self.probe_and_apply(entry))
            .buffer_unordered(concurrency);

        while let Some(outcome) = outcomes.next().await {
            report.record(outcome);
        }

        report.elapsed_secs = start.elapsed().as_secs_f64();
        Ok(report)
    }

    pub async fn run_cycle(&self, kind: CycleKind) -> Result<CycleReport> {
        match kind {
            CycleKind::LinkSweep => self.run_link_sweep().await,
            CycleKind::EchoSweep => self.run_echo_sweep().await,
        }
    }

    async fn probe_and_apply(&self, entry: PoolEntry) -> AddressOutcome {
        let timeout = self.settings.probe_timeout;
        let outcome = tokio::time::timeout(timeout + PROBE_GRACE, self.echo.probe(&entry.address, timeout))
            .await
            .unwrap_or_else(|_| {
                tracing::debug!("Echo probe to {} exceeded {:?}", entry.address, timeout);
                ProbeOutcome::dead()
            });

        let seen_on_link = self.snapshot.contains(&entry.address).await;
        match echo_signal(outcome.alive, seen_on_link) {
            Some(signal) => self.apply_signal(&entry.address, signal).await,
            None => {
                tracing::debug!(
                    "{} did not answer echo but was seen at the link layer, leaving as {}",
                    entry.address,
                    entry.in_use
                );
                AddressOutcome::Guarded
            }
        }
    }

    /// Atomic read-decide-write for one address.
    async fn apply_signal(&self, address: &str, signal: Signal) -> AddressOutcome {
        let _guard = self.locks.lock(address).await;

        let entry = match self.store.find_by_address(address).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return AddressOutcome::Missing,
            Err(e) => {
                tracing::warn!("Failed to read pool entry {}: {}", address, e);
                return AddressOutcome::Failed;
            }
        };

        // Never move timestamps backwards, even if the clock does
        let now = match entry.last_checked_at {
            Some(checked) => (self.clock)().max(checked),
            None => (self.clock)(),
        };

        let next = transition(entry.in_use, signal);
        if let Err(e) = self.store.update_by_address(address, next.patch(now)).await {
            tracing::warn!("Failed to update pool entry {}: {}", address, e);
            return AddressOutcome::Failed;
        }

        if let Transition::Changed(usage) = next {
            tracing::debug!("{}: {} -> {}", address, entry.in_use, usage);
        }
        AddressOutcome::Applied(next)
    }

    fn in_flight(&self, kind: CycleKind) -> &AtomicUsize {
        match kind {
            CycleKind::LinkSweep => &self.link_in_flight,
            CycleKind::EchoSweep => &self.echo_in_flight,
        }
    }

    /// Start a cycle in the background. Overlap with a still-running cycle
    /// of the same kind is allowed but logged.
    pub fn spawn_cycle(self: &Arc<Self>, kind: CycleKind) -> tokio::task::JoinHandle<()> {
        let running = self.in_flight(kind).fetch_add(1, Ordering::SeqCst);
        if running > 0 {
            tracing::warn!(
                "Previous {} still running ({} in flight); the interval may be too short",
                kind,
                running
            );
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.run_cycle(kind).await {
                Ok(report) => tracing::info!(
                    "{} complete in {:.1}s: {} promoted, {} demoted, {} confirmed, {} guarded, {} failed",
                    kind,
                    report.elapsed_secs,
                    report.promoted,
                    report.demoted,
                    report.confirmed,
                    report.guarded,
                    report.failed
                ),
                Err(e) => tracing::error!("{} aborted, retrying next tick: {}", kind, e),
            }
            engine.in_flight(kind).fetch_sub(1, Ordering::SeqCst);
        })
    }

    /// Drive both cycles on their timers until `shutdown` turns true or its
    /// sender is dropped.
    ///
    /// The first link sweep completes before the first echo sweep starts, so
    /// echo failures are always checked against a real discovery snapshot.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Reconciliation started: link sweep every {}s, echo sweep every {}s",
            self.settings.sweep_interval.as_secs(),
            self.settings.probe_interval.as_secs()
        );

        let first_sweep = self.spawn_cycle(CycleKind::LinkSweep);
        tokio::select! {
            _ = first_sweep => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("Reconciliation stopped before the first echo sweep");
                    return;
                }
            }
        }

        let mut sweep_timer = interval_at(
            tokio::time::Instant::now() + self.settings.sweep_interval,
            self.settings.sweep_interval,
        );
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut probe_timer = interval(self.settings.probe_interval);
        probe_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sweep_timer.tick() => {
                    self.spawn_cycle(CycleKind::LinkSweep);
                }
                _ = probe_timer.tick() => {
                    self.spawn_cycle(CycleKind::EchoSweep);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Reconciliation stopped");
    }
}
