//! Liveness signal sources.
//!
//! Two independent producers feed the reconciliation engine:
//! - [`LinkLayerSweep`]: addresses answering at the data-link layer right now
//! - [`EchoProbe`]: per-address ICMP reachability
//!
//! Both are black boxes to the engine and may fail independently.

mod arp;
mod ping;
pub mod privileges;

pub use arp::{ArpScanSweep, ArpTableSweep, DEFAULT_SWEEP_TIMEOUT};
pub use ping::SystemPing;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::process::Command;
use std::time::Duration;

/// Result of a single echo probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub alive: bool,
    pub response_time_ms: Option<f64>,
}

impl ProbeOutcome {
    pub fn alive(response_time_ms: f64) -> Self {
        Self {
            alive: true,
            response_time_ms: Some(response_time_ms),
        }
    }

    pub fn dead() -> Self {
        Self {
            alive: false,
            response_time_ms: None,
        }
    }
}

#[async_trait]
pub trait LinkLayerSweep: Send + Sync {
    /// Addresses currently responding. Fails with `DiscoveryUnavailable`.
    async fn sweep(&self) -> Result<HashSet<String>>;
}

#[async_trait]
pub trait EchoProbe: Send + Sync {
    /// Never fails: timeouts and unreachable hosts are `alive = false`.
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome;
}

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Create a Command that hides the console window on Windows.
pub(crate) fn hidden_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Parse ping response time from command output
pub(crate) fn parse_ping_time(output: &str) -> Option<f64> {
    for word in output.split_whitespace() {
        if word.starts_with("time=") || word.starts_with("time<") {
            let time_str = word
                .trim_start_matches("time=")
                .trim_start_matches("time<")
                .trim_end_matches("ms");

            if let Ok(time) = time_str.parse::<f64>() {
                return Some(time);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ping_time() {
        let linux = "64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=0.412 ms";
        assert_eq!(parse_ping_time(linux), Some(0.412));
        let windows = "Reply from 10.0.0.1: bytes=32 time<1ms TTL=128";
        assert_eq!(parse_ping_time(windows), Some(1.0));
        assert_eq!(parse_ping_time("Request timed out."), None);
    }
}
