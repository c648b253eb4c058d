//! Link-layer discovery using system commands

use super::{LinkLayerSweep, hidden_command, privileges};
use crate::error::{PoolError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default deadline for one `arp-scan` run. A /24 takes a couple of seconds.
pub const DEFAULT_SWEEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Reading the kernel cache is local and should be near instant.
const ARP_TABLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a discovery tool to completion, killing it once `timeout` passes.
async fn output_within(program: &str, args: &[String], timeout: Duration) -> std::io::Result<Output> {
    let mut cmd = Command::from(hidden_command(program));
    cmd.args(args).kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            ErrorKind::TimedOut,
            format!("no result within {:?}", timeout),
        )),
    }
}

fn launch_failure(command: &str, e: std::io::Error) -> PoolError {
    match e.kind() {
        ErrorKind::NotFound => {
            PoolError::DiscoveryUnavailable(format!("{} is not installed or not on PATH", command))
        }
        ErrorKind::TimedOut => PoolError::DiscoveryUnavailable(format!("{} timed out: {}", command, e)),
        _ => PoolError::DiscoveryUnavailable(format!("failed to run {}: {}", command, e)),
    }
}

/// Active ARP sweep of the local segment via `arp-scan -l`.
///
/// Needs raw socket access; install with `apt-get install arp-scan`.
#[derive(Debug, Clone)]
pub struct ArpScanSweep {
    pub command: String,
    pub interface: Option<String>,
    pub use_sudo: bool,
    pub timeout: Duration,
}

impl Default for ArpScanSweep {
    fn default() -> Self {
        Self {
            command: "arp-scan".to_string(),
            interface: None,
            use_sudo: false,
            timeout: DEFAULT_SWEEP_TIMEOUT,
        }
    }
}

impl ArpScanSweep {
    fn argv(&self) -> (String, Vec<String>) {
        let mut args = Vec::new();
        if self.use_sudo {
            args.push("-n".to_string());
            args.push(self.command.clone());
        }
        args.push("--localnet".to_string());
        if let Some(ref iface) = self.interface {
            args.push(format!("--interface={}", iface));
        }

        let program = if self.use_sudo {
            "sudo".to_string()
        } else {
            self.command.clone()
        };
        (program, args)
    }
}

#[async_trait]
impl LinkLayerSweep for ArpScanSweep {
    async fn sweep(&self) -> Result<HashSet<String>> {
        let (program, args) = self.argv();

        let output = output_within(&program, &args, self.timeout)
            .await
            .map_err(|e| launch_failure(&self.command, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let mut message = format!("{} exited with {}: {}", self.command, output.status, stderr);
            if !self.use_sudo && !privileges::is_elevated() {
                message.push_str(" (");
                message.push_str(&privileges::elevation_hint(&self.command));
                message.push(')');
            }
            return Err(PoolError::DiscoveryUnavailable(message));
        }

        let responding = parse_arp_scan(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!("arp-scan reported {} responding addresses", responding.len());
        Ok(responding)
    }
}

/// Passive read of the kernel ARP cache.
///
/// Needs no privileges but only sees hosts this machine talked to recently.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArpTableSweep;

#[async_trait]
impl LinkLayerSweep for ArpTableSweep {
    async fn sweep(&self) -> Result<HashSet<String>> {
        #[cfg(target_os = "windows")]
        let args = ["-a"];
        #[cfg(target_os = "macos")]
        let args = ["-a", "-n"];
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let args = ["-n"];
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();

        let output = output_within("arp", &args, ARP_TABLE_TIMEOUT)
            .await
            .map_err(|e| launch_failure("arp", e))?;

        if !output.status.success() {
            return Err(PoolError::DiscoveryUnavailable(format!(
                "arp exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);

        #[cfg(target_os = "windows")]
        let responding = parse_arp_table_windows(&stdout);
        #[cfg(target_os = "macos")]
        let responding = parse_arp_table_macos(&stdout);
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let responding = parse_arp_table_linux(&stdout);

        Ok(responding)
    }
}

fn is_mac(candidate: &str, separator: char) -> bool {
    candidate.len() == 17
        && candidate.contains(separator)
        && candidate != "00:00:00:00:00:00"
        && candidate != "00-00-00-00-00-00"
}

/// Lines look like `10.0.0.1\t00:11:22:33:44:55\tVendor`; banner and
/// summary lines are skipped.
fn parse_arp_scan(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let ip = fields.next()?;
            let mac = fields.next()?;
            (ip.parse::<Ipv4Addr>().is_ok() && is_mac(mac, ':')).then(|| ip.to_string())
        })
        .collect()
}

#[cfg_attr(any(target_os = "windows", target_os = "macos"), allow(dead_code))]
fn parse_arp_table_linux(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return None;
            }
            let (ip, mac) = (parts[0], parts[2]);
            (ip.parse::<Ipv4Addr>().is_ok() && is_mac(mac, ':')).then(|| ip.to_string())
        })
        .collect()
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_arp_table_macos(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let ip = line.get(line.find('(')? + 1..line.find(')')?)?;
            let after_at = &line[line.find(" at ")? + 4..];
            let mac = after_at.split_whitespace().next()?;
            // macOS drops leading zeros, so MACs can be shorter than 17 chars
            let valid_mac = mac.contains(':') && mac != "(incomplete)";
            (ip.parse::<Ipv4Addr>().is_ok() && valid_mac).then(|| ip.to_string())
        })
        .collect()
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_arp_table_windows(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let ip = parts.next()?;
            let mac = parts.next()?;
            if ip.starts_with("224.") || ip.starts_with("239.") || ip.ends_with(".255") {
                return None;
            }
            (ip.parse::<Ipv4Addr>().is_ok() && is_mac(mac, '-')).then(|| ip.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arp_scan_output() {
        let output = "Interface: eth0, type: EN10MB, MAC: 52:54:00:12:34:56, IPv4: 10.0.0.2\n\
Starting arp-scan 1.10.0 with 256 hosts (https://github.com/royhills/arp-scan)\n\
10.0.0.1\t00:1a:2b:3c:4d:5e\tCisco Systems, Inc\n\
10.0.0.7\tb8:27:eb:aa:bb:cc\tRaspberry Pi Foundation\n\
10.0.0.7\tb8:27:eb:aa:bb:cc\tRaspberry Pi Foundation (DUP: 2)\n\
\n\
3 packets received by filter, 0 packets dropped by kernel\n\
Ending arp-scan 1.10.0: 256 hosts scanned in 1.915 seconds (133.68 hosts/sec). 2 responded\n";
        let responding = parse_arp_scan(output);
        assert_eq!(responding.len(), 2);
        assert!(responding.contains("10.0.0.1"));
        assert!(responding.contains("10.0.0.7"));
    }

    #[test]
    fn test_parse_arp_table_linux() {
        let output = "Address                  HWtype  HWaddress           Flags Mask            Iface\n\
192.168.1.1              ether   a4:91:b1:00:11:22   C                     eth0\n\
192.168.1.40                     (incomplete)                              eth0\n\
192.168.1.41             ether   00:00:00:00:00:00   C                     eth0\n";
        let responding = parse_arp_table_linux(output);
        assert_eq!(responding, HashSet::from(["192.168.1.1".to_string()]));
    }

    #[test]
    fn test_parse_arp_table_macos() {
        let output = "? (192.168.1.1) at a4:91:b1:0:11:22 on en0 ifscope [ethernet]\n\
? (192.168.1.9) at (incomplete) on en0 ifscope [ethernet]\n";
        let responding = parse_arp_table_macos(output);
        assert_eq!(responding, HashSet::from(["192.168.1.1".to_string()]));
    }

    #[test]
    fn test_parse_arp_table_windows() {
        let output = "Interface: 192.168.1.10 --- 0xb\n\
  Internet Address      Physical Address      Type\n\
  192.168.1.1           a4-91-b1-00-11-22     dynamic\n\
  192.168.1.255         ff-ff-ff-ff-ff-ff     static\n\
  224.0.0.22            01-00-5e-00-00-16     static\n";
        let responding = parse_arp_table_windows(output);
        assert_eq!(responding, HashSet::from(["192.168.1.1".to_string()]));
    }

    #[test]
    fn test_arp_scan_argv() {
        let sweep = ArpScanSweep {
            interface: Some("eth1".into()),
            use_sudo: true,
            ..Default::default()
        };
        let (program, args) = sweep.argv();
        assert_eq!(program, "sudo");
        assert_eq!(args, vec!["-n", "arp-scan", "--localnet", "--interface=eth1"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_tool_is_killed_at_deadline() {
        let started = std::time::Instant::now();
        let result = output_within("sleep", &["5".to_string()], Duration::from_millis(200)).await;
        assert_eq!(result.map(|_| ()).unwrap_err().kind(), ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_timeout_is_discovery_unavailable() {
        let err = launch_failure(
            "arp-scan",
            std::io::Error::new(ErrorKind::TimedOut, "no result within 30s"),
        );
        assert!(matches!(err, PoolError::DiscoveryUnavailable(m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn test_missing_tool_is_discovery_unavailable() {
        let sweep = ArpScanSweep {
            command: "poolwatch-no-such-arp-scan".into(),
            ..Default::default()
        };
        assert!(matches!(
            sweep.sweep().await,
            Err(PoolError::DiscoveryUnavailable(_))
        ));
    }
}
