//! Echo probe using the system ping command

use super::{EchoProbe, ProbeOutcome, parse_ping_time};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Extra time granted to the ping process beyond its own deadline before
/// it is killed.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// One ICMP echo per probe through the system `ping` binary, which is
/// usually setuid and so needs no privileges of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPing;

fn ping_args(address: &str, timeout: Duration) -> Vec<String> {
    #[cfg(target_os = "windows")]
    {
        let ms = timeout.as_millis().max(1);
        vec!["-n".into(), "1".into(), "-w".into(), ms.to_string(), address.into()]
    }

    #[cfg(target_os = "macos")]
    {
        let ms = timeout.as_millis().max(1);
        vec!["-c".into(), "1".into(), "-W".into(), ms.to_string(), address.into()]
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // Linux ping takes whole seconds
        let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        vec!["-c".into(), "1".into(), "-W".into(), secs.to_string(), address.into()]
    }
}

#[async_trait]
impl EchoProbe for SystemPing {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome {
        let mut cmd = Command::new("ping");
        cmd.args(ping_args(address, timeout)).kill_on_drop(true);

        #[cfg(target_os = "windows")]
        cmd.creation_flags(0x08000000);

        let start = Instant::now();
        let output = match tokio::time::timeout(timeout + KILL_GRACE, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::debug!("Failed to execute ping for {}: {}", address, e);
                return ProbeOutcome::dead();
            }
            Err(_) => {
                tracing::debug!("Ping to {} timed out", address);
                return ProbeOutcome::dead();
            }
        };

        let output_str = String::from_utf8_lossy(&output.stdout);

        #[cfg(target_os = "windows")]
        {
            // Windows ping exits 0 for some unreachable replies
            let output_lower = output_str.to_lowercase();
            if output_lower.contains("destination host unreachable")
                || !output_lower.contains("reply from")
            {
                return ProbeOutcome::dead();
            }
        }

        if !output.status.success() {
            return ProbeOutcome::dead();
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        ProbeOutcome::alive(parse_ping_time(&output_str).unwrap_or(elapsed_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_args_single_echo() {
        let args = ping_args("10.0.0.1", Duration::from_millis(1000));
        assert_eq!(args.last().map(String::as_str), Some("10.0.0.1"));
        assert!(args.iter().any(|a| a == "1"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_deadline_rounds_up_to_seconds() {
        assert_eq!(ping_args("h", Duration::from_millis(1500))[3], "2");
        assert_eq!(ping_args("h", Duration::from_millis(200))[3], "1");
    }
}
