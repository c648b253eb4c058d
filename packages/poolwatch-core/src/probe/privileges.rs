//! Privilege detection for link-layer discovery.
//!
//! `arp-scan` opens a raw socket, so on Linux and macOS it needs root or
//! CAP_NET_RAW (or a setuid binary). The effective uid is only used to make
//! failure messages actionable.

/// Check if the current process is running with elevated privileges
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// Instructions appended to discovery failures when not elevated.
pub fn elevation_hint(command: &str) -> String {
    #[cfg(target_os = "linux")]
    {
        format!(
            "{cmd} needs raw socket access: run as root, set `use_sudo = true`, \
             or grant it with `sudo setcap cap_net_raw+ep $(which {cmd})`",
            cmd = command
        )
    }

    #[cfg(not(target_os = "linux"))]
    {
        format!("{} needs raw socket access: run as root or set `use_sudo = true`", command)
    }
}
