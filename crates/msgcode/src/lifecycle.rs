//! Process lifecycle: pidfile discipline and the `stop`/`allstop` CLI
//! verbs. There is no inbound admin surface to carry these over HTTP (see
//! the crate layout note), so they're implemented the traditional Unix way
//! — a pidfile under the config directory, liveness checked with `kill -0`,
//! shutdown requested with `kill -TERM`/`kill -KILL`.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

const PIDFILE_NAME: &str = "msgcode.pid";

/// `~/.config/msgcode`, created on first use. Reads `HOME` directly — no
/// `dirs` crate.
pub fn config_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config").join("msgcode")
}

fn pidfile_path(dir: &Path) -> PathBuf {
    dir.join(PIDFILE_NAME)
}

/// Read the pidfile and confirm the process is actually alive (`kill -0`).
/// A stale pidfile pointing at a dead pid is treated as "not running" and
/// quietly removed rather than reported as an error.
pub fn running_pid(config_dir: &Path) -> Option<u32> {
    let raw = std::fs::read_to_string(pidfile_path(config_dir)).ok()?;
    let pid: u32 = raw.trim().parse().ok()?;
    if is_alive(pid) {
        Some(pid)
    } else {
        let _ = std::fs::remove_file(pidfile_path(config_dir));
        None
    }
}

fn is_alive(pid: u32) -> bool {
    process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Write the current process's pid, refusing if a live instance already
/// holds the file.
pub fn claim(config_dir: &Path) -> Result<()> {
    if let Some(pid) = running_pid(config_dir) {
        bail!("msgcode is already running (pid {pid})");
    }
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating {}", config_dir.display()))?;
    std::fs::write(pidfile_path(config_dir), process::id().to_string())
        .with_context(|| format!("writing {}", pidfile_path(config_dir).display()))?;
    Ok(())
}

pub fn release(config_dir: &Path) {
    let _ = std::fs::remove_file(pidfile_path(config_dir));
}

/// `msgcode stop`: graceful shutdown, `SIGTERM` then wait briefly for the
/// pidfile to disappear.
pub fn stop(config_dir: &Path) -> Result<()> {
    let Some(pid) = running_pid(config_dir) else {
        info!("msgcode is not running");
        return Ok(());
    };
    send_signal(pid, "-TERM")?;
    info!(pid, "sent SIGTERM, waiting for shutdown");
    for _ in 0..20 {
        if running_pid(config_dir).is_none() {
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_millis(250));
    }
    warn!(pid, "process did not exit within 5s after SIGTERM");
    Ok(())
}

/// `msgcode allstop`: immediate `SIGKILL`, no grace period. Matches the
/// spec's distinction between a clean stop and an emergency one — this is
/// the emergency one.
pub fn allstop(config_dir: &Path) -> Result<()> {
    let Some(pid) = running_pid(config_dir) else {
        info!("msgcode is not running");
        return Ok(());
    };
    send_signal(pid, "-KILL")?;
    info!(pid, "sent SIGKILL");
    release(config_dir);
    Ok(())
}

/// Whether `bin` resolves to an executable file — either directly (a path
/// containing a separator) or somewhere on `$PATH`. Used at `start` to give
/// the "precondition: binary missing" exit code (3) instead of a generic
/// failure when the transport adapter can't possibly spawn.
pub fn binary_available(bin: &str) -> bool {
    if bin.contains('/') {
        return Path::new(bin).is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(bin).is_file())
        })
        .unwrap_or(false)
}

fn send_signal(pid: u32, flag: &str) -> Result<()> {
    let status = process::Command::new("kill")
        .args([flag, &pid.to_string()])
        .status()
        .context("invoking kill(1)")?;
    if !status.success() {
        bail!("kill {flag} {pid} failed");
    }
    Ok(())
}
