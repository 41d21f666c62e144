//! Shutdown and scheduled restart

use crate::transport::{CommandChannel, Link};
use anyhow::{Context, Result};
use tracing::{info, warn};

/// Why the main loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// ctrl-c or SIGTERM
    Signal,
    /// Uptime reached the restart interval
    ScheduledRestart,
}

/// Unsubscribe, close the channel, then release the link
///
/// Each step is attempted even if an earlier one failed.
pub async fn shutdown(channel: &dyn CommandChannel, link: &dyn Link, command_topic: &str) {
    info!("[LIFECYCLE] shutting down");

    if channel.is_connected() {
        if let Err(e) = channel.unsubscribe(command_topic).await {
            warn!("[LIFECYCLE] unsubscribe from {} failed: {:#}", command_topic, e);
        }
    }
    if let Err(e) = channel.disconnect().await {
        warn!("[LIFECYCLE] {} disconnect failed: {:#}", channel.name(), e);
    }
    if let Err(e) = link.disconnect().await {
        warn!("[LIFECYCLE] link disconnect failed: {:#}", e);
    }
}

/// Replace the running process with a fresh copy of itself
///
/// Only returns on failure.
#[cfg(unix)]
pub fn restart() -> Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("Failed to locate own executable")?;
    info!("[LIFECYCLE] restarting {}", exe.display());

    let err = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(err).with_context(|| format!("Failed to exec {}", exe.display()))
}

#[cfg(not(unix))]
pub fn restart() -> Result<()> {
    let exe = std::env::current_exe().context("Failed to locate own executable")?;
    info!("[LIFECYCLE] restarting {}", exe.display());

    std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .spawn()
        .with_context(|| format!("Failed to spawn {}", exe.display()))?;
    std::process::exit(0)
}

/// Resolve on ctrl-c or, on unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("[LIFECYCLE] ctrl-c handler failed: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("[LIFECYCLE] SIGTERM handler failed: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("[LIFECYCLE] ctrl-c received"),
        _ = terminate => info!("[LIFECYCLE] SIGTERM received"),
    }
}
