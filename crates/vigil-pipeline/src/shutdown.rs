// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C), triggering a
//! [`CancellationToken`] that the worker pool monitors. In-flight jobs see
//! the same token and stop at their next checkpoint.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, listening for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            info!("received SIGINT (Ctrl+C), initiating shutdown");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT (Ctrl+C), initiating shutdown");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received Ctrl+C, initiating shutdown");
}

/// Waits up to `timeout` for spawned tasks to finish, then aborts the rest.
///
/// Returns how many tasks had to be aborted.
pub async fn drain_tasks(tasks: &mut JoinSet<()>, timeout: Duration) -> usize {
    if tasks.is_empty() {
        debug!("no tasks to drain");
        return 0;
    }

    info!(count = tasks.len(), "draining worker tasks");
    let drained = tokio::time::timeout(timeout, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result
                && e.is_panic()
            {
                warn!(error = %e, "worker task panicked");
            }
        }
    })
    .await;

    match drained {
        Ok(()) => {
            info!("all worker tasks stopped");
            0
        }
        Err(_) => {
            let remaining = tasks.len();
            warn!(remaining, "drain timeout reached, aborting remaining tasks");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            remaining
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn drain_with_no_tasks_returns_immediately() {
        let mut tasks = JoinSet::new();
        assert_eq!(drain_tasks(&mut tasks, Duration::from_millis(10)).await, 0);
    }

    #[tokio::test]
    async fn drain_waits_for_tasks_that_honour_the_token() {
        let token = CancellationToken::new();
        let mut tasks = JoinSet::new();
        for _ in 0..3 {
            let token = token.clone();
            tasks.spawn(async move { token.cancelled().await });
        }
        token.cancel();
        assert_eq!(drain_tasks(&mut tasks, Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn drain_aborts_stuck_tasks() {
        let mut tasks = JoinSet::new();
        tasks.spawn(std::future::pending::<()>());
        assert_eq!(drain_tasks(&mut tasks, Duration::from_millis(20)).await, 1);
        assert!(tasks.is_empty());
    }
}
