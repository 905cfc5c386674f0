//! Background Sweeper
//!
//! Periodically deletes expired sessions and stale one-time codes, and drops
//! idle rate-limit buckets. Runs off the request path; a failed pass is
//! logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use platform::rate_limit::BucketRegistry;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::service::AuthService;
use crate::domain::notifier::OtpSender;
use crate::domain::repository::AuthStore;

/// Handle to a running sweeper task
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task and wait for the current pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Sweeper task ended abnormally");
        }
    }
}

/// Spawn the sweeper on the current runtime.
///
/// ## Arguments
/// * `service` - used for session and code cleanup
/// * `limiter` - buckets idle for `interval * 4` are dropped
/// * `interval` - time between passes; the first pass runs immediately
pub fn spawn_sweeper<R, N>(
    service: AuthService<R, N>,
    limiter: Option<Arc<BucketRegistry>>,
    interval: Duration,
) -> SweeperHandle
where
    R: AuthStore,
    N: OtpSender + Send + Sync + 'static,
{
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let idle_after = interval.saturating_mul(4);

    let task = tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Starting sweeper");
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Sweeper shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match service.sweep_expired().await {
                        Ok(report) => {
                            if report.sessions > 0 || report.codes > 0 {
                                tracing::info!(
                                    sessions = report.sessions,
                                    codes = report.codes,
                                    "Expired auth records swept"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Sweep failed, will retry next interval");
                        }
                    }

                    if let Some(limiter) = &limiter {
                        let pruned = limiter.prune_idle(idle_after);
                        if pruned > 0 {
                            tracing::debug!(pruned, "Idle rate-limit buckets dropped");
                        }
                    }
                }
            }
        }
    });

    SweeperHandle { shutdown, task }
}
