//! Background deletion of leftover managed resources.
//!
//! Runs once on startup, then every `interval` and whenever triggered.
//! Deletion failures are logged and retried on the next sweep; they never
//! stop the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ForecastConfig;

use super::backend::{ManagedForecastBackend, ResourceHandle, ResourceKind};
use super::ledger::ResourceLedger;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete `items` in order; successes leave the ledger, failures stay.
pub(crate) async fn delete_resources<B>(
    backend: &B,
    ledger: &ResourceLedger,
    items: impl IntoIterator<Item = (ResourceKind, ResourceHandle)>,
) -> SweepReport
where
    B: ManagedForecastBackend + ?Sized,
{
    let mut report = SweepReport::default();
    for (kind, handle) in items {
        report.attempted += 1;
        match backend.delete(kind, &handle).await {
            Ok(()) => {
                ledger.forget(kind, &handle);
                report.deleted += 1;
                debug!(kind = %kind, handle = %handle, "managed resource deleted");
            }
            Err(e) => {
                report.failed += 1;
                warn!(kind = %kind, handle = %handle, error = %e, "managed resource deletion failed");
            }
        }
    }
    report
}

pub struct CleanupSweeper<B> {
    backend: Arc<B>,
    ledger: Arc<ResourceLedger>,
    retention: Duration,
    interval: Duration,
}

/// Running sweeper (shutdown + trigger hook).
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: oneshot::Sender<()>,
    trigger: Arc<Notify>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Request an extra sweep. Triggers that arrive during a sweep coalesce.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }
}

impl<B: ManagedForecastBackend> CleanupSweeper<B> {
    pub fn new(backend: Arc<B>, ledger: Arc<ResourceLedger>, config: &ForecastConfig) -> Self {
        Self {
            backend,
            ledger,
            retention: config.retention,
            interval: config.sweep_interval,
        }
    }

    /// Delete everything older than the retention period.
    pub async fn sweep_once(&self) -> SweepReport {
        match retention_cutoff(Utc::now(), self.retention) {
            Some(cutoff) => self.sweep_older_than(cutoff).await,
            None => SweepReport::default(),
        }
    }

    pub async fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> SweepReport {
        let expired = self.ledger.expired(cutoff);
        if expired.is_empty() {
            return SweepReport::default();
        }
        let report = delete_resources(
            self.backend.as_ref(),
            &self.ledger,
            expired.into_iter().map(|e| (e.kind, e.handle)),
        )
        .await;
        info!(
            attempted = report.attempted,
            deleted = report.deleted,
            failed = report.failed,
            remaining = self.ledger.len(),
            "managed resource sweep finished"
        );
        report
    }

    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let trigger = Arc::new(Notify::new());
        let notified = trigger.clone();

        let join = tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "cleanup sweeper started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                    _ = notified.notified() => {}
                }
                self.sweep_once().await;
            }
            info!("cleanup sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            trigger,
            join,
        }
    }
}

fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> Option<DateTime<Utc>> {
    let retention = TimeDelta::from_std(retention).ok()?;
    now.checked_sub_signed(retention)
}
