//! Fixed-period export scheduler.
//!
//! One task owns the timer. Each tick collects a frame synchronously and hands
//! the export to a spawned task, so the next tick is never delayed by the
//! network. At most one export is in flight: a tick that finds the previous
//! export still running is skipped whole (no snapshot, no reset), so
//! interval-reset samples are never collected and then dropped.
//!
//! A panic while collecting is caught at the tick boundary; a panic inside an
//! export task dies with that task. Either way the next tick runs.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};

use crate::pipeline::exporter::{ExportOutcome, Exporter};
use crate::telemetry::Telemetry;

type FlushReply = oneshot::Sender<ExportOutcome>;

pub struct Scheduler {
    telemetry: Telemetry,
    exporter: Exporter,
    period: Duration,
    shutdown_timeout: Duration,
    in_flight: Arc<Semaphore>,
}

/// Control side of a running scheduler. Dropping it stops the scheduler the
/// same way `shutdown` does, without waiting for the result.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    flush_tx: mpsc::Sender<FlushReply>,
    join: JoinHandle<ExportOutcome>,
}

impl Scheduler {
    pub fn new(
        telemetry: Telemetry,
        exporter: Exporter,
        period: Duration,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            telemetry,
            exporter,
            period,
            shutdown_timeout,
            in_flight: Arc::new(Semaphore::new(1)),
        }
    }

    /// Start ticking on the current runtime. The first export happens one
    /// full period after start.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (flush_tx, flush_rx) = mpsc::channel(8);
        let join = tokio::spawn(self.run(shutdown_rx, flush_rx));
        SchedulerHandle {
            shutdown_tx,
            flush_tx,
            join,
        }
    }

    async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut flush_rx: mpsc::Receiver<FlushReply>,
    ) -> ExportOutcome {
        tracing::info!(period_ms = self.period.as_millis() as u64, "metrics scheduler started");

        let start = tokio::time::Instant::now() + self.period;
        let mut ticker = tokio::time::interval_at(start, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(None),
                Some(reply) = flush_rx.recv() => self.tick(Some(reply)),
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.drain().await
    }

    fn tick(&self, reply: Option<FlushReply>) {
        let permit = match Arc::clone(&self.in_flight).try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!("previous metrics export still in flight; skipping tick");
                if let Some(r) = reply {
                    let _ = r.send(ExportOutcome::Skipped);
                }
                return;
            }
        };

        let batch = match catch_unwind(AssertUnwindSafe(|| self.telemetry.collect_frame())) {
            Ok(b) => b,
            Err(_) => {
                tracing::error!(
                    kind = "INTERNAL",
                    "metrics tick panicked while collecting; continuing"
                );
                if let Some(r) = reply {
                    let _ = r.send(ExportOutcome::EncodeFailed);
                }
                return;
            }
        };

        let exporter = self.exporter.clone();
        tokio::spawn(async move {
            let outcome = exporter.export(&batch).await;
            drop(permit);
            if let Some(r) = reply {
                let _ = r.send(outcome);
            }
        });
    }

    /// Await the in-flight export (bounded), then one final flush (bounded).
    async fn drain(self) -> ExportOutcome {
        if timeout(self.shutdown_timeout, self.in_flight.acquire())
            .await
            .is_err()
        {
            tracing::warn!("in-flight metrics export did not finish before shutdown timeout");
        }

        let batch = match catch_unwind(AssertUnwindSafe(|| self.telemetry.collect_frame())) {
            Ok(b) => b,
            Err(_) => {
                tracing::error!(kind = "INTERNAL", "final metrics collection panicked");
                return ExportOutcome::EncodeFailed;
            }
        };

        let outcome = match timeout(self.shutdown_timeout, self.exporter.export(&batch)).await {
            Ok(o) => o,
            Err(_) => {
                tracing::warn!("final metrics flush timed out");
                ExportOutcome::TransportFailed
            }
        };
        tracing::info!(?outcome, "metrics scheduler stopped");
        outcome
    }
}

impl SchedulerHandle {
    /// Run one tick now and wait for its export outcome.
    pub async fn flush_now(&self) -> ExportOutcome {
        let (tx, rx) = oneshot::channel();
        if self.flush_tx.send(tx).await.is_err() {
            return ExportOutcome::Skipped;
        }
        rx.await.unwrap_or(ExportOutcome::Skipped)
    }

    /// Stop the timer, wait for any in-flight export, and perform one final
    /// flush. Returns the final flush outcome.
    pub async fn shutdown(self) -> ExportOutcome {
        let _ = self.shutdown_tx.send(true);
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "metrics scheduler task failed");
                ExportOutcome::Skipped
            }
        }
    }
}
