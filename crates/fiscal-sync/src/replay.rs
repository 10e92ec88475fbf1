//! # Replay Worker
//!
//! Re-runs retryable failed events from the ledger.
//!
//! ## Replay Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Replay Worker Flow                              │
//! │                                                                         │
//! │  every poll_interval_secs:                                              │
//! │                                                                         │
//! │  1. Load: retry_count < max_attempts AND                                │
//! │           ( failed AND retryable AND next_attempt_at <= now             │
//! │           | pending/processing untouched for stale_after_secs )         │
//! │                                                (batch_size rows)        │
//! │                                                                         │
//! │  2. Claim: CAS → processing, retry_count += 1                           │
//! │            (lost claim ⇒ another worker has it, skip)                   │
//! │                                                                         │
//! │  3. Replay: EventProcessor::replay(stored payload)                      │
//! │            failure ⇒ next_attempt_at = now + initial * 2^retry_count    │
//! │                                                  (capped at max)        │
//! │            aborted ⇒ row still marked failed                           │
//! │                                                                         │
//! │  SHUTDOWN: ReplayWorkerHandle::shutdown() stops after the current tick  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use fiscal_db::Database;

use crate::config::ReplaySettings;
use crate::error::{SyncError, SyncResult};
use crate::processor::{EventOutcome, EventProcessor};

/// Background task replaying failed events.
pub struct ReplayWorker {
    processor: EventProcessor,
    db: Database,
    settings: ReplaySettings,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping the replay worker.
#[derive(Clone)]
pub struct ReplayWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ReplayWorkerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Replay shutdown channel closed".into()))
    }
}

/// Tally of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ReplayWorker {
    /// Creates a new replay worker and returns a handle.
    pub fn new(
        processor: EventProcessor,
        db: Database,
        settings: ReplaySettings,
    ) -> (Self, ReplayWorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = ReplayWorker {
            processor,
            db,
            settings,
            shutdown_rx,
        };

        (worker, ReplayWorkerHandle { shutdown_tx })
    }

    /// Runs the worker until shutdown.
    pub async fn run(mut self) {
        info!("Replay worker starting");

        let poll_interval = Duration::from_secs(self.settings.poll_interval_secs.max(1));
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(?e, "Failed to replay events");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Replay worker shutting down");
                    break;
                }
            }
        }

        info!("Replay worker stopped");
    }

    /// Replays every event currently due.
    pub async fn run_once(&self) -> SyncResult<ReplayStats> {
        let now = Utc::now();
        let cutoff = self.settings.stale_before(now);
        let due = self
            .db
            .events()
            .list_due_retries(now, cutoff, self.settings.max_attempts, self.settings.batch_size)
            .await?;

        if due.is_empty() {
            debug!("No events due for replay");
            return Ok(ReplayStats::default());
        }

        info!(count = due.len(), "Replaying failed events");

        let mut stats = ReplayStats::default();
        for mut record in due {
            if !self
                .db
                .events()
                .claim_for_retry(&record.id, record.retry_count, cutoff)
                .await?
            {
                debug!(event_id = %record.id, "Replay claimed elsewhere");
                continue;
            }
            record.retry_count += 1;
            stats.claimed += 1;

            match self.processor.replay(record.clone()).await {
                Ok(EventOutcome::Completed { .. }) => stats.completed += 1,
                Ok(_) => stats.failed += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(event_id = %record.id, error = %e, "Replay aborted");
                    if let Err(fail_err) = self.processor.fail_aborted(&record, &e).await {
                        error!(event_id = %record.id, error = %fail_err, "Failed to record aborted replay");
                    }
                }
            }
        }

        Ok(stats)
    }
}
