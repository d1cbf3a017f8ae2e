//! Poll loop feeding pending documents to the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use super::orchestrator::{DocumentOutcome, Orchestrator};
use crate::error::StoreError;
use crate::models::config::ProcessorConfig;
use crate::models::invoice::DocumentStatus;

/// Counts from one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Documents picked from the queue.
    pub fetched: usize,
    pub done: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }

    fn merge(&mut self, other: BatchReport) {
        self.fetched += other.fetched;
        self.done += other.done;
        self.failed += other.failed;
    }
}

/// Sequential document worker.
///
/// Documents are processed one at a time. Shutdown is observed while
/// waiting and between documents, never in the middle of one.
pub struct Worker {
    orchestrator: Arc<Orchestrator>,
    config: ProcessorConfig,
}

impl Worker {
    pub fn new(orchestrator: Arc<Orchestrator>, config: ProcessorConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Process one batch of pending documents with pacing between them.
    pub async fn run_once(&self) -> Result<BatchReport, StoreError> {
        let (_tx, mut shutdown) = watch::channel(false);
        self.process_batch(&mut shutdown).await
    }

    /// Poll until `shutdown` becomes true, returning totals for the run.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> BatchReport {
        info!(
            "Worker started (batch size {}, pacing {:?})",
            self.config.batch_size,
            self.config.pacing()
        );
        let mut totals = BatchReport::default();

        while !*shutdown.borrow() {
            let pause = match self.process_batch(&mut shutdown).await {
                Ok(report) if report.is_empty() => {
                    debug!("No pending documents");
                    self.config.idle()
                }
                Ok(report) => {
                    info!(
                        "Batch finished: {} done, {} failed",
                        report.done, report.failed
                    );
                    totals.merge(report);
                    // Keeps the pacing between the last document of this
                    // batch and the first of the next.
                    self.config.pacing()
                }
                Err(e) => {
                    error!("Polling pending documents failed: {}", e);
                    self.config.cooldown()
                }
            };

            if !pause.is_zero() && !wait(pause, &mut shutdown).await {
                break;
            }
        }

        info!(
            "Worker stopped after {} documents ({} done, {} failed)",
            totals.fetched, totals.done, totals.failed
        );
        totals
    }

    async fn process_batch(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<BatchReport, StoreError> {
        let batch = self
            .orchestrator
            .documents()
            .list_pending(DocumentStatus::Pending, self.config.batch_size)
            .await?;

        let mut report = BatchReport::default();
        if batch.is_empty() {
            return Ok(report);
        }
        info!("Found {} pending documents", batch.len());

        for (i, document) in batch.iter().enumerate() {
            if i > 0 && !wait(self.config.pacing(), shutdown).await {
                break;
            }

            report.fetched += 1;
            match self.orchestrator.process(document).await {
                DocumentOutcome::Done => report.done += 1,
                DocumentOutcome::Failed(_) => report.failed += 1,
            }
        }

        Ok(report)
    }
}

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `false` when the worker should stop.
async fn wait(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        changed = shutdown.changed() => match changed {
            Ok(()) => !*shutdown.borrow(),
            // Sender gone: nobody can ask us to stop, keep the pause.
            Err(_) => {
                tokio::time::sleep(duration).await;
                true
            }
        },
    }
}
