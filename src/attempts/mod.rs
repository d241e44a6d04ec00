//! Channel-fed recorder for callers that report attempts without awaiting
//! each write.

use crate::{engine::LearningEngine, models::AttemptRecord};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};

pub type AttemptSender = mpsc::Sender<AttemptRecord>;
pub type AttemptReceiver = mpsc::Receiver<AttemptRecord>;

/// Spawns a task that records every attempt sent on the returned channel, in
/// order. Failed records are logged and counted; the task keeps going.
pub fn spawn_recorder(
    engine: Arc<LearningEngine>,
    queue_capacity: usize,
) -> (RecorderHandle, AttemptSender) {
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let join = tokio::spawn(AttemptRecorder::new(engine).run(rx));
    (RecorderHandle { join }, tx)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderSummary {
    pub recorded: u64,
    pub failed: u64,
}

pub struct RecorderHandle {
    join: JoinHandle<RecorderSummary>,
}

impl RecorderHandle {
    /// Waits for the queue to drain. Every sender must be dropped first or
    /// this never returns.
    pub async fn shutdown(self) -> Result<RecorderSummary> {
        self.join
            .await
            .map_err(|err| anyhow!("attempt recorder task failed: {err}"))
    }
}

struct AttemptRecorder {
    engine: Arc<LearningEngine>,
    summary: RecorderSummary,
}

impl AttemptRecorder {
    fn new(engine: Arc<LearningEngine>) -> Self {
        Self {
            engine,
            summary: RecorderSummary::default(),
        }
    }

    async fn run(mut self, mut rx: AttemptReceiver) -> RecorderSummary {
        while let Some(attempt) = rx.recv().await {
            self.handle_attempt(attempt).await;
        }
        tracing::debug!(
            recorded = self.summary.recorded,
            failed = self.summary.failed,
            "attempt recorder drained"
        );
        self.summary
    }

    async fn handle_attempt(&mut self, attempt: AttemptRecord) {
        match self.engine.record_attempt(&attempt).await {
            Ok(()) => self.summary.recorded += 1,
            Err(err) => {
                self.summary.failed += 1;
                tracing::warn!(
                    error = %err,
                    retryable = err.is_retryable(),
                    category = %attempt.category,
                    model = %attempt.model_id,
                    "failed to record feature attempt"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LearningConfig;
    use tempfile::NamedTempFile;

    async fn engine(file: &NamedTempFile) -> Arc<LearningEngine> {
        Arc::new(
            LearningEngine::open(file.path(), LearningConfig::default())
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn recorder_persists_attempts_and_counts_failures() {
        let db_file = NamedTempFile::new().unwrap();
        let engine = engine(&db_file).await;

        let (handle, tx) = spawn_recorder(engine.clone(), 10);
        tx.send(AttemptRecord::new("auth", "m1", true)).await.unwrap();
        tx.send(AttemptRecord::new("auth", "m1", false)).await.unwrap();
        tx.send(AttemptRecord::new("", "m1", true)).await.unwrap();
        drop(tx);

        let summary = handle.shutdown().await.unwrap();
        assert_eq!(summary, RecorderSummary { recorded: 2, failed: 1 });

        let patterns = engine.get_category_stats().await.unwrap();
        assert_eq!(patterns[0].total_attempts, 2);
        assert_eq!(patterns[0].successful_attempts, 1);
    }

    #[tokio::test]
    async fn small_queue_still_drains_every_attempt() {
        let db_file = NamedTempFile::new().unwrap();
        let engine = engine(&db_file).await;

        let (handle, tx) = spawn_recorder(engine.clone(), 0);
        for i in 0..12 {
            tx.send(AttemptRecord::new("ui", "m1", i % 3 == 0))
                .await
                .unwrap();
        }
        drop(tx);

        let summary = handle.shutdown().await.unwrap();
        assert_eq!(summary.recorded, 12);
        let pattern = &engine.get_category_stats().await.unwrap()[0];
        assert_eq!(pattern.total_attempts, 12);
        assert_eq!(pattern.successful_attempts, 4);
    }
}
