// Batch writer - accumulates pending operations and flushes them in bulk
use crate::application::bucket_store::{BulkOutcome, StoreError};
use async_trait::async_trait;
use std::sync::Arc;

/// Destination of a flush: one multi-operation call per batch.
#[async_trait]
pub trait BatchSink<T: Send + Sync>: Send + Sync {
    fn name(&self) -> &str;

    async fn write_batch(&self, batch: &[T]) -> Result<BulkOutcome, StoreError>;
}

/// What happened to the pending list during one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Ops submitted in this call, 0 when the flush was skipped
    pub attempted: usize,
    /// Ops confirmed written and removed from the pending list
    pub written: usize,
    /// Failed ops kept for the next flush
    pub retained: usize,
    /// Failed ops that ran out of attempts and were discarded
    pub dropped: usize,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.retained == 0 && self.dropped == 0
    }

    /// Fold a later flush into this one; `retained` is what the later one left
    fn absorb(&mut self, later: FlushReport) {
        self.attempted += later.attempted;
        self.written += later.written;
        self.dropped += later.dropped;
        self.retained = later.retained;
    }
}

/// Pending ops in arrival order.
///
/// `flush(false)` runs only once `batch_size` ops are pending, `flush(true)`
/// whenever anything is pending. Only ops the sink confirms are removed;
/// failed ops stay at the head of the list until they have been tried
/// `max_attempts` times. After a failed flush the retained ops do not count
/// towards the threshold, so the next unforced retry waits for a fresh batch
/// on top of them.
pub struct BatchWriter<T: Send + Sync> {
    sink: Arc<dyn BatchSink<T>>,
    ops: Vec<T>,
    attempts: Vec<u32>,
    batch_size: usize,
    max_attempts: u32,
    held_back: usize,
}

impl<T: Send + Sync> BatchWriter<T> {
    pub fn new(sink: Arc<dyn BatchSink<T>>, batch_size: usize, max_attempts: u32) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            ops: Vec::with_capacity(batch_size),
            attempts: Vec::with_capacity(batch_size),
            batch_size,
            max_attempts: max_attempts.max(1),
            held_back: 0,
        }
    }

    pub fn enqueue(&mut self, op: T) {
        self.ops.push(op);
        self.attempts.push(0);
    }

    pub fn pending_len(&self) -> usize {
        self.ops.len()
    }

    pub fn should_flush(&self, force: bool) -> bool {
        !self.ops.is_empty() && (force || self.ops.len() >= self.held_back + self.batch_size)
    }

    /// Force-flush until nothing is pending. Each forced flush either writes
    /// an op or spends one of its attempts, so this ends after at most
    /// `max_attempts` calls with every op written or dropped.
    pub async fn drain(&mut self) -> FlushReport {
        let mut total = FlushReport::default();
        while !self.ops.is_empty() {
            let report = self.flush(true).await;
            total.absorb(report);
        }
        total
    }

    pub async fn flush(&mut self, force: bool) -> FlushReport {
        if !self.should_flush(force) {
            return FlushReport::default();
        }

        let attempted = self.ops.len();
        let failed = match self.sink.write_batch(&self.ops).await {
            Ok(outcome) => {
                if let Some(first) = outcome.failures.first() {
                    tracing::error!(
                        sink = self.sink.name(),
                        attempted,
                        failed = outcome.failures.len(),
                        reason = %first.reason,
                        "Bulk write partially rejected"
                    );
                }
                outcome.failed_indices()
            }
            Err(e) => {
                tracing::error!(
                    sink = self.sink.name(),
                    attempted,
                    error = %e,
                    "Bulk write failed"
                );
                (0..attempted).collect()
            }
        };

        let mut report = FlushReport {
            attempted,
            ..FlushReport::default()
        };
        let ops = std::mem::take(&mut self.ops);
        let attempts = std::mem::take(&mut self.attempts);

        for (index, (op, tries)) in ops.into_iter().zip(attempts).enumerate() {
            if !failed.contains(&index) {
                report.written += 1;
                continue;
            }
            let tries = tries + 1;
            if tries >= self.max_attempts {
                report.dropped += 1;
            } else {
                self.ops.push(op);
                self.attempts.push(tries);
                report.retained += 1;
            }
        }
        self.held_back = report.retained;

        if report.dropped > 0 {
            tracing::error!(
                sink = self.sink.name(),
                dropped = report.dropped,
                max_attempts = self.max_attempts,
                "Discarding operations after repeated write failures"
            );
        }
        tracing::debug!(
            sink = self.sink.name(),
            written = report.written,
            retained = report.retained,
            "Flushed batch"
        );

        report
    }
}
