// Ingest counters, updated by the ingest loop and read by the HTTP layer
use crate::application::batch_writer::FlushReport;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    decode_failures: AtomicU64,
    written: AtomicU64,
    lost: AtomicU64,
    pending: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatsView {
    pub received: u64,
    pub decode_failures: u64,
    pub written: u64,
    pub lost: u64,
    pub pending: usize,
}

impl IngestStats {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        self.lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, report: &FlushReport, pending: usize) {
        self.written.fetch_add(report.written as u64, Ordering::Relaxed);
        self.lost.fetch_add(report.dropped as u64, Ordering::Relaxed);
        self.pending.store(pending, Ordering::Relaxed);
    }

    pub fn view(&self) -> IngestStatsView {
        IngestStatsView {
            received: self.received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}
