// Ingest service - single consumer loop from transport messages to buckets
use crate::application::batch_writer::{BatchSink, BatchWriter, FlushReport};
use crate::application::bucket_store::{BucketStore, BulkOutcome, StoreError};
use crate::application::ingest_stats::IngestStats;
use crate::application::live_snapshot::LiveSnapshot;
use crate::domain::bucket::UpsertOp;
use crate::domain::event::{EventDecoder, InboundMessage};
use crate::infrastructure::config::IngestSettings;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Flushes upserts into the bucket store as one bulk call, or as a single
/// atomic upsert when only one op is pending
struct BucketStoreSink {
    store: Arc<dyn BucketStore>,
}

#[async_trait]
impl BatchSink<UpsertOp> for BucketStoreSink {
    fn name(&self) -> &str {
        "buckets"
    }

    async fn write_batch(&self, batch: &[UpsertOp]) -> Result<BulkOutcome, StoreError> {
        match batch {
            [op] => {
                self.store.upsert_measurement(op).await?;
                Ok(BulkOutcome::success())
            }
            _ => self.store.bulk_upsert(batch).await,
        }
    }
}

pub struct IngestService {
    decoder: EventDecoder,
    writer: BatchWriter<UpsertOp>,
    snapshot: Arc<LiveSnapshot>,
    stats: Arc<IngestStats>,
}

impl IngestService {
    pub fn new(
        decoder: EventDecoder,
        store: Arc<dyn BucketStore>,
        settings: &IngestSettings,
        snapshot: Arc<LiveSnapshot>,
        stats: Arc<IngestStats>,
    ) -> Self {
        let sink = Arc::new(BucketStoreSink { store });
        Self {
            decoder,
            writer: BatchWriter::<UpsertOp>::new(
                sink,
                settings.batch_size,
                settings.max_flush_attempts,
            ),
            snapshot,
            stats,
        }
    }

    /// Consume messages until every sender is dropped, then force-flush the
    /// pending list until every op is written or out of attempts.
    pub async fn run(mut self, mut rx: mpsc::Receiver<InboundMessage>) -> FlushReport {
        tracing::info!("Ingest loop started");
        while let Some(message) = rx.recv().await {
            self.handle(message).await;
        }

        let report = self.writer.drain().await;
        self.stats.record_flush(&report, self.writer.pending_len());
        tracing::info!(
            written = report.written,
            dropped = report.dropped,
            left_pending = self.writer.pending_len(),
            "Ingest loop stopped"
        );
        report
    }

    pub async fn handle(&mut self, message: InboundMessage) {
        self.stats.record_received();

        let event = match self.decoder.decode(&message) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(topic = %message.topic, error = %e, "Dropping undecodable event");
                self.stats.record_decode_failure();
                return;
            }
        };

        self.snapshot.update(&event);
        self.writer.enqueue(event.to_upsert());

        let report = self.writer.flush(false).await;
        self.stats.record_flush(&report, self.writer.pending_len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::bucket_store::BucketFilter;
    use crate::domain::bucket::Bucket;
    use crate::domain::event::AxisOrder;
    use crate::infrastructure::memory_store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Mutex;

    /// Memory store that remembers the size of every write call and can be
    /// told to reject the first few of them
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        bulk_sizes: Mutex<Vec<usize>>,
        single_upserts: Mutex<usize>,
        failures_left: Mutex<usize>,
    }

    impl CountingStore {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: Mutex::new(times),
                ..Self::default()
            }
        }

        fn fail_now(&self) -> Result<(), StoreError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl BucketStore for CountingStore {
        async fn upsert_measurement(&self, op: &UpsertOp) -> Result<(), StoreError> {
            *self.single_upserts.lock().unwrap() += 1;
            self.fail_now()?;
            self.inner.upsert_measurement(op).await
        }

        async fn bulk_upsert(&self, ops: &[UpsertOp]) -> Result<BulkOutcome, StoreError> {
            self.bulk_sizes.lock().unwrap().push(ops.len());
            self.fail_now()?;
            self.inner.bulk_upsert(ops).await
        }

        async fn find_buckets(&self, filter: &BucketFilter) -> Result<Vec<Bucket>, StoreError> {
            self.inner.find_buckets(filter).await
        }

        async fn list_vehicle_ids(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_vehicle_ids().await
        }
    }

    fn settings(batch_size: usize) -> IngestSettings {
        IngestSettings {
            batch_size,
            max_flush_attempts: 3,
        }
    }

    fn service_with(
        store: Arc<CountingStore>,
        batch_size: usize,
    ) -> (IngestService, Arc<LiveSnapshot>, Arc<IngestStats>) {
        let snapshot = Arc::new(LiveSnapshot::default());
        let stats = Arc::new(IngestStats::default());
        let service = IngestService::new(
            EventDecoder::new("vehicles/trucks/", AxisOrder::Swapped),
            store,
            &settings(batch_size),
            snapshot.clone(),
            stats.clone(),
        );
        (service, snapshot, stats)
    }

    fn service(store: Arc<CountingStore>) -> (IngestService, Arc<LiveSnapshot>, Arc<IngestStats>) {
        service_with(store, 10)
    }

    fn message(vehicle: &str, route: &str, speed: f64, seq: i64) -> InboundMessage {
        let payload = format!(
            r#"{{"location":{{"lat":7.6,"lon":51.4}},"routeId":"{route}","speed":{speed},"speedLimit":120.0,"break":false}}"#
        );
        InboundMessage {
            topic: format!("vehicles/trucks/{vehicle}/location"),
            payload: payload.into_bytes(),
            received_at: Utc.timestamp_opt(1_600_000_000, 0).unwrap() + Duration::seconds(seq),
        }
    }

    #[tokio::test]
    async fn test_fifteen_events_flush_at_ten_then_at_shutdown() {
        let store = Arc::new(CountingStore::default());
        let (service, _, stats) = service(store.clone());
        let (tx, rx) = mpsc::channel(32);

        for i in 1..=15 {
            tx.send(message("A", "R1", i as f64 * 10.0, i)).await.unwrap();
        }
        drop(tx);
        let last = service.run(rx).await;

        assert_eq!(*store.bulk_sizes.lock().unwrap(), vec![10, 5]);
        assert_eq!(last.written, 5);

        let buckets = store.find_buckets(&BucketFilter::default()).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].size, 15);
        assert_eq!(buckets[0].measurements[14].speed, 150.0);

        let view = stats.view();
        assert_eq!(view.received, 15);
        assert_eq!(view.written, 15);
        assert_eq!(view.pending, 0);
    }

    #[tokio::test]
    async fn test_snapshot_tracks_latest_event_per_vehicle() {
        let store = Arc::new(CountingStore::default());
        let (mut service, snapshot, _) = service(store);

        service.handle(message("A", "R1", 10.0, 1)).await;
        service.handle(message("B", "R1", 20.0, 2)).await;
        service.handle(message("A", "R2", 30.0, 3)).await;

        assert_eq!(snapshot.len(), 2);
        let a = snapshot.get("A").unwrap();
        assert_eq!(a.speed, 30.0);
        assert_eq!(a.route_id, "R2");
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let store = Arc::new(CountingStore::default());
        let (mut service, snapshot, stats) = service(store.clone());

        let mut bad = message("A", "R1", 10.0, 1);
        bad.payload = b"{not json".to_vec();
        service.handle(bad).await;

        let mut bad_topic = message("A", "R1", 10.0, 2);
        bad_topic.topic = "vehicles/trucks/".to_string();
        service.handle(bad_topic).await;

        assert_eq!(snapshot.len(), 0);
        assert_eq!(stats.view().decode_failures, 2);
        assert!(store.bulk_sizes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_retries_a_failed_final_flush() {
        let store = Arc::new(CountingStore::failing(1));
        let (service, _, stats) = service(store.clone());
        let (tx, rx) = mpsc::channel(8);

        for i in 1..=5 {
            tx.send(message("A", "R1", 50.0, i)).await.unwrap();
        }
        drop(tx);
        let report = service.run(rx).await;

        assert_eq!(*store.bulk_sizes.lock().unwrap(), vec![5, 5]);
        assert_eq!(report.written, 5);
        assert!(report.is_clean());

        let buckets = store.find_buckets(&BucketFilter::default()).await.unwrap();
        assert_eq!(buckets[0].size, 5);
        let view = stats.view();
        assert_eq!(view.written, 5);
        assert_eq!(view.lost, 0);
        assert_eq!(view.pending, 0);
    }

    #[tokio::test]
    async fn test_shutdown_counts_ops_that_never_land_as_lost() {
        let store = Arc::new(CountingStore::failing(usize::MAX));
        let (service, _, stats) = service(store.clone());
        let (tx, rx) = mpsc::channel(8);

        for i in 1..=5 {
            tx.send(message("A", "R1", 50.0, i)).await.unwrap();
        }
        drop(tx);
        let report = service.run(rx).await;

        assert_eq!(store.bulk_sizes.lock().unwrap().len(), 3);
        assert_eq!(report.dropped, 5);
        let view = stats.view();
        assert_eq!(view.lost, 5);
        assert_eq!(view.pending, 0);
    }

    #[tokio::test]
    async fn test_single_pending_op_uses_atomic_upsert() {
        let store = Arc::new(CountingStore::default());
        let (mut service, _, _) = service_with(store.clone(), 1);

        service.handle(message("A", "R1", 10.0, 1)).await;
        service.handle(message("A", "R1", 20.0, 2)).await;

        assert_eq!(*store.single_upserts.lock().unwrap(), 2);
        assert!(store.bulk_sizes.lock().unwrap().is_empty());
        let buckets = store.find_buckets(&BucketFilter::default()).await.unwrap();
        assert_eq!(buckets[0].size, 2);
    }
}
