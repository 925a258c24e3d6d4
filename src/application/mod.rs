// Application layer - use cases and repository seams
pub mod batch_writer;
pub mod bucket_store;
pub mod ingest_service;
pub mod ingest_stats;
pub mod live_snapshot;
pub mod trajectory_service;
pub mod warehouse_service;
