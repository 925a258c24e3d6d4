// Application state for HTTP handlers
use crate::application::ingest_stats::IngestStats;
use crate::application::live_snapshot::LiveSnapshot;
use crate::application::trajectory_service::TrajectoryService;
use crate::application::warehouse_service::WarehouseService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub trajectory_service: TrajectoryService,
    pub warehouse_service: WarehouseService,
    pub live_snapshot: Arc<LiveSnapshot>,
    pub ingest_stats: Arc<IngestStats>,
}
