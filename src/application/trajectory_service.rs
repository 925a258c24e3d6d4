// Trajectory service - trace and route queries over stored buckets
use crate::application::bucket_store::{BucketFilter, BucketStore, StoreError};
use crate::domain::trajectory::{flatten_trace, summarize_routes, RouteSummary, TracePoint};
use std::sync::Arc;

#[derive(Clone)]
pub struct TrajectoryService {
    store: Arc<dyn BucketStore>,
}

impl TrajectoryService {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self { store }
    }

    pub async fn list_vehicles(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_vehicle_ids().await
    }

    /// Measurements of the selected vehicles and routes ordered by
    /// (vehicle, timestamp). `None` selects everything.
    pub async fn get_trace(
        &self,
        vehicle_ids: Option<Vec<String>>,
        route_ids: Option<Vec<String>>,
    ) -> Result<Vec<TracePoint>, StoreError> {
        let filter = BucketFilter {
            vehicle_ids,
            route_ids,
        };
        let buckets = self.store.find_buckets(&filter).await?;
        tracing::debug!(buckets = buckets.len(), "Building trace");
        Ok(flatten_trace(&buckets))
    }

    pub async fn get_route_summaries(
        &self,
        vehicle_ids: Vec<String>,
    ) -> Result<Vec<RouteSummary>, StoreError> {
        if vehicle_ids.is_empty() {
            return Ok(Vec::new());
        }
        let buckets = self
            .store
            .find_buckets(&BucketFilter::vehicles(vehicle_ids))
            .await?;
        Ok(summarize_routes(&buckets))
    }
}
