// Bucket domain model - size-bounded group of measurements for one vehicle+route
use crate::domain::measurement::Measurement;
use chrono::{DateTime, Utc};

/// Maximum number of measurements held by a single bucket.
pub const BUCKET_CAPACITY: usize = 60;

/// Queued write: append `measurement` to the open bucket of (vehicle, route),
/// creating that bucket when none is open.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOp {
    pub vehicle_id: String,
    pub route_id: String,
    pub measurement: Measurement,
}

impl UpsertOp {
    pub fn new(vehicle_id: String, route_id: String, measurement: Measurement) -> Self {
        Self {
            vehicle_id,
            route_id,
            measurement,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub vehicle_id: String,
    pub route_id: String,
    pub measurements: Vec<Measurement>,
    pub min_ts: DateTime<Utc>,
    pub max_ts: DateTime<Utc>,
    pub size: usize,
}

impl Bucket {
    /// New bucket holding a single measurement
    pub fn open(op: &UpsertOp) -> Self {
        Self {
            vehicle_id: op.vehicle_id.clone(),
            route_id: op.route_id.clone(),
            measurements: vec![op.measurement.clone()],
            min_ts: op.measurement.ts,
            max_ts: op.measurement.ts,
            size: 1,
        }
    }

    pub fn is_open(&self) -> bool {
        self.size < BUCKET_CAPACITY
    }

    pub fn belongs_to(&self, vehicle_id: &str, route_id: &str) -> bool {
        self.vehicle_id == vehicle_id && self.route_id == route_id
    }

    /// Whether `op` would be appended to this bucket rather than open a new one
    pub fn accepts(&self, op: &UpsertOp) -> bool {
        self.is_open() && self.belongs_to(&op.vehicle_id, &op.route_id)
    }

    /// Append a measurement and fold its timestamp into the bounds.
    /// Callers must check `accepts` first.
    pub fn append(&mut self, measurement: Measurement) {
        debug_assert!(self.is_open(), "append to a full bucket");
        self.min_ts = self.min_ts.min(measurement.ts);
        self.max_ts = self.max_ts.max(measurement.ts);
        self.measurements.push(measurement);
        self.size += 1;
    }
}
