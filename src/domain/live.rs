// Live position of a vehicle, as last reported
use crate::domain::event::VehicleEvent;
use crate::domain::measurement::GeoPoint;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEntry {
    pub vehicle_id: String,
    pub route_id: String,
    pub geo: GeoPoint,
    pub speed: f64,
    pub speed_limit: f64,
    #[serde(rename = "break")]
    pub on_break: bool,
    pub speeding: bool,
    pub received_at: DateTime<Utc>,
}

impl From<&VehicleEvent> for LiveEntry {
    fn from(event: &VehicleEvent) -> Self {
        let m = &event.measurement;
        Self {
            vehicle_id: event.vehicle_id.clone(),
            route_id: event.route_id.clone(),
            geo: m.geo,
            speed: m.speed,
            speed_limit: m.speed_limit,
            on_break: m.on_break,
            speeding: m.is_speeding(),
            received_at: m.ts,
        }
    }
}
