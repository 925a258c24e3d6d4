// Inbound vehicle events and their decoding
use crate::domain::bucket::UpsertOp;
use crate::domain::measurement::{GeoPoint, Measurement};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Raw message handed over by the transport, stamped on arrival.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// Which payload label carries which axis.
///
/// The fleet publisher writes longitude under `location.lat` and latitude
/// under `location.lon`; `Swapped` binds them that way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisOrder {
    #[default]
    Swapped,
    Standard,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("topic '{0}' does not name a vehicle")]
    Topic(String),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("coordinates out of range: lon={lon}, lat={lat}")]
    Coordinates { lon: f64, lat: f64 },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationPayload {
    location: RawLocation,
    route_id: String,
    speed: f64,
    speed_limit: f64,
    #[serde(rename = "break")]
    on_break: bool,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    lat: f64,
    lon: f64,
}

/// A decoded event for one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleEvent {
    pub vehicle_id: String,
    pub route_id: String,
    pub measurement: Measurement,
}

impl VehicleEvent {
    pub fn to_upsert(&self) -> UpsertOp {
        UpsertOp::new(
            self.vehicle_id.clone(),
            self.route_id.clone(),
            self.measurement.clone(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct EventDecoder {
    topic_prefix: String,
    axis_order: AxisOrder,
}

impl EventDecoder {
    pub fn new(topic_prefix: impl Into<String>, axis_order: AxisOrder) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            axis_order,
        }
    }

    /// Vehicle id is the topic segment right after the prefix:
    /// `vehicles/trucks/truck-00001/location` -> `truck-00001`
    pub fn vehicle_id<'a>(&self, topic: &'a str) -> Result<&'a str, DecodeError> {
        topic
            .strip_prefix(self.topic_prefix.as_str())
            .and_then(|rest| rest.split('/').next())
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| DecodeError::Topic(topic.to_string()))
    }

    pub fn decode(&self, message: &InboundMessage) -> Result<VehicleEvent, DecodeError> {
        let vehicle_id = self.vehicle_id(&message.topic)?;
        let payload: LocationPayload = serde_json::from_slice(&message.payload)?;

        let geo = match self.axis_order {
            AxisOrder::Swapped => GeoPoint::new(payload.location.lat, payload.location.lon),
            AxisOrder::Standard => GeoPoint::new(payload.location.lon, payload.location.lat),
        };
        if !(-180.0..=180.0).contains(&geo.lon) || !(-90.0..=90.0).contains(&geo.lat) {
            return Err(DecodeError::Coordinates {
                lon: geo.lon,
                lat: geo.lat,
            });
        }

        Ok(VehicleEvent {
            vehicle_id: vehicle_id.to_string(),
            route_id: payload.route_id,
            measurement: Measurement::new(
                message.received_at,
                geo,
                payload.speed,
                payload.speed_limit,
                payload.on_break,
            ),
        })
    }
}
