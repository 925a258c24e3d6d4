// Measurement domain model - one vehicle reading
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Geographic point, longitude first like GeoJSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// `[lon, lat]` pair as used in GeoJSON coordinate arrays
    pub fn coordinates(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub ts: DateTime<Utc>,
    pub geo: GeoPoint,
    pub speed: f64,
    pub speed_limit: f64,
    #[serde(rename = "break")]
    pub on_break: bool,
}

impl Measurement {
    pub fn new(
        ts: DateTime<Utc>,
        geo: GeoPoint,
        speed: f64,
        speed_limit: f64,
        on_break: bool,
    ) -> Self {
        Self {
            ts,
            geo,
            speed,
            speed_limit,
            on_break,
        }
    }

    pub fn is_speeding(&self) -> bool {
        self.speed > self.speed_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_are_longitude_first() {
        let point = GeoPoint::new(7.62, 51.48);
        assert_eq!(point.coordinates(), [7.62, 51.48]);
    }

    #[test]
    fn test_serializes_break_flag_under_wire_name() {
        let m = Measurement::new(Utc::now(), GeoPoint::new(1.0, 2.0), 140.0, 120.0, true);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["break"], true);
        assert_eq!(json["speedLimit"], 120.0);
        assert!(m.is_speeding());
    }
}
