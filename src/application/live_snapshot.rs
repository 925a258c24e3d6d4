// Live snapshot - latest event per vehicle, shared between ingest and readers
use crate::domain::event::VehicleEvent;
use crate::domain::live::LiveEntry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct LiveSnapshot {
    entries: RwLock<HashMap<String, LiveEntry>>,
}

impl LiveSnapshot {
    /// Overwrite the vehicle's entry with this event
    pub fn update(&self, event: &VehicleEvent) {
        let entry = LiveEntry::from(event);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.vehicle_id.clone(), entry);
    }

    #[cfg(test)]
    pub fn get(&self, vehicle_id: &str) -> Option<LiveEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(vehicle_id)
            .cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// All entries ordered by vehicle id
    pub fn entries(&self) -> Vec<LiveEntry> {
        let mut entries: Vec<LiveEntry> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        entries
    }

    /// Sorted ids of vehicles whose latest event reports a break
    pub fn vehicles_on_break(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.on_break)
            .map(|e| e.vehicle_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::measurement::{GeoPoint, Measurement};
    use chrono::Utc;

    fn event(vehicle: &str, speed: f64, on_break: bool) -> VehicleEvent {
        VehicleEvent {
            vehicle_id: vehicle.to_string(),
            route_id: "R1".to_string(),
            measurement: Measurement::new(
                Utc::now(),
                GeoPoint::new(7.0, 51.0),
                speed,
                100.0,
                on_break,
            ),
        }
    }

    #[test]
    fn test_latest_event_wins() {
        let snapshot = LiveSnapshot::default();
        snapshot.update(&event("A", 10.0, false));
        snapshot.update(&event("B", 20.0, false));
        snapshot.update(&event("A", 30.0, true));

        assert_eq!(snapshot.len(), 2);
        let a = snapshot.get("A").unwrap();
        assert_eq!(a.speed, 30.0);
        assert!(a.on_break);
    }

    #[test]
    fn test_vehicles_on_break_sorted() {
        let snapshot = LiveSnapshot::default();
        snapshot.update(&event("truck-3", 0.0, true));
        snapshot.update(&event("truck-1", 0.0, true));
        snapshot.update(&event("truck-2", 50.0, false));

        assert_eq!(snapshot.vehicles_on_break(), vec!["truck-1", "truck-3"]);
        let ids: Vec<String> = snapshot.entries().into_iter().map(|e| e.vehicle_id).collect();
        assert_eq!(ids, vec!["truck-1", "truck-2", "truck-3"]);
    }
}
