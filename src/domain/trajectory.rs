// Trajectory domain models - traces and route summaries derived from buckets
use crate::domain::bucket::Bucket;
use crate::domain::measurement::Measurement;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePoint {
    pub vehicle_id: String,
    pub route_id: String,
    #[serde(flatten)]
    pub measurement: Measurement,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub vehicle_id: String,
    pub route_id: String,
    pub from: Measurement,
    pub to: Measurement,
    /// Coordinate path across all buckets of the route, `[lon, lat]` pairs
    pub path: Vec<[f64; 2]>,
    #[serde(skip)]
    first_bucket_ts: DateTime<Utc>,
}

/// Flatten buckets into one trace ordered by (vehicle, timestamp).
///
/// Buckets are flattened in the order given; the sort is stable so equal
/// timestamps keep that order.
pub fn flatten_trace(buckets: &[Bucket]) -> Vec<TracePoint> {
    let mut trace: Vec<TracePoint> = buckets
        .iter()
        .flat_map(|bucket| {
            bucket.measurements.iter().map(|m| TracePoint {
                vehicle_id: bucket.vehicle_id.clone(),
                route_id: bucket.route_id.clone(),
                measurement: m.clone(),
            })
        })
        .collect();

    trace.sort_by(|a, b| {
        a.vehicle_id
            .cmp(&b.vehicle_id)
            .then(a.measurement.ts.cmp(&b.measurement.ts))
    });
    trace
}

/// One summary per (vehicle, route), ordered by vehicle then the route's
/// earliest bucket.
pub fn summarize_routes(buckets: &[Bucket]) -> Vec<RouteSummary> {
    let mut groups: HashMap<(&str, &str), Vec<&Bucket>> = HashMap::new();
    for bucket in buckets {
        groups
            .entry((bucket.vehicle_id.as_str(), bucket.route_id.as_str()))
            .or_default()
            .push(bucket);
    }

    let mut summaries: Vec<RouteSummary> = groups
        .into_iter()
        .filter_map(|((vehicle_id, route_id), mut route_buckets)| {
            route_buckets.sort_by_key(|b| b.min_ts);
            summarize_route(vehicle_id, route_id, &route_buckets)
        })
        .collect();

    summaries.sort_by(|a, b| {
        a.vehicle_id
            .cmp(&b.vehicle_id)
            .then(a.first_bucket_ts.cmp(&b.first_bucket_ts))
            .then_with(|| a.route_id.cmp(&b.route_id))
    });
    summaries
}

fn summarize_route(vehicle_id: &str, route_id: &str, buckets: &[&Bucket]) -> Option<RouteSummary> {
    let first_bucket_ts = buckets.first()?.min_ts;
    let mut from: Option<&Measurement> = None;
    let mut to: Option<&Measurement> = None;
    let mut path = Vec::new();

    for m in buckets.iter().flat_map(|b| b.measurements.iter()) {
        if from.is_none_or(|f| m.ts < f.ts) {
            from = Some(m);
        }
        if to.is_none_or(|t| m.ts >= t.ts) {
            to = Some(m);
        }
        path.push(m.geo.coordinates());
    }

    Some(RouteSummary {
        vehicle_id: vehicle_id.to_string(),
        route_id: route_id.to_string(),
        from: from?.clone(),
        to: to?.clone(),
        path,
        first_bucket_ts,
    })
}
