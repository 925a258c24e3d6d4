// Mapper between domain models and MongoDB documents
use crate::application::bucket_store::{BucketFilter, StoreError};
use crate::domain::bucket::{Bucket, UpsertOp, BUCKET_CAPACITY};
use crate::domain::measurement::{GeoPoint, Measurement};
use crate::domain::warehouse::WarehouseRef;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};

fn mapping(field: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Mapping(format!("{field}: {e}"))
}

fn to_bson_datetime(ts: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(ts.timestamp_millis())
}

fn from_bson_datetime(doc: &Document, field: &str) -> Result<DateTime<Utc>, StoreError> {
    let millis = doc.get_datetime(field).map_err(|e| mapping(field, e))?.timestamp_millis();
    DateTime::from_timestamp_millis(millis).ok_or_else(|| mapping(field, "timestamp out of range"))
}

/// Numbers may come back as double or integer depending on who wrote them
fn number(doc: &Document, field: &str) -> Result<f64, StoreError> {
    match doc.get(field) {
        Some(Bson::Double(v)) => Ok(*v),
        Some(Bson::Int32(v)) => Ok(f64::from(*v)),
        Some(Bson::Int64(v)) => Ok(*v as f64),
        other => Err(mapping(field, format!("expected number, got {other:?}"))),
    }
}

fn optional_str(doc: &Document, field: &str) -> Option<String> {
    doc.get_str(field).ok().map(str::to_string)
}

/// Coordinates as `[lon, lat]` from a GeoJSON point
fn point(geometry: &Document) -> Result<GeoPoint, StoreError> {
    let coordinates = geometry
        .get_array("coordinates")
        .map_err(|e| mapping("coordinates", e))?;
    let axis = |i: usize| match coordinates.get(i) {
        Some(Bson::Double(v)) => Ok(*v),
        Some(Bson::Int32(v)) => Ok(f64::from(*v)),
        Some(Bson::Int64(v)) => Ok(*v as f64),
        other => Err(mapping("coordinates", format!("bad axis {i}: {other:?}"))),
    };
    Ok(GeoPoint::new(axis(0)?, axis(1)?))
}

fn point_to_bson(geo: &GeoPoint) -> Document {
    doc! { "type": "Point", "coordinates": [geo.lon, geo.lat] }
}

/// Selects the open bucket of the op's vehicle+route
pub fn open_bucket_filter(op: &UpsertOp) -> Document {
    let capacity = BUCKET_CAPACITY as i32;
    doc! {
        "vehicleId": op.vehicle_id.as_str(),
        "routeId": op.route_id.as_str(),
        "bktSize": { "$lt": capacity },
    }
}

/// Append + bounds + count in one update; with upsert it also creates the bucket
pub fn append_update(op: &UpsertOp) -> Document {
    let ts = to_bson_datetime(op.measurement.ts);
    doc! {
        "$push": { "m": measurement_to_bson(&op.measurement) },
        "$max": { "maxTs": ts },
        "$min": { "minTs": ts },
        "$inc": { "bktSize": 1 },
    }
}

pub fn measurement_to_bson(m: &Measurement) -> Document {
    doc! {
        "ts": to_bson_datetime(m.ts),
        "geo": point_to_bson(&m.geo),
        "speed": m.speed,
        "speedLimit": m.speed_limit,
        "break": m.on_break,
    }
}

pub fn measurement_from_bson(doc: &Document) -> Result<Measurement, StoreError> {
    let geo = doc.get_document("geo").map_err(|e| mapping("geo", e))?;
    Ok(Measurement::new(
        from_bson_datetime(doc, "ts")?,
        point(geo)?,
        number(doc, "speed")?,
        number(doc, "speedLimit")?,
        doc.get_bool("break").map_err(|e| mapping("break", e))?,
    ))
}

pub fn bucket_from_bson(doc: &Document) -> Result<Bucket, StoreError> {
    let measurements = doc
        .get_array("m")
        .map_err(|e| mapping("m", e))?
        .iter()
        .map(|entry| match entry {
            Bson::Document(m) => measurement_from_bson(m),
            other => Err(mapping("m", format!("expected document, got {other:?}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Bucket {
        vehicle_id: doc.get_str("vehicleId").map_err(|e| mapping("vehicleId", e))?.to_string(),
        route_id: doc.get_str("routeId").map_err(|e| mapping("routeId", e))?.to_string(),
        min_ts: from_bson_datetime(doc, "minTs")?,
        max_ts: from_bson_datetime(doc, "maxTs")?,
        size: number(doc, "bktSize")? as usize,
        measurements,
    })
}

/// `$match` stage body for a bucket filter
pub fn bucket_match(filter: &BucketFilter) -> Document {
    let mut stage = Document::new();
    if let Some(ids) = &filter.vehicle_ids {
        stage.insert("vehicleId", doc! { "$in": ids.clone() });
    }
    if let Some(ids) = &filter.route_ids {
        stage.insert("routeId", doc! { "$in": ids.clone() });
    }
    stage
}

/// Warehouses keep the GeoJSON feature layout of the reference file
pub fn warehouse_to_bson(w: &WarehouseRef) -> Document {
    doc! {
        "type": "Feature",
        "properties": {
            "name": w.name.clone(),
            "addr:street": w.street.clone(),
            "addr:postcode": w.postcode.clone(),
            "addr:city": w.city.clone(),
        },
        "geometry": point_to_bson(&GeoPoint::new(w.lon, w.lat)),
    }
}

pub fn warehouse_from_bson(doc: &Document) -> Result<WarehouseRef, StoreError> {
    let empty = Document::new();
    let properties = doc.get_document("properties").unwrap_or(&empty);
    let geometry = doc
        .get_document("geometry")
        .map_err(|e| mapping("geometry", e))?;
    let geo = point(geometry)?;

    Ok(WarehouseRef {
        name: optional_str(properties, "name"),
        street: optional_str(properties, "addr:street"),
        postcode: optional_str(properties, "addr:postcode"),
        city: optional_str(properties, "addr:city"),
        lon: geo.lon,
        lat: geo.lat,
    })
}
