// Warehouse reference data
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarehouseRef {
    pub name: Option<String>,
    pub street: Option<String>,
    pub postcode: Option<String>,
    pub city: Option<String>,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: FeatureProperties,
    geometry: Geometry,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    name: Option<String>,
    #[serde(rename = "addr:street")]
    street: Option<String>,
    #[serde(rename = "addr:postcode")]
    postcode: Option<String>,
    #[serde(rename = "addr:city")]
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    coordinates: Vec<f64>,
}

impl WarehouseRef {
    /// Convert a GeoJSON point feature. Returns `None` for features without
    /// a `[lon, lat]` coordinate pair.
    pub fn from_feature(feature: serde_json::Value) -> Option<Self> {
        let feature: Feature = serde_json::from_value(feature).ok()?;
        let &[lon, lat] = feature.geometry.coordinates.as_slice() else {
            return None;
        };

        Some(Self {
            name: feature.properties.name,
            street: feature.properties.street,
            postcode: feature.properties.postcode,
            city: feature.properties.city,
            lon,
            lat,
        })
    }
}
