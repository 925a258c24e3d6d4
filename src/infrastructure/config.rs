use crate::domain::event::AxisOrder;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub store: StoreSettings,
    pub ingest: IngestSettings,
    pub reference: ReferenceSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Subscription filter covering every vehicle
    pub topic: String,
    /// Topic prefix stripped to find the vehicle id
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
    pub channel_capacity: usize,
    pub axis_order: AxisOrder,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "geo-subscriber".to_string(),
            topic: "vehicles/trucks/#".to_string(),
            topic_prefix: "vehicles/trucks/".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_ms: 2000,
            channel_capacity: 1024,
            axis_order: AxisOrder::Swapped,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mongo,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub uri: String,
    pub database: String,
    pub bucket_collection: String,
    pub warehouse_collection: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Mongo,
            uri: "mongodb://localhost:27017".to_string(),
            database: "geotruck".to_string(),
            bucket_collection: "status".to_string(),
            warehouse_collection: "warehouse".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestSettings {
    pub batch_size: usize,
    pub max_flush_attempts: u32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_flush_attempts: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReferenceSettings {
    pub batch_size: usize,
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpSettings {
    pub bind: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// `config/fleet.toml` (optional) overlaid with `FLEET__SECTION__KEY` variables
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/fleet").required(false))
        .add_source(
            config::Environment::with_prefix("FLEET")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_configured() {
        let settings: Settings = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.mqtt.port, 1883);
        assert_eq!(settings.mqtt.topic, "vehicles/trucks/#");
        assert_eq!(settings.mqtt.axis_order, AxisOrder::Swapped);
        assert_eq!(settings.store.backend, StoreBackend::Mongo);
        assert_eq!(settings.store.database, "geotruck");
        assert_eq!(settings.ingest.batch_size, 10);
        assert_eq!(settings.http.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let toml = r#"
            [mqtt]
            host = "broker.example"
            axis_order = "standard"

            [store]
            backend = "memory"

            [ingest]
            batch_size = 50
        "#;
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.mqtt.host, "broker.example");
        assert_eq!(settings.mqtt.port, 1883);
        assert_eq!(settings.mqtt.axis_order, AxisOrder::Standard);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.ingest.batch_size, 50);
        assert_eq!(settings.ingest.max_flush_attempts, 3);
    }
}
