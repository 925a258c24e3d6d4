// Infrastructure layer - External dependencies and adapters
pub mod bson_mapper;
pub mod config;
pub mod memory_store;
pub mod mongo_store;
pub mod mqtt_source;
