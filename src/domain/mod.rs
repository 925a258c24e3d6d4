// Domain layer - fleet telemetry models and pure aggregation logic
pub mod bucket;
pub mod event;
pub mod live;
pub mod measurement;
pub mod trajectory;
pub mod warehouse;
