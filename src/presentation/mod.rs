// Presentation layer - HTTP read API for display clients
pub mod app_state;
pub mod handlers;
