// Main entry point - Dependency injection, ingest loop and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::bucket_store::{BucketStore, WarehouseRepository};
use crate::application::ingest_service::IngestService;
use crate::application::ingest_stats::IngestStats;
use crate::application::live_snapshot::LiveSnapshot;
use crate::application::trajectory_service::TrajectoryService;
use crate::application::warehouse_service::WarehouseService;
use crate::domain::event::EventDecoder;
use crate::infrastructure::config::{load_settings, Settings, StoreBackend, StoreSettings};
use crate::infrastructure::memory_store::MemoryStore;
use crate::infrastructure::mongo_store::MongoStore;
use crate::infrastructure::mqtt_source::MqttSource;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    get_routes, get_trace, health_check, ingest_stats, list_vehicles, list_warehouses,
    live_positions, vehicles_on_break,
};

#[derive(Parser)]
#[command(name = "fleet-telemetry", about = "Fleet location ingest and trajectory queries")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest vehicle events from MQTT and serve the read API (default)
    Run,
    /// Load warehouse locations from a GeoJSON feature collection
    ImportWarehouses { path: PathBuf },
}

struct Stores {
    buckets: Arc<dyn BucketStore>,
    warehouses: Arc<dyn WarehouseRepository>,
}

async fn open_stores(settings: &StoreSettings) -> anyhow::Result<Stores> {
    match settings.backend {
        StoreBackend::Mongo => {
            let store = Arc::new(
                MongoStore::connect(settings)
                    .await
                    .context("Failed to connect to MongoDB")?,
            );
            store.ensure_indexes().await.context("Failed to create indexes")?;
            Ok(Stores {
                buckets: store.clone(),
                warehouses: store,
            })
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, nothing survives a restart");
            let store = Arc::new(MemoryStore::default());
            Ok(Stores {
                buckets: store.clone(),
                warehouses: store,
            })
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown requested");
}

async fn import_warehouses(
    settings: &Settings,
    stores: Stores,
    path: PathBuf,
) -> anyhow::Result<()> {
    let service = WarehouseService::new(stores.warehouses, settings.reference.batch_size);
    let summary = service
        .import_file(&path)
        .await
        .with_context(|| format!("Warehouse import from {} failed", path.display()))?;
    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped,
        "Imported warehouses"
    );
    Ok(())
}

async fn run(settings: Settings, stores: Stores) -> anyhow::Result<()> {
    let live_snapshot = Arc::new(LiveSnapshot::default());
    let stats = Arc::new(IngestStats::default());

    // Ingest: MQTT source -> channel -> single ingest loop
    let (source, mqtt_handle) = MqttSource::connect(&settings.mqtt).await?;
    let (tx, rx) = mpsc::channel(settings.mqtt.channel_capacity.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let source_task = tokio::spawn(source.run(tx, shutdown_rx));

    let decoder = EventDecoder::new(settings.mqtt.topic_prefix.clone(), settings.mqtt.axis_order);
    let ingest = IngestService::new(
        decoder,
        stores.buckets.clone(),
        &settings.ingest,
        live_snapshot.clone(),
        stats.clone(),
    );
    let ingest_task = tokio::spawn(ingest.run(rx));

    // Read API
    let state = Arc::new(AppState {
        trajectory_service: TrajectoryService::new(stores.buckets),
        warehouse_service: WarehouseService::new(stores.warehouses, settings.reference.batch_size),
        live_snapshot,
        ingest_stats: stats,
    });

    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/vehicles", get(list_vehicles))
        .route("/vehicles/live", get(live_positions))
        .route("/vehicles/breaks", get(vehicles_on_break))
        .route("/trace", get(get_trace))
        .route("/routes", get(get_routes))
        .route("/warehouses", get(list_warehouses))
        .route("/stats", get(ingest_stats))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.http.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.http.bind))?;
    tracing::info!(addr = %settings.http.bind, "Starting fleet-telemetry service");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain pending writes before giving up the subscription
    let _ = shutdown_tx.send(true);
    let report = ingest_task.await.context("Ingest loop panicked")?;
    if !report.is_clean() {
        tracing::error!(
            retained = report.retained,
            dropped = report.dropped,
            "Final flush did not write everything"
        );
    }
    if let Err(e) = mqtt_handle.release().await {
        tracing::warn!(error = %e, "Failed to release MQTT subscription");
    }
    source_task.await.context("MQTT source panicked")?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings()?;
    let stores = open_stores(&settings.store).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(settings, stores).await,
        Command::ImportWarehouses { path } => import_warehouses(&settings, stores, path).await,
    }
}
