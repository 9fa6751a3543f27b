//! ecom server
//!
//! Runs one of the catalog, customers or orders services: an HTTP API over
//! Postgres plus the background workers that move integration events
//! through the outbox and the message bus.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use anyhow::Context;
use clap::Parser;
use config::{ConfigLoader, LoadedConfig, ServiceRole};
use ecom_core::bus::{AmqpEventBus, EventBus};
use ecom_core::config::ConfigStore;
use ecom_core::framework::DatabaseProcessor;
use ecom_core::processors::{Projector, Relay};
use ecom_sdk::events::{CustomerUpserted, ProductUpserted};
use server::{build_router, run_server};
use shutdown::{
    shutdown_signal, spawn_config_reload_handler, supervise_projector, wait_for_shutdown,
};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const CUSTOMERS_CACHE_QUEUE: &str = "orders.customers_cache";
const PRODUCTS_CACHE_QUEUE: &str = "orders.products_cache";

/// ecom - outbox-driven e-commerce services
#[derive(Parser, Debug)]
#[command(name = "ecom-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./ecom-config.toml")]
    config: PathBuf,

    /// Which service to run
    #[arg(short, long, value_enum, env = "ECOM_SERVICE")]
    service: ServiceRole,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let role = args.service;
    tracing::info!(
        service = role.name(),
        "Starting ecom-server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen, role));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    let LoadedConfig {
        server: server_config,
        database,
        bus: bus_config,
        relay,
        projector,
    } = loaded_config;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .connect(&database.url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        run_migrations(role, &db_pool).await.map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            e
        })?;
        tracing::info!("Migrations completed successfully");
    }

    let bus = Arc::new(
        AmqpEventBus::connect(bus_config)
            .await
            .context("failed to connect to message bus")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let relay_config = ConfigStore::new(relay);
    let db = DatabaseProcessor {
        pool: db_pool.clone(),
    };
    let event_bus: Arc<dyn EventBus> = bus.clone();

    let mut workers: JoinSet<anyhow::Result<()>> = JoinSet::new();
    match role {
        ServiceRole::Catalog | ServiceRole::Customers => {
            let relay = Relay::new(role.name(), db.clone(), event_bus, relay_config.clone());
            let shutdown_rx = shutdown_rx.clone();
            workers.spawn(async move {
                relay.run(shutdown_rx).await;
                Ok(())
            });
        }
        ServiceRole::Orders => {
            let customers = Projector::<CustomerUpserted, _>::new(
                CUSTOMERS_CACHE_QUEUE,
                event_bus.clone(),
                db.clone(),
                projector,
            );
            let products = Projector::<ProductUpserted, _>::new(
                PRODUCTS_CACHE_QUEUE,
                event_bus,
                db.clone(),
                projector,
            );
            for task in [
                tokio::spawn(customers.run(shutdown_rx.clone())),
                tokio::spawn(products.run(shutdown_rx.clone())),
            ] {
                workers.spawn(supervise_projector(task, shutdown_tx.clone()));
            }
        }
    }

    let reload_handle =
        spawn_config_reload_handler(config_loader, relay_config, shutdown_rx.clone());

    let router = build_router(AppState::new(db_pool.clone(), role), server_config.request_timeout);
    let graceful = {
        let shutdown_rx = shutdown_rx.clone();
        async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = wait_for_shutdown(shutdown_rx) => {}
            }
        }
    };

    tracing::info!("Starting HTTP server on {}", server_config.listen);
    let result = run_server(router, server_config.listen, graceful).await;

    // Workers stop at their next suspension point; in-flight work is
    // redelivered or re-relayed after restart.
    let _ = shutdown_tx.send(true);
    let mut worker_failure = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                worker_failure.get_or_insert(e);
            }
            Err(e) => {
                tracing::error!(error = %e, "Worker task panicked");
                worker_failure.get_or_insert(anyhow::Error::new(e).context("worker task panicked"));
            }
        }
    }
    let _ = reload_handle.await;

    tracing::info!("Closing message bus connection...");
    if let Err(e) = bus.close().await {
        tracing::warn!(error = %e, "Failed to close message bus cleanly");
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result?;
    match worker_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn run_migrations(
    role: ServiceRole,
    pool: &sqlx::PgPool,
) -> Result<(), sqlx::migrate::MigrateError> {
    match role {
        ServiceRole::Catalog => sqlx::migrate!("../migrations/catalog").run(pool).await,
        ServiceRole::Customers => sqlx::migrate!("../migrations/customers").run(pool).await,
        ServiceRole::Orders => sqlx::migrate!("../migrations/orders").run(pool).await,
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,lapin=warn,tower_http=debug"));

    let (json_layer, text_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}
