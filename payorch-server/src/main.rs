//! payorch server
//!
//! Payment orchestration in front of a bank's merchant API.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use payorch_core::gateway::{MerchantApiGateway, PaymentGateway};
use payorch_core::processors::Reconciler;
use payorch_core::service::PaymentService;
use payorch_core::store::{PaymentStore, PostgresStore};
use server::{build_router, run_server};
use shutdown::spawn_shutdown_listener;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// payorch - payment orchestration service
#[derive(Parser, Debug)]
#[command(name = "payorch-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./payorch-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "PAYORCH_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_json);

    tracing::info!("Starting payorch-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(loaded_config.max_connections)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        MerchantApiGateway::new(loaded_config.gateway.clone()).map_err(|e| {
            tracing::error!("Failed to build gateway client: {}", e);
            e
        })?,
    );
    let store: Arc<dyn PaymentStore> = Arc::new(PostgresStore::new(db_pool.clone()));
    tracing::info!(
        gateway = %gateway.name(),
        base_url = %loaded_config.gateway.base_url,
        "Gateway configured"
    );

    let service = Arc::new(PaymentService::new(
        gateway.clone(),
        store.clone(),
        loaded_config.service,
    ));

    let shutdown_rx = spawn_shutdown_listener();

    let reconciler_handle = loaded_config.reconciler.map(|reconciler_config| {
        let reconciler = Reconciler::new(store.clone(), gateway.clone(), reconciler_config);
        tokio::spawn(reconciler.run(shutdown_rx.clone()))
    });

    let state = AppState::new(service, loaded_config.server.request_timeout);
    let router = build_router(state);

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, shutdown_rx).await;

    if let Some(handle) = reconciler_handle
        && let Err(e) = handle.await
    {
        tracing::error!("Reconciler task failed: {}", e);
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
