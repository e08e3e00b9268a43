use clap::Parser;
use sea_orm::{ConnectOptions, Database};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use fleet_tasks::db::schema;
use fleet_tasks::db::services::{StatusAggregator, TaskManager};
use fleet_tasks::server::config::ServerConfig;
use fleet_tasks::server::event_recorder::EventRecorder;
use fleet_tasks::server::task_dispatcher::TaskDispatcher;
use fleet_tasks::services::error_catalog::ErrorCatalog;
use fleet_tasks::services::event_sink::DbEventSink;
use fleet_tasks::services::package_lookup::HttpPackageLookup;
use fleet_tasks::services::scheduler_client::HttpSchedulerClient;
use fleet_tasks::services::user_info::HttpUserInfoLookup;
use fleet_tasks::web::{AppState, create_axum_router};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "fleet-tasks.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    // Route `log` records from dependencies into tracing
    tracing_log::LogTracer::init()?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;
    Ok(())
}

fn load_error_catalog(path: Option<&str>) -> ErrorCatalog {
    let Some(path) = path else {
        warn!("No error catalog configured; error codes will get generic messages.");
        return ErrorCatalog::default();
    };
    match ErrorCatalog::load(Path::new(path)) {
        Ok(catalog) => {
            info!(path = %path, messages = catalog.len(), "Loaded error catalog.");
            catalog
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to load error catalog. Continuing with an empty one.");
            ErrorCatalog::default()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // --- Server Config Setup ---
    let config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir)?;
    info!("Starting fleet-tasks server, version: {}", VERSION);

    // --- Database Pool Setup ---
    let mut opt = ConnectOptions::new(config.database_url.clone());
    opt.max_connections(config.max_db_connections)
        .sqlx_logging(false);
    let db = Database::connect(opt).await?;
    schema::create_tables(&db).await?;
    info!("Database schema is up to date.");

    // --- Collaborators ---
    let catalog = Arc::new(load_error_catalog(config.error_catalog_path.as_deref()));
    let dispatcher = TaskDispatcher::new(
        Arc::new(HttpSchedulerClient::new(config.scheduler_url.clone())),
        config.callback_base_url.clone(),
    );
    let recorder = EventRecorder::new(
        Arc::new(DbEventSink::new(db.clone())),
        Arc::new(HttpPackageLookup::new(config.package_service_url.clone())),
    );

    let app_state = Arc::new(AppState {
        task_manager: Arc::new(TaskManager::new(db.clone(), dispatcher, recorder)),
        status_aggregator: Arc::new(StatusAggregator::new(db.clone(), catalog)),
        user_lookup: Arc::new(HttpUserInfoLookup::new(config.user_info_url.clone())),
    });
    let app = create_axum_router(app_state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "HTTP server listening.");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await?;
    info!("Server stopped.");
    Ok(())
}
