//! funnel-session - Participation funnel session service
//!
//! Owns the session lifecycle: visitor number allocation, phase
//! transitions, response recording, and branching evaluation. Video
//! playback and the chat UI are client-side; this service is their
//! state-keeping backend.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use funnel_common::config::{self, ServiceConfig};
use funnel_session::allocator::SqliteAllocator;
use funnel_session::catalog::ExperimentCatalog;
use funnel_session::db::{SqliteResponseStore, SqliteSessionStore, SqliteUserStore};
use funnel_session::lifecycle::SessionLifecycle;
use funnel_session::storage::{LocalFileStorage, LoggingCustomerProfile};
use funnel_session::AppState;

#[derive(Debug, Parser)]
#[command(name = "funnel-session", about = "Participation funnel session service")]
struct Args {
    /// Root folder holding the database, uploads, and config
    #[arg(long)]
    root_folder: Option<String>,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Starting funnel-session service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve root folder: CLI > env > config file > platform default
    let root_folder =
        config::resolve_root_folder(args.root_folder.as_deref(), "FUNNEL_ROOT_FOLDER");
    config::ensure_root_folder(&root_folder)?;
    info!("Root folder: {}", root_folder.display());

    let service_config = ServiceConfig::load(&root_folder)?;
    let port = args.port.unwrap_or(service_config.port);

    // Open or create database
    let db_path = config::database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let pool = funnel_common::db::init_database(&db_path).await?;

    // Experiment catalog is read-only configuration
    let catalog_path = root_folder.join(&service_config.experiments_file);
    let catalog = if catalog_path.exists() {
        let catalog = ExperimentCatalog::load_toml(&catalog_path)?;
        info!(
            "Loaded {} experiment(s) from {}",
            catalog.len(),
            catalog_path.display()
        );
        catalog
    } else {
        warn!(
            "No experiment catalog at {}; session creation will fail until one is provided",
            catalog_path.display()
        );
        ExperimentCatalog::empty()
    };

    let lifecycle = SessionLifecycle::new(
        Arc::new(SqliteUserStore::new(pool.clone())),
        Arc::new(SqliteSessionStore::new(pool.clone())),
        Arc::new(SqliteResponseStore::new(pool.clone())),
        Arc::new(SqliteAllocator::new(
            pool.clone(),
            Duration::from_millis(service_config.allocator_timeout_ms),
        )),
        Arc::new(LocalFileStorage::new(config::uploads_dir(&root_folder))),
        Arc::new(LoggingCustomerProfile),
        Arc::new(catalog),
        service_config.fallback_path.clone(),
    );

    let state = AppState::new(Arc::new(lifecycle));
    let app = funnel_session::build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("Listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;

    Ok(())
}
