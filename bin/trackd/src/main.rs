//! `trackd` — the OpenTrack server binary.
//!
//! Usage:
//!   trackd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/opentrack/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use opentrack_core::Module;
use tracing::info;

use config::ServerConfig;

/// OpenTrack server.
#[derive(Parser, Debug)]
#[command(name = "trackd", about = "OpenTrack server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address (overrides the configured one).
    #[arg(long = "listen")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Load server configuration.
    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;

    let listen = cli
        .listen
        .or_else(|| server_config.listen.clone())
        .unwrap_or_else(|| "0.0.0.0:8080".to_string());

    // Initialize storage.
    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = opentrack_core::ServiceConfig {
        data_dir: Some(data_dir),
        sqlite_path: server_config
            .storage
            .sqlite_path
            .as_ref()
            .map(std::path::PathBuf::from),
        listen: listen.clone(),
    };

    let sql: Arc<dyn opentrack_sql::SQLStore> = Arc::new(
        opentrack_sql::SqliteStore::open(&core_config.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );

    // Membership comes from the configured roster; an empty roster
    // means single-tenant mode where everyone is a member.
    let directory: Arc<dyn opentrack_core::Directory> = if server_config.members.is_empty() {
        info!("No member roster configured; running with open membership");
        Arc::new(opentrack_core::AllowAll)
    } else {
        info!("Member roster loaded ({} entries)", server_config.members.len());
        Arc::new(server_config.directory())
    };

    let track_module = track::TrackModule::new(sql, directory, server_config.rate_limits())?;
    info!("Track module initialized");

    let module_routes = vec![(track_module.name(), track_module.routes())];
    let app = routes::build_router(module_routes);

    // Start server.
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!("OpenTrack server listening on {}", listen);
    axum::serve(listener, app).await?;

    Ok(())
}
