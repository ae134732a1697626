use anyhow::Result;
use fusion_dashboard::api::{AppState, RestApi};
use fusion_dashboard::config;
use fusion_dashboard::db::DatabaseService;
use fusion_dashboard::messaging::{ClientTransport, Router};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

async fn run_app() -> Result<()> {
    // Config path from the first argument, then the environment
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DASHBOARD_CONFIG").ok())
        .map(PathBuf::from);
    let config = config::load_config(config_path.as_deref())?;

    // Initialize logging, RUST_LOG still wins over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.api.log_level)).init();
    info!("Starting fusion dashboard server v{}", env!("CARGO_PKG_VERSION"));

    let db = Arc::new(DatabaseService::new(&config.database).await?);
    let transport = Arc::new(ClientTransport::new());

    let router = Router::new(&config, transport.clone(), db.clone());
    router.start().await?;

    let http_server = RestApi::new(
        &config.api,
        AppState {
            transport,
            db,
            energy_threshold: config.api.energy_threshold,
            viewer_log_dir: config.client_log.directory.clone(),
        },
    );

    // Serve until a termination signal arrives
    let served = http_server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await;

    router.close().await;
    served
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
