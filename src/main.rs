//! PADDOCK — Race Wagering Ledger & Settlement Engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects the SQLite ledger (creating the schema if needed), optionally
//! seeds demo data, and serves the JSON API with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use paddock::config;
use paddock::seed;
use paddock::server::{build_router, AppState, ServerState};
use paddock::store::{LedgerStore, SqliteStore};

const BANNER: &str = r#"
 ____   _    ____  ____   ___   ____ _  __
|  _ \ / \  |  _ \|  _ \ / _ \ / ___| |/ /
| |_) / _ \ | | | | | | | | | | |   | ' /
|  __/ ___ \| |_| | |_| | |_| | |___| . \
|_| /_/   \_\____/|____/ \___/ \____|_|\_\

  Race Wagering Ledger & Settlement Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        app_name = %cfg.app.name,
        currency = %cfg.app.currency,
        starting_balance = %cfg.app.starting_balance,
        "PADDOCK starting up"
    );

    // -- Connect the ledger ------------------------------------------------

    let db_url = cfg.database_url();
    let store: Arc<dyn LedgerStore> = Arc::new(SqliteStore::connect(&db_url).await?);
    info!(url = %db_url, "Ledger connected");

    if cfg.seed.enabled {
        seed::seed_demo_data(&store).await?;
    }

    // -- Serve -------------------------------------------------------------

    if !cfg.server.enabled {
        info!("Server disabled in config, exiting after setup");
        return Ok(());
    }

    let state: AppState = Arc::new(ServerState {
        store,
        starting_balance: cfg.app.starting_balance,
    });
    let app = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    info!(port = cfg.server.port, "API server listening on http://localhost:{}", cfg.server.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received.");
        })
        .await?;

    info!("PADDOCK shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("paddock=info"));

    let json_logging = std::env::var("PADDOCK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
