//! telestory-server – entry point.
//!
//! Startup order:
//! 1. Load `.env` files and parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON or pretty).
//! 3. Open the SQLite database and run pending migrations.
//! 4. Connect to Telegram and build the download engine.
//! 5. Start the update loop in a background task.
//! 6. Serve the health endpoint until SIGINT/SIGTERM, then drain.

mod bot;
mod config;
mod routes;
mod telegram;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use telestory_core::{DownloadEngine, SqliteStore};
use telestory_fetch::{CatalogClient, MediaFetcher};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::telegram::TelegramClient;

#[derive(Debug, Parser)]
#[command(version, about = "Telegram story relay bot")]
struct Cli {
    /// Load `.env.<ENV>` instead of `.env`.
    #[arg(long, value_name = "ENV")]
    env: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── 1. Configuration ───────────────────────────────────────────────────────
    let env_file = match cli.env.as_deref() {
        Some(name) => dotenvy::from_filename(format!(".env.{name}")).or_else(|e| {
            if e.not_found() { dotenvy::dotenv() } else { Err(e) }
        }),
        None => dotenvy::dotenv(),
    };
    if let Err(e) = &env_file {
        if !e.not_found() {
            eprintln!("WARN: failed to load env file: {e}");
        }
    }
    let cfg = Config::from_env()?;

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: TELESTORY_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %cfg.environment,
        "telestory-server starting"
    );

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store = Arc::new(SqliteStore::connect(&cfg.database_url).await?);
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Telegram + engine ───────────────────────────────────────────────────
    tokio::fs::create_dir_all(&cfg.scratch_dir).await?;
    let telegram = Arc::new(TelegramClient::new(
        &cfg.telegram_api_url,
        &cfg.bot_token,
        cfg.call_timeout,
    )?);
    let catalog = CatalogClient::new(cfg.catalog())?;
    let fetcher = MediaFetcher::new(cfg.fetcher())?;

    let shutdown = CancellationToken::new();
    let engine = DownloadEngine::start(
        cfg.engine(),
        store,
        telegram,
        catalog,
        fetcher,
        shutdown.clone(),
    )
    .await?;
    let policy = engine.config().policy;
    info!(
        cooldown_secs = policy.cooldown.as_secs(),
        daily_limit = policy.daily_limit,
        scratch_dir = %cfg.scratch_dir.display(),
        "download engine ready"
    );

    // ── 5. Update loop ─────────────────────────────────────────────────────────
    let bot = tokio::spawn(bot::run(Arc::new(engine), shutdown.clone()));

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build();
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    let stop = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = stop.cancelled() => {}
            }
            stop.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = bot.await {
        warn!(error = %e, "update loop task failed");
    }

    info!("telestory-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
