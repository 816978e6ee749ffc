//! `VigiMeteo` portal server
//!
//! HTTP backend for vigilance alerts, passwordless login and subscriptions.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use vigimeteo_core::config::load_config;
use vigimeteo_core::tracing_init::init_tracing;
use vigimeteo_core::{Clock, SystemClock};
use vigimeteo_server::jobs;
use vigimeteo_server::notifications::{BrevoClient, Mailer};
use vigimeteo_server::server::{AppState, Secrets, build_router};
use vigimeteo_server::storage::PortalDatabase;
use vigimeteo_server::vigilance::{BulletinFetch, HttpBulletinFetch};

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Parser, Debug)]
#[command(name = "vigimeteo-server")]
#[command(version, about = "VigiMeteo portal server - vigilance alerts and passwordless login")]
struct Args {
    /// JSON settings file.
    #[arg(long, env = "VIGIMETEO_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the settings file).
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Public origin used in emailed links.
    #[arg(long)]
    base_url: Option<String>,

    /// In-process vigilance polling period in seconds (0 disables).
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Session signing secret.
    #[arg(long, env = "VIGIMETEO_JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true)]
    jwt_secret: String,

    /// Brevo transactional API key.
    #[arg(long, env = "BREVO_API_KEY", hide_env_values = true)]
    brevo_api_key: String,

    /// Bearer token required on `/api/cron/vigilance`.
    #[arg(long, env = "CRON_SECRET", hide_env_values = true)]
    cron_secret: Option<String>,

    /// Stripe webhook signing secret.
    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    stripe_webhook_secret: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("vigimeteo_server=info,tower_http=info", args.log_json)?;

    let mut config = load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(path) = args.db_path {
        config.server.database_path = Some(path);
    }
    if let Some(base_url) = args.base_url {
        config.server.base_url = base_url;
    }
    if let Some(secs) = args.poll_interval {
        config.vigilance.poll_interval_secs = secs;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        region = %config.vigilance.region_code,
        "Starting vigimeteo-server"
    );

    if args.jwt_secret == DEV_JWT_SECRET {
        warn!("Using the development session secret; set VIGIMETEO_JWT_SECRET in production");
    }
    if config.vigilance.api_keys.is_empty() {
        warn!("No Météo France API key configured; vigilance checks will report unavailable");
    }

    let db_path = match config.server.database_path.clone() {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening portal database");
    let db = PortalDatabase::open(&db_path).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetch: Arc<dyn BulletinFetch> = Arc::new(HttpBulletinFetch::new(Duration::from_secs(
        config.vigilance.request_timeout_secs,
    ))?);
    let mailer: Arc<dyn Mailer> = Arc::new(BrevoClient::new(&config.mail, &args.brevo_api_key)?);

    let state = AppState::assemble(
        &config,
        db.clone(),
        fetch,
        mailer,
        Arc::clone(&clock),
        Secrets {
            jwt_secret: args.jwt_secret,
            cron_secret: args.cron_secret,
            stripe_webhook_secret: args.stripe_webhook_secret,
        },
    );

    if config.vigilance.poll_interval_secs > 0 {
        info!(secs = config.vigilance.poll_interval_secs, "In-process vigilance polling enabled");
        jobs::spawn_vigilance_poll(
            Arc::clone(&state.notifier),
            Duration::from_secs(config.vigilance.poll_interval_secs),
        );
    }
    jobs::spawn_purge(db, clock);

    let app = build_router(state, Duration::from_secs(config.server.request_timeout_secs));
    let listener = tokio::net::TcpListener::bind(config.server.addr).await?;
    info!(addr = %config.server.addr, "Portal server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await?;

    info!("Portal server stopped");
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".vigimeteo").join("portal.db"))
}
