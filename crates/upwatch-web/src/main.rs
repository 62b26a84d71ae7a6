mod background;
mod handlers;
mod openapi;
mod state;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use upwatch_core::collector::Collector;
use upwatch_core::probe::{DEFAULT_PROBE_TIMEOUT, HttpProber};
use upwatch_core::storage::LogStore;
use upwatch_core::timezone::ZoneResolver;

use state::{SharedState, WebAppInner};

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(name = "upwatch-web", about = "upwatch uptime monitor", version = upwatch_core::VERSION)]
struct Args {
    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:3000", env = "UPWATCH_LISTEN")]
    listen: String,

    /// Base URL of the monitored service.
    #[arg(long, default_value = "http://localhost:3000", env = "HEALTHCHECK_HOST")]
    target_url: String,

    /// Health-check path appended to the target URL.
    #[arg(long, default_value = "/api/status", env = "HEALTHCHECK_URL")]
    health_path: String,

    /// Probe interval in milliseconds.
    #[arg(
        long,
        default_value_t = 30_000,
        env = "CHECK_INTERVAL_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval_ms: u64,

    /// Hard bound on a single probe, in milliseconds.
    #[arg(
        long,
        default_value_t = DEFAULT_PROBE_TIMEOUT.as_millis() as u64,
        env = "UPWATCH_PROBE_TIMEOUT_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout_ms: u64,

    /// IANA zone used for partition names and date grouping.
    /// Unknown names fall back to UTC.
    #[arg(long, default_value = "UTC", env = "TIMEZONE")]
    timezone: String,

    /// Directory holding the daily log partitions.
    #[arg(long, default_value = "./logs", env = "UPWATCH_LOG_DIR")]
    log_dir: PathBuf,

    /// Number of most recent partitions loaded per request.
    #[arg(
        long,
        default_value_t = 7,
        env = "UPWATCH_DAYS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    days: u64,

    /// Directory of static files served at `/`.
    #[arg(long, env = "UPWATCH_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };
    runtime.block_on(async_main(args));
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let default_filter = format!("upwatch_web={level},upwatch_core={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}

async fn async_main(args: Args) {
    let zone = ZoneResolver::resolve_or_utc(&args.timezone);
    info!(
        version = upwatch_core::VERSION,
        target = %args.target_url,
        path = %args.health_path,
        interval_ms = args.interval_ms,
        timezone = zone.name(),
        log_dir = %args.log_dir.display(),
        "starting upwatch"
    );

    let store = match LogStore::open(&args.log_dir, zone) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(dir = %args.log_dir.display(), error = %e, "failed to open log directory");
            process::exit(1);
        }
    };

    let prober = match HttpProber::new(
        &args.target_url,
        &args.health_path,
        Duration::from_millis(args.timeout_ms),
    ) {
        Ok(prober) => prober,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            process::exit(1);
        }
    };
    info!(url = prober.url(), "probing");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let collector = Collector::new(
        prober,
        store.clone(),
        Duration::from_millis(args.interval_ms),
    );
    let collector_task = background::spawn_collector(collector, shutdown_rx);

    let state: SharedState = Arc::new(WebAppInner {
        store,
        days: args.days as usize,
    });
    let app = build_router(state, args.static_dir.as_deref());

    let addr: SocketAddr = match args.listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(listen = %args.listen, error = %e, "invalid listen address");
            process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    info!(%addr, "listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = served {
        error!(error = %e, "server error");
    }

    // The collector finishes its in-flight tick before returning.
    let _ = shutdown_tx.send(true);
    match collector_task.await {
        Ok(stats) => info!(
            ticks = stats.ticks,
            up = stats.succeeded,
            down = stats.failed,
            append_errors = stats.append_errors,
            "stopped"
        ),
        Err(e) => warn!(error = %e, "collector task ended abnormally"),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            // Without a signal handler the process runs until killed.
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}

pub(crate) fn build_router(state: SharedState, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/api/status", get(handlers::handle_status))
        .route("/api/health", get(handlers::handle_health))
        .route("/api/timezone", get(handlers::handle_timezone))
        .route("/api/logs", get(handlers::handle_logs))
        .route("/api/summary", get(handlers::handle_summary))
        .route("/api-docs/openapi.json", get(handlers::handle_openapi))
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
}
