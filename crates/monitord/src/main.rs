// # monitord - DNS Health Monitor Daemon
//
// Thin integration layer: reads configuration from environment variables,
// wires the Postgres store and the DNS prober into the core Monitor engine,
// and drives the 30-second probe loop. All probing and scoring logic lives
// in failover-core.
//
// ## Configuration
//
// - `DATABASE_URL`          Postgres DSN (required)
// - `CHECK_LOCATION`        Label recorded on every probe result
//                           (default: us-east-1)
// - `MONITOR_LISTEN_ADDR`   HTTP listen address for /metrics and /healthz
//                           (default: 0.0.0.0:8080)
// - `LOG_LEVEL`             trace|debug|info|warn|error (default: info)

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use failover_core::Monitor;
use failover_dns::DnsProber;
use failover_store_postgres::PgStore;

/// Probe interval.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Exit codes following systemd conventions.
#[derive(Debug, Clone, Copy)]
enum MonitorExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<MonitorExitCode> for ExitCode {
    fn from(code: MonitorExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

struct Config {
    database_url: String,
    check_location: String,
    listen_addr: String,
    log_level: String,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        Ok(Self {
            database_url,
            check_location: env::var("CHECK_LOCATION").unwrap_or_else(|_| "us-east-1".to_string()),
            listen_addr: env::var("MONITOR_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL cannot be empty");
        }

        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!(
                "MONITOR_LISTEN_ADDR '{}' is not a valid socket address",
                self.listen_addr
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                other
            ),
        }

        Ok(())
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return MonitorExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return MonitorExitCode::ConfigError.into();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("starting DNS health monitor");

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {}", e);
            return MonitorExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => MonitorExitCode::CleanShutdown,
            Err(e) => {
                error!("daemon error: {}", e);
                MonitorExitCode::RuntimeError
            }
        }
    })
    .into()
}

async fn run_daemon(config: Config) -> Result<()> {
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    info!("connected to database");

    let monitor = Monitor::new(
        store.clone(),
        store.clone(),
        Arc::new(DnsProber::new()),
        config.check_location.clone(),
    );

    // HTTP surface: metrics exposition and liveness.
    let app = Router::new()
        .route(
            "/metrics",
            get({
                let handle = metrics_handle.clone();
                move || async move { handle.render() }
            }),
        )
        .route("/healthz", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "HTTP server listening (/metrics, /healthz)");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server failed: {}", e);
        }
    });

    // Main probe loop. The first interval tick fires immediately, which
    // doubles as the startup run.
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("running health checks");
                monitor.run_checks().await;
            }
            signal = &mut shutdown => {
                match signal {
                    Ok(name) => info!("received {}, shutting down", name),
                    Err(e) => error!("shutdown signal error: {}", e),
                }
                break;
            }
        }
    }

    // In-flight probe tasks are bounded by the DNS timeout and are not
    // awaited; only the tick loop observes cancellation.
    info!("DNS health monitor stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to set up SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to set up SIGINT handler: {}", e))?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("SIGINT")
}
