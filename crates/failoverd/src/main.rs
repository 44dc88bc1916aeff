// # failoverd - DNS Failover Controller Daemon
//
// Thin integration layer: reads configuration from environment variables,
// wires the health store, state store, and registrar into the core state
// machine, and drives the 30-second evaluation loop. All failover logic
// lives in failover-core.
//
// ## Configuration
//
// - `DATABASE_URL`             Postgres DSN (required)
// - `STATE_FILE`               Controller state path
//                              (default: /var/lib/failover-controller/state.json)
// - `PRIMARY_PROVIDER_ID`      Seeds the default state on first run
// - `SECONDARY_PROVIDER_ID`    Seeds the default state on first run
// - `FAILOVER_DOMAIN`          Seeds the default state on first run
// - `REGISTRAR_TYPE`           mock | godaddy (default: mock)
// - `GODADDY_API_KEY`          Required when REGISTRAR_TYPE=godaddy
// - `GODADDY_API_SECRET`       Required when REGISTRAR_TYPE=godaddy
// - `CONTROLLER_LISTEN_ADDR`   HTTP listen address (default: 0.0.0.0:8080)
// - `LOG_LEVEL`                trace|debug|info|warn|error (default: info)

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use failover_core::state::{StateSeed, StateStore};
use failover_core::traits::Registrar;
use failover_core::{MockRegistrar, StateMachine};
use failover_registrar_godaddy::GoDaddyRegistrar;
use failover_store_postgres::PgStore;

/// Evaluation interval.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Exit codes following systemd conventions.
#[derive(Debug, Clone, Copy)]
enum ControllerExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<ControllerExitCode> for ExitCode {
    fn from(code: ControllerExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

struct Config {
    database_url: String,
    state_file: String,
    primary_provider_id: String,
    secondary_provider_id: String,
    domain: String,
    registrar_type: String,
    listen_addr: String,
    log_level: String,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        Ok(Self {
            database_url,
            state_file: env::var("STATE_FILE")
                .unwrap_or_else(|_| "/var/lib/failover-controller/state.json".to_string()),
            primary_provider_id: env::var("PRIMARY_PROVIDER_ID").unwrap_or_default(),
            secondary_provider_id: env::var("SECONDARY_PROVIDER_ID").unwrap_or_default(),
            domain: env::var("FAILOVER_DOMAIN").unwrap_or_default(),
            registrar_type: env::var("REGISTRAR_TYPE").unwrap_or_else(|_| "mock".to_string()),
            listen_addr: env::var("CONTROLLER_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL cannot be empty");
        }

        match self.registrar_type.as_str() {
            "mock" | "godaddy" => {}
            other => anyhow::bail!(
                "REGISTRAR_TYPE '{}' is not supported. Supported types: mock, godaddy",
                other
            ),
        }

        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!(
                "CONTROLLER_LISTEN_ADDR '{}' is not a valid socket address",
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

    fn build_registrar(&self) -> Result<Arc<dyn Registrar>> {
        match self.registrar_type.as_str() {
            "godaddy" => {
                let api_key = env::var("GODADDY_API_KEY").map_err(|_| {
                    anyhow::anyhow!("GODADDY_API_KEY is required when REGISTRAR_TYPE=godaddy")
                })?;
                let api_secret = env::var("GODADDY_API_SECRET").map_err(|_| {
                    anyhow::anyhow!("GODADDY_API_SECRET is required when REGISTRAR_TYPE=godaddy")
                })?;
                Ok(Arc::new(GoDaddyRegistrar::new(api_key, api_secret)?))
            }
            _ => Ok(Arc::new(MockRegistrar::new())),
        }
    }
}

/// Shared state for the HTTP surface.
#[derive(Clone)]
struct AppState {
    state_store: Arc<StateStore>,
    metrics: PrometheusHandle,
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ControllerExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ControllerExitCode::ConfigError.into();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("starting DNS failover controller");

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {}", e);
            return ControllerExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => ControllerExitCode::CleanShutdown,
            Err(e) => {
                error!("daemon error: {}", e);
                ControllerExitCode::RuntimeError
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

    let seed = StateSeed {
        primary_provider_id: config.primary_provider_id.clone(),
        secondary_provider_id: config.secondary_provider_id.clone(),
        domain: config.domain.clone(),
    };
    let state_store = Arc::new(StateStore::new(&config.state_file, seed).await?);

    // Verify we can load (or create default) state at startup.
    let initial = state_store.load().await?;
    info!(
        state = %initial.current_state,
        last_transition = %initial.last_transition_time.to_rfc3339(),
        "loaded controller state"
    );

    let registrar = config.build_registrar()?;
    info!(registrar = registrar.name(), "registrar selected");

    let machine = StateMachine::new(
        store.clone(),
        store.clone(),
        registrar,
        state_store.clone(),
    );

    // HTTP surface: metrics, liveness, readiness, and the persisted state.
    let app_state = AppState {
        state_store: state_store.clone(),
        metrics: metrics_handle,
    };
    let app = Router::new()
        .route("/metrics", get(metrics_endpoint))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .route("/state", get(state_endpoint))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(
        addr = %config.listen_addr,
        "HTTP server listening (/metrics, /healthz, /readyz, /state)"
    );
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server failed: {}", e);
        }
    });

    // Main evaluation loop. The first interval tick fires immediately,
    // which doubles as the startup evaluation.
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                machine.evaluate().await;
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

    info!("DNS failover controller stopped");
    Ok(())
}

async fn metrics_endpoint(State(app): State<AppState>) -> String {
    app.metrics.render()
}

async fn readyz(State(app): State<AppState>) -> impl IntoResponse {
    match app.state_store.load().await {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

async fn state_endpoint(State(app): State<AppState>) -> Response {
    match app.state_store.load().await {
        Ok(state) => (StatusCode::OK, Json(state)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
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
