#![forbid(unsafe_code)]

//! **ai4a-cli** – The `ai4all-coordinator` server binary.
//!
//! Wires the restored runtime to the HTTP boundary, optionally starts the
//! lifecycle scheduler, and serves until interrupted. Exits 0 on a clean
//! shutdown and 1 on a fatal startup failure.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ai4a_auth::{Ed25519Scheme, RequestAuthenticator, SignatureScheme};
use ai4a_runtime::{Runtime, RuntimeConfig, SchedulerConfig, StoreBackendConfig};
use ai4a_service::{router, ServiceState};

//─────────────────────────────
//  CLI structure
//─────────────────────────────

#[derive(Parser)]
#[command(name = "ai4all-coordinator")]
#[command(about = "AI4All coordinator - deterministic epoch coordinator for the compute network")]
#[command(version)]
struct Cli {
    /// HTTP listen port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Storage backend (memory, durable)
    #[arg(long, env = "STORE_BACKEND", default_value = "durable")]
    store_backend: String,

    /// Database path for the durable backend
    #[arg(long, env = "DB_PATH", default_value = "data/coordinator.db")]
    db_path: String,

    /// Admin credential for /admin endpoints (use a strong secret in production)
    #[arg(long, env = "ADMIN_KEY", default_value = "ai4all-development-admin-key")]
    admin_key: String,

    /// Run day start/finalize on a cron schedule
    #[arg(long, env = "SCHEDULER_ENABLED", default_value_t = false)]
    scheduler_enabled: bool,

    /// Cron expression for day/start
    #[arg(long, env = "SCHEDULER_START_CRON", default_value = "0 5 0 * * *")]
    scheduler_start_cron: String,

    /// Cron expression for day/finalize
    #[arg(long, env = "SCHEDULER_FINALIZE_CRON", default_value = "0 55 23 * * *")]
    scheduler_finalize_cron: String,

    /// Timezone the scheduler expressions are evaluated in
    #[arg(long, env = "SCHEDULER_TIMEZONE", default_value = "UTC")]
    scheduler_timezone: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn runtime_config(&self) -> Result<RuntimeConfig> {
        Ok(RuntimeConfig {
            port: self.port,
            store_backend: StoreBackendConfig::parse(&self.store_backend, &self.db_path)?,
            admin_key: self.admin_key.clone(),
            scheduler: SchedulerConfig {
                enabled: self.scheduler_enabled,
                start_cron: self.scheduler_start_cron.clone(),
                finalize_cron: self.scheduler_finalize_cron.clone(),
                timezone: self.scheduler_timezone.clone(),
            },
            epoch: ai4a_types::EpochConfig::default(),
        })
    }
}

//─────────────────────────────
//  Main application
//─────────────────────────────

#[tokio::main]
async fn main() -> std::process::ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("failed to initialize logging: {e}");
        return std::process::ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "fatal startup failure");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting ai4all-coordinator v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.runtime_config()?;
    let runtime = Runtime::new(config).await.context("building runtime")?;
    let scheduler_tasks = runtime.spawn_scheduler().context("starting scheduler")?;

    let scheme: Arc<dyn SignatureScheme> = Arc::new(Ed25519Scheme);
    let state = ServiceState {
        coordinator: runtime.coordinator.clone(),
        authenticator: Arc::new(RequestAuthenticator::new(scheme)),
        admin_key: runtime.config.admin_key.clone(),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", runtime.config.port))
        .await
        .with_context(|| format!("binding port {}", runtime.config.port))?;
    info!("listening on port {}", runtime.config.port);

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.context("http server")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    for task in scheduler_tasks {
        task.abort();
    }
    info!("ai4all-coordinator stopped");
    Ok(())
}

//─────────────────────────────
//  Utility functions
//─────────────────────────────

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
