#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-runtime** – Runtime adapter for the AI4All coordinator.
//!
//! This crate bridges the deterministic kernel with its fuzzy surroundings:
//! it selects and constructs the storage back-end, restores the coordinator
//! from persisted state on startup, and optionally drives the daily
//! lifecycle from a cron schedule so deployments do not need an external
//! operator calling `day/start` and `day/finalize`.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use ai4a_kernel::DayCoordinator;
use ai4a_store_core::Stores;
use ai4a_store_memory::MemoryBackend;
use ai4a_store_sled::SledBackend;
use ai4a_types::EpochConfig;

//─────────────────────────────
//  Configuration
//─────────────────────────────

/// Storage back-end selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackendConfig {
    /// In-memory storage (non-persistent).
    Memory,
    /// Sled-backed durable storage.
    Durable {
        /// Database directory path.
        path: PathBuf,
    },
}

impl StoreBackendConfig {
    /// Parse the `STORE_BACKEND` knob (`memory` | `durable`).
    pub fn parse(backend: &str, db_path: &str) -> Result<Self> {
        match backend.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "durable" => Ok(Self::Durable {
                path: PathBuf::from(db_path),
            }),
            other => Err(anyhow::anyhow!(
                "unsupported STORE_BACKEND {other}; expected memory or durable"
            )),
        }
    }
}

/// Cron-driven lifecycle automation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Whether the scheduler tasks run at all.
    pub enabled: bool,
    /// Cron expression for `day/start`.
    pub start_cron: String,
    /// Cron expression for `day/finalize`.
    pub finalize_cron: String,
    /// Timezone the expressions are evaluated in.
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // Start shortly after midnight, finalize just before the next.
            start_cron: "0 5 0 * * *".to_string(),
            finalize_cron: "0 55 23 * * *".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

/// Everything the server binary needs to run a coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Storage back-end.
    pub store_backend: StoreBackendConfig,
    /// Shared admin credential.
    pub admin_key: String,
    /// Lifecycle automation.
    pub scheduler: SchedulerConfig,
    /// Epoch knobs passed to the kernel.
    pub epoch: EpochConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            store_backend: StoreBackendConfig::Durable {
                path: PathBuf::from("data/coordinator.db"),
            },
            admin_key: "ai4all-development-admin-key".to_string(),
            scheduler: SchedulerConfig::default(),
            epoch: EpochConfig::default(),
        }
    }
}

/// Configuration for tests: in-memory storage, scheduler off.
pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        store_backend: StoreBackendConfig::Memory,
        ..RuntimeConfig::default()
    }
}

//─────────────────────────────
//  Store construction
//─────────────────────────────

/// Build the six-store bundle for the selected back-end. One backend
/// instance serves every interface.
pub fn build_stores(config: &StoreBackendConfig) -> Result<Stores> {
    match config {
        StoreBackendConfig::Memory => {
            debug!("using in-memory storage backend");
            let backend = Arc::new(MemoryBackend::new());
            Ok(Stores {
                events: backend.clone(),
                state: backend.clone(),
                assignments: backend.clone(),
                submissions: backend.clone(),
                operational: backend.clone(),
                balances: backend,
            })
        }
        StoreBackendConfig::Durable { path } => {
            debug!(path = %path.display(), "using durable sled backend");
            let backend = Arc::new(
                SledBackend::open(path)
                    .with_context(|| format!("opening sled store at {}", path.display()))?,
            );
            Ok(Stores {
                events: backend.clone(),
                state: backend.clone(),
                assignments: backend.clone(),
                submissions: backend.clone(),
                operational: backend.clone(),
                balances: backend,
            })
        }
    }
}

//─────────────────────────────
//  Runtime
//─────────────────────────────

/// A restored, ready-to-serve coordinator plus its configuration.
pub struct Runtime {
    /// The restored coordinator.
    pub coordinator: Arc<DayCoordinator>,
    /// The configuration the runtime was built from.
    pub config: RuntimeConfig,
}

impl Runtime {
    /// Construct the stores and restore the coordinator.
    pub async fn new(config: RuntimeConfig) -> Result<Self> {
        let stores = build_stores(&config.store_backend)?;
        let coordinator =
            Arc::new(DayCoordinator::new(stores, config.epoch.clone()).await?);
        let status = coordinator.status().await;
        info!(phase = %status.phase, day_number = status.day_number,
              contributors = status.contributor_count, "coordinator restored");
        Ok(Self {
            coordinator,
            config,
        })
    }

    /// Spawn the lifecycle scheduler tasks, if enabled. Returns the spawned
    /// handles so the caller can abort them on shutdown.
    pub fn spawn_scheduler(&self) -> Result<Vec<JoinHandle<()>>> {
        if !self.config.scheduler.enabled {
            info!("scheduler disabled");
            return Ok(Vec::new());
        }

        let tz: chrono_tz::Tz = self
            .config
            .scheduler
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid SCHEDULER_TIMEZONE: {e}"))?;
        let start = Schedule::from_str(&self.config.scheduler.start_cron)
            .context("parsing SCHEDULER_START_CRON")?;
        let finalize = Schedule::from_str(&self.config.scheduler.finalize_cron)
            .context("parsing SCHEDULER_FINALIZE_CRON")?;
        info!(timezone = %tz, start = %self.config.scheduler.start_cron,
              finalize = %self.config.scheduler.finalize_cron, "scheduler enabled");

        let start_task = tokio::spawn(schedule_loop(
            self.coordinator.clone(),
            start,
            tz,
            LifecycleAction::Start,
        ));
        let finalize_task = tokio::spawn(schedule_loop(
            self.coordinator.clone(),
            finalize,
            tz,
            LifecycleAction::Finalize,
        ));
        Ok(vec![start_task, finalize_task])
    }
}

#[derive(Debug, Clone, Copy)]
enum LifecycleAction {
    Start,
    Finalize,
}

async fn schedule_loop(
    coordinator: Arc<DayCoordinator>,
    schedule: Schedule,
    timezone: chrono_tz::Tz,
    action: LifecycleAction,
) {
    for next in schedule.upcoming(timezone) {
        let now = Utc::now().with_timezone(&timezone);
        let sleep_duration = (next - now)
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(0));
        debug!(?action, next = %next, secs = sleep_duration.as_secs(), "scheduler waiting");
        tokio::time::sleep(sleep_duration).await;

        match action {
            LifecycleAction::Start => match coordinator.start_day(None, Utc::now()).await {
                Ok(outcome) => info!(day = %outcome.day_id, roster = outcome.roster_size,
                                     "scheduled day start"),
                Err(e) => error!(error = %e, "scheduled day start failed"),
            },
            LifecycleAction::Finalize => match coordinator.finalize_day(Utc::now()).await {
                Ok(outcome) => info!(day = %outcome.day_id, day_number = outcome.day_number,
                                     "scheduled finalize"),
                Err(e) => error!(error = %e, "scheduled finalize failed"),
            },
        }
    }
}
