//! Lead-management console core: a two-entity (leads, clients) tracker with
//! local persistence. The reconciliation engine keeps the two collections a
//! strict partition of ids over a shared key-value store, and an in-process
//! event bus lets independent view components converge on state changes
//! without direct references to each other.

pub mod engine;
pub mod errors;
pub mod events;
pub mod latency;
pub mod models;
pub mod seed;
pub mod store;
pub mod views;

pub use engine::{ConvertOutcome, LeadEngine, RestoreOutcome};
pub use errors::{AppError, AppResult};
pub use events::{Channel, Event, EventBus, Subscription};
pub use models::{Client, Lead, LeadPatch, LeadStatus, PipelineStep};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use views::{LeadQuery, PipelineSummary, SortOrder};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Install the process-wide tracing subscriber, writing JSON lines to a daily
/// rolling file under `<data_dir>/logs`. Safe to call once per process.
pub fn init_tracing(data_dir: &Path) -> AppResult<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "console.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
