use std::path::PathBuf;

use datakeep_verify::VerificationError;

use crate::scheduler::SchedulingError;

/// Failure reported by a [`DataFileEngine`](crate::DataFileEngine) callback.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Everything that can go wrong during a refresh cycle.
///
/// None of these escape to the host application: the service renders each
/// one through its [`UpdateLog`](crate::UpdateLog) and carries on. Each
/// variant names the update URL and the engine's data key so the log line
/// stands on its own.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("failed to fetch '{url}' for engine '{engine}': {reason}")]
    Network {
        url:    String,
        engine: String,
        reason: String,
    },

    #[error("{} from '{url}' for engine '{engine}'", status_text(.status))]
    HttpStatus {
        url:    String,
        engine: String,
        status: u16,
    },

    #[error("integrity check failed for '{url}' for engine '{engine}': {source}")]
    Integrity {
        url:    String,
        engine: String,
        source: VerificationError,
    },

    #[error("file system error while updating from '{url}' for engine '{engine}': {source}")]
    FileSystem {
        url:    String,
        engine: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to schedule the next update from '{url}' for engine '{engine}': {source}")]
    Scheduling {
        url:    String,
        engine: String,
        source: SchedulingError,
    },

    #[error("engine '{engine}' failed to refresh from '{path}': {source}")]
    Engine {
        engine: String,
        path:   PathBuf,
        source: EngineError,
    },
}

fn status_text(status: &u16) -> String {
    match status {
        403 => "Access denied".to_string(),
        429 => "Too many requests".to_string(),
        other => format!("HTTP error {other}"),
    }
}
