use crate::collectors::CollectError;
use std::fmt;
use thiserror::Error;

/// Lifecycle of one run. `Done` and `Failed` are terminal; a failed run
/// also reports the non-terminal stage it left through `ExportError::stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Collecting,
    Serializing,
    Delivering,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Collecting => "collecting",
            Stage::Serializing => "serializing",
            Stage::Delivering => "delivering",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("collection failed: {0}")]
    Collection(#[from] CollectError),
    #[error("invalid destination '{input}': {reason}")]
    Validation { input: String, reason: String },
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("http delivery failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("writing to stdout failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not start http runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl ExportError {
    /// The stage the run was in when this error moved it to `Failed`.
    pub fn stage(&self) -> Stage {
        match self {
            ExportError::Validation { .. } => Stage::Idle,
            ExportError::Collection(_) => Stage::Collecting,
            ExportError::Serialization(_) => Stage::Serializing,
            ExportError::Transport(_) | ExportError::Io(_) | ExportError::Runtime(_) => {
                Stage::Delivering
            }
        }
    }
}
