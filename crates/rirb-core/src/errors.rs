//! Error taxonomy (component I). One variant per named error kind from the design's
//! error handling section; every variant carries enough context to render a useful
//! message without the caller reaching back into a log.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RirbError {
    #[error("config error: {0}")]
    Config(String),

    #[error("no previous file list available; re-run with --init if this is the first backup ({reason})")]
    NoPreviousList { reason: String },

    #[error("no common hash algorithm for '{path}': prior={prior_algos:?} current={current_algos:?}")]
    NoCommonHash {
        path: String,
        prior_algos: Vec<String>,
        current_algos: Vec<String>,
    },

    #[error("sync tool invocation failed (exit {exit_code:?}): {}", argv.join(" "))]
    ToolInvocation {
        argv: Vec<String>,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("shell hook '{mode}' failed (exit {exit_code:?}): {command}")]
    Shell {
        mode: String,
        command: String,
        exit_code: Option<i32>,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RirbResult<T> = std::result::Result<T, RirbError>;

impl RirbError {
    /// Whether this error kind is fatal in every configuration (no suppression knob
    /// ever applies to it).
    pub fn always_fatal(&self) -> bool {
        matches!(
            self,
            RirbError::Config(_) | RirbError::NoPreviousList { .. } | RirbError::NoCommonHash { .. }
        )
    }
}
