use std::path::PathBuf;

use thiserror::Error;

use crate::store::job::JobState;

/// Per-job recoverable failure raised by a transition function.
///
/// Caught at the per-job granularity in the worker's transition pass: the job
/// is marked `Failed` with the message recorded, and the pass moves on to the
/// next job.
#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("{hook} executable {path} does not exist on filesystem")]
    MissingExecutable { hook: &'static str, path: String },

    #[error("{hook} returned {code:?}:\n{tail}")]
    HookFailed {
        hook: &'static str,
        code: Option<i32>,
        tail: String,
    },

    #[error("{hook} timed out after {seconds}s and was killed")]
    HookTimeout { hook: &'static str, seconds: u64 },

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("symlink {dest} -> {src} failed: {source}")]
    Symlink {
        src: PathBuf,
        dest: PathBuf,
        source: std::io::Error,
    },

    #[error("bad glob pattern {0}: {1}")]
    BadPattern(String, glob::PatternError),

    #[error("no {0} handler configured")]
    NoHandler(&'static str),

    #[error("handler did not change job state from {0}")]
    HandlerIgnored(JobState),

    #[error("no transition defined for state {0}")]
    NotProcessable(JobState),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure from the remote-transfer collaborator.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("bad transfer url: {0}")]
    BadUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level errors surfaced by the binary.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to read jobs file {path}: {source}")]
    JobsFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse jobs file: {0}")]
    JobsParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
