//! Error types for process orchestration and task execution

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

use rigger_common::ProcessState;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Failed to spawn {name} ({command}): {source}")]
    Spawn {
        name: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} exited before becoming ready ({status})")]
    PrematureExit { name: String, status: ExitStatus },

    #[error("{name} not ready after {timeout:?}")]
    ReadinessTimeout { name: String, timeout: Duration },

    #[error("{name} did not exit after {grace:?} and could not be killed: {reason}")]
    StopTimeout {
        name: String,
        grace: Duration,
        reason: String,
    },

    #[error("Cannot {operation} {name} while {state}")]
    InvalidState {
        name: String,
        state: ProcessState,
        operation: &'static str,
    },

    #[error("Setup failed at {name}: {source}")]
    Setup {
        name: String,
        #[source]
        source: Box<HarnessError>,
    },

    #[error("Teardown failed: {}", join_errors(.0))]
    Teardown(Vec<HarnessError>),

    #[error("Interrupt trap already installed for this orchestrator")]
    TrapAlreadyInstalled,

    #[error("Invalid probe url {url}: {reason}")]
    InvalidProbe { url: String, reason: String },

    #[error("Task {name} failed: {reason}")]
    TaskFailed { name: String, reason: String },

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task cycle: {0}")]
    TaskCycle(String),

    #[error("Invalid manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Config error: {0}")]
    Config(#[from] rigger_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version error: {0}")]
    Semver(#[from] semver::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Glob error: {0}")]
    Glob(#[from] globset::Error),
}

fn join_errors(errors: &[HarnessError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type HarnessResult<T> = Result<T, HarnessError>;
