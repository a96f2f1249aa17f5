//! CLI Commands

pub mod bump;
pub mod check;
pub mod clean;
pub mod list;
pub mod run;
pub mod test;
pub mod up;
pub mod watch;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use rigger_common::RigConfig;
use rigger_harness::{HarnessError, Orchestrator, RunSummary, TaskReport, TaskRunner};

use crate::output::{print_table, TableDisplay};

/// Exit code for failed tasks
pub const EXIT_TASK_FAILURE: i32 = 1;

/// Exit code for unreadable or invalid configuration
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Configuration could not be loaded or is invalid
#[derive(Debug, Error)]
#[error("{path}: {message}")]
pub struct ConfigError {
    pub path: PathBuf,
    pub message: String,
}

/// One or more tasks failed
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TaskFailure(pub String);

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct Context {
    pub config_path: PathBuf,
}

impl Context {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Load and validate the configuration file
    pub fn load_config(&self) -> Result<RigConfig> {
        let config = RigConfig::load(&self.config_path).map_err(|e| self.config_error(e))?;
        config.validate().map_err(|e| self.config_error(e))?;
        debug!(
            "Loaded {} ({} processes, {} tasks)",
            self.config_path.display(),
            config.processes.len(),
            config.tasks.len()
        );
        Ok(config)
    }

    /// Build the orchestrator for the configured processes
    pub fn orchestrator(&self, config: &RigConfig) -> Result<Arc<Orchestrator>> {
        let orchestrator = Orchestrator::from_config(config).map_err(|e| self.config_error(e))?;
        Ok(Arc::new(orchestrator))
    }

    /// Directory tasks run in: the one holding the configuration file
    pub fn workdir(&self) -> PathBuf {
        match self.config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn runner(&self, config: RigConfig, orchestrator: Arc<Orchestrator>) -> TaskRunner {
        TaskRunner::new(config, orchestrator).with_workdir(self.workdir())
    }

    fn config_error(&self, e: impl std::fmt::Display) -> anyhow::Error {
        ConfigError {
            path: self.config_path.clone(),
            message: e.to_string(),
        }
        .into()
    }
}

/// Map an error to the process exit code
pub fn exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG_ERROR;
    }
    match error.downcast_ref::<HarnessError>() {
        Some(
            HarnessError::Config(_)
            | HarnessError::UnknownTask(_)
            | HarnessError::TaskCycle(_)
            | HarnessError::InvalidProbe { .. },
        ) => EXIT_CONFIG_ERROR,
        _ => EXIT_TASK_FAILURE,
    }
}

#[derive(Serialize)]
struct ReportRow<'a> {
    report: &'a TaskReport,
}

impl TableDisplay for ReportRow<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["Task", "Kind", "Result", "Duration", "Error"]
    }

    fn row(&self) -> Vec<String> {
        let result = if self.report.success {
            "passed".green().to_string()
        } else {
            "failed".red().to_string()
        };
        vec![
            self.report.name.clone(),
            self.report.kind.clone(),
            result,
            format!("{}ms", self.report.duration_ms),
            self.report.error.clone().unwrap_or_default(),
        ]
    }
}

/// Print the per-task table and turn a failed run into an error
pub fn finish_run(summary: &RunSummary) -> Result<()> {
    let rows: Vec<ReportRow<'_>> = summary.reports.iter().map(|report| ReportRow { report }).collect();
    print_table(&rows);

    match summary.failure() {
        None => {
            println!(
                "{} {} task(s) in {}ms",
                "Finished".green().bold(),
                summary.passed(),
                summary.duration_ms
            );
            Ok(())
        }
        Some(failed) => Err(TaskFailure(format!(
            "{} failed: {}",
            failed.name,
            failed.error.as_deref().unwrap_or("unknown error")
        ))
        .into()),
    }
}

/// Resolve `path` against `base` unless it is absolute
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workdir_of_bare_file_name() {
        let ctx = Context::new(PathBuf::from("rigger.toml"));
        assert_eq!(ctx.workdir(), PathBuf::from("."));

        let ctx = Context::new(PathBuf::from("site/rigger.toml"));
        assert_eq!(ctx.workdir(), PathBuf::from("site"));
    }

    #[test]
    fn test_exit_codes() {
        let config: anyhow::Error = ConfigError {
            path: "rigger.toml".into(),
            message: "bad".into(),
        }
        .into();
        assert_eq!(exit_code(&config), EXIT_CONFIG_ERROR);

        let unknown: anyhow::Error = HarnessError::UnknownTask("x".into()).into();
        assert_eq!(exit_code(&unknown), EXIT_CONFIG_ERROR);

        let failed: anyhow::Error = TaskFailure("lint failed".into()).into();
        assert_eq!(exit_code(&failed), EXIT_TASK_FAILURE);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rigger.toml");
        std::fs::write(&path, "[[process]]\nname = \"\"\ncommand = \"sh\"\nreadiness = { kind = \"output\", pattern = \"x\" }\n").unwrap();

        let err = Context::new(path).load_config().unwrap_err();
        assert_eq!(exit_code(&err), EXIT_CONFIG_ERROR);
    }
}
