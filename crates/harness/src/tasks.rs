//! Task runner - runs named pipeline tasks in order
//!
//! Build steps (bundling, style compilation, linting) are external commands;
//! the runner only sequences them and reports success or failure. `test`
//! tasks wrap their command in the orchestrator's setup and teardown.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use rigger_common::{BumpLevel, CommandSpec, RigConfig, TaskSpec};

use crate::bump;
use crate::error::{HarnessError, HarnessResult};
use crate::orchestrator::Orchestrator;
use crate::output::{self, OutputStream};
use crate::process;

/// Outcome of a single leaf task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub name: String,
    pub kind: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Outcome of a run of one or more tasks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub reports: Vec<TaskReport>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.reports.iter().all(|r| r.success)
    }

    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.passed()
    }

    /// The report of the task that halted the run, if any
    pub fn failure(&self) -> Option<&TaskReport> {
        self.reports.iter().find(|r| !r.success)
    }
}

/// Runs tasks from a configuration against one orchestrator session
pub struct TaskRunner {
    config: RigConfig,
    orchestrator: Arc<Orchestrator>,
    workdir: PathBuf,
    external_session: bool,
}

impl TaskRunner {
    pub fn new(config: RigConfig, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            config,
            orchestrator,
            workdir: PathBuf::from("."),
            external_session: false,
        }
    }

    /// Resolve relative task paths and working directories against `dir`
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = dir.into();
        self
    }

    /// Processes are set up and torn down by the caller (`up`, `watch`);
    /// `test` tasks then only run their command
    pub fn with_external_session(mut self, external: bool) -> Self {
        self.external_session = external;
        self
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Run tasks in order, stopping at the first failure
    ///
    /// Unknown tasks and cycles are returned as errors before or while
    /// running; task failures are recorded in the summary.
    pub async fn run(&self, names: &[String]) -> HarnessResult<RunSummary> {
        for name in names {
            if self.config.task(name).is_none() {
                return Err(HarnessError::UnknownTask(name.clone()));
            }
        }

        let start = Instant::now();
        let mut summary = RunSummary::default();
        let mut stack = Vec::new();

        for name in names {
            self.run_named(name, &mut stack, &mut summary).await?;
            if !summary.success() {
                break;
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "{} task(s) passed, {} failed ({} ms)",
            summary.passed(),
            summary.failed(),
            summary.duration_ms
        );
        Ok(summary)
    }

    /// Run a single task given inline rather than by name
    pub async fn run_spec(&self, name: &str, task: &TaskSpec) -> HarnessResult<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary::default();
        let mut stack = vec![name.to_string()];
        self.run_task(name, task, &mut stack, &mut summary).await?;
        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }

    async fn run_named(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        summary: &mut RunSummary,
    ) -> HarnessResult<()> {
        if stack.iter().any(|s| s == name) {
            stack.push(name.to_string());
            return Err(HarnessError::TaskCycle(stack.join(" -> ")));
        }
        let task = self
            .config
            .task(name)
            .ok_or_else(|| HarnessError::UnknownTask(name.to_string()))?;

        stack.push(name.to_string());
        let result = self.run_task(name, task, stack, summary).await;
        stack.pop();
        result
    }

    async fn run_task(
        &self,
        name: &str,
        task: &TaskSpec,
        stack: &mut Vec<String>,
        summary: &mut RunSummary,
    ) -> HarnessResult<()> {
        if let TaskSpec::Sequence { steps } = task {
            debug!("Running sequence {}: {}", name, steps.join(" -> "));
            for step in steps {
                Box::pin(self.run_named(step, stack, summary)).await?;
                if !summary.success() {
                    break;
                }
            }
            return Ok(());
        }

        info!("▶ {}", name);
        let start = Instant::now();
        let result = match task {
            TaskSpec::Exec(cmd) => self.run_command(name, cmd).await,
            TaskSpec::Clean { paths } => self.clean(paths).await,
            TaskSpec::Bump { files, level } => self.bump(files, *level).await,
            TaskSpec::Test(cmd) => self.run_test(name, cmd).await,
            TaskSpec::Sequence { .. } => Ok(()),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => info!("✓ {} ({} ms)", name, duration_ms),
            Err(e) => error!("✗ {} - {}", name, e),
        }
        summary.reports.push(TaskReport {
            name: name.to_string(),
            kind: task.kind().to_string(),
            success: result.is_ok(),
            duration_ms,
            error: result.err().map(|e| e.to_string()),
        });
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    /// Run an external command to completion, logging its output
    async fn run_command(&self, name: &str, spec: &CommandSpec) -> HarnessResult<()> {
        let cwd = spec
            .cwd
            .as_deref()
            .map(|p| self.resolve(p))
            .unwrap_or_else(|| self.workdir.clone());
        debug!("{}: {} (in {})", name, spec.command_line(), cwd.display());

        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::TaskFailed {
                name: name.to_string(),
                reason: format!("failed to spawn {}: {}", spec.command, e),
            })?;

        let label: Arc<str> = Arc::from(name);
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(output::forward(label.clone(), OutputStream::Stdout, stdout, None));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(output::forward(label, OutputStream::Stderr, stderr, None));
        }

        let status = child.wait().await?;
        // Background children may keep the pipes open past the command
        process::drain(pumps).await;

        if status.success() {
            Ok(())
        } else {
            Err(HarnessError::TaskFailed {
                name: name.to_string(),
                reason: format!("{} exited with {}", spec.command, status),
            })
        }
    }

    /// setup -> test command -> teardown
    async fn run_test(&self, name: &str, spec: &CommandSpec) -> HarnessResult<()> {
        if self.external_session {
            return self.run_command(name, spec).await;
        }

        // A failed setup has already rolled itself back
        self.orchestrator.setup().await?;

        let test_result = self.run_command(name, spec).await;
        let teardown_result = self.orchestrator.teardown().await;

        match (test_result, teardown_result) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(e)) => Err(e),
            (Err(test), Err(teardown)) => {
                warn!("Teardown after failed test also failed: {}", teardown);
                Err(test)
            }
        }
    }

    async fn clean(&self, paths: &[PathBuf]) -> HarnessResult<()> {
        for path in paths {
            let path = self.resolve(path);
            let result = match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
                Ok(_) => tokio::fs::remove_file(&path).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => info!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("{} does not exist", path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn bump(&self, files: &[PathBuf], level: BumpLevel) -> HarnessResult<()> {
        let mut bumped = 0;
        for file in files {
            let path = self.resolve(file);
            if !path.exists() {
                debug!("{} does not exist, skipping", path.display());
                continue;
            }
            let outcome = bump::bump_manifest(&path, level).await?;
            info!(
                "{}: {} -> {}",
                path.display(),
                outcome.previous,
                outcome.current
            );
            bumped += 1;
        }
        if bumped == 0 {
            warn!("No manifests found to bump");
        }
        Ok(())
    }
}
