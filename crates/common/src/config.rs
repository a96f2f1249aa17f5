//! Pipeline configuration (`rigger.toml`)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{BumpLevel, ProcessSpec, ReadinessSpec};

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    /// Orchestrator defaults
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Processes in setup order
    #[serde(default, rename = "process")]
    pub processes: Vec<ProcessSpec>,

    /// Named pipeline tasks
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskSpec>,

    /// Watch mode settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchConfig>,
}

/// Defaults applied to every orchestrated process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How long a process may take to become ready
    pub readiness_timeout_ms: u64,

    /// How long a process may take to exit after its stop signal
    pub stop_grace_ms: u64,

    /// Interval between HTTP readiness probes
    pub probe_interval_ms: u64,

    /// Timeout of a single HTTP readiness probe
    pub probe_request_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            readiness_timeout_ms: 30_000,
            stop_grace_ms: 5_000,
            probe_interval_ms: 250,
            probe_request_timeout_ms: 2_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_request_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_request_timeout_ms)
    }
}

/// External command invocation shared by `exec` and `test` tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// A named pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSpec {
    /// Run an external command to completion
    Exec(CommandSpec),

    /// Run other tasks in order
    Sequence { steps: Vec<String> },

    /// Remove build output
    Clean {
        #[serde(default = "default_clean_paths")]
        paths: Vec<PathBuf>,
    },

    /// Bump the version in JSON manifests
    Bump {
        #[serde(default = "default_manifests")]
        files: Vec<PathBuf>,
        #[serde(default)]
        level: BumpLevel,
    },

    /// Setup processes, run the test command, tear down
    Test(CommandSpec),
}

impl TaskSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskSpec::Exec(_) => "exec",
            TaskSpec::Sequence { .. } => "sequence",
            TaskSpec::Clean { .. } => "clean",
            TaskSpec::Bump { .. } => "bump",
            TaskSpec::Test(_) => "test",
        }
    }

    /// One-line summary for listings
    pub fn summary(&self) -> String {
        match self {
            TaskSpec::Exec(cmd) | TaskSpec::Test(cmd) => cmd.command_line(),
            TaskSpec::Sequence { steps } => steps.join(" -> "),
            TaskSpec::Clean { paths } => join_paths(paths),
            TaskSpec::Bump { files, level } => format!("{} ({})", join_paths(files), level),
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Host part of an http(s) URL, None for any other scheme
///
/// Only the shape is checked here; the full parse happens when the probe
/// is built.
fn url_host(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    Some(host.split(':').next().unwrap_or_default())
}

pub fn default_clean_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("dist"), PathBuf::from("temp")]
}

pub fn default_manifests() -> Vec<PathBuf> {
    vec![PathBuf::from("package.json"), PathBuf::from("bower.json")]
}

/// Watch mode configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directories watched recursively
    pub paths: Vec<PathBuf>,

    /// Glob patterns a changed file must match
    pub patterns: Vec<String>,

    /// Task re-run on every change
    pub task: String,

    /// Quiet period that closes a burst of changes
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from("src")],
            patterns: vec!["**/*".to_string()],
            task: "default".to_string(),
            debounce_ms: 300,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl RigConfig {
    /// Load configuration from file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.get(name)
    }

    pub fn process(&self, name: &str) -> Option<&ProcessSpec> {
        self.processes.iter().find(|p| p.name == name)
    }

    /// Watch settings, or defaults when the section is absent
    pub fn watch_config(&self) -> WatchConfig {
        self.watch.clone().unwrap_or_default()
    }

    /// Check the configuration for mistakes that would only surface mid-run
    pub fn validate(&self) -> Result<()> {
        let orch = &self.orchestrator;
        if orch.readiness_timeout_ms == 0
            || orch.stop_grace_ms == 0
            || orch.probe_interval_ms == 0
            || orch.probe_request_timeout_ms == 0
        {
            return Err(Error::InvalidConfig(
                "orchestrator timeouts and intervals must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for process in &self.processes {
            if process.name.trim().is_empty() {
                return Err(Error::InvalidConfig("process with empty name".to_string()));
            }
            if !names.insert(process.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate process name: {}",
                    process.name
                )));
            }
            if process.command.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "process {} has an empty command",
                    process.name
                )));
            }
            if process.readiness_timeout_ms == Some(0) || process.stop_grace_ms == Some(0) {
                return Err(Error::InvalidConfig(format!(
                    "process {} has a zero timeout",
                    process.name
                )));
            }
            match &process.readiness {
                ReadinessSpec::Output { pattern } if pattern.is_empty() => {
                    return Err(Error::InvalidConfig(format!(
                        "process {} has an empty output pattern",
                        process.name
                    )));
                }
                ReadinessSpec::Http { url, interval_ms, .. } => {
                    if url_host(url).map_or(true, str::is_empty) {
                        return Err(Error::InvalidConfig(format!(
                            "process {} probes an invalid HTTP url: {}",
                            process.name, url
                        )));
                    }
                    if *interval_ms == Some(0) {
                        return Err(Error::InvalidConfig(format!(
                            "process {} has a zero probe interval",
                            process.name
                        )));
                    }
                }
                _ => {}
            }
        }

        for (name, task) in &self.tasks {
            match task {
                TaskSpec::Exec(cmd) | TaskSpec::Test(cmd) if cmd.command.trim().is_empty() => {
                    return Err(Error::InvalidConfig(format!("task {} has an empty command", name)));
                }
                TaskSpec::Sequence { steps } => {
                    if let Some(missing) = steps.iter().find(|s| !self.tasks.contains_key(*s)) {
                        return Err(Error::InvalidConfig(format!(
                            "task {} refers to unknown task {}",
                            name, missing
                        )));
                    }
                }
                _ => {}
            }
        }

        for name in self.tasks.keys() {
            let mut stack = Vec::new();
            self.check_cycle(name, &mut stack)?;
        }

        if let Some(watch) = &self.watch {
            if !self.tasks.contains_key(&watch.task) {
                return Err(Error::InvalidConfig(format!(
                    "watch task {} is not defined",
                    watch.task
                )));
            }
        }

        Ok(())
    }

    fn check_cycle<'a>(&'a self, name: &'a str, stack: &mut Vec<&'a str>) -> Result<()> {
        if stack.contains(&name) {
            stack.push(name);
            return Err(Error::InvalidConfig(format!(
                "task cycle: {}",
                stack.join(" -> ")
            )));
        }
        if let Some(TaskSpec::Sequence { steps }) = self.tasks.get(name) {
            stack.push(name);
            for step in steps {
                self.check_cycle(step, stack)?;
            }
            stack.pop();
        }
        Ok(())
    }
}
