//! Process handle - spawning, readiness and shutdown of one external process

use parking_lot::RwLock;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use rigger_common::{OrchestratorConfig, ProcessSpec, ProcessState, StopSignal};

use crate::error::{HarnessError, HarnessResult};
use crate::output::{self, OutputLines, OutputStream};
use crate::readiness::{self, ReadinessMonitor};

/// How long leftover output is drained after a process exits
const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

/// Handle to one orchestrated process
///
/// `start` and `stop` take `&self` and are serialized through an internal
/// async lock: a call made while another is in flight waits for it and then
/// acts on the state it left behind. `state` and `pid` never wait.
pub struct ProcessHandle {
    spec: ProcessSpec,
    name: Arc<str>,
    monitor: Box<dyn ReadinessMonitor>,
    readiness_timeout: Duration,
    stop_grace: Duration,
    state: RwLock<ProcessState>,
    pid: RwLock<Option<u32>>,
    live: Mutex<Option<LiveProcess>>,
}

/// The OS process and the tasks pumping its output
struct LiveProcess {
    child: Child,
    pumps: Vec<JoinHandle<()>>,
}

/// How a start attempt ended
enum StartOutcome {
    Ready,
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
}

impl ProcessHandle {
    /// Create a handle whose readiness monitor is built from the spec
    pub fn new(spec: ProcessSpec, defaults: &OrchestratorConfig) -> HarnessResult<Self> {
        let monitor = readiness::monitor_for(&spec.readiness, defaults)?;
        Ok(Self::with_monitor(spec, monitor, defaults))
    }

    /// Create a handle with a custom readiness monitor
    pub fn with_monitor(
        spec: ProcessSpec,
        monitor: Box<dyn ReadinessMonitor>,
        defaults: &OrchestratorConfig,
    ) -> Self {
        let readiness_timeout = spec
            .readiness_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| defaults.readiness_timeout());
        let stop_grace = spec
            .stop_grace_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| defaults.stop_grace());

        Self {
            name: Arc::from(spec.name.as_str()),
            spec,
            monitor,
            readiness_timeout,
            stop_grace,
            state: RwLock::new(ProcessState::Idle),
            pid: RwLock::new(None),
            live: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn state(&self) -> ProcessState {
        *self.state.read()
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.read()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    pub fn readiness_timeout(&self) -> Duration {
        self.readiness_timeout
    }

    pub fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    fn set_state(&self, state: ProcessState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        debug!("{}: {} -> {}", self.name, previous, state);
    }

    /// Spawn the process and wait until its readiness monitor fires
    pub async fn start(&self) -> HarnessResult<()> {
        let mut live = self.live.lock().await;

        let state = self.state();
        if state == ProcessState::Running {
            debug!("{} already running", self.name);
            return Ok(());
        }
        if !state.can_start() {
            return Err(HarnessError::InvalidState {
                name: self.name.to_string(),
                state,
                operation: "start",
            });
        }

        self.set_state(ProcessState::Starting);
        info!(
            "Starting {}: {} (ready when {})",
            self.name,
            self.spec.command_line(),
            self.monitor.describe()
        );

        let mut cmd = Command::new(&self.spec.command);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.set_state(ProcessState::Failed);
                return Err(HarnessError::Spawn {
                    name: self.name.to_string(),
                    command: self.spec.command.clone(),
                    source,
                });
            }
        };
        *self.pid.write() = child.id();
        debug!("{} spawned with pid {:?}", self.name, child.id());

        let (tx, mut lines) = OutputLines::channel();
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(output::forward(
                self.name.clone(),
                OutputStream::Stdout,
                stdout,
                Some(tx.clone()),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(output::forward(
                self.name.clone(),
                OutputStream::Stderr,
                stderr,
                Some(tx),
            ));
        }

        let outcome = tokio::select! {
            biased;
            _ = self.monitor.await_ready(&mut lines) => StartOutcome::Ready,
            status = child.wait() => StartOutcome::Exited(status),
            _ = sleep(self.readiness_timeout) => StartOutcome::TimedOut,
        };
        // Stop buffering output for the monitor; pumps keep logging
        drop(lines);

        match outcome {
            StartOutcome::Ready => {
                self.set_state(ProcessState::Running);
                info!("{} is ready (pid {:?})", self.name, self.pid());
                *live = Some(LiveProcess { child, pumps });
                Ok(())
            }
            StartOutcome::Exited(status) => {
                drain(pumps).await;
                *self.pid.write() = None;
                self.set_state(ProcessState::Failed);
                let status = status?;
                warn!("{} exited before becoming ready: {}", self.name, status);
                Err(HarnessError::PrematureExit {
                    name: self.name.to_string(),
                    status,
                })
            }
            StartOutcome::TimedOut => {
                warn!(
                    "{} not ready after {:?}, killing it",
                    self.name, self.readiness_timeout
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", self.name, e);
                }
                drain(pumps).await;
                *self.pid.write() = None;
                self.set_state(ProcessState::Failed);
                Err(HarnessError::ReadinessTimeout {
                    name: self.name.to_string(),
                    timeout: self.readiness_timeout,
                })
            }
        }
    }

    /// Stop the process; a no-op unless it is running
    pub async fn stop(&self) -> HarnessResult<()> {
        let mut live = self.live.lock().await;

        let state = self.state();
        if state != ProcessState::Running {
            debug!("{} is {}, nothing to stop", self.name, state);
            return Ok(());
        }
        let Some(mut process) = live.take() else {
            self.set_state(ProcessState::Stopped);
            return Ok(());
        };

        self.set_state(ProcessState::Stopping);
        info!(
            "Stopping {} (pid {:?}) with {}",
            self.name,
            self.pid(),
            self.spec.stop_signal
        );

        if let Err(e) = send_signal(&mut process.child, self.spec.stop_signal) {
            warn!("Failed to send {} to {}: {}", self.spec.stop_signal, self.name, e);
        }

        let result = match timeout(self.stop_grace, process.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("{} exited: {}", self.name, status);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Waiting for {} failed: {}", self.name, e);
                self.force_kill(&mut process.child).await
            }
            Err(_) => {
                warn!(
                    "{} did not exit within {:?}, killing it",
                    self.name, self.stop_grace
                );
                self.force_kill(&mut process.child).await
            }
        };

        drain(process.pumps).await;
        *self.pid.write() = None;

        match result {
            Ok(()) => {
                self.set_state(ProcessState::Stopped);
                info!("{} stopped", self.name);
                Ok(())
            }
            Err(e) => {
                self.set_state(ProcessState::Failed);
                Err(e)
            }
        }
    }

    async fn force_kill(&self, child: &mut Child) -> HarnessResult<()> {
        let stop_timeout = |reason: String| HarnessError::StopTimeout {
            name: self.name.to_string(),
            grace: self.stop_grace,
            reason,
        };

        if let Err(e) = child.start_kill() {
            return Err(stop_timeout(e.to_string()));
        }
        match timeout(self.stop_grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("{} killed: {}", self.name, status);
                Ok(())
            }
            Ok(Err(e)) => Err(stop_timeout(e.to_string())),
            Err(_) => Err(stop_timeout("still alive after SIGKILL".to_string())),
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pid", &self.pid())
            .finish()
    }
}

/// Give output pumps a moment to flush, then detach them
pub(crate) async fn drain(pumps: Vec<JoinHandle<()>>) {
    for pump in pumps {
        let abort = pump.abort_handle();
        if timeout(OUTPUT_DRAIN, pump).await.is_err() {
            // A grandchild may still hold the pipe open
            abort.abort();
        }
    }
}

#[cfg(unix)]
fn send_signal(child: &mut Child, signal: StopSignal) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // Already reaped
        return Ok(());
    };
    let signal = match signal {
        StopSignal::Term => Signal::SIGTERM,
        StopSignal::Int => Signal::SIGINT,
        StopSignal::Hup => Signal::SIGHUP,
        StopSignal::Quit => Signal::SIGQUIT,
        StopSignal::Kill => Signal::SIGKILL,
    };
    kill(Pid::from_raw(pid as i32), signal).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
fn send_signal(child: &mut Child, _signal: StopSignal) -> std::io::Result<()> {
    child.start_kill()
}
