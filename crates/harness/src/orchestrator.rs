//! Orchestrator - ordered setup and teardown of a group of processes

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use rigger_common::{ProcessState, RigConfig};

use crate::error::{HarnessError, HarnessResult};
use crate::process::ProcessHandle;
use crate::signal::SignalTrap;

/// Owns the process handles of one session and sequences their lifecycles
///
/// Handles are started one at a time in declared order; each must be
/// running before the next is spawned. Teardown stops them in the exact
/// reverse of the order in which they were started.
pub struct Orchestrator {
    handles: Vec<ProcessHandle>,
    /// Indices into `handles`, in start order. Held for the whole of a
    /// setup or teardown so the two never interleave.
    started: Mutex<Vec<usize>>,
    trap_armed: AtomicBool,
}

impl Orchestrator {
    pub fn new(handles: Vec<ProcessHandle>) -> Self {
        Self {
            handles,
            started: Mutex::new(Vec::new()),
            trap_armed: AtomicBool::new(false),
        }
    }

    /// Build handles for every process in the configuration, in file order
    pub fn from_config(config: &RigConfig) -> HarnessResult<Self> {
        let handles = config
            .processes
            .iter()
            .map(|spec| ProcessHandle::new(spec.clone(), &config.orchestrator))
            .collect::<HarnessResult<Vec<_>>>()?;
        Ok(Self::new(handles))
    }

    pub fn handles(&self) -> &[ProcessHandle] {
        &self.handles
    }

    pub fn handle(&self, name: &str) -> Option<&ProcessHandle> {
        self.handles.iter().find(|h| h.name() == name)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Name and state of every handle, in setup order
    pub fn statuses(&self) -> Vec<(String, ProcessState)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.state()))
            .collect()
    }

    /// Start every handle in declared order
    ///
    /// On the first failure the remaining handles are left untouched, the
    /// ones already started are stopped again in reverse order, and the
    /// failure is returned. Handles already running from an earlier setup
    /// are skipped.
    pub async fn setup(&self) -> HarnessResult<()> {
        let mut started = self.started.lock().await;
        info!("Setting up {} process(es)", self.handles.len());

        for (index, handle) in self.handles.iter().enumerate() {
            if started.contains(&index) {
                debug!("{} already started", handle.name());
                continue;
            }

            match handle.start().await {
                Ok(()) => started.push(index),
                Err(source) => {
                    error!("Setup failed at {}: {}", handle.name(), source);
                    if !started.is_empty() {
                        info!("Rolling back {} started process(es)", started.len());
                        for e in self.stop_started(&mut started).await {
                            warn!("Rollback error: {}", e);
                        }
                    }
                    return Err(HarnessError::Setup {
                        name: handle.name().to_string(),
                        source: Box::new(source),
                    });
                }
            }
        }

        info!("Setup complete");
        Ok(())
    }

    /// Stop every started handle in reverse start order
    ///
    /// Every handle is attempted even if an earlier stop fails; all
    /// failures are returned together.
    pub async fn teardown(&self) -> HarnessResult<()> {
        let mut started = self.started.lock().await;
        if started.is_empty() {
            debug!("Nothing to tear down");
            return Ok(());
        }

        info!("Tearing down {} process(es)", started.len());
        let errors = self.stop_started(&mut started).await;
        if errors.is_empty() {
            info!("Teardown complete");
            Ok(())
        } else {
            Err(HarnessError::Teardown(errors))
        }
    }

    async fn stop_started(&self, started: &mut Vec<usize>) -> Vec<HarnessError> {
        let mut errors = Vec::new();
        while let Some(index) = started.pop() {
            let handle = &self.handles[index];
            if let Err(e) = handle.stop().await {
                error!("Failed to stop {}: {}", handle.name(), e);
                errors.push(e);
            }
        }
        errors
    }

    /// Names of the started handles, in start order
    pub async fn started(&self) -> Vec<String> {
        self.started
            .lock()
            .await
            .iter()
            .map(|&i| self.handles[i].name().to_string())
            .collect()
    }

    /// Tear down on Ctrl-C, then exit the host process
    ///
    /// Only one trap may be armed per orchestrator at a time; disarm or drop
    /// the returned trap to release it.
    pub fn register_on_interrupt(self: &Arc<Self>) -> HarnessResult<SignalTrap> {
        SignalTrap::install(Arc::clone(self))
    }

    pub(crate) fn claim_trap(&self) -> HarnessResult<()> {
        self.trap_armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| HarnessError::TrapAlreadyInstalled)
    }

    pub(crate) fn release_trap(&self) {
        self.trap_armed.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputLines;
    use crate::readiness::ReadinessMonitor;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use rigger_common::{OrchestratorConfig, ProcessSpec, ReadinessSpec};
    use std::time::Duration;

    type Journal = Arc<SyncMutex<Vec<String>>>;

    /// Records when readiness is awaited and confirmed
    struct Recording {
        name: String,
        delay: Duration,
        journal: Journal,
    }

    #[async_trait]
    impl ReadinessMonitor for Recording {
        async fn await_ready(&self, _output: &mut OutputLines) {
            self.journal.lock().push(format!("await:{}", self.name));
            tokio::time::sleep(self.delay).await;
            self.journal.lock().push(format!("ready:{}", self.name));
        }

        fn describe(&self) -> String {
            format!("recording {}", self.name)
        }
    }

    fn defaults() -> OrchestratorConfig {
        OrchestratorConfig {
            readiness_timeout_ms: 2_000,
            stop_grace_ms: 2_000,
            ..Default::default()
        }
    }

    fn recorded(name: &str, delay_ms: u64, journal: &Journal) -> ProcessHandle {
        let spec = ProcessSpec::new(name, "sleep", ReadinessSpec::output("unused")).with_args(["30"]);
        let monitor = Recording {
            name: name.to_string(),
            delay: Duration::from_millis(delay_ms),
            journal: Arc::clone(journal),
        };
        ProcessHandle::with_monitor(spec, Box::new(monitor), &defaults())
    }

    fn failing(name: &str) -> ProcessHandle {
        let spec = ProcessSpec::new(name, "sh", ReadinessSpec::output("ready"))
            .with_args(["-c", "exit 1"]);
        ProcessHandle::new(spec, &defaults()).unwrap()
    }

    #[tokio::test]
    async fn test_setup_is_sequential() {
        let journal: Journal = Arc::default();
        let orchestrator = Orchestrator::new(vec![
            recorded("server", 150, &journal),
            recorded("driver", 10, &journal),
            recorded("proxy", 10, &journal),
        ]);

        orchestrator.setup().await.unwrap();

        assert_eq!(
            *journal.lock(),
            vec![
                "await:server",
                "ready:server",
                "await:driver",
                "ready:driver",
                "await:proxy",
                "ready:proxy",
            ]
        );
        assert_eq!(orchestrator.started().await, vec!["server", "driver", "proxy"]);
        assert!(orchestrator.handles().iter().all(ProcessHandle::is_running));

        orchestrator.teardown().await.unwrap();
    }

    /// Appends its name to `log` when it receives SIGTERM
    fn logs_on_term(name: &str, log: &std::path::Path) -> ProcessHandle {
        let script = format!(
            "trap 'echo {name} >> {log}; exit 0' TERM; echo up; while true; do sleep 0.05; done",
            name = name,
            log = log.display()
        );
        let spec = ProcessSpec::new(name, "sh", ReadinessSpec::output("up")).with_args(["-c", script.as_str()]);
        ProcessHandle::new(spec, &defaults()).unwrap()
    }

    #[tokio::test]
    async fn test_teardown_reverses_start_order() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("stops.log");
        let orchestrator = Orchestrator::new(vec![
            logs_on_term("server", &log),
            logs_on_term("driver", &log),
            logs_on_term("proxy", &log),
        ]);

        orchestrator.setup().await.unwrap();
        orchestrator.teardown().await.unwrap();

        let stops = std::fs::read_to_string(&log).unwrap();
        assert_eq!(stops.lines().collect::<Vec<_>>(), vec!["proxy", "driver", "server"]);
        assert!(orchestrator.started().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_stops_sequence_and_rolls_back() {
        let journal: Journal = Arc::default();
        let orchestrator = Orchestrator::new(vec![
            recorded("server", 10, &journal),
            failing("driver"),
            recorded("proxy", 10, &journal),
        ]);

        let err = orchestrator.setup().await.unwrap_err();
        match err {
            HarnessError::Setup { name, source } => {
                assert_eq!(name, "driver");
                assert!(matches!(*source, HarnessError::PrematureExit { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        let states = orchestrator.statuses();
        assert_eq!(states[0], ("server".to_string(), ProcessState::Stopped));
        assert_eq!(states[1], ("driver".to_string(), ProcessState::Failed));
        assert_eq!(states[2], ("proxy".to_string(), ProcessState::Idle));
        assert!(!journal.lock().iter().any(|e| e.ends_with(":proxy")));
        assert!(orchestrator.started().await.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_without_setup_is_noop() {
        let journal: Journal = Arc::default();
        let orchestrator = Orchestrator::new(vec![recorded("server", 10, &journal)]);

        orchestrator.teardown().await.unwrap();
        assert_eq!(orchestrator.statuses()[0].1, ProcessState::Idle);
    }

    #[tokio::test]
    async fn test_setup_twice_keeps_running_handles() {
        let journal: Journal = Arc::default();
        let orchestrator = Orchestrator::new(vec![recorded("server", 10, &journal)]);

        orchestrator.setup().await.unwrap();
        let pid = orchestrator.handle("server").unwrap().pid();
        orchestrator.setup().await.unwrap();

        assert_eq!(orchestrator.handle("server").unwrap().pid(), pid);
        assert_eq!(journal.lock().len(), 2);
        orchestrator.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_teardown_is_best_effort() {
        let journal: Journal = Arc::default();
        let stubborn = {
            let spec = ProcessSpec::new("stubborn", "sh", ReadinessSpec::output("unused"))
                .with_args(["-c", "trap '' TERM; while true; do sleep 1; done"])
                .with_stop_grace(Duration::from_millis(200));
            let monitor = Recording {
                name: "stubborn".to_string(),
                delay: Duration::from_millis(100),
                journal: Arc::clone(&journal),
            };
            ProcessHandle::with_monitor(spec, Box::new(monitor), &defaults())
        };
        let orchestrator = Orchestrator::new(vec![recorded("server", 10, &journal), stubborn]);

        orchestrator.setup().await.unwrap();
        // SIGKILL still works, so teardown succeeds after escalation
        orchestrator.teardown().await.unwrap();
        assert!(orchestrator
            .statuses()
            .iter()
            .all(|(_, state)| *state == ProcessState::Stopped));
    }

    #[tokio::test]
    async fn test_from_config_keeps_file_order() {
        let config = RigConfig::from_toml(
            r#"
[[process]]
name = "Test server"
command = "npm"
args = ["start"]
readiness = { kind = "http", url = "http://localhost:8080/" }

[[process]]
name = "Ghostdriver"
command = "phantomjs"
readiness = { kind = "output", pattern = "running on port 4444" }
"#,
        )
        .unwrap();

        let orchestrator = Orchestrator::from_config(&config).unwrap();
        let names: Vec<_> = orchestrator.handles().iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["Test server", "Ghostdriver"]);
        assert!(orchestrator.statuses().iter().all(|(_, s)| *s == ProcessState::Idle));
    }

    #[tokio::test]
    async fn test_trap_registration_is_exclusive() {
        let orchestrator = Arc::new(Orchestrator::new(Vec::new()));

        let trap = orchestrator.register_on_interrupt().unwrap();
        assert!(matches!(
            orchestrator.register_on_interrupt(),
            Err(HarnessError::TrapAlreadyInstalled)
        ));

        trap.disarm();
        let again = orchestrator.register_on_interrupt().unwrap();
        again.disarm();
    }
}
