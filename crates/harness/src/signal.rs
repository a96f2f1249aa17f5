//! Interrupt trap - tear the session down on Ctrl-C before exiting

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::HarnessResult;
use crate::orchestrator::Orchestrator;

/// Exit code used after an interrupt (128 + SIGINT)
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// Called with the exit code once teardown after an interrupt finished
pub type ExitHook = Box<dyn Fn(i32) + Send + Sync>;

/// An armed interrupt handler bound to one orchestrator
///
/// The first interrupt runs the orchestrator's teardown and then calls the
/// exit hook (by default `std::process::exit`). Interrupts arriving while
/// that is in flight are ignored. Dropping the trap unregisters it.
pub struct SignalTrap {
    inner: Arc<TrapInner>,
    tasks: Vec<JoinHandle<()>>,
}

struct TrapInner {
    orchestrator: Arc<Orchestrator>,
    fired: AtomicBool,
    exit: ExitHook,
}

impl TrapInner {
    async fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            info!("Teardown already in progress, ignoring interrupt");
            return false;
        }

        info!("Interrupt received, tearing down");
        if let Err(e) = self.orchestrator.teardown().await {
            error!("Teardown after interrupt failed: {}", e);
        }
        (self.exit)(INTERRUPT_EXIT_CODE);
        true
    }
}

impl SignalTrap {
    /// Listen for Ctrl-C and exit the process after teardown
    pub(crate) fn install(orchestrator: Arc<Orchestrator>) -> HarnessResult<Self> {
        orchestrator.claim_trap()?;

        let (tx, rx) = mpsc::channel(4);
        let forwarder = tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Cannot listen for interrupts: {}", e);
                    return;
                }
                if tx.send(()).await.is_err() {
                    return;
                }
            }
        });

        let mut trap = Self::arm(
            orchestrator,
            rx,
            Box::new(|code: i32| std::process::exit(code)),
        );
        trap.tasks.push(forwarder);
        Ok(trap)
    }

    /// Arm a trap fed by an arbitrary interrupt source
    pub fn install_with(
        orchestrator: Arc<Orchestrator>,
        interrupts: mpsc::Receiver<()>,
        exit: ExitHook,
    ) -> HarnessResult<Self> {
        orchestrator.claim_trap()?;
        Ok(Self::arm(orchestrator, interrupts, exit))
    }

    fn arm(
        orchestrator: Arc<Orchestrator>,
        mut interrupts: mpsc::Receiver<()>,
        exit: ExitHook,
    ) -> Self {
        let inner = Arc::new(TrapInner {
            orchestrator,
            fired: AtomicBool::new(false),
            exit,
        });

        let listener = {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                while interrupts.recv().await.is_some() {
                    // Teardown runs apart from the listener so later
                    // interrupts are drained and ignored meanwhile
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        inner.trigger().await;
                    });
                }
            })
        };

        info!("Interrupt trap armed");
        Self {
            inner,
            tasks: vec![listener],
        }
    }

    /// Fire the trap as if an interrupt arrived
    ///
    /// Returns false if teardown was already triggered.
    pub async fn trigger(&self) -> bool {
        self.inner.trigger().await
    }

    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Unregister the trap after a clean shutdown
    pub fn disarm(self) {
        info!("Interrupt trap disarmed");
    }
}

impl Drop for SignalTrap {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.inner.orchestrator.release_trap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessHandle;
    use rigger_common::{OrchestratorConfig, ProcessSpec, ProcessState, ReadinessSpec};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn orchestrator() -> Arc<Orchestrator> {
        let spec = ProcessSpec::new("server", "sh", ReadinessSpec::output("up"))
            .with_args(["-c", "echo up; exec sleep 30"]);
        let handle = ProcessHandle::new(spec, &OrchestratorConfig::default()).unwrap();
        Arc::new(Orchestrator::new(vec![handle]))
    }

    fn counting_exit(exits: &Arc<AtomicUsize>, notify: &Arc<Notify>) -> ExitHook {
        let exits = Arc::clone(exits);
        let notify = Arc::clone(notify);
        Box::new(move |code| {
            assert_eq!(code, INTERRUPT_EXIT_CODE);
            exits.fetch_add(1, Ordering::SeqCst);
            notify.notify_one();
        })
    }

    #[tokio::test]
    async fn test_interrupt_tears_down_then_exits() {
        let orchestrator = orchestrator();
        orchestrator.setup().await.unwrap();

        let exits = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let (tx, rx) = mpsc::channel(4);
        let trap = SignalTrap::install_with(
            Arc::clone(&orchestrator),
            rx,
            counting_exit(&exits, &notify),
        )
        .unwrap();

        tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), notify.notified())
            .await
            .unwrap();

        assert!(trap.has_fired());
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.statuses()[0].1, ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_double_interrupt_tears_down_once() {
        let orchestrator = orchestrator();
        orchestrator.setup().await.unwrap();

        let exits = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let (tx, rx) = mpsc::channel(4);
        let _trap = SignalTrap::install_with(
            Arc::clone(&orchestrator),
            rx,
            counting_exit(&exits, &notify),
        )
        .unwrap();

        tx.send(()).await.unwrap();
        tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), notify.notified())
            .await
            .unwrap();
        // Give a stray second teardown the chance to show up
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_run_teardown_once() {
        let orchestrator = orchestrator();
        orchestrator.setup().await.unwrap();

        let exits = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        let (_tx, rx) = mpsc::channel(1);
        let trap = SignalTrap::install_with(
            Arc::clone(&orchestrator),
            rx,
            counting_exit(&exits, &notify),
        )
        .unwrap();

        let (first, second) = tokio::join!(trap.trigger(), trap.trigger());
        assert!(first ^ second);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_registration() {
        let orchestrator = orchestrator();
        let (_tx, rx) = mpsc::channel(1);
        let trap = SignalTrap::install_with(Arc::clone(&orchestrator), rx, Box::new(|_| {})).unwrap();
        drop(trap);

        let (_tx, rx) = mpsc::channel(1);
        assert!(SignalTrap::install_with(orchestrator, rx, Box::new(|_| {})).is_ok());
    }
}
