//! rigger harness
//!
//! Process lifecycle orchestration for integration test sessions, plus the
//! task pipeline that runs around it:
//! - Spawns external processes and waits until each is ready to serve
//! - Starts a group in order and stops it in reverse
//! - Tears the group down on Ctrl-C before the program exits
//! - Sequences build tasks, bumps manifest versions and watches sources
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  TaskRunner                                                 │
//! │    ├── exec / sequence / clean / bump                       │
//! │    └── test: setup() -> command -> teardown()               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Orchestrator (Arc)                                         │
//! │    ├── setup()     handles[0] .. handles[n], rollback       │
//! │    ├── teardown()  reverse start order, best effort         │
//! │    └── register_on_interrupt() -> SignalTrap                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ProcessHandle                                              │
//! │    ├── start()  spawn + ReadinessMonitor, bounded           │
//! │    ├── stop()   stop signal, grace period, SIGKILL          │
//! │    └── Idle -> Starting -> Running -> Stopping -> Stopped   │
//! │                    └────────> Failed                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ReadinessMonitor                                           │
//! │    ├── OutputMatch { pattern }                              │
//! │    └── HttpProbe { url, check_status }                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bump;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod process;
pub mod readiness;
pub mod signal;
pub mod tasks;
pub mod watch;

pub use bump::{bump_manifest, bump_version, BumpOutcome};
pub use error::{HarnessError, HarnessResult};
pub use orchestrator::Orchestrator;
pub use output::{OutputLine, OutputLines, OutputStream};
pub use process::ProcessHandle;
pub use readiness::{monitor_for, HttpProbe, OutputMatch, ReadinessMonitor};
pub use signal::{SignalTrap, INTERRUPT_EXIT_CODE};
pub use tasks::{RunSummary, TaskReport, TaskRunner};
pub use watch::FileWatcher;
