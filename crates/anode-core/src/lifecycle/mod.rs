//! Electron application lifecycle.
//!
//! Keeps exactly one instance of the application running for the whole dev
//! session, replacing it after every successful main-process build.
//!
//! - [`Coordinator`] is the state machine (first launch, restarts, exits).
//! - [`ProcessSpawner`] / [`ChildHandle`] are the process seam;
//!   [`TokioSpawner`] is the real implementation.
//! - [`supervisor::run`] is the single task that owns the coordinator and
//!   serializes every event it reacts to.

pub mod coordinator;
pub mod process;
pub mod supervisor;

pub use coordinator::{Coordinator, ExitDisposition, LifecycleState};
pub use process::TokioSpawner;
pub use supervisor::{SupervisorEvent, SupervisorExit, SupervisorHandle};

use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything needed to launch the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Binary to run.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: PathBuf,
    /// Environment added on top of the inherited one.
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![".".to_string()],
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitStatusInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
}

impl ExitStatusInfo {
    #[must_use]
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Killed by a signal (no exit code).
    #[must_use]
    pub fn signaled() -> Self {
        Self { code: None }
    }
}

impl From<std::process::ExitStatus> for ExitStatusInfo {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// A live application instance.
pub trait ChildHandle: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Request termination.
    ///
    /// The kill is issued when this is called; the returned future resolves
    /// once the process has exited. Dropping the future does not cancel the
    /// kill.
    fn terminate(&mut self) -> BoxFuture<'static, ()>;
}

/// Launches application instances.
///
/// The spawner reports each instance's exit (tagged with `generation`)
/// back to whoever drives the coordinator.
pub trait ProcessSpawner: Send {
    fn spawn(&mut self, spec: &LaunchSpec, generation: u64)
        -> std::io::Result<Box<dyn ChildHandle>>;
}
