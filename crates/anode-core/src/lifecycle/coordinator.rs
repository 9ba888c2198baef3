//! The application process state machine.
//!
//! ```text
//! NoProcess ──bundle closed──▶ Starting ──spawned──▶ Running
//!                                                     │  ▲
//!                                       bundle closed │  │ retired exit observed
//!                                                     ▼  │
//!                                                  Restarting
//!
//! Running ──current child exits──▶ ShuttingDown
//! ```
//!
//! Every spawned child gets a generation number. Killing a child to replace
//! it *retires* its generation; the exit of a retired generation is
//! expected and clears the restart intent. The exit of the current,
//! non-retired child means the user closed the application (or it crashed),
//! and the whole tool shuts down.

use super::{ChildHandle, ExitStatusInfo, LaunchSpec, ProcessSpawner};
use crate::error::Error;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Lifecycle state of the application slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing launched yet.
    NoProcess,
    /// Spawning the first instance.
    Starting,
    /// Exactly one instance alive, no replaced instance pending.
    Running,
    /// A replaced instance has been killed and its exit not yet observed.
    Restarting,
    /// The tool is going away; no further spawns.
    ShuttingDown,
}

/// How a child exit was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Caused by an intentional restart.
    Expected,
    /// The tracked application went away on its own.
    Shutdown,
    /// Unknown generation; ignored.
    Stale,
}

struct TrackedChild {
    generation: u64,
    handle: Box<dyn ChildHandle>,
}

/// Owns the single application slot.
pub struct Coordinator<S> {
    spawner: S,
    spec: LaunchSpec,
    state: LifecycleState,
    first_launch: bool,
    current: Option<TrackedChild>,
    retired: BTreeSet<u64>,
    next_generation: u64,
    await_exit: bool,
    launches: u64,
}

impl<S: ProcessSpawner> Coordinator<S> {
    /// Create a coordinator that launches `spec` through `spawner`.
    pub fn new(spawner: S, spec: LaunchSpec) -> Self {
        Self {
            spawner,
            spec,
            state: LifecycleState::NoProcess,
            first_launch: true,
            current: None,
            retired: BTreeSet::new(),
            next_generation: 0,
            await_exit: true,
            launches: 0,
        }
    }

    /// Whether a restart waits for the old instance to exit before spawning.
    #[must_use]
    pub fn with_await_exit(mut self, await_exit: bool) -> Self {
        self.await_exit = await_exit;
        self
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// True until the first bundle has been launched.
    #[must_use]
    pub fn is_first_launch(&self) -> bool {
        self.first_launch
    }

    /// True while an intentionally killed instance has not been seen exiting.
    #[must_use]
    pub fn restart_pending(&self) -> bool {
        !self.retired.is_empty()
    }

    /// Generation of the live instance, if any.
    #[must_use]
    pub fn current_generation(&self) -> Option<u64> {
        self.current.as_ref().map(|c| c.generation)
    }

    /// Total number of spawned instances.
    #[must_use]
    pub fn launches(&self) -> u64 {
        self.launches
    }

    /// Add an environment variable for every future launch.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.spec.env.insert(key.into(), value.into());
    }

    /// A build finished: replace the running instance with a fresh one.
    ///
    /// A spawn failure is fatal: the state moves to `ShuttingDown` and the
    /// error is returned.
    pub async fn on_bundle_closed(&mut self) -> Result<(), Error> {
        if self.state == LifecycleState::ShuttingDown {
            debug!("Ignoring rebuild while shutting down");
            return Ok(());
        }

        let first_launch = std::mem::replace(&mut self.first_launch, false);

        if let Some(mut old) = self.current.take() {
            self.retired.insert(old.generation);
            self.state = LifecycleState::Restarting;
            info!(
                generation = old.generation,
                pid = old.handle.id(),
                "Main process rebuilt, restarting application"
            );
            let exited = old.handle.terminate();
            if self.await_exit {
                exited.await;
            }
        } else {
            self.state = LifecycleState::Starting;
            if first_launch {
                info!("Main process built, starting application");
            }
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        match self.spawner.spawn(&self.spec, generation) {
            Ok(handle) => {
                info!(
                    generation,
                    pid = handle.id(),
                    program = %self.spec.program.display(),
                    "Application started"
                );
                self.current = Some(TrackedChild { generation, handle });
                self.launches += 1;
                self.state = if self.retired.is_empty() {
                    LifecycleState::Running
                } else {
                    LifecycleState::Restarting
                };
                Ok(())
            }
            Err(source) => {
                self.state = LifecycleState::ShuttingDown;
                Err(Error::Spawn {
                    program: self.spec.program.clone(),
                    source,
                })
            }
        }
    }

    /// A child exited; decide whether the tool keeps running.
    pub fn on_child_exit(&mut self, generation: u64, status: ExitStatusInfo) -> ExitDisposition {
        if self.retired.remove(&generation) {
            debug!(generation, code = status.code, "Replaced application exited");
            if self.retired.is_empty() && self.state == LifecycleState::Restarting {
                self.state = LifecycleState::Running;
            }
            return ExitDisposition::Expected;
        }

        if self.current_generation() == Some(generation) {
            self.current = None;
            self.state = LifecycleState::ShuttingDown;
            info!(generation, code = status.code, "Application exited, shutting down");
            return ExitDisposition::Shutdown;
        }

        warn!(generation, "Exit from unknown application instance ignored");
        ExitDisposition::Stale
    }

    /// Stop the live instance (if any) and refuse further launches.
    pub async fn shutdown(&mut self) {
        self.state = LifecycleState::ShuttingDown;
        if let Some(mut child) = self.current.take() {
            self.retired.insert(child.generation);
            info!(generation = child.generation, "Stopping application");
            child.handle.terminate().await;
        }
    }
}
