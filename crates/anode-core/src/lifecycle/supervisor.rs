//! The supervisor task.
//!
//! Everything that affects the application slot (endpoint publication, build
//! completion, child exits, shutdown requests) arrives as a
//! [`SupervisorEvent`] on one channel. [`run`] owns the [`Coordinator`] and
//! handles the events strictly one at a time, so no two handlers ever
//! interleave.

use super::coordinator::{Coordinator, ExitDisposition};
use super::{ExitStatusInfo, ProcessSpawner};
use crate::endpoint::PublishedEndpoint;
use crate::error::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Input to the supervisor.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// The dev server endpoint is known; future launches see it.
    EndpointPublished(PublishedEndpoint),
    /// A main-process build finished writing its output.
    BundleClosed,
    /// An application instance exited.
    ChildExited {
        generation: u64,
        status: ExitStatusInfo,
    },
    /// Stop the application and return.
    Shutdown,
}

/// Why the supervisor returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The user closed the application (or it crashed).
    ApplicationClosed { code: Option<i32> },
    /// Shutdown was requested, or every sender went away.
    Stopped,
}

/// Sending half of the supervisor channel.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl SupervisorHandle {
    /// Queue an event. Events sent after the supervisor returned are dropped.
    pub fn send(&self, event: SupervisorEvent) {
        if self.tx.send(event).is_err() {
            debug!("Supervisor gone, event dropped");
        }
    }

    pub fn publish_endpoint(&self, endpoint: PublishedEndpoint) {
        self.send(SupervisorEvent::EndpointPublished(endpoint));
    }

    pub fn bundle_closed(&self) {
        self.send(SupervisorEvent::BundleClosed);
    }

    pub fn child_exited(&self, generation: u64, status: ExitStatusInfo) {
        self.send(SupervisorEvent::ChildExited { generation, status });
    }

    pub fn shutdown(&self) {
        self.send(SupervisorEvent::Shutdown);
    }
}

/// Create a supervisor channel.
#[must_use]
pub fn channel() -> (SupervisorHandle, mpsc::UnboundedReceiver<SupervisorEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SupervisorHandle { tx }, rx)
}

/// Drive `coordinator` until the application closes or shutdown is requested.
///
/// A spawn failure ends the loop with the error.
pub async fn run<S: ProcessSpawner>(
    mut coordinator: Coordinator<S>,
    mut events: mpsc::UnboundedReceiver<SupervisorEvent>,
) -> Result<SupervisorExit, Error> {
    while let Some(event) = events.recv().await {
        match event {
            SupervisorEvent::EndpointPublished(endpoint) => {
                debug!(url = %endpoint.url, "Launch environment updated");
                for (key, value) in endpoint.env() {
                    coordinator.set_env(key, value);
                }
            }
            SupervisorEvent::BundleClosed => {
                coordinator.on_bundle_closed().await?;
            }
            SupervisorEvent::ChildExited { generation, status } => {
                if coordinator.on_child_exit(generation, status) == ExitDisposition::Shutdown {
                    return Ok(SupervisorExit::ApplicationClosed { code: status.code });
                }
            }
            SupervisorEvent::Shutdown => {
                info!(launches = coordinator.launches(), "Shutting down");
                coordinator.shutdown().await;
                return Ok(SupervisorExit::Stopped);
            }
        }
    }

    coordinator.shutdown().await;
    Ok(SupervisorExit::Stopped)
}
