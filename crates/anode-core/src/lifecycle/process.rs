//! Real process spawning on tokio.

use super::supervisor::{SupervisorEvent, SupervisorHandle};
use super::{ChildHandle, ExitStatusInfo, LaunchSpec, ProcessSpawner};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

/// Spawns the application with inherited stdio and reports exits to the supervisor.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    events: SupervisorHandle,
}

impl TokioSpawner {
    #[must_use]
    pub fn new(events: SupervisorHandle) -> Self {
        Self { events }
    }
}

impl ProcessSpawner for TokioSpawner {
    fn spawn(
        &mut self,
        spec: &LaunchSpec,
        generation: u64,
    ) -> std::io::Result<Box<dyn ChildHandle>> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exited_tx, exited_rx) = watch::channel(false);
        let events = self.events.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!(generation, error = %e, "Failed to kill application");
                    }
                    child.wait().await
                }
            };

            let status = match status {
                Ok(status) => ExitStatusInfo::from(status),
                Err(e) => {
                    warn!(generation, error = %e, "Failed to wait for application");
                    ExitStatusInfo::signaled()
                }
            };
            debug!(generation, code = status.code, "Application process ended");

            let _ = exited_tx.send(true);
            events.send(SupervisorEvent::ChildExited { generation, status });
        });

        Ok(Box::new(TokioChild {
            pid,
            kill: Some(kill_tx),
            exited: exited_rx,
        }))
    }
}

struct TokioChild {
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
}

impl ChildHandle for TokioChild {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn terminate(&mut self) -> BoxFuture<'static, ()> {
        if let Some(kill) = self.kill.take() {
            // Err: the process already exited on its own.
            let _ = kill.send(());
        }
        let mut exited = self.exited.clone();
        async move {
            let _ = exited.wait_for(|done| *done).await;
        }
        .boxed()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::lifecycle::supervisor;
    use std::time::Duration;

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec::new("/bin/sh", std::env::temp_dir())
            .with_args(vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_natural_exit_is_reported() {
        let (handle, mut events) = supervisor::channel();
        let mut spawner = TokioSpawner::new(handle);

        let _child = spawner.spawn(&sh("exit 3"), 7).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            SupervisorEvent::ChildExited { generation, status } => {
                assert_eq!(generation, 7);
                assert_eq!(status.code, Some(3));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_terminate_waits_for_exit() {
        let (handle, mut events) = supervisor::channel();
        let mut spawner = TokioSpawner::new(handle);

        let mut child = spawner.spawn(&sh("sleep 30"), 0).unwrap();
        assert!(child.id().is_some());

        tokio::time::timeout(Duration::from_secs(10), child.terminate())
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            SupervisorEvent::ChildExited { generation: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let (handle, mut events) = supervisor::channel();
        let mut spawner = TokioSpawner::new(handle);

        let mut spec = sh(r#"test "$VITE_DEV_SERVER_URL" = "http://127.0.0.1:5173""#);
        spec.env.insert(
            "VITE_DEV_SERVER_URL".to_string(),
            "http://127.0.0.1:5173".to_string(),
        );
        let _child = spawner.spawn(&spec, 1).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            SupervisorEvent::ChildExited { generation: 1, status } if status.code == Some(0)
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_fails() {
        let (handle, _events) = supervisor::channel();
        let mut spawner = TokioSpawner::new(handle);

        let spec = LaunchSpec::new("/definitely/not/electron", std::env::temp_dir());
        assert!(spawner.spawn(&spec, 0).is_err());
    }
}
