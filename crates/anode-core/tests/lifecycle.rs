//! Dev-loop scenarios driven through the supervisor with a fake process layer.

use anode_core::endpoint::EndpointListener;
use anode_core::lifecycle::supervisor::{self, SupervisorEvent, SupervisorExit, SupervisorHandle};
use anode_core::lifecycle::{ChildHandle, Coordinator, ExitStatusInfo, LaunchSpec, ProcessSpawner};
use anode_core::Error;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Spawn { generation: u64, url: Option<String> },
    Kill(u64),
}

type Log = Arc<Mutex<Vec<Action>>>;

/// Killing a fake child reports its exit, like a real process would.
struct FakeChild {
    generation: u64,
    log: Log,
    events: SupervisorHandle,
}

impl ChildHandle for FakeChild {
    fn id(&self) -> Option<u32> {
        None
    }

    fn terminate(&mut self) -> BoxFuture<'static, ()> {
        self.log.lock().unwrap().push(Action::Kill(self.generation));
        self.events
            .child_exited(self.generation, ExitStatusInfo::signaled());
        async {}.boxed()
    }
}

struct FakeSpawner {
    log: Log,
    events: SupervisorHandle,
    fail: bool,
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(
        &mut self,
        spec: &LaunchSpec,
        generation: u64,
    ) -> std::io::Result<Box<dyn ChildHandle>> {
        if self.fail {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "not executable",
            ));
        }
        self.log.lock().unwrap().push(Action::Spawn {
            generation,
            url: spec.env.get("VITE_DEV_SERVER_URL").cloned(),
        });
        Ok(Box::new(FakeChild {
            generation,
            log: Arc::clone(&self.log),
            events: self.events.clone(),
        }))
    }
}

struct Harness {
    log: Log,
    events: SupervisorHandle,
    task: tokio::task::JoinHandle<Result<SupervisorExit, Error>>,
}

fn start(fail: bool, await_exit: bool) -> Harness {
    let (events, rx) = supervisor::channel();
    let log: Log = Arc::default();
    let spawner = FakeSpawner {
        log: Arc::clone(&log),
        events: events.clone(),
        fail,
    };
    let coordinator = Coordinator::new(spawner, LaunchSpec::new("/opt/electron/electron", "/app"))
        .with_await_exit(await_exit);
    let task = tokio::spawn(supervisor::run(coordinator, rx));
    Harness { log, events, task }
}

impl Harness {
    fn spawns(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|a| matches!(a, Action::Spawn { .. }))
            .count()
    }

    fn kills(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|a| matches!(a, Action::Kill(_)))
            .count()
    }

    async fn wait_for_spawns(&self, n: usize) {
        for _ in 0..200 {
            if self.spawns() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} spawns, saw {}", self.spawns());
    }

    async fn finish(self) -> Result<SupervisorExit, Error> {
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("supervisor did not finish")
            .expect("supervisor panicked")
    }
}

fn publish(events: &SupervisorHandle) {
    let listener = EndpointListener::new();
    let endpoint = listener
        .fire("127.0.0.1:5173".parse().unwrap(), "development")
        .unwrap();
    events.publish_endpoint(endpoint);
}

#[tokio::test]
async fn first_bundle_launches_with_endpoint() {
    let h = start(false, true);
    publish(&h.events);
    h.events.bundle_closed();
    h.wait_for_spawns(1).await;

    assert_eq!(
        h.log.lock().unwrap().clone(),
        vec![Action::Spawn {
            generation: 0,
            url: Some("http://127.0.0.1:5173".to_string()),
        }]
    );
    assert_eq!(h.kills(), 0);

    h.events.shutdown();
    assert_eq!(h.finish().await.unwrap(), SupervisorExit::Stopped);
}

#[tokio::test]
async fn rebuild_replaces_application_without_shutting_down() {
    let h = start(false, true);
    publish(&h.events);
    h.events.bundle_closed();
    h.wait_for_spawns(1).await;
    h.events.bundle_closed();
    h.wait_for_spawns(2).await;

    assert_eq!(
        h.log.lock().unwrap()[1..].to_vec(),
        vec![
            Action::Kill(0),
            Action::Spawn {
                generation: 1,
                url: Some("http://127.0.0.1:5173".to_string()),
            },
        ]
    );

    // the exit of child 0 is queued ahead of this and must not end the session
    h.events.shutdown();
    assert_eq!(h.finish().await.unwrap(), SupervisorExit::Stopped);
}

#[tokio::test]
async fn n_bundles_spawn_n_and_kill_n_minus_one() {
    let h = start(false, true);
    for _ in 0..5 {
        h.events.bundle_closed();
    }
    h.wait_for_spawns(5).await;
    assert_eq!(h.kills(), 4);

    h.events.shutdown();
    assert_eq!(h.finish().await.unwrap(), SupervisorExit::Stopped);
}

#[tokio::test]
async fn overlapping_restarts_behave_the_same() {
    let h = start(false, false);
    for _ in 0..3 {
        h.events.bundle_closed();
    }
    h.wait_for_spawns(3).await;
    assert_eq!(h.kills(), 2);

    h.events.shutdown();
    assert_eq!(h.finish().await.unwrap(), SupervisorExit::Stopped);
}

#[tokio::test]
async fn user_closing_application_ends_session() {
    let h = start(false, true);
    h.events.bundle_closed();
    h.wait_for_spawns(1).await;

    h.events.child_exited(0, ExitStatusInfo::code(0));

    assert_eq!(
        h.finish().await.unwrap(),
        SupervisorExit::ApplicationClosed { code: Some(0) }
    );
}

#[tokio::test]
async fn stale_exit_is_ignored() {
    let h = start(false, true);
    h.events.bundle_closed();
    h.wait_for_spawns(1).await;

    h.events.child_exited(99, ExitStatusInfo::code(1));
    h.events.send(SupervisorEvent::Shutdown);

    assert_eq!(h.finish().await.unwrap(), SupervisorExit::Stopped);
}

#[tokio::test]
async fn spawn_failure_is_fatal() {
    let h = start(true, true);
    h.events.bundle_closed();

    let err = h.finish().await.unwrap_err();
    assert!(matches!(err, Error::Spawn { .. }));
    assert_eq!(err.code(), "SPAWN_FAILED");
}
