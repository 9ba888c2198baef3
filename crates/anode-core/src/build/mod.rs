//! Main-process build service.
//!
//! The build engine itself is opaque: anode only needs it to run a build
//! for a [`BuildConfig`], rebuild on change in watch mode, and fire the
//! plugin hooks (`build_start`, `build_end`, `close_bundle`) around every
//! build. Builds are serialized: hooks for build *n* complete before build
//! *n + 1* starts.

mod command;

pub use command::{esbuild_args, CommandBuildService, IgnoreFilter, BUILD_CONFIG_ENV, MODE_ENV};

use crate::config::BuildConfig;
use crate::error::Error;
use tokio::task::JoinHandle;

/// Something that can build the main process.
pub trait BuildService: Send + Sync {
    /// Start building `config`: once, or continuously if it has watch options.
    fn watch(&self, config: BuildConfig) -> Result<BuildHandle, Error>;
}

/// A running build. Dropping it stops the build loop and the file watcher.
pub struct BuildHandle {
    task: JoinHandle<()>,
    _guard: Option<Box<dyn std::any::Any + Send>>,
}

impl BuildHandle {
    #[must_use]
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task, _guard: None }
    }

    /// Keep `guard` (e.g. a file watcher) alive as long as the handle.
    #[must_use]
    pub fn with_guard(mut self, guard: impl Send + 'static) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }

    /// True once the build loop has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the build loop to end (single builds only; watch mode runs
    /// until dropped).
    pub async fn finished(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for BuildHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for BuildHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildHandle")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}
