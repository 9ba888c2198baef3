//! Dev-server plugin that runs the Electron main process alongside it.
//!
//! When the dev server first starts listening, [`ElectronPlugin`] publishes
//! the endpoint, assembles the main-process [`BuildConfig`] and starts the
//! build in watch mode. Every successful build then (re)starts the
//! application through the supervisor.

use crate::build::{BuildHandle, BuildService};
use crate::config::{merge_config, BuildConfig};
use crate::endpoint::{EndpointListener, PublishedEndpoint};
use crate::error::Error;
use crate::externals::with_external_builtins;
use crate::lifecycle::SupervisorHandle;
use crate::plugin::{
    HookResult, ListeningInfo, Plugin, PluginContext, PluginEnforce, PluginError, ServerContext,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Name of the dev-server plugin.
pub const PLUGIN_NAME: &str = "anode:electron";

/// Name of the build plugin that restarts the application.
pub const NOTIFIER_PLUGIN_NAME: &str = "anode:start-electron";

/// Build plugin: every successful build restarts the application.
#[derive(Debug, Clone)]
pub struct NotifierPlugin {
    supervisor: SupervisorHandle,
}

impl NotifierPlugin {
    #[must_use]
    pub fn new(supervisor: SupervisorHandle) -> Self {
        Self { supervisor }
    }
}

impl Plugin for NotifierPlugin {
    fn name(&self) -> &str {
        NOTIFIER_PLUGIN_NAME
    }

    fn close_bundle(&self, _ctx: &PluginContext) -> HookResult<()> {
        debug!("Bundle closed, notifying supervisor");
        self.supervisor.bundle_closed();
        Ok(())
    }
}

/// Build the main-process configuration for a published endpoint.
///
/// Defaults (with the server's mode) are deep-merged with `overrides`, the
/// endpoint environment is applied, builtin modules are added to the
/// external rule and the restart notifier is installed.
pub fn assemble_build_config(
    root: &Path,
    overrides: &serde_json::Value,
    endpoint: &PublishedEndpoint,
    supervisor: &SupervisorHandle,
) -> Result<BuildConfig, Error> {
    let defaults = BuildConfig {
        mode: Some(endpoint.mode.clone()),
        ..BuildConfig::default()
    };
    let defaults = serde_json::to_value(&defaults).map_err(Error::BuildConfig)?;
    let mut config: BuildConfig =
        serde_json::from_value(merge_config(&defaults, overrides)).map_err(Error::BuildConfig)?;

    config.env.extend(endpoint.env());
    config.external = with_external_builtins(&config.external);
    config
        .plugins
        .push(Arc::new(NotifierPlugin::new(supervisor.clone())));

    config.validate(root)?;
    Ok(config)
}

struct Inner {
    root: PathBuf,
    overrides: serde_json::Value,
    build_plugins: Vec<Arc<dyn Plugin>>,
    build: Arc<dyn BuildService>,
    supervisor: SupervisorHandle,
    listener: EndpointListener,
    handle: Mutex<Option<BuildHandle>>,
}

impl Inner {
    fn on_listening(&self, info: &ListeningInfo) -> HookResult<()> {
        let Some(endpoint) = self.listener.fire(info.addr, &info.mode) else {
            return Ok(());
        };

        // Published before the build exists: the application reads it at startup.
        self.supervisor.publish_endpoint(endpoint.clone());

        let mut config =
            assemble_build_config(&self.root, &self.overrides, &endpoint, &self.supervisor)
                .map_err(|e| PluginError::new(PLUGIN_NAME, "listening", e.to_string()))?;
        config.plugins.extend(self.build_plugins.iter().cloned());

        info!(
            entries = ?config.entries(),
            out_dir = %config.out_dir.display(),
            "Starting main process build"
        );
        let handle = self
            .build
            .watch(config)
            .map_err(|e| PluginError::new(PLUGIN_NAME, "listening", e.to_string()))?;

        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }
}

/// Dev-server plugin driving the main-process build and the application.
#[derive(Clone)]
pub struct ElectronPlugin {
    inner: Arc<Inner>,
}

impl ElectronPlugin {
    pub fn new(
        root: impl Into<PathBuf>,
        overrides: serde_json::Value,
        build: Arc<dyn BuildService>,
        supervisor: SupervisorHandle,
    ) -> Self {
        Self::with_build_plugins(root, overrides, build, supervisor, Vec::new())
    }

    /// Like [`ElectronPlugin::new`], with extra plugins for the main-process build.
    /// They run after the restart notifier.
    pub fn with_build_plugins(
        root: impl Into<PathBuf>,
        overrides: serde_json::Value,
        build: Arc<dyn BuildService>,
        supervisor: SupervisorHandle,
        build_plugins: Vec<Arc<dyn Plugin>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                overrides,
                build_plugins,
                build,
                supervisor,
                listener: EndpointListener::new(),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Whether the main-process build has been started.
    #[must_use]
    pub fn build_started(&self) -> bool {
        self.inner
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop the main-process build, if running.
    pub fn stop_build(&self) {
        if let Some(handle) = self
            .inner
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            debug!("Stopping main process build");
            drop(handle);
        }
    }
}

impl std::fmt::Debug for ElectronPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElectronPlugin")
            .field("root", &self.inner.root)
            .field("endpoint_published", &self.inner.listener.has_fired())
            .finish_non_exhaustive()
    }
}

impl Plugin for ElectronPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn enforce(&self) -> PluginEnforce {
        PluginEnforce::Post
    }

    fn configure_server(&self, server: &mut ServerContext) -> HookResult<()> {
        let inner = Arc::clone(&self.inner);
        server.once_listening(Box::new(move |info| inner.on_listening(info)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::externals::ExternalRule;
    use crate::lifecycle::{supervisor, SupervisorEvent};
    use crate::plugin::DevConfig;
    use std::net::SocketAddr;

    #[derive(Default)]
    struct RecordingBuild {
        configs: Mutex<Vec<BuildConfig>>,
    }

    impl BuildService for RecordingBuild {
        fn watch(&self, config: BuildConfig) -> Result<BuildHandle, Error> {
            self.configs.lock().unwrap().push(config);
            Ok(BuildHandle::new(tokio::spawn(async {})))
        }
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("electron")).unwrap();
        std::fs::write(dir.path().join("electron/main.ts"), "").unwrap();
        dir
    }

    fn endpoint(mode: &str) -> PublishedEndpoint {
        PublishedEndpoint {
            url: "http://127.0.0.1:5173".to_string(),
            addr: "127.0.0.1:5173".parse().unwrap(),
            mode: mode.to_string(),
        }
    }

    #[test]
    fn test_assemble_defaults() {
        let dir = project();
        let (handle, _rx) = supervisor::channel();
        let config =
            assemble_build_config(dir.path(), &serde_json::Value::Null, &endpoint("development"), &handle)
                .unwrap();

        assert_eq!(config.mode.as_deref(), Some("development"));
        assert_eq!(
            config.env.get("VITE_DEV_SERVER_URL").map(String::as_str),
            Some("http://127.0.0.1:5173")
        );
        assert!(config.external.is_external("fs", None, false));
        assert!(config.external.is_external("node:fs", None, false));
        assert!(config.external.is_external("electron", None, false));
        assert!(!config.external.is_external("lodash", None, false));
        assert_eq!(
            config.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            vec![NOTIFIER_PLUGIN_NAME]
        );
    }

    #[test]
    fn test_assemble_caller_overrides_win() {
        let dir = project();
        std::fs::write(dir.path().join("electron/preload.ts"), "").unwrap();
        let (handle, _rx) = supervisor::channel();
        let overrides = serde_json::json!({
            "entry": ["electron/main.ts", "electron/preload.ts"],
            "outDir": "out/main",
            "mode": "staging",
            "external": ["sqlite3"],
        });

        let config =
            assemble_build_config(dir.path(), &overrides, &endpoint("development"), &handle).unwrap();

        assert_eq!(config.entries().len(), 2);
        assert_eq!(config.out_dir, PathBuf::from("out/main"));
        assert_eq!(config.mode.as_deref(), Some("staging"));
        assert!(config.external.is_external("sqlite3", None, false));
        assert!(config.external.is_external("path", None, false));
        assert!(matches!(config.external, ExternalRule::List(_)));
    }

    #[test]
    fn test_assemble_missing_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, _rx) = supervisor::channel();
        let err = assemble_build_config(
            dir.path(),
            &serde_json::Value::Null,
            &endpoint("development"),
            &handle,
        )
        .unwrap_err();
        assert!(matches!(err, Error::EntryNotFound { .. }));
    }

    #[test]
    fn test_notifier_sends_bundle_closed() {
        let (handle, mut rx) = supervisor::channel();
        let notifier = NotifierPlugin::new(handle);
        notifier.close_bundle(&PluginContext::default()).unwrap();
        assert!(matches!(rx.try_recv(), Ok(SupervisorEvent::BundleClosed)));
    }

    #[tokio::test]
    async fn test_listening_publishes_then_builds_once() {
        let dir = project();
        let (handle, mut rx) = supervisor::channel();
        let build = Arc::new(RecordingBuild::default());
        let plugin = ElectronPlugin::new(
            dir.path(),
            serde_json::Value::Null,
            build.clone(),
            handle,
        );

        let mut server = ServerContext::new(dir.path().to_path_buf(), DevConfig::default());
        plugin.configure_server(&mut server).unwrap();
        assert!(!plugin.build_started());

        let addr: SocketAddr = "127.0.0.1:5173".parse().unwrap();
        server.notify_listening(addr).unwrap();
        server.notify_listening(addr).unwrap();

        assert!(plugin.build_started());
        assert_eq!(build.configs.lock().unwrap().len(), 1);
        match rx.try_recv() {
            Ok(SupervisorEvent::EndpointPublished(ep)) => {
                assert_eq!(ep.url, "http://127.0.0.1:5173");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());

        plugin.stop_build();
        assert!(!plugin.build_started());
    }

    #[tokio::test]
    async fn test_configure_twice_still_builds_once() {
        let dir = project();
        let (handle, _rx) = supervisor::channel();
        let build = Arc::new(RecordingBuild::default());
        let plugin = ElectronPlugin::new(dir.path(), serde_json::Value::Null, build.clone(), handle);

        let mut server = ServerContext::new(dir.path().to_path_buf(), DevConfig::default());
        plugin.configure_server(&mut server).unwrap();
        plugin.configure_server(&mut server).unwrap();
        server
            .notify_listening("127.0.0.1:5173".parse().unwrap())
            .unwrap();

        assert_eq!(build.configs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_build_error_surfaces_as_plugin_error() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, _rx) = supervisor::channel();
        let plugin = ElectronPlugin::new(
            dir.path(),
            serde_json::Value::Null,
            Arc::new(RecordingBuild::default()),
            handle,
        );

        let mut server = ServerContext::new(dir.path().to_path_buf(), DevConfig::default());
        plugin.configure_server(&mut server).unwrap();
        let err = server
            .notify_listening("127.0.0.1:5173".parse().unwrap())
            .unwrap_err();
        assert_eq!(err.plugin, PLUGIN_NAME);
    }
}
