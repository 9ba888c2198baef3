//! Plugin system for the dev loop.
//!
//! Provides a Vite-compatible subset of plugin hooks: config hooks and
//! `configure_server` on the dev-server side, `build_start`, `build_end` and
//! `close_bundle` on the build side.
//!
//! ## Example
//!
//! ```ignore
//! use anode_core::plugin::{HookResult, Plugin, PluginContext};
//!
//! struct Announce;
//!
//! impl Plugin for Announce {
//!     fn name(&self) -> &str { "announce" }
//!
//!     fn close_bundle(&self, _ctx: &PluginContext) -> HookResult<()> {
//!         println!("bundle written");
//!         Ok(())
//!     }
//! }
//! ```

#![allow(clippy::unused_self)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Result type for plugin hooks.
pub type HookResult<T> = Result<T, PluginError>;

/// Error from a plugin.
#[derive(Debug)]
pub struct PluginError {
    /// Plugin name that caused the error.
    pub plugin: String,
    /// Hook that failed.
    pub hook: &'static str,
    /// Error message.
    pub message: String,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, hook: &'static str, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            hook,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.plugin, self.hook, self.message)
    }
}

impl std::error::Error for PluginError {}

/// Context passed to build hooks.
#[derive(Debug, Default)]
pub struct PluginContext {
    /// Working directory.
    pub cwd: PathBuf,
    /// Whether this is a watch build.
    pub watch: bool,
}

impl PluginContext {
    /// Create a new plugin context.
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd, watch: false }
    }
}

/// Plugin enforcement ordering.
///
/// Mirrors Vite's `enforce` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PluginEnforce {
    /// Runs before normal plugins.
    Pre,
    /// Default ordering (no enforcement).
    #[default]
    Normal,
    /// Runs after normal plugins.
    Post,
}

/// Development server configuration.
///
/// Passed to the `config` hook so plugins can modify dev server settings.
#[derive(Debug, Clone)]
pub struct DevConfig {
    /// Root directory of the project.
    pub root: PathBuf,
    /// Dev server port.
    pub port: u16,
    /// Dev server host.
    pub host: String,
    /// Resolved mode (`development`, `production`, ...).
    pub mode: String,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_default(),
            port: 5173,
            host: "localhost".to_string(),
            mode: "development".to_string(),
        }
    }
}

/// What a listening hook learns when the server starts accepting connections.
#[derive(Debug, Clone)]
pub struct ListeningInfo {
    /// Address the listener is bound to.
    pub addr: SocketAddr,
    /// Server mode at the moment of binding.
    pub mode: String,
}

/// One-shot callback run when the dev server starts listening.
pub type ListeningHook = Box<dyn FnOnce(&ListeningInfo) -> HookResult<()> + Send>;

/// Context for the dev server, passed to `configure_server` hook.
pub struct ServerContext {
    /// Project root.
    pub root: PathBuf,
    /// Dev server configuration.
    pub config: DevConfig,
    /// Pending listening hooks; drained on the first bind.
    listening: Vec<ListeningHook>,
}

impl ServerContext {
    /// Create a new server context.
    pub fn new(root: PathBuf, config: DevConfig) -> Self {
        Self {
            root,
            config,
            listening: Vec::new(),
        }
    }

    /// Run `hook` once, the first time the server starts listening.
    pub fn once_listening(&mut self, hook: ListeningHook) {
        self.listening.push(hook);
    }

    /// Number of hooks that have not fired yet.
    #[must_use]
    pub fn pending_listening_hooks(&self) -> usize {
        self.listening.len()
    }

    /// Report that the server is accepting connections on `addr`.
    ///
    /// Every pending hook runs exactly once; a later call (rebind) finds
    /// nothing left to run.
    pub fn notify_listening(&mut self, addr: SocketAddr) -> HookResult<()> {
        let info = ListeningInfo {
            addr,
            mode: self.config.mode.clone(),
        };
        for hook in std::mem::take(&mut self.listening) {
            hook(&info)?;
        }
        Ok(())
    }
}

/// The main plugin trait.
///
/// All methods have default implementations that do nothing, so you only
/// need to implement the hooks you care about.
pub trait Plugin: Send + Sync {
    /// Plugin name for debugging and error messages.
    fn name(&self) -> &str;

    /// Plugin ordering: `Pre`, `Normal` (default), or `Post`.
    fn enforce(&self) -> PluginEnforce {
        PluginEnforce::Normal
    }

    /// Modify the dev config before it is resolved.
    fn config(&self, _config: &mut DevConfig) -> HookResult<()> {
        Ok(())
    }

    /// Called after config is resolved (read-only).
    fn config_resolved(&self, _config: &DevConfig) -> HookResult<()> {
        Ok(())
    }

    /// Configure the dev server.
    ///
    /// Called once at dev server startup, before the server binds.
    fn configure_server(&self, _server: &mut ServerContext) -> HookResult<()> {
        Ok(())
    }

    /// Called at the start of every build.
    fn build_start(&self, _ctx: &PluginContext) -> HookResult<()> {
        Ok(())
    }

    /// Called at the end of every build, with the failure if there was one.
    fn build_end(&self, _error: Option<&str>, _ctx: &PluginContext) -> HookResult<()> {
        Ok(())
    }

    /// Called after a build's output has been written successfully.
    fn close_bundle(&self, _ctx: &PluginContext) -> HookResult<()> {
        Ok(())
    }
}

/// Logs every hook it sees at `debug` level and changes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracePlugin;

impl Plugin for TracePlugin {
    fn name(&self) -> &str {
        "anode:trace"
    }

    fn config(&self, config: &mut DevConfig) -> HookResult<()> {
        debug!(hook = "config", ?config, "Plugin hook");
        Ok(())
    }

    fn config_resolved(&self, config: &DevConfig) -> HookResult<()> {
        debug!(hook = "config_resolved", ?config, "Plugin hook");
        Ok(())
    }

    fn configure_server(&self, server: &mut ServerContext) -> HookResult<()> {
        debug!(
            hook = "configure_server",
            root = %server.root.display(),
            listening_hooks = server.pending_listening_hooks(),
            "Plugin hook"
        );
        Ok(())
    }

    fn build_start(&self, ctx: &PluginContext) -> HookResult<()> {
        debug!(hook = "build_start", watch = ctx.watch, "Plugin hook");
        Ok(())
    }

    fn build_end(&self, error: Option<&str>, _ctx: &PluginContext) -> HookResult<()> {
        debug!(hook = "build_end", error, "Plugin hook");
        Ok(())
    }

    fn close_bundle(&self, _ctx: &PluginContext) -> HookResult<()> {
        debug!(hook = "close_bundle", "Plugin hook");
        Ok(())
    }
}

/// A container for managing multiple plugins.
///
/// Plugins are sorted by their `enforce()` ordering: `Pre` → `Normal` → `Post`.
/// Within the same enforcement level, insertion order is preserved.
pub struct PluginContainer {
    plugins: Vec<Arc<dyn Plugin>>,
    ctx: PluginContext,
}

impl PluginContainer {
    /// Create a new plugin container.
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            plugins: Vec::new(),
            ctx: PluginContext::new(cwd),
        }
    }

    /// Add a plugin. Plugins are kept sorted by enforce order.
    pub fn add(&mut self, plugin: Arc<dyn Plugin>) {
        let needs_sort = plugin.enforce() != PluginEnforce::Normal;
        self.plugins.push(plugin);
        if needs_sort {
            // stable: insertion order within a level survives
            self.plugins.sort_by_key(|p| p.enforce());
        }
    }

    /// Set watch mode.
    pub fn set_watch(&mut self, watch: bool) {
        self.ctx.watch = watch;
    }

    /// Names of registered plugins, in dispatch order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Call `config` on all plugins, letting each mutate the config.
    pub fn call_config(&self, config: &mut DevConfig) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin.config(config)?;
        }
        Ok(())
    }

    /// Call `config_resolved` on all plugins.
    pub fn call_config_resolved(&self, config: &DevConfig) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin.config_resolved(config)?;
        }
        Ok(())
    }

    /// Call `configure_server` on all plugins.
    pub fn call_configure_server(&self, server: &mut ServerContext) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin.configure_server(server)?;
        }
        Ok(())
    }

    /// Call `build_start` on all plugins.
    pub fn build_start(&self) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin.build_start(&self.ctx)?;
        }
        Ok(())
    }

    /// Call `build_end` on all plugins.
    pub fn build_end(&self, error: Option<&str>) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin.build_end(error, &self.ctx)?;
        }
        Ok(())
    }

    /// Call `close_bundle` on all plugins.
    pub fn close_bundle(&self) -> HookResult<()> {
        for plugin in &self.plugins {
            plugin.close_bundle(&self.ctx)?;
        }
        Ok(())
    }
}

impl Default for PluginContainer {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        enforce: PluginEnforce,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn enforce(&self) -> PluginEnforce {
            self.enforce
        }

        fn config(&self, config: &mut DevConfig) -> HookResult<()> {
            config.port += 1;
            Ok(())
        }

        fn build_end(&self, error: Option<&str>, _ctx: &PluginContext) -> HookResult<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:end:{}", self.name, error.unwrap_or("ok")));
            Ok(())
        }

        fn close_bundle(&self, _ctx: &PluginContext) -> HookResult<()> {
            self.log.lock().unwrap().push(format!("{}:close", self.name));
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        enforce: PluginEnforce,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn Plugin> {
        Arc::new(Recorder {
            name,
            enforce,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_enforce_ordering_is_stable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut container = PluginContainer::default();
        container.add(recorder("a", PluginEnforce::Normal, &log));
        container.add(recorder("post", PluginEnforce::Post, &log));
        container.add(recorder("b", PluginEnforce::Normal, &log));
        container.add(recorder("pre", PluginEnforce::Pre, &log));

        assert_eq!(container.names(), vec!["pre", "a", "b", "post"]);

        container.close_bundle().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["pre:close", "a:close", "b:close", "post:close"]
        );
    }

    #[test]
    fn test_config_hooks_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut container = PluginContainer::default();
        container.add(recorder("a", PluginEnforce::Normal, &log));
        container.add(recorder("b", PluginEnforce::Normal, &log));

        let mut config = DevConfig::default();
        container.call_config(&mut config).unwrap();
        assert_eq!(config.port, 5175);
    }

    #[test]
    fn test_build_end_receives_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut container = PluginContainer::default();
        container.add(recorder("a", PluginEnforce::Normal, &log));

        container.build_end(Some("syntax error")).unwrap();
        container.build_end(None).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a:end:syntax error", "a:end:ok"]);
    }

    #[test]
    fn test_listening_hooks_run_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut server = ServerContext::new(PathBuf::from("."), DevConfig::default());

        let counter = Arc::clone(&fired);
        server.once_listening(Box::new(move |info| {
            assert_eq!(info.mode, "development");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        assert_eq!(server.pending_listening_hooks(), 1);

        let addr: SocketAddr = "127.0.0.1:5173".parse().unwrap();
        server.notify_listening(addr).unwrap();
        server.notify_listening(addr).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(server.pending_listening_hooks(), 0);
    }

    #[test]
    fn test_listening_hook_error_propagates() {
        let mut server = ServerContext::new(PathBuf::from("."), DevConfig::default());
        server.once_listening(Box::new(|_| Err(PluginError::new("x", "listening", "boom"))));

        let err = server
            .notify_listening("127.0.0.1:1".parse().unwrap())
            .unwrap_err();
        assert_eq!(err.to_string(), "[x] listening: boom");
    }

    #[test]
    fn test_trace_plugin_passes_through() {
        let mut container = PluginContainer::default();
        container.add(Arc::new(TracePlugin));

        let mut config = DevConfig::default();
        let before = format!("{config:?}");
        container.call_config(&mut config).unwrap();
        container.call_config_resolved(&config).unwrap();
        assert_eq!(format!("{config:?}"), before);

        let mut server = ServerContext::new(PathBuf::from("."), config);
        container.call_configure_server(&mut server).unwrap();
        assert_eq!(server.pending_listening_hooks(), 0);

        container.build_start().unwrap();
        container.build_end(Some("boom")).unwrap();
        container.close_bundle().unwrap();
    }
}
