//! `anode dev` command implementation.
//!
//! Serves the renderer from the project root and runs the Electron main
//! process next to it:
//!
//! ```text
//! bind dev server ──listening──▶ publish VITE_DEV_SERVER_URL
//!                                 └─▶ watch-build main process
//!                                       └─▶ close_bundle ──▶ (re)start Electron
//! ```
//!
//! The command returns when the application is closed, on Ctrl+C, or on a
//! fatal error (config, missing Electron binary, spawn failure).

use super::diagnostic;
use anode_core::build::{BuildService, CommandBuildService};
use anode_core::config::{load_config, AnodeConfig};
use anode_core::electron::ElectronPlugin;
use anode_core::lifecycle::{supervisor, Coordinator, LaunchSpec, SupervisorExit, TokioSpawner};
use anode_core::paths::resolve_electron_binary;
use anode_core::plugin::{DevConfig, Plugin, PluginContainer, ServerContext, TracePlugin};
use anode_core::Error;
use axum::Router;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

/// Default dev server port.
pub const DEFAULT_PORT: u16 = 5173;

/// Default dev server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Dev command action.
#[derive(Debug, Clone)]
pub struct DevAction {
    /// Project root.
    pub cwd: PathBuf,
    /// Port to listen on, when given on the command line.
    pub port: Option<u16>,
    /// Host to bind to, when given on the command line.
    pub host: Option<String>,
    /// Mode (e.g. "development", "production").
    pub mode: String,
    /// Explicit config file path (overrides auto-discovery).
    pub config: Option<PathBuf>,
    /// Log every plugin hook of the dev server and the main-process build.
    pub trace_hooks: bool,
}

pub async fn run(action: DevAction) -> Result<()> {
    let cwd = action.cwd.canonicalize().into_diagnostic()?;

    let file_config = match load_config(&cwd, action.config.as_deref()).map_err(diagnostic)? {
        Some((config_path, config)) => {
            let rel_path = config_path.strip_prefix(&cwd).unwrap_or(&config_path);
            info!(path = %rel_path.display(), "Loaded config");
            config
        }
        None => AnodeConfig::default(),
    };

    let (port, host) = resolve_listen(&action, &file_config);

    let binary = match &file_config.electron.binary {
        Some(binary) => cwd.join(binary),
        None => resolve_electron_binary(&cwd).map_err(diagnostic)?,
    };
    debug!(binary = %binary.display(), "Using Electron binary");

    let (events, rx) = supervisor::channel();
    let spec = LaunchSpec::new(binary, &cwd).with_args(file_config.electron.args.clone());
    let coordinator = Coordinator::new(TokioSpawner::new(events.clone()), spec)
        .with_await_exit(file_config.electron.await_exit);
    let mut supervisor_task = tokio::spawn(supervisor::run(coordinator, rx));

    let build: Arc<dyn BuildService> = Arc::new(CommandBuildService::new(&cwd));
    let build_plugins: Vec<Arc<dyn Plugin>> = if action.trace_hooks {
        vec![Arc::new(TracePlugin)]
    } else {
        Vec::new()
    };
    let electron = ElectronPlugin::with_build_plugins(
        &cwd,
        file_config.build.clone(),
        build,
        events.clone(),
        build_plugins,
    );

    let mut plugins = PluginContainer::new(cwd.clone());
    if action.trace_hooks {
        plugins.add(Arc::new(TracePlugin));
    }
    plugins.add(Arc::new(electron.clone()));
    debug!(plugins = ?plugins.names(), "Plugins registered");

    let mut dev_config = DevConfig {
        root: cwd.clone(),
        port,
        host,
        mode: action.mode.clone(),
    };
    plugins
        .call_config(&mut dev_config)
        .map_err(|e| diagnostic(e.into()))?;
    plugins
        .call_config_resolved(&dev_config)
        .map_err(|e| diagnostic(e.into()))?;

    let mut server = ServerContext::new(cwd.clone(), dev_config.clone());
    plugins
        .call_configure_server(&mut server)
        .map_err(|e| diagnostic(e.into()))?;
    debug!(
        hooks = server.pending_listening_hooks(),
        "Listening hooks registered"
    );

    let host_ip = if dev_config.host == DEFAULT_HOST {
        "127.0.0.1".to_string()
    } else {
        dev_config.host.clone()
    };
    let listener = tokio::net::TcpListener::bind((host_ip.as_str(), dev_config.port))
        .await
        .into_diagnostic()?;
    let local_addr = listener.local_addr().into_diagnostic()?;

    let app = Router::new().fallback_service(ServeDir::new(&cwd));
    let mut server_task = tokio::spawn(async move { axum::serve(listener, app).await });

    println!();
    println!("  Dev server running at http://{local_addr}");
    println!("  Press Ctrl+C to stop");
    println!();

    if let Err(e) = server.notify_listening(local_addr) {
        events.shutdown();
        let _ = supervisor_task.await;
        server_task.abort();
        return Err(diagnostic(Error::from(e)));
    }

    let outcome = tokio::select! {
        res = &mut supervisor_task => res,
        res = &mut server_task => {
            match res {
                Ok(Err(e)) => warn!(error = %e, "Dev server stopped"),
                Err(e) => warn!(error = %e, "Dev server task failed"),
                Ok(Ok(())) => warn!("Dev server stopped"),
            }
            events.shutdown();
            supervisor_task.await
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            events.shutdown();
            supervisor_task.await
        }
    };

    electron.stop_build();
    server_task.abort();

    match outcome.into_diagnostic()? {
        Ok(SupervisorExit::ApplicationClosed { code }) => {
            info!(code, "Application closed, stopping dev server");
            Ok(())
        }
        Ok(SupervisorExit::Stopped) => Ok(()),
        Err(e) => Err(diagnostic(e)),
    }
}

/// Listen address: CLI flags win over the config file, which wins over the defaults.
fn resolve_listen(action: &DevAction, file_config: &AnodeConfig) -> (u16, String) {
    let port = action
        .port
        .or(file_config.server.port)
        .unwrap_or(DEFAULT_PORT);
    let host = action
        .host
        .clone()
        .or_else(|| file_config.server.host.clone())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    (port, host)
}
