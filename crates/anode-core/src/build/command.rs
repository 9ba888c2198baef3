//! Build service backed by an external command (esbuild by default).

use super::{BuildHandle, BuildService};
use crate::config::BuildConfig;
use crate::error::Error;
use crate::paths::resolve_bin;
use crate::plugin::PluginContainer;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The assembled build configuration, as JSON, for custom build commands.
pub const BUILD_CONFIG_ENV: &str = "ANODE_BUILD_CONFIG";

/// Build mode, when one is configured.
pub const MODE_ENV: &str = "ANODE_MODE";

/// Default bundler binary.
const ESBUILD: &str = "esbuild";

/// Directory names never worth rebuilding for.
const IGNORED_DIRS: &[&str] = &["node_modules", ".git"];

/// Runs the configured build command in the project root.
#[derive(Debug, Clone)]
pub struct CommandBuildService {
    root: PathBuf,
}

impl CommandBuildService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BuildService for CommandBuildService {
    fn watch(&self, config: BuildConfig) -> Result<BuildHandle, Error> {
        config.validate(&self.root)?;

        let runner = BuildRunner::new(&self.root, &config)?;

        let Some(options) = config.watch.clone() else {
            debug!("No watch options, building once");
            let task = tokio::spawn(async move {
                let mut runner = runner;
                runner.run().await;
            });
            return Ok(BuildHandle::new(task));
        };

        let filter = IgnoreFilter::new(&self.root, &config);
        let roots = config.watch_roots(&self.root);
        let (tx, rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let paths: Vec<PathBuf> = event
                        .paths
                        .into_iter()
                        .filter(|p| !filter.is_ignored(p))
                        .collect();
                    if !paths.is_empty() {
                        let _ = tx.send(paths);
                    }
                }
                Err(e) => {
                    error!(error = %e, "Watch error");
                }
            },
            Config::default(),
        )
        .map_err(|e| Error::Watch(e.to_string()))?;

        for root in &roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| Error::Watch(format!("{}: {e}", root.display())))?;
            info!(root = %root.display(), "Watching main process sources");
        }

        let debounce = Duration::from_millis(options.debounce_ms);
        let task = tokio::spawn(watch_loop(runner, rx, debounce));
        Ok(BuildHandle::new(task).with_guard(watcher))
    }
}

/// Decides which changed paths can trigger a rebuild.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    out_dirs: Vec<PathBuf>,
    exclude: Vec<String>,
}

impl IgnoreFilter {
    #[must_use]
    pub fn new(root: &Path, config: &BuildConfig) -> Self {
        // Watcher events carry canonical paths; keep both spellings of the root.
        let mut out_dirs = vec![root.join(&config.out_dir)];
        if let Ok(canonical) = dunce::canonicalize(root) {
            out_dirs.push(canonical.join(&config.out_dir));
        }
        out_dirs.dedup();

        let exclude = config
            .watch
            .as_ref()
            .map(|w| w.exclude.iter().filter(|e| !e.is_empty()).cloned().collect())
            .unwrap_or_default();

        Self { out_dirs, exclude }
    }

    /// Whether a change to `path` should be ignored.
    #[must_use]
    pub fn is_ignored(&self, path: &Path) -> bool {
        if self.out_dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }
        let in_ignored_dir = path.components().any(|c| match c {
            Component::Normal(name) => IGNORED_DIRS.iter().any(|d| name == *d),
            _ => false,
        });
        if in_ignored_dir {
            return true;
        }
        let display = path.to_string_lossy();
        self.exclude.iter().any(|fragment| display.contains(fragment.as_str()))
    }
}

/// Derive the esbuild arguments for `config`, one invocation per output format.
#[must_use]
pub fn esbuild_args(config: &BuildConfig) -> Vec<Vec<String>> {
    let (stem, extension) = match config.file_name.find('.') {
        Some(idx) => config.file_name.split_at(idx),
        None => (config.file_name.as_str(), ".js"),
    };

    if config.external.has_dynamic_parts() {
        debug!(
            rule = ?config.external,
            "External patterns and predicates cannot be passed to esbuild; forwarding identifiers only"
        );
    }
    let externals = config.external.ids();

    let multiple = config.formats.len() > 1;
    config
        .formats
        .iter()
        .enumerate()
        .map(|(idx, format)| {
            let mut args = config.entries();
            args.push("--bundle".to_string());
            args.push("--platform=node".to_string());
            args.push(format!("--format={}", format.as_str()));
            args.push(format!("--outdir={}", config.out_dir.display()));

            let entry_names = if multiple && idx > 0 {
                format!("{stem}-{}", format.as_str())
            } else {
                stem.to_string()
            };
            args.push(format!("--entry-names={entry_names}"));
            if extension != ".js" {
                args.push(format!("--out-extension:.js={extension}"));
            }
            if config.minify {
                args.push("--minify".to_string());
            }
            args.extend(externals.iter().map(|id| format!("--external:{id}")));
            args
        })
        .collect()
}

struct Invocation {
    program: PathBuf,
    args: Vec<String>,
}

/// Runs one build at a time and fires the build hooks around it.
struct BuildRunner {
    invocations: Vec<Invocation>,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
    plugins: PluginContainer,
    builds: u64,
}

impl BuildRunner {
    fn new(root: &Path, config: &BuildConfig) -> Result<Self, Error> {
        let invocations = match config.command.as_deref() {
            Some([program, args @ ..]) => vec![Invocation {
                program: resolve_program(root, program)?,
                args: args.to_vec(),
            }],
            _ => {
                let esbuild = resolve_bin(root, ESBUILD)?;
                esbuild_args(config)
                    .into_iter()
                    .map(|args| Invocation {
                        program: esbuild.clone(),
                        args,
                    })
                    .collect()
            }
        };

        let mut env = config.env.clone();
        env.insert(
            BUILD_CONFIG_ENV.to_string(),
            serde_json::to_string(config).map_err(Error::BuildConfig)?,
        );
        if let Some(mode) = &config.mode {
            env.insert(MODE_ENV.to_string(), mode.clone());
        }

        let mut plugins = PluginContainer::new(root.to_path_buf());
        for plugin in &config.plugins {
            plugins.add(plugin.clone());
        }
        plugins.set_watch(config.watch.is_some());

        Ok(Self {
            invocations,
            cwd: root.to_path_buf(),
            env,
            plugins,
            builds: 0,
        })
    }

    /// Run one build. Returns whether it succeeded.
    async fn run(&mut self) -> bool {
        self.builds += 1;
        let build = self.builds;
        let start = Instant::now();

        if let Err(e) = self.plugins.build_start() {
            error!(build, error = %e, "Build aborted by plugin");
            let _ = self.plugins.build_end(Some(e.to_string().as_str()));
            return false;
        }

        let failure = self.execute().await;

        if let Err(e) = self.plugins.build_end(failure.as_deref()) {
            error!(build, error = %e, "Build failed in plugin");
            return false;
        }

        if let Some(message) = failure {
            error!(build, error = %message, "Main process build failed");
            return false;
        }

        info!(
            build,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Main process built"
        );
        if let Err(e) = self.plugins.close_bundle() {
            warn!(build, error = %e, "close_bundle hook failed");
        }
        true
    }

    async fn execute(&self) -> Option<String> {
        for invocation in &self.invocations {
            debug!(
                program = %invocation.program.display(),
                args = ?invocation.args,
                "Running build command"
            );
            let status = Command::new(&invocation.program)
                .args(&invocation.args)
                .current_dir(&self.cwd)
                .envs(&self.env)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .status()
                .await;

            match status {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    return Some(format!(
                        "{} exited with {status}",
                        invocation.program.display()
                    ))
                }
                Err(e) => {
                    return Some(format!(
                        "failed to run {}: {e}",
                        invocation.program.display()
                    ))
                }
            }
        }
        None
    }
}

fn resolve_program(root: &Path, program: &str) -> Result<PathBuf, Error> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        Ok(root.join(path))
    } else {
        resolve_bin(root, program)
    }
}

async fn watch_loop(
    mut runner: BuildRunner,
    mut changes: mpsc::UnboundedReceiver<Vec<PathBuf>>,
    debounce: Duration,
) {
    runner.run().await;

    while let Some(first) = changes.recv().await {
        let mut changed: BTreeSet<PathBuf> = first.into_iter().collect();
        loop {
            match tokio::time::timeout(debounce, changes.recv()).await {
                Ok(Some(more)) => changed.extend(more),
                Ok(None) => return,
                Err(_) => break,
            }
        }

        info!(files = changed.len(), "Main process sources changed, rebuilding");
        debug!(changed = ?changed, "Changed files");
        runner.run().await;
    }
}
