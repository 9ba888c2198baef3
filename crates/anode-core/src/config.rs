//! Build and project configuration.
//!
//! [`BuildConfig`] describes the main-process build. It starts from
//! defaults, caller overrides are deep-merged onto it with
//! [`merge_config`], and the result is validated before any build starts.
//!
//! The project file `anode.config.json` is optional:
//!
//! ```json
//! {
//!   "server": { "port": 5173, "host": "localhost" },
//!   "build": { "entry": "electron/main.ts", "external": ["sqlite3"] },
//!   "electron": { "args": ["."], "awaitExit": true }
//! }
//! ```

use crate::error::Error;
use crate::externals::ExternalRule;
use crate::plugin::Plugin;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Config file names in priority order.
const CONFIG_FILES: &[&str] = &["anode.config.json", ".anoderc.json"];

/// Default main-process entry point.
pub const DEFAULT_ENTRY: &str = "electron/main.ts";

/// Default output directory for the main-process bundle.
pub const DEFAULT_OUT_DIR: &str = "dist-electron";

/// Default watch coalescing window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// Output module format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Cjs,
    Esm,
    Iife,
}

impl OutputFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cjs => "cjs",
            Self::Esm => "esm",
            Self::Iife => "iife",
        }
    }
}

/// One or many entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryPoints {
    Single(String),
    Many(Vec<String>),
}

impl EntryPoints {
    /// Entry points as a list.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(entry) => vec![entry.clone()],
            Self::Many(entries) => entries.clone(),
        }
    }
}

impl Default for EntryPoints {
    fn default() -> Self {
        Self::Single(DEFAULT_ENTRY.to_string())
    }
}

/// Watch-mode options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchOptions {
    /// Directories to watch. Empty = the project root.
    pub include: Vec<PathBuf>,
    /// Path fragments to ignore.
    pub exclude: Vec<String>,
    /// Coalescing window for change events.
    pub debounce_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Main-process build configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    /// Entry point(s).
    pub entry: EntryPoints,
    /// Output formats.
    pub formats: Vec<OutputFormat>,
    /// Output file name template.
    pub file_name: String,
    /// Output directory.
    pub out_dir: PathBuf,
    /// Clear the output directory before building. Off: several builds
    /// share one output tree.
    pub empty_out_dir: bool,
    /// Minify output.
    pub minify: bool,
    /// Watch mode; `None` builds once.
    pub watch: Option<WatchOptions>,
    /// Modules to leave unbundled.
    pub external: ExternalRule,
    /// Build command argv. `None` derives an esbuild invocation.
    pub command: Option<Vec<String>>,
    /// Build mode.
    pub mode: Option<String>,
    /// Extra environment for the build.
    pub env: BTreeMap<String, String>,
    /// Build plugins (not serialized).
    #[serde(skip)]
    pub plugins: Vec<Arc<dyn Plugin>>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            entry: EntryPoints::default(),
            formats: vec![OutputFormat::Cjs],
            file_name: "[name].js".to_string(),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            empty_out_dir: false,
            minify: false,
            watch: Some(WatchOptions::default()),
            external: ExternalRule::Absent,
            command: None,
            mode: None,
            env: BTreeMap::new(),
            plugins: Vec::new(),
        }
    }
}

impl fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfig")
            .field("entry", &self.entry)
            .field("formats", &self.formats)
            .field("file_name", &self.file_name)
            .field("out_dir", &self.out_dir)
            .field("empty_out_dir", &self.empty_out_dir)
            .field("minify", &self.minify)
            .field("watch", &self.watch)
            .field("external", &self.external)
            .field("command", &self.command)
            .field("mode", &self.mode)
            .field("env", &self.env)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl BuildConfig {
    /// Apply `overrides` on top of the defaults.
    pub fn from_overrides(overrides: &serde_json::Value) -> Result<Self, Error> {
        let defaults = serde_json::to_value(Self::default()).map_err(Error::BuildConfig)?;
        let merged = merge_config(&defaults, overrides);
        serde_json::from_value(merged).map_err(Error::BuildConfig)
    }

    /// Entry points as a list.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entry.to_vec()
    }

    /// Fail fast on configurations that can never build.
    pub fn validate(&self, root: &Path) -> Result<(), Error> {
        let entries = self.entries();
        if entries.is_empty() || entries.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::MissingEntry);
        }
        for entry in &entries {
            let path = root.join(entry);
            if !path.is_file() {
                return Err(Error::EntryNotFound { path });
            }
        }
        Ok(())
    }

    /// Directories watch mode should observe.
    ///
    /// Without `include` this is the project root; outDir, `node_modules`,
    /// `.git` and `exclude` are dropped later by the ignore filter.
    #[must_use]
    pub fn watch_roots(&self, root: &Path) -> Vec<PathBuf> {
        let include = self
            .watch
            .as_ref()
            .map(|w| w.include.clone())
            .unwrap_or_default();

        if include.is_empty() {
            return vec![root.to_path_buf()];
        }

        let mut roots: Vec<PathBuf> = include.iter().map(|p| root.join(p)).collect();
        roots.sort();
        roots.dedup();
        roots
    }
}

/// Deep-merge `overrides` onto `defaults`.
///
/// Objects merge key by key, two arrays concatenate, `null` overrides are
/// ignored, and any other conflict is won by the override.
#[must_use]
pub fn merge_config(
    defaults: &serde_json::Value,
    overrides: &serde_json::Value,
) -> serde_json::Value {
    use serde_json::Value;

    match (defaults, overrides) {
        (_, Value::Null) => defaults.clone(),
        (Value::Object(base), Value::Object(over)) => {
            let mut merged = base.clone();
            for (key, value) in over {
                if value.is_null() {
                    continue;
                }
                let next = match base.get(key) {
                    Some(existing) => merge_config(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (Value::Array(base), Value::Array(over)) => {
            Value::Array(base.iter().chain(over.iter()).cloned().collect())
        }
        (_, other) => other.clone(),
    }
}

/// Dev server settings from the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: Option<u16>,
    /// Host to bind to.
    pub host: Option<String>,
}

/// How the Electron application is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElectronOptions {
    /// Explicit path to the Electron binary.
    pub binary: Option<PathBuf>,
    /// Arguments passed to the binary.
    pub args: Vec<String>,
    /// Wait for the old instance to exit before starting the next one.
    pub await_exit: bool,
}

impl Default for ElectronOptions {
    fn default() -> Self {
        Self {
            binary: None,
            args: vec![".".to_string()],
            await_exit: true,
        }
    }
}

/// Contents of `anode.config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnodeConfig {
    /// Dev server settings.
    pub server: ServerConfig,
    /// Build overrides, merged onto [`BuildConfig::default`].
    pub build: serde_json::Value,
    /// Application launch settings.
    pub electron: ElectronOptions,
}

/// Find a config file in the given root directory.
pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.exists())
}

/// Load configuration from the given root directory.
///
/// If `config_path` is `Some`, use that specific file. Otherwise, auto-discover.
pub fn load_config(
    root: &Path,
    config_path: Option<&Path>,
) -> Result<Option<(PathBuf, AnodeConfig)>, Error> {
    let path = match config_path {
        Some(p) => {
            let abs = if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            };
            if !abs.exists() {
                return Err(Error::ConfigRead {
                    path: abs,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            abs
        }
        None => match find_config_file(root) {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    let source = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
        path: path.clone(),
        source,
    })?;
    let config = serde_json::from_str(&source).map_err(|source| Error::ConfigParse {
        path: path.clone(),
        source,
    })?;

    Ok(Some((path, config)))
}
