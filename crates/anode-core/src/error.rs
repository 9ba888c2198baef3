use crate::plugin::PluginError;
use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes.
///
/// All codes are SCREAMING_SNAKE_CASE and stable across versions.
pub mod codes {
    /// Config file could not be read.
    pub const CONFIG_READ: &str = "CONFIG_READ";
    /// Config file or build overrides are not valid JSON for their shape.
    pub const CONFIG_PARSE: &str = "CONFIG_PARSE";
    /// No entry point configured (or an empty one).
    pub const CONFIG_MISSING_ENTRY: &str = "CONFIG_MISSING_ENTRY";
    /// Entry point does not exist on disk.
    pub const CONFIG_ENTRY_NOT_FOUND: &str = "CONFIG_ENTRY_NOT_FOUND";
    /// External pattern is not a valid regular expression.
    pub const CONFIG_INVALID_PATTERN: &str = "CONFIG_INVALID_PATTERN";
    /// The Electron binary could not be located.
    pub const ELECTRON_NOT_FOUND: &str = "ELECTRON_NOT_FOUND";
    /// The build tool binary could not be located.
    pub const BUILD_TOOL_NOT_FOUND: &str = "BUILD_TOOL_NOT_FOUND";
    /// Spawning the application process failed.
    pub const SPAWN_FAILED: &str = "SPAWN_FAILED";
    /// File watcher could not be set up.
    pub const WATCH_FAILED: &str = "WATCH_FAILED";
    /// A plugin hook failed.
    pub const PLUGIN_ERROR: &str = "PLUGIN_ERROR";
    /// Generic I/O failure.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Core error type for anode operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid build configuration: {0}")]
    BuildConfig(#[source] serde_json::Error),

    #[error("No entry point configured for the main process build")]
    MissingEntry,

    #[error("Entry point not found: {}", path.display())]
    EntryNotFound { path: PathBuf },

    #[error("Invalid external pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },

    #[error("Electron binary not found from {} (install the `electron` package or set `electron.binary`)", start.display())]
    ElectronNotFound { start: PathBuf },

    #[error("Build tool `{name}` not found in node_modules/.bin or PATH")]
    BuildToolNotFound { name: String },

    #[error("Failed to spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File watcher failed: {0}")]
    Watch(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

impl Error {
    /// Stable code for this error (see [`codes`]).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => codes::IO_ERROR,
            Self::ConfigRead { .. } => codes::CONFIG_READ,
            Self::ConfigParse { .. } | Self::BuildConfig(_) => codes::CONFIG_PARSE,
            Self::MissingEntry => codes::CONFIG_MISSING_ENTRY,
            Self::EntryNotFound { .. } => codes::CONFIG_ENTRY_NOT_FOUND,
            Self::InvalidPattern { .. } => codes::CONFIG_INVALID_PATTERN,
            Self::ElectronNotFound { .. } => codes::ELECTRON_NOT_FOUND,
            Self::BuildToolNotFound { .. } => codes::BUILD_TOOL_NOT_FOUND,
            Self::Spawn { .. } => codes::SPAWN_FAILED,
            Self::Watch(_) => codes::WATCH_FAILED,
            Self::Plugin(_) => codes::PLUGIN_ERROR,
        }
    }

    /// Whether this error comes from configuration assembly.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        self.code().starts_with("CONFIG_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_codes_are_screaming_snake_case() {
        let codes = [
            codes::CONFIG_READ,
            codes::CONFIG_PARSE,
            codes::CONFIG_MISSING_ENTRY,
            codes::CONFIG_ENTRY_NOT_FOUND,
            codes::CONFIG_INVALID_PATTERN,
            codes::ELECTRON_NOT_FOUND,
            codes::BUILD_TOOL_NOT_FOUND,
            codes::SPAWN_FAILED,
            codes::WATCH_FAILED,
            codes::PLUGIN_ERROR,
            codes::IO_ERROR,
        ];

        for code in codes {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn test_config_errors_are_classified() {
        assert!(Error::MissingEntry.is_config_error());
        assert!(Error::EntryNotFound {
            path: PathBuf::from("electron/main.ts")
        }
        .is_config_error());

        let spawn = Error::Spawn {
            program: PathBuf::from("electron"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(!spawn.is_config_error());
        assert_eq!(spawn.code(), codes::SPAWN_FAILED);
    }
}
