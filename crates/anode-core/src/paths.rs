//! Binary resolution for the tools anode drives.

use crate::error::Error;
use std::path::{Path, PathBuf};

/// Overrides the directory holding the Electron distribution.
pub const ELECTRON_OVERRIDE_DIST_PATH_ENV: &str = "ELECTRON_OVERRIDE_DIST_PATH";

/// Platform default name of the Electron executable inside its dist dir.
fn electron_executable_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "Electron.app/Contents/MacOS/Electron"
    } else if cfg!(windows) {
        "electron.exe"
    } else {
        "electron"
    }
}

/// Locate the Electron binary for the project at `root`.
///
/// Resolution order matches the `electron` npm package:
/// 1. `$ELECTRON_OVERRIDE_DIST_PATH/<name from path.txt or "electron">`
/// 2. `node_modules/electron/dist/<path.txt>`, walking up from `root`
/// 3. `electron` on PATH
pub fn resolve_electron_binary(root: &Path) -> Result<PathBuf, Error> {
    let package_dir = root
        .ancestors()
        .map(|dir| dir.join("node_modules").join("electron"))
        .find(|dir| dir.is_dir());

    let executable = package_dir.as_ref().and_then(|dir| {
        std::fs::read_to_string(dir.join("path.txt"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    });

    if let Ok(dist) = std::env::var(ELECTRON_OVERRIDE_DIST_PATH_ENV) {
        let name = executable.as_deref().unwrap_or(electron_executable_name());
        return Ok(PathBuf::from(dist).join(name));
    }

    if let (Some(dir), Some(executable)) = (&package_dir, &executable) {
        let candidate = dir.join("dist").join(executable);
        if candidate.exists() {
            return Ok(dunce::simplified(&candidate).to_path_buf());
        }
    }

    which::which("electron").map_err(|_| Error::ElectronNotFound {
        start: root.to_path_buf(),
    })
}

/// Locate a tool binary in `node_modules/.bin` (walking up from `root`) or PATH.
pub fn resolve_bin(root: &Path, name: &str) -> Result<PathBuf, Error> {
    let names: Vec<String> = if cfg!(windows) {
        vec![format!("{name}.cmd"), format!("{name}.exe"), name.to_string()]
    } else {
        vec![name.to_string()]
    };

    for dir in root.ancestors() {
        let bin_dir = dir.join("node_modules").join(".bin");
        if !bin_dir.is_dir() {
            continue;
        }
        if let Some(found) = names.iter().map(|n| bin_dir.join(n)).find(|p| p.exists()) {
            return Ok(found);
        }
    }

    which::which(name).map_err(|_| Error::BuildToolNotFound {
        name: name.to_string(),
    })
}
