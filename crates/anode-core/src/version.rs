use std::fmt::Write;

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git revision this binary was built from, set by the build script.
pub const GIT_HASH: Option<&str> = option_env!("ANODE_BUILD_GIT_HASH");

/// Returns a formatted version string including build metadata if available.
#[must_use]
pub fn version_string() -> String {
    format_version(GIT_HASH)
}

fn format_version(hash: Option<&str>) -> String {
    let mut s = format!("anode {VERSION}");

    if let Some(hash) = hash {
        let _ = write!(s, " ({hash})");
    }

    s
}
