pub mod dev;
pub mod externals;
pub mod version;

use anode_core::Error;

/// Hint attached to configuration failures.
const CONFIG_HELP: &str = "fix anode.config.json or point --config at another file";

/// Convert a core error into a diagnostic carrying its stable code.
pub fn diagnostic(err: Error) -> miette::Report {
    if err.is_config_error() {
        miette::miette!(code = err.code(), help = CONFIG_HELP, "{err}")
    } else {
        miette::miette!(code = err.code(), "{err}")
    }
}
