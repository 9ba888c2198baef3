// Build script for anode-core.
// Records the git revision shown by `anode version` when built from a checkout.

use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=ANODE_BUILD_GIT_HASH");
    if std::env::var_os("ANODE_BUILD_GIT_HASH").is_some() {
        return;
    }

    let head = Path::new("../../.git/HEAD");
    if head.exists() {
        println!("cargo:rerun-if-changed={}", head.display());
    }

    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output();
    if let Ok(output) = output {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !hash.is_empty() {
            println!("cargo:rustc-env=ANODE_BUILD_GIT_HASH={hash}");
        }
    }
}
