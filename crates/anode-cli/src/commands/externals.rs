//! `anode externals` command implementation.
//!
//! Prints the identifiers that are always left out of the main-process bundle.

use anode_core::externals::builtin_modules;
use miette::Result;

pub fn run(json: bool) -> Result<()> {
    let builtins = builtin_modules();

    if json {
        let externals: Vec<&str> = builtins.iter().collect();
        let output = serde_json::json!({
            "ok": true,
            "count": externals.len(),
            "externals": externals,
        });
        println!("{output}");
    } else {
        for id in builtins.iter() {
            println!("{id}");
        }
    }

    Ok(())
}
