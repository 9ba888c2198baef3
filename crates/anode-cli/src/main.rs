#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::unnecessary_wraps)]

mod commands;
mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "anode")]
#[command(author, version, about = "Electron main-process dev loop driver", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Serve the renderer and run the Electron app, restarting it on main-process changes
    Dev {
        /// Port to listen on [default: 5173, or `server.port` from the config file]
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// Host to bind to [default: localhost, or `server.host` from the config file]
        #[arg(long)]
        host: Option<String>,

        /// Mode (e.g. "development", "production"), propagated to the main-process build
        #[arg(long, short = 'm', default_value = "development")]
        mode: String,

        /// Path to config file (overrides auto-discovery)
        #[arg(long, short = 'c', value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// List the module identifiers never bundled into the main process
    Externals,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Externals) => commands::externals::run(cli.json),
        Some(Commands::Dev {
            port,
            host,
            mode,
            config,
        }) => {
            let span = tracing::info_span!("dev", cmd = "dev", cwd = %cwd.display());
            let _guard = span.enter();

            let action = commands::dev::DevAction {
                cwd,
                port,
                host,
                mode,
                config,
                trace_hooks: cli.verbose > 0,
            };
            let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
            rt.block_on(commands::dev::run(action))
        }
    }
}
