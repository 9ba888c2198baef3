#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod build;
pub mod config;
pub mod electron;
pub mod endpoint;
pub mod error;
pub mod externals;
pub mod lifecycle;
pub mod paths;
pub mod plugin;
pub mod version;

pub use build::{BuildHandle, BuildService, CommandBuildService};
pub use config::{load_config, AnodeConfig, BuildConfig, ElectronOptions};
pub use electron::{assemble_build_config, ElectronPlugin, NotifierPlugin};
pub use endpoint::{EndpointListener, PublishedEndpoint, DEV_SERVER_URL_ENV};
pub use error::{codes, Error};
pub use externals::{builtin_modules, with_external_builtins, ExternalRule};
pub use lifecycle::{
    Coordinator, LaunchSpec, LifecycleState, SupervisorEvent, SupervisorExit, SupervisorHandle,
    TokioSpawner,
};
pub use version::VERSION;
