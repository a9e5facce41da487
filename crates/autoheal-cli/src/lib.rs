//! Autoheal CLI library
//!
//! Command-line surface for the autoheal engine. Every command prints one
//! JSON status payload on stdout; logs and progress notes go to stderr.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    Cli, ColorArg, Commands, HealArgs, MappingsByNameArgs, MappingsFromAppArgs, PlatformArg, PublishArgs,
    RunArgs, TextRenameArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity, DEFAULT_CONFIG};
pub use error::{CliError, CliResult};
pub use handlers::Context;
pub use output::{Reporter, Status, StatusPayload};
