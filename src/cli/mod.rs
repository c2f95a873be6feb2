//! Command line interface for service_updater.
//!
//! Argument parsing, colored output and the two commands: `update` (the
//! default) and the internal `restart`.

mod args;
pub mod commands;
mod output;

pub use args::{Args, Command, RestartArgs, UpdateArgs};
pub use commands::execute_command;
pub use output::OutputManager;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}
