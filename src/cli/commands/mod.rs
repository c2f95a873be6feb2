//! Command execution.
//!
//! Each command reports its own progress; this module turns failures into a
//! printed message, recovery suggestions and an exit status.

mod restart;
mod update;

use crate::cli::{Args, Command, OutputManager};
use crate::error::{CliError, Result, UpdateError};

use restart::execute_restart;
use update::execute_update;

/// Execute the command selected by the parsed arguments
pub async fn execute_command(args: Args) -> Result<i32> {
    if let Err(reason) = args.validate() {
        let err = UpdateError::from(CliError::InvalidArguments { reason });
        return Ok(report_failure("command line", &err, &OutputManager::new(false)));
    }

    let command = args.into_command();
    let quiet = matches!(&command, Command::Update(update) if update.quiet);
    let output = OutputManager::new(quiet);

    let (name, result) = match command {
        Command::Update(update) => ("update", execute_update(&update, &output).await),
        Command::Restart(restart) => ("restart", execute_restart(&restart, &output).await),
    };

    match result {
        Ok(()) => Ok(0),
        Err(e) => Ok(report_failure(name, &e, &output)),
    }
}

/// Print `err` with its recovery suggestions and return the exit status
fn report_failure(name: &str, err: &UpdateError, output: &OutputManager) -> i32 {
    output.error(&format!("{} failed: {}", name, err));

    if err.leaves_tree_advanced() {
        output.error("Source tree left ahead of the running build");
    }

    let suggestions = err.recovery_suggestions();
    if !suggestions.is_empty() && !output.is_quiet() {
        output.println("\n💡 Recovery suggestions:");
        for suggestion in suggestions {
            output.indent(&format!("• {}", suggestion));
        }
    }

    err.exit_code()
}
