//! Restart command implementation.
//!
//! This is the body of the detached restart process: it runs the whole
//! stop / wait / start sequence in the foreground and exits.

use crate::cli::{OutputManager, RestartArgs};
use crate::error::Result;
use crate::service::{RestartPlan, SystemdServiceManager, run_restart_sequence};
use std::time::Duration;

/// Execute restart command
pub(super) async fn execute_restart(args: &RestartArgs, output: &OutputManager) -> Result<()> {
    let service = SystemdServiceManager::new(args.service.clone(), !args.no_sudo);
    let plan = RestartPlan {
        port: args.port,
        delay: Duration::from_millis(args.delay_ms),
        poll_attempts: args.poll_attempts,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
    };

    output.progress(&format!(
        "Restarting '{}' in {:.1}s",
        args.service,
        plan.delay.as_secs_f64()
    ));
    let report = run_restart_sequence(&service, &plan).await?;

    if report.port_released {
        output.success(&format!("Restarted '{}'", args.service));
    } else {
        output.warn(&format!(
            "Started '{}' although port {} was still in use after {} check(s)",
            args.service, plan.port, report.polls
        ));
    }
    Ok(())
}
