//! Deferred service restart.
//!
//! The restart is the last step of an update and the one the updater never
//! observes: the process that asked for the update is usually a child of the
//! service being restarted, so nothing in it would live to see the result.
//! A [`RestartScheduler`] therefore launches [`run_restart_sequence`] and
//! returns immediately.

use crate::config::{RestartLauncher, ServiceConfig};
use crate::error::{Result, ServiceError};
use crate::process::{self, CommandSpec};
use crate::service::ServiceManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Timing and target of a deferred restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPlan {
    /// Port that must be released before starting again
    pub port: u16,
    /// Wait before stopping, so the caller can finish returning its output
    pub delay: Duration,
    /// Maximum number of port checks after stopping
    pub poll_attempts: u32,
    /// Wait between port checks
    pub poll_interval: Duration,
}

impl RestartPlan {
    /// Plan built from service settings
    pub fn from_config(service: &ServiceConfig) -> Self {
        Self {
            port: service.port,
            delay: service.restart_delay(),
            poll_attempts: service.port_poll_attempts,
            poll_interval: service.port_poll_interval(),
        }
    }
}

/// What the restart sequence observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartReport {
    /// Whether the port was seen released before starting
    pub port_released: bool,
    /// Number of port checks performed
    pub polls: u32,
}

/// Delay, stop, wait for the port to be released, start.
///
/// The service is started even when the port was never seen released within
/// the plan's attempts; a stop failure aborts before anything else happens.
pub async fn run_restart_sequence<S: ServiceManager>(
    service: &S,
    plan: &RestartPlan,
) -> Result<RestartReport> {
    if !plan.delay.is_zero() {
        tokio::time::sleep(plan.delay).await;
    }

    log::info!("stopping service '{}'", service.service_name());
    service.stop().await?;

    let mut polls = 0;
    let mut port_released = false;
    while polls < plan.poll_attempts {
        polls += 1;
        if !service.is_port_in_use(plan.port).await {
            port_released = true;
            break;
        }
        if polls < plan.poll_attempts {
            tokio::time::sleep(plan.poll_interval).await;
        }
    }

    if port_released {
        log::info!("port {} released after {} check(s)", plan.port, polls);
    } else {
        log::warn!(
            "port {} still in use after {} check(s), starting anyway",
            plan.port,
            polls
        );
    }

    log::info!("starting service '{}'", service.service_name());
    service.start().await?;

    Ok(RestartReport {
        port_released,
        polls,
    })
}

/// Launches a restart without waiting for it
pub trait RestartScheduler {
    /// Launch the restart described by `plan` and return as soon as it is running
    fn schedule(&self, plan: &RestartPlan) -> Result<()>;
}

/// Runs the restart sequence as a tokio task in this process.
///
/// Suitable when the calling process outlives the update call. The task is
/// intentionally unsupervised: its join handle is dropped and its outcome is
/// only logged.
#[derive(Debug)]
pub struct InProcessRestart<S> {
    service: Arc<S>,
}

impl<S> InProcessRestart<S> {
    /// Restart `service` from a background task
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

impl<S> RestartScheduler for InProcessRestart<S>
where
    S: ServiceManager + Send + Sync + 'static,
{
    fn schedule(&self, plan: &RestartPlan) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| ServiceError::Launch {
            service: self.service.service_name().to_string(),
            reason: e.to_string(),
        })?;

        let service = Arc::clone(&self.service);
        let plan = plan.clone();
        let _unsupervised = handle.spawn(async move {
            match run_restart_sequence(service.as_ref(), &plan).await {
                Ok(report) => log::info!(
                    "restart of '{}' finished (port released: {})",
                    service.service_name(),
                    report.port_released
                ),
                Err(e) => log::error!("restart of '{}' failed: {}", service.service_name(), e),
            }
        });
        Ok(())
    }
}

/// How the detached restart process is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launcher {
    /// Plain child in its own process group
    ProcessGroup,
    /// Transient systemd unit, outside the service's cgroup
    SystemdRun {
        /// Run systemd-run through `sudo -n`
        use_sudo: bool,
    },
}

/// Runs the restart sequence in a separate process that outlives this one.
///
/// The process is this executable's hidden `restart` subcommand. It is not
/// waited on.
#[derive(Debug, Clone)]
pub struct DetachedRestart {
    executable: PathBuf,
    service: String,
    use_sudo: bool,
    launcher: Launcher,
    log_file: PathBuf,
}

impl DetachedRestart {
    /// Restart via `executable restart ...` using the given service settings
    pub fn new(executable: impl Into<PathBuf>, service: &ServiceConfig) -> Self {
        let launcher = match service.launcher {
            RestartLauncher::SystemdRun => Launcher::SystemdRun {
                use_sudo: service.use_sudo,
            },
            RestartLauncher::ProcessGroup => Launcher::ProcessGroup,
        };
        let log_file = service
            .restart_log
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("service_updater-restart.log"));

        Self {
            executable: executable.into(),
            service: service.name.clone(),
            use_sudo: service.use_sudo,
            launcher,
            log_file,
        }
    }

    /// Restart via the currently running executable
    pub fn for_current_exe(service: &ServiceConfig) -> Result<Self> {
        let executable = std::env::current_exe().map_err(|e| ServiceError::Launch {
            service: service.name.clone(),
            reason: format!("cannot locate own executable: {}", e),
        })?;
        Ok(Self::new(executable, service))
    }

    /// Log file receiving the detached process output
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Arguments of the hidden `restart` subcommand for `plan`
    pub fn restart_args(&self, plan: &RestartPlan) -> Vec<String> {
        let mut args = vec![
            "restart".to_string(),
            "--service".to_string(),
            self.service.clone(),
            "--port".to_string(),
            plan.port.to_string(),
            "--delay-ms".to_string(),
            plan.delay.as_millis().to_string(),
            "--poll-attempts".to_string(),
            plan.poll_attempts.to_string(),
            "--poll-interval-ms".to_string(),
            plan.poll_interval.as_millis().to_string(),
        ];
        if !self.use_sudo {
            args.push("--no-sudo".to_string());
        }
        args
    }

    /// Full command line that launches the restart
    pub fn command_line(&self, plan: &RestartPlan) -> CommandSpec {
        let executable = self.executable.display().to_string();
        let restart_args = self.restart_args(plan);

        match self.launcher {
            Launcher::ProcessGroup => CommandSpec::new(executable, restart_args),
            Launcher::SystemdRun { use_sudo } => {
                let mut args = vec![
                    "--quiet".to_string(),
                    "--collect".to_string(),
                    format!("--unit={}-restart-{}", self.service, std::process::id()),
                    "--setenv=RUST_LOG=info".to_string(),
                    executable,
                ];
                args.extend(restart_args);
                if use_sudo {
                    let mut sudo_args = vec!["-n".to_string(), "systemd-run".to_string()];
                    sudo_args.extend(args);
                    CommandSpec::new("sudo", sudo_args)
                } else {
                    CommandSpec::new("systemd-run", args)
                }
            }
        }
    }
}

impl RestartScheduler for DetachedRestart {
    fn schedule(&self, plan: &RestartPlan) -> Result<()> {
        let spec = self.command_line(plan);
        let pid = process::spawn_detached(&spec, Path::new("/"), &self.log_file).map_err(|e| {
            ServiceError::Launch {
                service: self.service.clone(),
                reason: e.to_string(),
            }
        })?;
        log::info!(
            "detached restart launched (pid {}, log {}): {}",
            pid,
            self.log_file.display(),
            spec
        );
        Ok(())
    }
}
