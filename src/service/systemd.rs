//! `ServiceManager` backed by systemctl.

use crate::error::{Result, ServiceError};
use crate::process::{self, CommandSpec};
use crate::service::{ServiceManager, port_in_use};
use std::path::Path;
use std::time::Duration;

/// Timeout for the connect fallback of a single port probe
const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Stops and starts a systemd unit, optionally through non-interactive sudo
#[derive(Debug, Clone)]
pub struct SystemdServiceManager {
    unit: String,
    use_sudo: bool,
}

impl SystemdServiceManager {
    /// Manage `unit`
    pub fn new(unit: impl Into<String>, use_sudo: bool) -> Self {
        Self {
            unit: unit.into(),
            use_sudo,
        }
    }

    /// Command line for `systemctl <action> <unit>`
    pub fn systemctl(&self, action: &str) -> CommandSpec {
        if self.use_sudo {
            CommandSpec::new("sudo", ["-n", "systemctl", action, self.unit.as_str()])
        } else {
            CommandSpec::new("systemctl", [action, self.unit.as_str()])
        }
    }

    async fn run_action(&self, action: &str) -> std::result::Result<(), String> {
        let spec = self.systemctl(action);
        log::info!("{}", spec);
        let output = process::run_captured(&spec, Path::new("/"))
            .await
            .map_err(|e| e.to_string())?;
        if output.success() {
            Ok(())
        } else {
            Err(output.failure_reason())
        }
    }
}

impl ServiceManager for SystemdServiceManager {
    fn service_name(&self) -> &str {
        &self.unit
    }

    async fn stop(&self) -> Result<()> {
        self.run_action("stop")
            .await
            .map_err(|reason| ServiceError::Stop {
                service: self.unit.clone(),
                reason,
            })?;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.run_action("start")
            .await
            .map_err(|reason| ServiceError::Start {
                service: self.unit.clone(),
                reason,
            })?;
        Ok(())
    }

    async fn is_port_in_use(&self, port: u16) -> bool {
        port_in_use(port, PROBE_TIMEOUT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_systemctl_command_lines() {
        let sudo = SystemdServiceManager::new("app", true);
        assert_eq!(sudo.systemctl("stop").to_string(), "sudo -n systemctl stop app");

        let direct = SystemdServiceManager::new("app", false);
        assert_eq!(direct.systemctl("start").to_string(), "systemctl start app");
        assert_eq!(direct.service_name(), "app");
    }
}
