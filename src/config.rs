//! Layered configuration for the updater.
//!
//! Built-in defaults describe a Mix project served by a systemd unit on port
//! 4000. A TOML file can override any of them; command line flags (and the
//! `PORT` environment variable, via clap) are applied on top by the CLI.

use crate::error::ConfigError;
use crate::process::CommandSpec;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the repository root
pub const REPO_CONFIG_FILE: &str = "service_updater.toml";

/// Placeholder replaced with the new revision in `commands.mark_updating`
pub const REVISION_PLACEHOLDER: &str = "{revision}";

/// Upper bound on port release polls
pub const MAX_PORT_POLL_ATTEMPTS: u32 = 600;

/// Complete updater configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Checkout being updated
    pub repository: RepositoryConfig,
    /// Build tool command lines
    pub commands: CommandsConfig,
    /// Service restart settings
    pub service: ServiceConfig,
}

/// Repository settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Path to the work tree
    pub path: PathBuf,
    /// Remote to fetch from
    pub remote: String,
    /// Branch on the remote to rebase onto
    pub branch: String,
    /// Dependency lock file, relative to the work tree
    pub lock_file: PathBuf,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            remote: "origin".to_string(),
            branch: "main".to_string(),
            lock_file: PathBuf::from("mix.lock"),
        }
    }
}

/// Build tool command lines, argv style
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsConfig {
    /// Fetch dependencies
    pub dependencies: Vec<String>,
    /// Compile
    pub build: Vec<String>,
    /// Apply pending schema migrations
    pub migrate: Vec<String>,
    /// Record the new revision as updating; must mention `{revision}`
    pub mark_updating: Vec<String>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            dependencies: argv(&["mix", "deps.get"]),
            build: argv(&["mix", "compile"]),
            migrate: argv(&["mix", "ecto.migrate"]),
            mark_updating: argv(&["mix", "service.mark_updating", REVISION_PLACEHOLDER]),
        }
    }
}

/// Service restart settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// systemd unit name
    pub name: String,
    /// Port the service listens on
    pub port: u16,
    /// Run systemctl through `sudo -n`
    pub use_sudo: bool,
    /// How the detached restart process is launched
    pub launcher: RestartLauncher,
    /// Delay before stopping, in milliseconds
    pub restart_delay_ms: u64,
    /// Maximum number of port release checks
    pub port_poll_attempts: u32,
    /// Interval between port release checks, in milliseconds
    pub port_poll_interval_ms: u64,
    /// Where the detached restart writes its log
    pub restart_log: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            port: 4000,
            use_sudo: true,
            launcher: RestartLauncher::default(),
            restart_delay_ms: 2000,
            port_poll_attempts: 30,
            port_poll_interval_ms: 500,
            restart_log: None,
        }
    }
}

/// Launcher for the detached restart process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartLauncher {
    /// Transient unit via `systemd-run`, outside the cgroup of the service
    /// being stopped. Required when the updater runs inside that service.
    #[default]
    SystemdRun,
    /// Child in its own process group. Only survives the stop when the
    /// updater runs outside the service's cgroup.
    ProcessGroup,
}

impl ServiceConfig {
    /// Delay before stopping
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Interval between port checks
    pub fn port_poll_interval(&self) -> Duration {
        Duration::from_millis(self.port_poll_interval_ms)
    }
}

/// A configuration together with the file it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Parsed configuration
    pub config: UpdaterConfig,
    /// File it was read from, `None` when only defaults apply
    pub source: Option<PathBuf>,
}

impl UpdaterConfig {
    /// Parse a TOML document
    pub fn from_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read and parse the file at `path`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents, path)
    }

    /// Locate and load configuration.
    ///
    /// An explicit path must exist. Otherwise `<repo_dir>/service_updater.toml`
    /// and then `<config dir>/service_updater/config.toml` are tried, falling
    /// back to defaults when neither exists.
    pub fn load(explicit: Option<&Path>, repo_dir: &Path) -> Result<LoadedConfig, ConfigError> {
        if let Some(path) = explicit {
            return Ok(LoadedConfig {
                config: Self::from_file(path)?,
                source: Some(path.to_path_buf()),
            });
        }

        let candidates = std::iter::once(repo_dir.join(REPO_CONFIG_FILE)).chain(
            dirs::config_dir().map(|dir| dir.join("service_updater").join("config.toml")),
        );

        for candidate in candidates {
            if candidate.is_file() {
                log::debug!("using config file {}", candidate.display());
                return Ok(LoadedConfig {
                    config: Self::from_file(&candidate)?,
                    source: Some(candidate),
                });
            }
        }

        Ok(LoadedConfig {
            config: Self::default(),
            source: None,
        })
    }

    /// Check every value before anything touches the repository
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.repository.remote.trim().is_empty() {
            return Err(invalid("repository.remote", "must not be empty"));
        }
        if self.repository.branch.trim().is_empty() {
            return Err(invalid("repository.branch", "must not be empty"));
        }
        if self.repository.lock_file.as_os_str().is_empty() {
            return Err(invalid("repository.lock_file", "must not be empty"));
        }

        self.command_specs()?;
        if !self.commands.mark_updating.iter().any(|arg| arg.contains(REVISION_PLACEHOLDER)) {
            return Err(invalid(
                "commands.mark_updating",
                "must contain the {revision} placeholder",
            ));
        }

        if self.service.name.trim().is_empty() {
            return Err(invalid("service.name", "must not be empty"));
        }
        if self.service.port == 0 {
            return Err(invalid("service.port", "must be non-zero"));
        }
        if !(1..=MAX_PORT_POLL_ATTEMPTS).contains(&self.service.port_poll_attempts) {
            return Err(ConfigError::Invalid {
                field: "service.port_poll_attempts".to_string(),
                reason: format!("must be between 1 and {}", MAX_PORT_POLL_ATTEMPTS),
            });
        }

        Ok(())
    }

    /// Command specs for the four build steps
    pub fn command_specs(&self) -> Result<BuildCommands, ConfigError> {
        Ok(BuildCommands {
            dependencies: CommandSpec::from_argv(
                "commands.dependencies",
                &self.commands.dependencies,
            )?,
            build: CommandSpec::from_argv("commands.build", &self.commands.build)?,
            migrate: CommandSpec::from_argv("commands.migrate", &self.commands.migrate)?,
            mark_updating: CommandSpec::from_argv(
                "commands.mark_updating",
                &self.commands.mark_updating,
            )?,
        })
    }
}

/// Parsed build step commands
#[derive(Debug, Clone)]
pub struct BuildCommands {
    /// Fetch dependencies
    pub dependencies: CommandSpec,
    /// Compile
    pub build: CommandSpec,
    /// Migrate
    pub migrate: CommandSpec,
    /// Mark updating (still containing the placeholder)
    pub mark_updating: CommandSpec,
}
