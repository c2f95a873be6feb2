//! External command specs and the async process runner.
//!
//! Every collaborator (git, the build tool, systemctl) is driven through
//! [`CommandSpec`]. Programs are resolved with `which` before spawning so a
//! missing tool surfaces as [`CliError::ProgramNotFound`] rather than a bare
//! spawn error.

use crate::error::{CliError, ConfigError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// A program plus its arguments and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status
    pub status: ExitStatus,
    /// Stdout, lossily decoded
    pub stdout: String,
    /// Stderr, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited successfully
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Best human-readable failure reason: stderr, else stdout, else the status
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        self.status.to_string()
    }
}

impl CommandSpec {
    /// Create a spec from a program and arguments
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// Build a spec from an argv-style list as written in the config file
    pub fn from_argv(field: &str, argv: &[String]) -> Result<Self, ConfigError> {
        let (program, args) = argv.split_first().ok_or_else(|| ConfigError::Invalid {
            field: field.to_string(),
            reason: "command line must not be empty".to_string(),
        })?;

        if program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: field.to_string(),
                reason: "program name must not be blank".to_string(),
            });
        }

        Ok(Self::new(program.clone(), args.iter().cloned()))
    }

    /// Add an environment variable for the child process
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Replace every occurrence of `placeholder` in the arguments
    pub fn substitute(&self, placeholder: &str, value: &str) -> Self {
        Self {
            program: self.program.clone(),
            args: self
                .args
                .iter()
                .map(|arg| arg.replace(placeholder, value))
                .collect(),
            envs: self.envs.clone(),
        }
    }

    /// Whether any argument mentions `placeholder`
    pub fn mentions(&self, placeholder: &str) -> bool {
        self.args.iter().any(|arg| arg.contains(placeholder))
    }

    /// Program name as configured
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments as configured
    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn resolve_program(&self) -> Result<PathBuf, CliError> {
        which::which(&self.program).map_err(|_| CliError::ProgramNotFound {
            program: self.program.clone(),
        })
    }

    fn command(&self, work_dir: &Path) -> Result<Command, CliError> {
        let program = self.resolve_program()?;
        let mut cmd = Command::new(program);
        cmd.args(&self.args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(false);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        Ok(cmd)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Run a command and capture its output
pub async fn run_captured(spec: &CommandSpec, work_dir: &Path) -> Result<CommandOutput, CliError> {
    log::debug!("running (captured) in {}: {}", work_dir.display(), spec);

    let output = spec
        .command(work_dir)?
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| CliError::ExecutionFailed {
            command: spec.to_string(),
            reason: e.to_string(),
        })?;

    let captured = CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };
    log::debug!("{} -> {}", spec, captured.status);
    Ok(captured)
}

/// Run a command with stdout/stderr passed through to the terminal
pub async fn run_inherited(spec: &CommandSpec, work_dir: &Path) -> Result<ExitStatus, CliError> {
    log::debug!("running in {}: {}", work_dir.display(), spec);

    let status = spec
        .command(work_dir)?
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| CliError::ExecutionFailed {
            command: spec.to_string(),
            reason: e.to_string(),
        })?;

    log::debug!("{} -> {}", spec, status);
    Ok(status)
}

/// Spawn a command that keeps running after this process exits.
///
/// Output is appended to `log_file`. On unix the child gets its own process
/// group so signals aimed at ours do not reach it. The child is never waited
/// on; its pid is returned for logging.
pub fn spawn_detached(spec: &CommandSpec, work_dir: &Path, log_file: &Path) -> Result<u32, CliError> {
    let program = spec.resolve_program()?;
    let failed = |reason: String| CliError::ExecutionFailed {
        command: spec.to_string(),
        reason,
    };

    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| failed(format!("cannot open {}: {}", log_file.display(), e)))?;
    let log_err = log
        .try_clone()
        .map_err(|e| failed(format!("cannot duplicate log handle: {}", e)))?;

    let mut cmd = std::process::Command::new(program);
    cmd.args(&spec.args)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    for (key, value) in &spec.envs {
        cmd.env(key, value);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd.spawn().map_err(|e| failed(e.to_string()))?;
    Ok(child.id())
}
