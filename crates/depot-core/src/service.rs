//! External service stop/start capability.
//!
//! The deployer never inspects the platform itself. The composition root picks
//! an implementation: a command runner when a control executable is
//! configured, or [`NoopServiceControl`] where no process-level control exists.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Command;

use crate::error::{DepotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Stop,
    Start,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Start => "start",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened when a stop or start was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// The control mechanism ran; a non-zero `code` is reported, not raised.
    Completed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// No control mechanism on this host.
    Unavailable(String),
}

impl ServiceOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed { code: Some(0), .. })
    }
}

pub trait ServiceControl: Send + Sync {
    /// Run `action` against the service called `name`.
    ///
    /// Returns `Unavailable` rather than an error when the capability is
    /// absent; errors are reserved for genuine invocation failures.
    fn control(&self, action: ServiceAction, name: &str) -> Result<ServiceOutcome>;

    fn stop(&self, name: &str) -> Result<ServiceOutcome> {
        self.control(ServiceAction::Stop, name)
    }

    fn start(&self, name: &str) -> Result<ServiceOutcome> {
        self.control(ServiceAction::Start, name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoopServiceControl {
    reason: Option<String>,
}

impl NoopServiceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

impl ServiceControl for NoopServiceControl {
    fn control(&self, _action: ServiceAction, _name: &str) -> Result<ServiceOutcome> {
        Ok(ServiceOutcome::Unavailable(
            self.reason
                .clone()
                .unwrap_or_else(|| "service control not available on this host".to_string()),
        ))
    }
}

/// Runs an external control executable.
///
/// Arguments may contain `{action}` and `{name}` placeholders.
#[derive(Debug, Clone)]
pub struct CommandServiceControl {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandServiceControl {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// IIS `appcmd.exe`: `appcmd {action} site /site.name:{name}`.
    pub fn appcmd(program: impl Into<PathBuf>) -> Self {
        Self::new(
            program,
            vec![
                "{action}".to_string(),
                "site".to_string(),
                "/site.name:{name}".to_string(),
            ],
        )
    }

    fn render_args(&self, action: ServiceAction, name: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{action}", action.as_str()).replace("{name}", name))
            .collect()
    }
}

impl ServiceControl for CommandServiceControl {
    fn control(&self, action: ServiceAction, name: &str) -> Result<ServiceOutcome> {
        // A bare program name is looked up on PATH at spawn time.
        if self.program.components().count() > 1 && !self.program.exists() {
            return Ok(ServiceOutcome::Unavailable(format!(
                "{} not found",
                self.program.display()
            )));
        }

        let mut command = Command::new(&self.program);
        command.args(self.render_args(action, name));
        if let Some(dir) = self.program.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let output = match command.output() {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(ServiceOutcome::Unavailable(format!(
                    "{} not found",
                    self.program.display()
                )));
            }
            Err(e) => {
                return Err(DepotError::io(
                    format!("{action} service '{name}' via {}", self.program.display()),
                    e,
                ));
            }
        };

        Ok(ServiceOutcome::Completed {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
