//! Error taxonomy shared by the deploying and serving sides.
//!
//! Fatal conditions are [`DepotError`] values. Non-fatal cleanup problems are
//! collected as [`CleanupWarning`]s and returned alongside a successful result.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T, E = DepotError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DepotError {
    /// Malformed terminal identifier or tag.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Missing source archive, missing subtree or missing deployment artifact.
    #[error("not found: {0}")]
    NotFound(String),

    /// Permission denied while reading or writing.
    #[error("access denied: {context}")]
    Access {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Any other I/O or transport fault.
    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Structurally invalid archive.
    #[error("corrupt archive {path}: {message}")]
    Archive { path: PathBuf, message: String },

    /// No artifact source succeeded.
    #[error("could not resolve a deployment artifact: {0}")]
    Resolution(String),

    /// Another deployment holds the lock for this target.
    #[error("deployment already in progress for {}", .0.display())]
    DeploymentInProgress(PathBuf),

    /// The caller cancelled the operation or its deadline passed.
    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl DepotError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Classify an I/O error by kind.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        let context = context.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(format!("{context}: {source}")),
            io::ErrorKind::PermissionDenied => Self::Access { context, source },
            _ => Self::Io { context, source },
        }
    }

    /// Classify a zip error; I/O failures inside the zip layer keep their kind.
    pub fn zip(path: &Path, source: zip::result::ZipError) -> Self {
        match source {
            zip::result::ZipError::Io(err) => Self::io(format!("archive {}", path.display()), err),
            other => Self::Archive {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Short machine-readable class name, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound(_) => "not_found",
            Self::Access { .. } => "access",
            Self::Io { .. } | Self::Archive { .. } => "io",
            Self::Resolution(_) => "resolution",
            Self::DeploymentInProgress(_) => "in_progress",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
        }
    }
}

/// A best-effort cleanup step that failed without aborting the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub message: String,
}

impl CleanupWarning {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}
