//! UPK-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, UnpackrError>;

/// Top-level error type for unpackr.
#[derive(Debug, Error)]
pub enum UnpackrError {
    #[error("[UPK-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[UPK-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[UPK-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[UPK-1101] required external tool unavailable: {family}")]
    MissingTool { family: &'static str },

    #[error("[UPK-2001] safety refusal ({invariant}) for {path}: {reason}")]
    SafetyRefusal {
        invariant: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("[UPK-2002] illegal pipeline transition from {from} to {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("[UPK-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[UPK-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[UPK-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[UPK-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[UPK-3101] external tool failed ({tool}): {details}")]
    ToolFailed { tool: String, details: String },

    #[error("[UPK-3102] external tool timed out ({tool}) after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    #[error("[UPK-3103] run cancelled")]
    Cancelled,

    #[error("[UPK-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl UnpackrError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "UPK-1001",
            Self::MissingConfig { .. } => "UPK-1002",
            Self::ConfigParse { .. } => "UPK-1003",
            Self::MissingTool { .. } => "UPK-1101",
            Self::SafetyRefusal { .. } => "UPK-2001",
            Self::IllegalTransition { .. } => "UPK-2002",
            Self::Serialization { .. } => "UPK-2101",
            Self::PermissionDenied { .. } => "UPK-3001",
            Self::Io { .. } => "UPK-3002",
            Self::ChannelClosed { .. } => "UPK-3003",
            Self::ToolFailed { .. } => "UPK-3101",
            Self::ToolTimeout { .. } => "UPK-3102",
            Self::Cancelled => "UPK-3103",
            Self::Runtime { .. } => "UPK-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::PermissionDenied { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for UnpackrError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}
