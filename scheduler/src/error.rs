use keel_governance::RegistryError;
use keel_types::ErrorKind;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("failed to read config file: {0}")]
    Read(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("operation source failed: {0}")]
    Source(String),

    #[error("shutdown timeout")]
    ShutdownTimeout,
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::AlreadyRunning => ErrorKind::Validation,
            Self::Source(_) | Self::ShutdownTimeout => ErrorKind::TransientExecutionFailure,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("gas oracle unreachable: {0}")]
    Unreachable(String),

    #[error("invalid gas oracle response: {0}")]
    InvalidResponse(String),
}

/// A failed propose or execute against the registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct DispatchError {
    pub kind: ErrorKind,
    pub reason: String,
}

impl DispatchError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientExecutionFailure, reason)
    }
}

impl From<RegistryError> for DispatchError {
    fn from(e: RegistryError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}
