//! Unified error handling for Hotplugger
//!
//! This crate provides the error taxonomy shared by the arbitration core, the
//! IPC protocol, the daemon and the operator CLI. It uses thiserror for the
//! Display and Error trait impls.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// Result type alias using HotplugError
pub type Result<T> = std::result::Result<T, HotplugError>;

/// Failure reported by a controller's own transition.
///
/// Opaque to the arbitration core and propagated verbatim.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("hardware rejected transition: {0}")]
    Hardware(String),

    #[error("I/O failure: {0}")]
    Io(String),
}

impl ControllerError {
    pub fn hardware(msg: impl Into<String>) -> Self {
        Self::Hardware(msg.into())
    }
}

impl From<io::Error> for ControllerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// One peer a conflict-resolution walk failed to disable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFailure {
    pub name: String,
    pub error: ControllerError,
}

impl fmt::Display for PeerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

/// Stable classification of errors, used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    DuplicateName,
    Busy,
    Disabled,
    NotFound,
    Controller,
    Unresolved,
    InvalidInput,
    ReadOnly,
    Config,
    Io,
    Ipc,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::DuplicateName => "duplicate name",
            ErrorKind::Busy => "busy",
            ErrorKind::Disabled => "disabled",
            ErrorKind::NotFound => "not found",
            ErrorKind::Controller => "controller error",
            ErrorKind::Unresolved => "unresolved conflicts",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::ReadOnly => "read-only",
            ErrorKind::Config => "configuration error",
            ErrorKind::Io => "I/O error",
            ErrorKind::Ipc => "IPC error",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Unified error type for all Hotplugger operations
#[derive(thiserror::Error, Debug)]
pub enum HotplugError {
    // ============================================================================
    // Arbitration Errors
    // ============================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("A different driver named \"{0}\" is already registered")]
    DuplicateName(String),

    #[error("Registry busy after {attempts} attempt(s), retry later")]
    Busy { attempts: u32 },

    #[error("Hotplugger is disabled")]
    Disabled,

    #[error("Driver not found: {0}")]
    NotFound(String),

    #[error("Driver \"{name}\" failed to change state: {source}")]
    Controller {
        name: String,
        #[source]
        source: ControllerError,
    },

    #[error("Conflict resolution for \"{requester}\" left {} peer(s) running: {}", .failures.len(), format_failures(.failures))]
    Unresolved {
        requester: String,
        failures: Vec<PeerFailure>,
    },

    // ============================================================================
    // Control Surface Errors
    // ============================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Attribute is read-only: {0}")]
    ReadOnly(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Daemon and IPC Errors
    // ============================================================================
    #[error("Daemon not available")]
    DaemonNotAvailable,

    #[error("Daemon connection failed: {0}")]
    DaemonConnection(String),

    #[error("IPC protocol error: {0}")]
    IpcProtocol(String),

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// An error reported by the daemon, reconstructed on the client side
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },
}

fn format_failures(failures: &[PeerFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl HotplugError {
    /// Create an invalid argument error from a string
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an invalid input error from a string
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a controller failure with the name of the driver that raised it
    pub fn controller(name: impl Into<String>, source: ControllerError) -> Self {
        Self::Controller {
            name: name.into(),
            source,
        }
    }

    /// Stable classification for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::DuplicateName(_) => ErrorKind::DuplicateName,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::Disabled => ErrorKind::Disabled,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Controller { .. } => ErrorKind::Controller,
            Self::Unresolved { .. } => ErrorKind::Unresolved,
            Self::InvalidInput(_) | Self::UnknownAttribute(_) => ErrorKind::InvalidInput,
            Self::ReadOnly(_) => ErrorKind::ReadOnly,
            Self::Config(_) | Self::InvalidConfig { .. } | Self::JsonParse(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::DaemonNotAvailable
            | Self::DaemonConnection(_)
            | Self::IpcProtocol(_)
            | Self::MessageTooLarge { .. } => ErrorKind::Ipc,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Remote { kind, .. } => *kind,
        }
    }

    /// Whether retrying the same call later can succeed without operator action.
    ///
    /// `Disabled` is not retryable: the gate has to be re-opened first.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Busy | ErrorKind::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(HotplugError::Busy { attempts: 2 }.kind(), ErrorKind::Busy);
        assert_eq!(HotplugError::Disabled.kind(), ErrorKind::Disabled);
        assert_eq!(
            HotplugError::controller("x", ControllerError::hardware("nak")).kind(),
            ErrorKind::Controller
        );
        assert_eq!(
            HotplugError::UnknownAttribute("foo".into()).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_retryable() {
        assert!(HotplugError::Busy { attempts: 2 }.is_retryable());
        assert!(!HotplugError::Disabled.is_retryable());
        assert!(HotplugError::Remote {
            kind: ErrorKind::Busy,
            message: "busy".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_unresolved_display_lists_peers() {
        let err = HotplugError::Unresolved {
            requester: "alpha".into(),
            failures: vec![
                PeerFailure {
                    name: "beta".into(),
                    error: ControllerError::hardware("stuck"),
                },
                PeerFailure {
                    name: "gamma".into(),
                    error: ControllerError::Io("read-only file system".into()),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 peer(s)"));
        assert!(msg.contains("beta: hardware rejected transition: stuck"));
        assert!(msg.contains("gamma"));
    }

    #[test]
    fn test_error_kind_serde() {
        let json = serde_json::to_string(&ErrorKind::DuplicateName).unwrap();
        assert_eq!(json, "\"duplicate_name\"");
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorKind::DuplicateName);
    }
}
