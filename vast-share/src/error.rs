//! Share reconciliation error types.

use std::fmt;

use thiserror::Error;

/// Resource collections whose records are keyed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    View,
    ViewPolicy,
    Quota,
    Snapshot,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::View => "export",
            ResourceKind::ViewPolicy => "policy",
            ResourceKind::Quota => "quota",
            ResourceKind::Snapshot => "snapshot",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during share lifecycle operations.
#[derive(Debug, Error)]
pub enum ShareError {
    /// Transport failure, non-2xx response or malformed record.
    #[error(transparent)]
    Api(#[from] vast_rest::Error),

    /// A name that must be unique matched the wrong number of records.
    #[error("found {found} {kind} records named '{name}', expected one")]
    Consistency {
        kind: ResourceKind,
        name: String,
        found: usize,
    },

    /// Ensure found a quota with a different hard limit.
    #[error("share already exists with different capacity (requested={requested}, exists={existing})")]
    CapacityMismatch { requested: u64, existing: u64 },

    /// Requested size does not fit in a byte count.
    #[error("share size of {0} GiB is too large")]
    InvalidSize(u64),

    #[error("invalid NAS protocol supplied: {0}")]
    InvalidProtocol(String),

    #[error("only 'ip' access type allowed, got '{0}'")]
    InvalidAccessType(String),

    #[error("invalid access level: {0}")]
    InvalidAccessLevel(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("share {0} not found")]
    NotFound(String),

    /// An OS command exited unsuccessfully.
    #[error("command `{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    /// An OS command could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for share operations.
pub type Result<T> = std::result::Result<T, ShareError>;
