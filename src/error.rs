//! Error types for lease-proxy
//!
//! Lease operations return `LeaseResult<T>`, proxy operations return
//! `ProxyResult<T>` and the CLI layer works with `AppResult<T>`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for lease operations
pub type LeaseResult<T> = Result<T, LeaseError>;

/// Result type alias for read proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Result type alias for CLI operations
pub type AppResult<T> = Result<T, AppError>;

/// Errors produced by leases and leasers
#[derive(Error, Debug)]
pub enum LeaseError {
    /// The lease no longer represents valid cached content and must be discarded
    #[error("lease has been revoked")]
    Invalidated,

    #[error("lease I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LeaseError {
    /// Check if this is the invalidation sentinel
    pub fn is_invalidated(&self) -> bool {
        matches!(self, Self::Invalidated)
    }
}

/// Errors surfaced by a read proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("read proxy has been revoked")]
    Revoked,

    #[error("allocating lease: {0}")]
    Allocation(#[source] LeaseError),

    #[error("opening content stream: {0}")]
    Source(#[source] io::Error),

    #[error("copying content into lease: {0}")]
    Copy(#[source] LeaseError),

    #[error("closing content stream: {0}")]
    Close(#[source] io::Error),

    #[error("copied {copied} bytes; expected {expected}")]
    LengthMismatch { copied: u64, expected: u64 },

    #[error("{op}: {source}")]
    Lease {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ProxyError {
    /// Wrap the failure of a delegated lease operation
    ///
    /// An invalidation at this point cannot be recovered from and is
    /// reported as a revocation.
    pub fn lease(op: &'static str, err: LeaseError) -> Self {
        match err {
            LeaseError::Invalidated => Self::Revoked,
            LeaseError::Io(source) => Self::Lease { op, source },
        }
    }

    /// Check if the proxy was permanently revoked
    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Revoked)
    }

    /// Check if retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Revoked | Self::LengthMismatch { .. })
    }
}

impl From<ProxyError> for io::Error {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Lease { source, .. } => source,
            ProxyError::Revoked => io::Error::new(io::ErrorKind::BrokenPipe, err),
            ProxyError::LengthMismatch { .. } => io::Error::new(io::ErrorKind::InvalidData, err),
            other => io::Error::other(other),
        }
    }
}

/// All errors that can occur in the lease-proxy CLI
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // Proxy errors
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Interrupted")]
    Cancelled,

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl AppError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Run: lease-proxy config init --force"),
            Self::Proxy(ProxyError::LengthMismatch { .. }) => {
                Some("The file changed while it was being read; retry once it is stable")
            }
            _ => None,
        }
    }
}
