//! Error types for the obspace library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`ObsError`] enum. Errors are not recovered locally: a failure in one
//! worker aborts the whole worker group.
//!
//! # Examples
//!
//! ```
//! use obspace::error::{ObsError, Result};
//!
//! fn check_window(instant: bool) -> Result<()> {
//!     if !instant {
//!         return Err(ObsError::configuration("window must be a single instant"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_window(false).is_err());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for obspace operations.
#[derive(Error, Debug)]
pub enum ObsError {
    /// I/O errors from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure reading or writing a persisted observation file.
    #[error("File error in {path}: {message}")]
    File { path: String, message: String },

    /// Storage backend errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration or window relationship.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A named item (group, column) is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Shape, size or index contract violated by the caller.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A collective operation failed (peer gone, undecodable payload).
    #[error("Collective error: {0}")]
    Collective(String),

    /// JSON configuration errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with ObsError.
pub type Result<T> = std::result::Result<T, ObsError>;

impl ObsError {
    /// Create a new file format error for the given path.
    pub fn file<P: Into<String>, S: Into<String>>(path: P, msg: S) -> Self {
        ObsError::File {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        ObsError::Storage(msg.into())
    }

    /// Create a new configuration error.
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        ObsError::Configuration(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        ObsError::NotFound(msg.into())
    }

    /// Create a new precondition error.
    pub fn precondition<S: Into<String>>(msg: S) -> Self {
        ObsError::Precondition(msg.into())
    }

    /// Create a new collective error.
    pub fn collective<S: Into<String>>(msg: S) -> Self {
        ObsError::Collective(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        ObsError::Other(msg.into())
    }

    /// Whether this error only reports that a peer worker went away.
    ///
    /// Such errors are consequences of a failure elsewhere in the group.
    pub fn is_collective(&self) -> bool {
        matches!(self, ObsError::Collective(_))
    }
}

impl From<bincode::Error> for ObsError {
    fn from(err: bincode::Error) -> Self {
        ObsError::Collective(format!("payload encoding failed: {err}"))
    }
}
