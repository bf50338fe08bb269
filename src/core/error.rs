use std::io;
use std::path::PathBuf;
use std::sync::PoisonError;
use thiserror::Error;

/// Errors raised by layered storage lookup.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("attribute '{0}' is not defined in any storage frame")]
    AttributeNotFound(String),

    #[error("attribute '{name}' is not of the requested type {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
    },
}

/// Errors raised by file references and the file manager.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("invalid file name '{0}'")]
    InvalidName(String),

    #[error("transient file '{0}' has been lost")]
    TransientLost(String),

    #[error("short read while copying upload: expected {expected} bytes, copied {copied}")]
    ShortRead { expected: u64, copied: u64 },

    #[error("I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FileError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the unit-of-work session and its file integration.
///
/// Everything except `File` and `Backend` is a configuration or usage
/// mistake and must not be retried.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("object is detached")]
    Detached,

    #[error("session doesn't support file management")]
    NoFileSupport,

    #[error(
        "file manager registration for field '{model}.{field}' is not supported, \
         register per model or per unit instead"
    )]
    FieldRegistration {
        model: &'static str,
        field: &'static str,
    },

    #[error("invalid name template '{template}': {reason}")]
    BadTemplate { template: String, reason: String },

    #[error("name template '{template}' requires a record identity that is not assigned yet")]
    MissingIdentity { template: String },

    #[error("could not find a free persistent name, last tried '{0}'")]
    NameCollision(String),

    #[error(transparent)]
    File(#[from] FileError),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("commit failed: {0}")]
    Backend(String),
}

impl<T> From<PoisonError<T>> for SessionError {
    fn from(err: PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
