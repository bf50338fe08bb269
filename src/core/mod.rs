pub mod error;

pub use error::{FileError, SessionError, StorageError};
