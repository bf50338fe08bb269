// ============================================================================
// Webloom Library
// ============================================================================
//
// Web application core: request dispatch with structured error-to-response
// mapping, layered per-request environment storage, and a transient ->
// persistent file lifecycle coordinated with unit-of-work commit events.

pub mod core;
pub mod files;
pub mod session;
pub mod storage;
pub mod web;

// Re-export main types for convenience
pub use crate::core::{FileError, SessionError, StorageError};
pub use crate::files::{FileManager, PersistentFile, StoredFile, TransientFile};
pub use crate::session::{
    FileField, FileFieldSpec, FileRecord, FileValue, ManagerScope, RecordHandle, RecordId, Session,
    SessionMaker, file_session_maker,
};
pub use crate::storage::LayeredStorage;
pub use crate::web::{
    Application, Environment, HandlerResult, HttpException, RequestHandler, UrlResolver,
    WebResponse,
};
