pub mod files;
pub mod record;
pub mod resolver;
pub mod unit;

pub use files::FileAttachmentHook;
pub use record::{FileField, FileFieldSpec, FileRecord, FileValue, NameTemplate, RecordId};
pub use resolver::{ManagerRegistry, ManagerScope};
pub use unit::{
    FlushContext, MemoryBackend, RecordHandle, Session, SessionBackend, SessionHook, SessionMaker,
    file_session_maker,
};
