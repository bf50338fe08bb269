// ============================================================================
// Unit-of-Work Session
// ============================================================================
//
// Tracks pending records between commits and drives the flush lifecycle:
//
//   before_flush hooks -> backend flush -> after_commit / after_delete hooks
//
// Hooks observe the pending new/dirty/deleted sets; the file attachment
// hook uses them to promote transient files and defer cleanup until the
// backend write is durable.

use std::sync::{Arc, Mutex};

use crate::core::SessionError;
use crate::files::{FileManager, PersistentFile};
use crate::session::files::FileAttachmentHook;
use crate::session::record::{FileRecord, FileValue, RecordId};
use crate::session::resolver::{ManagerRegistry, ManagerScope};

/// Shared handle to a tracked record.
pub type RecordHandle = Arc<Mutex<dyn FileRecord>>;

/// Durable-write seam invoked between the before-flush and after-commit
/// phases. Failure aborts the commit; deferred file deletions are dropped.
pub trait SessionBackend: Send {
    fn flush(&mut self) -> Result<(), SessionError>;
}

/// Default backend: rows live on the records themselves, so there is
/// nothing to write.
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl SessionBackend for MemoryBackend {
    fn flush(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Pending sets exposed to hooks for one commit.
pub struct FlushContext<'a> {
    /// Records added since the last commit.
    pub new: &'a [RecordHandle],
    /// Previously committed records still attached; hooks decide per field
    /// whether anything changed.
    pub dirty: &'a [RecordHandle],
    /// Records scheduled for deletion.
    pub deleted: &'a [RecordHandle],
    /// Files superseded during before-flush, deleted only once the backend
    /// write has succeeded.
    pub deferred_deletes: Vec<(Arc<FileManager>, PersistentFile)>,
}

/// Lifecycle events emitted by [`Session::commit`].
pub trait SessionHook: Send + Sync {
    /// Runs before the backend flush; may rewrite pending records. An error
    /// aborts the commit.
    fn before_flush(&self, ctx: &mut FlushContext<'_>) -> Result<(), SessionError> {
        let _ = ctx;
        Ok(())
    }

    /// Runs once the backend flush has succeeded.
    fn after_commit(&self, ctx: &mut FlushContext<'_>) {
        let _ = ctx;
    }

    /// Runs after a successful flush for every deleted record.
    fn after_delete(&self, record: &RecordHandle, ctx: &mut FlushContext<'_>) {
        let _ = (record, ctx);
    }
}

/// Session factory. File support is bound with [`file_session_maker`];
/// sessions built from a plain maker reject file-bearing flushes.
pub struct SessionMaker {
    files: Option<Arc<ManagerRegistry>>,
    hooks: Vec<Arc<dyn SessionHook>>,
}

impl SessionMaker {
    pub fn new() -> Self {
        Self {
            files: None,
            hooks: Vec::new(),
        }
    }

    /// Installs an additional lifecycle hook shared by every session built
    /// from this maker.
    pub fn with_hook(mut self, hook: impl SessionHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn session(&self) -> Session {
        self.session_with_backend(Box::new(MemoryBackend))
    }

    pub fn session_with_backend(&self, backend: Box<dyn SessionBackend>) -> Session {
        Session {
            new: Vec::new(),
            persistent: Vec::new(),
            deleted: Vec::new(),
            files: self.files.clone(),
            hooks: self.hooks.clone(),
            backend,
        }
    }
}

impl Default for SessionMaker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionMaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMaker")
            .field("files", &self.files.is_some())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Binds file management to a session factory: the resolution registry plus
/// the flush hook that promotes and cleans up files.
///
/// # Examples
///
/// ```no_run
/// use webloom::files::FileManager;
/// use webloom::session::{ManagerScope, SessionMaker, file_session_maker};
///
/// # fn main() -> Result<(), webloom::SessionError> {
/// let maker = file_session_maker(
///     SessionMaker::new(),
///     FileManager::new("/srv/app/transient", "/srv/app/media"),
///     vec![(
///         ManagerScope::Model("Invoice"),
///         FileManager::new("/srv/invoices/transient", "/srv/invoices/media"),
///     )],
/// )?;
/// let session = maker.session();
/// # Ok(())
/// # }
/// ```
pub fn file_session_maker(
    maker: SessionMaker,
    default: FileManager,
    scoped: Vec<(ManagerScope, FileManager)>,
) -> Result<SessionMaker, SessionError> {
    let mut registry = ManagerRegistry::new(default);
    for (scope, manager) in scoped {
        registry.register(scope, manager)?;
    }
    let registry = Arc::new(registry);

    let mut maker = maker;
    maker.files = Some(registry.clone());
    maker.hooks.push(Arc::new(FileAttachmentHook::new(registry)));
    Ok(maker)
}

/// Unit-of-work session tracking pending records between commits.
pub struct Session {
    new: Vec<RecordHandle>,
    persistent: Vec<RecordHandle>,
    deleted: Vec<RecordHandle>,
    files: Option<Arc<ManagerRegistry>>,
    hooks: Vec<Arc<dyn SessionHook>>,
    backend: Box<dyn SessionBackend>,
}

impl Session {
    /// Attaches a record. Attaching an already-attached record is a no-op.
    pub fn add(&mut self, record: RecordHandle) {
        if !self.is_attached(&record) {
            self.new.push(record);
        }
    }

    /// Schedules an attached record for deletion at the next commit.
    pub fn delete(&mut self, record: &RecordHandle) {
        let mut found = Self::remove_from(&mut self.new, record);
        if found.is_none() {
            found = Self::remove_from(&mut self.persistent, record);
        }
        if let Some(found) = found {
            self.deleted.push(found);
        }
    }

    fn remove_from(list: &mut Vec<RecordHandle>, record: &RecordHandle) -> Option<RecordHandle> {
        list.iter()
            .position(|r| Arc::ptr_eq(r, record))
            .map(|pos| list.remove(pos))
    }

    pub fn is_attached(&self, record: &RecordHandle) -> bool {
        self.new
            .iter()
            .chain(self.persistent.iter())
            .chain(self.deleted.iter())
            .any(|r| Arc::ptr_eq(r, record))
    }

    pub fn supports_files(&self) -> bool {
        self.files.is_some()
    }

    /// The session default file manager.
    pub fn file_manager(&self) -> Result<Arc<FileManager>, SessionError> {
        self.files
            .as_ref()
            .map(|registry| registry.default_manager().clone())
            .ok_or(SessionError::NoFileSupport)
    }

    /// Resolves the file manager responsible for the given attached record.
    pub fn find_file_manager(&self, record: &RecordHandle) -> Result<Arc<FileManager>, SessionError> {
        if !self.is_attached(record) {
            return Err(SessionError::Detached);
        }
        let registry = self.files.as_ref().ok_or(SessionError::NoFileSupport)?;
        let guard = record.lock()?;
        Ok(registry.resolve(guard.model(), guard.unit()))
    }

    /// Flushes pending records: assigns identities, runs before-flush
    /// hooks, performs the backend write, then runs the after-commit and
    /// after-delete hooks. If the backend write fails, deferred file
    /// deletions never run.
    pub fn commit(&mut self) -> Result<(), SessionError> {
        self.reject_unmanaged_files()?;

        for record in &self.new {
            let mut guard = record.lock()?;
            if guard.id().is_none() {
                guard.assign_id(RecordId::new());
            }
        }

        let mut ctx = FlushContext {
            new: &self.new,
            dirty: &self.persistent,
            deleted: &self.deleted,
            deferred_deletes: Vec::new(),
        };
        for hook in &self.hooks {
            hook.before_flush(&mut ctx)?;
        }

        self.backend.flush()?;

        for hook in &self.hooks {
            hook.after_commit(&mut ctx);
        }
        for record in &self.deleted {
            for hook in &self.hooks {
                hook.after_delete(record, &mut ctx);
            }
        }
        drop(ctx);

        let committed = std::mem::take(&mut self.new);
        self.persistent.extend(committed);
        self.deleted.clear();
        Ok(())
    }

    /// Drops pending registrations: new records are detached and scheduled
    /// deletions are reattached. Files on disk are not touched.
    pub fn rollback(&mut self) {
        self.new.clear();
        let restored = std::mem::take(&mut self.deleted);
        self.persistent.extend(restored);
    }

    // A session without file support must not silently skip promotion for
    // records that carry staged uploads.
    fn reject_unmanaged_files(&self) -> Result<(), SessionError> {
        if self.files.is_some() {
            return Ok(());
        }
        for record in self.new.iter().chain(self.persistent.iter()) {
            let mut guard = record.lock()?;
            let staged = guard
                .file_fields()
                .iter()
                .any(|field| matches!(field.value(), FileValue::Transient(_)));
            if staged {
                return Err(SessionError::NoFileSupport);
            }
        }
        Ok(())
    }
}
