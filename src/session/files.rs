// ============================================================================
// File Attachment Hook
// ============================================================================
//
// Session hook binding file lifecycle to the flush lifecycle. Before the
// backend flush every pending record is walked field by field:
//
//   Transient            -> stored under the templated name, columns written
//   Persistent (new)     -> columns written, no move
//   Absent with columns  -> columns emptied
//
// Superseded files are only ever deleted after the backend write succeeds;
// a failed commit must not destroy data the unchanged row still references.

use std::sync::Arc;

use log::warn;

use crate::core::SessionError;
use crate::files::{FileManager, PersistentFile, StoredFile, TransientFile};
use crate::session::record::{FileField, FileValue, NameTemplate, RecordId};
use crate::session::resolver::ManagerRegistry;
use crate::session::unit::{FlushContext, RecordHandle, SessionHook};

// Draws for a {random} template before giving up on finding a free name.
const MAX_NAME_DRAWS: usize = 8;

type DeferredDeletes = Vec<(Arc<FileManager>, PersistentFile)>;

/// Promotes transient files and cleans up superseded ones as records move
/// through the session lifecycle.
pub struct FileAttachmentHook {
    registry: Arc<ManagerRegistry>,
}

impl FileAttachmentHook {
    pub(crate) fn new(registry: Arc<ManagerRegistry>) -> Self {
        Self { registry }
    }

    fn flush_record(
        &self,
        record: &RecordHandle,
        deferred: &mut DeferredDeletes,
    ) -> Result<(), SessionError> {
        let mut guard = record.lock()?;
        let manager = self.registry.resolve(guard.model(), guard.unit());
        let id = guard.id();
        for field in guard.file_fields() {
            flush_field(&manager, id, field, deferred)?;
        }
        Ok(())
    }
}

impl SessionHook for FileAttachmentHook {
    fn before_flush(&self, ctx: &mut FlushContext<'_>) -> Result<(), SessionError> {
        let pending: Vec<RecordHandle> = ctx.new.iter().chain(ctx.dirty.iter()).cloned().collect();
        for record in &pending {
            self.flush_record(record, &mut ctx.deferred_deletes)?;
        }
        Ok(())
    }

    fn after_commit(&self, ctx: &mut FlushContext<'_>) {
        for (manager, file) in ctx.deferred_deletes.drain(..) {
            manager.delete(&file);
        }
    }

    fn after_delete(&self, record: &RecordHandle, _ctx: &mut FlushContext<'_>) {
        let mut guard = match record.lock() {
            Ok(guard) => guard,
            Err(err) => {
                warn!("skipping file cleanup for deleted record: {}", err);
                return;
            }
        };
        let manager = self.registry.resolve(guard.model(), guard.unit());
        for field in guard.file_fields() {
            if let Some(old) = field.committed().cloned() {
                manager.delete(&old);
            }
            field.write_columns(None, None);
            field.record_committed(None);
            field.clear();
        }
    }
}

fn flush_field(
    manager: &Arc<FileManager>,
    id: Option<RecordId>,
    field: &mut FileField,
    deferred: &mut DeferredDeletes,
) -> Result<(), SessionError> {
    match field.value().clone() {
        FileValue::Transient(transient) => {
            let template = NameTemplate::parse(field.spec().name_template)?;
            let name = place_name(manager.as_ref(), &template, id, &transient)?;
            let persistent = manager.store(&transient, &name)?;
            let size = persistent.size();

            if let Some(old) = field.committed() {
                if old.name() != persistent.name() {
                    deferred.push((manager.clone(), old.clone()));
                }
            }
            field.write_columns(Some(persistent.name().to_owned()), size);
            field.record_committed(Some(persistent.clone()));
            field.set_persistent(persistent);
        }
        FileValue::Persistent(persistent) => {
            if field.stored_name() == Some(persistent.name()) {
                return Ok(());
            }
            if let Some(old) = field.committed() {
                if old.name() != persistent.name() {
                    deferred.push((manager.clone(), old.clone()));
                }
            }
            let size = persistent.size();
            field.write_columns(Some(persistent.name().to_owned()), size);
            field.record_committed(Some(persistent));
        }
        FileValue::Absent => {
            if field.stored_name().is_none() {
                return Ok(());
            }
            if let Some(old) = field.committed() {
                deferred.push((manager.clone(), old.clone()));
            }
            field.write_columns(None, None);
            field.record_committed(None);
        }
    }
    Ok(())
}

// Deterministic templates store over the computed name; {random} templates
// redraw until the name is free.
fn place_name(
    manager: &FileManager,
    template: &NameTemplate,
    id: Option<RecordId>,
    transient: &TransientFile,
) -> Result<String, SessionError> {
    let ext = transient.extension();
    let mut name = format!("{}{}", template.render(id)?, ext);
    if !template.has_random() {
        return Ok(name);
    }
    for _ in 1..MAX_NAME_DRAWS {
        if !manager.get_persistent(&name)?.path().exists() {
            return Ok(name);
        }
        name = format!("{}{}", template.render(id)?, ext);
    }
    if manager.get_persistent(&name)?.path().exists() {
        return Err(SessionError::NameCollision(name));
    }
    Ok(name)
}
