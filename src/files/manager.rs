// ============================================================================
// File Manager
// ============================================================================
//
// Encapsulates where and how transient and persistent files are stored. The
// transient root is a staging area for uploads not yet attached to any
// durable record; the persistent root holds committed files. Promotion is a
// same-volume rename, so readers observe either the old or the new location,
// never a partial file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use uuid::Uuid;

use crate::core::FileError;
use crate::files::reference::{PersistentFile, StoredFile, TransientFile, extension_of};

const COPY_CHUNK: usize = 64 * 1024;

/// Manager for one pair of transient/persistent storage roots.
///
/// # Examples
///
/// ```no_run
/// use webloom::files::FileManager;
///
/// let manager = FileManager::new("/srv/app/transient", "/srv/app/media")
///     .transient_url("/transient/")
///     .persistent_url("/media/");
///
/// let staged = manager.new_transient(".png");
/// ```
pub struct FileManager {
    transient_root: PathBuf,
    persistent_root: PathBuf,
    transient_url: Option<Arc<str>>,
    persistent_url: Option<Arc<str>>,
}

impl FileManager {
    pub fn new(transient_root: impl Into<PathBuf>, persistent_root: impl Into<PathBuf>) -> Self {
        Self {
            transient_root: transient_root.into(),
            persistent_root: persistent_root.into(),
            transient_url: None,
            persistent_url: None,
        }
    }

    /// Sets the public URL prefix for transient files.
    pub fn transient_url(mut self, prefix: impl Into<String>) -> Self {
        self.transient_url = Some(Arc::from(prefix.into()));
        self
    }

    /// Sets the public URL prefix for persistent files.
    pub fn persistent_url(mut self, prefix: impl Into<String>) -> Self {
        self.persistent_url = Some(Arc::from(prefix.into()));
        self
    }

    pub fn transient_root(&self) -> &Path {
        &self.transient_root
    }

    pub fn persistent_root(&self) -> &Path {
        &self.persistent_root
    }

    /// Creates an empty [`TransientFile`] with a random name and the given
    /// extension. The file itself is not created.
    pub fn new_transient(&self, ext: &str) -> TransientFile {
        let name = format!("{}{}", Uuid::new_v4().simple(), ext);
        TransientFile::new(&self.transient_root, name, self.transient_url.clone())
    }

    /// Creates a [`TransientFile`] on disk from the given input stream,
    /// reusing the extension of `original_name`. Copies exactly `length`
    /// bytes in bounded-size chunks; a short input stream fails the call
    /// and removes the partial file.
    pub fn create_transient(
        &self,
        input: &mut dyn Read,
        original_name: &str,
        length: u64,
    ) -> Result<TransientFile, FileError> {
        let transient = self.new_transient(extension_of(original_name));
        fs::create_dir_all(&self.transient_root)
            .map_err(|err| FileError::io(&self.transient_root, err))?;

        let path = transient.path();
        match copy_exact(input, &path, length) {
            Ok(()) => Ok(transient),
            Err(err) => {
                let _ = fs::remove_file(&path);
                Err(err)
            }
        }
    }

    /// Restores a [`TransientFile`] from a name supplied by an untrusted
    /// client, e.g. a resubmitted form. Names containing path separators
    /// are rejected; a missing file reports [`FileError::TransientLost`] so
    /// callers can ask for a re-upload.
    pub fn get_transient(&self, name: &str) -> Result<TransientFile, FileError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(FileError::InvalidName(name.to_owned()));
        }
        let transient = TransientFile::new(&self.transient_root, name, self.transient_url.clone());
        if !transient.path().is_file() {
            return Err(FileError::TransientLost(name.to_owned()));
        }
        Ok(transient)
    }

    /// Restores a [`PersistentFile`] handle by name. The file itself is not
    /// checked for existence.
    pub fn get_persistent(&self, name: &str) -> Result<PersistentFile, FileError> {
        if name.is_empty()
            || name.contains("..")
            || name.starts_with('~')
            || name.starts_with('/')
            || name.starts_with('\\')
        {
            return Err(FileError::InvalidName(name.to_owned()));
        }
        Ok(PersistentFile::new(
            &self.persistent_root,
            name,
            self.persistent_url.clone(),
        ))
    }

    /// Promotes a transient file into the persistent root under the given
    /// name. The move is a rename on the same volume, never a copy.
    pub fn store(
        &self,
        transient: &TransientFile,
        persistent_name: &str,
    ) -> Result<PersistentFile, FileError> {
        let persistent = self.get_persistent(persistent_name)?;
        let target = persistent.path();
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| FileError::io(parent, err))?;
        }
        fs::rename(transient.path(), &target).map_err(|err| FileError::io(&target, err))?;
        Ok(persistent)
    }

    /// Best-effort unlink. A missing file is silently fine; any other
    /// failure is logged and swallowed, deletion is advisory cleanup.
    pub fn delete(&self, file: &dyn StoredFile) {
        let path = file.path();
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("could not delete {}: {}", path.display(), err);
            }
        }
    }
}

impl std::fmt::Debug for FileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileManager")
            .field("transient_root", &self.transient_root)
            .field("persistent_root", &self.persistent_root)
            .finish()
    }
}

fn copy_exact(input: &mut dyn Read, path: &Path, length: u64) -> Result<(), FileError> {
    let file = File::create(path).map_err(|err| FileError::io(path, err))?;
    let mut out = BufWriter::new(file);
    let mut buf = [0u8; COPY_CHUNK];
    let mut remaining = length;
    while remaining > 0 {
        let want = remaining.min(COPY_CHUNK as u64) as usize;
        let got = input
            .read(&mut buf[..want])
            .map_err(|err| FileError::io(path, err))?;
        if got == 0 {
            return Err(FileError::ShortRead {
                expected: length,
                copied: length - remaining,
            });
        }
        out.write_all(&buf[..got])
            .map_err(|err| FileError::io(path, err))?;
        remaining -= got as u64;
    }
    out.flush().map_err(|err| FileError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transient_has_extension() {
        let manager = FileManager::new("/tmp/t", "/tmp/p");
        let staged = manager.new_transient(".png");
        assert!(staged.name().ends_with(".png"));
        assert!(staged.name().len() > 32);
    }

    #[test]
    fn test_get_transient_rejects_separators() {
        let manager = FileManager::new("/tmp/t", "/tmp/p");
        assert!(matches!(
            manager.get_transient("../etc/passwd"),
            Err(FileError::InvalidName(_))
        ));
        assert!(matches!(
            manager.get_transient("a\\b"),
            Err(FileError::InvalidName(_))
        ));
    }

    #[test]
    fn test_get_persistent_rejects_suspicious_names() {
        let manager = FileManager::new("/tmp/t", "/tmp/p");
        for name in ["", "a/../b", "~secret", "/abs", "\\abs"] {
            assert!(
                matches!(manager.get_persistent(name), Err(FileError::InvalidName(_))),
                "expected rejection for {:?}",
                name
            );
        }
        assert!(manager.get_persistent("doc/a.png").is_ok());
    }
}
