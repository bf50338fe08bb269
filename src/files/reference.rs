// ============================================================================
// File References
// ============================================================================

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use log::debug;

/// Identity of a stored file: a root directory plus a name unique within
/// that root. The path is always `root + name`.
#[derive(Clone)]
pub(crate) struct FileRef {
    root: PathBuf,
    name: String,
    url_prefix: Option<Arc<str>>,
    // Lazily computed size, cached once read. Shared between clones of the
    // same reference; a fresh handle re-reads the filesystem.
    size: Arc<OnceLock<Option<u64>>>,
}

impl FileRef {
    pub(crate) fn new(
        root: impl Into<PathBuf>,
        name: impl Into<String>,
        url_prefix: Option<Arc<str>>,
    ) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            url_prefix,
            size: Arc::new(OnceLock::new()),
        }
    }

    fn path(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    // Missing file is not an error: the reference may point at a file that
    // was never written or has been cleaned up.
    fn size(&self) -> Option<u64> {
        *self.size.get_or_init(|| match fs::metadata(self.path()) {
            Ok(meta) => Some(meta.len()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                debug!("stat failed for {}: {}", self.path().display(), err);
                None
            }
        })
    }

    fn url(&self) -> Option<String> {
        self.url_prefix
            .as_ref()
            .map(|prefix| format!("{}{}", prefix, self.name))
    }
}

/// Common view over transient and persistent file references.
pub trait StoredFile {
    /// Name unique within the owning root.
    fn name(&self) -> &str;

    /// Absolute location on the filesystem.
    fn path(&self) -> PathBuf;

    /// Lazily computed size in bytes; `None` when the file does not exist.
    fn size(&self) -> Option<u64>;

    /// Public URL when the owning manager was configured with a prefix.
    fn url(&self) -> Option<String>;
}

macro_rules! stored_file_impl {
    ($ty:ident) => {
        impl StoredFile for $ty {
            fn name(&self) -> &str {
                &self.inner.name
            }

            fn path(&self) -> PathBuf {
                self.inner.path()
            }

            fn size(&self) -> Option<u64> {
                self.inner.size()
            }

            fn url(&self) -> Option<String> {
                self.inner.url()
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($ty), "({:?})"), self.inner.name)
            }
        }
    };
}

/// Staged upload not yet attached to any durable record. Lives in the
/// manager's transient root until promoted or cleaned up.
#[derive(Clone)]
pub struct TransientFile {
    inner: FileRef,
}

impl TransientFile {
    pub(crate) fn new(
        root: impl Into<PathBuf>,
        name: impl Into<String>,
        url_prefix: Option<Arc<str>>,
    ) -> Self {
        Self {
            inner: FileRef::new(root, name, url_prefix),
        }
    }

    /// Extension including the leading dot, or an empty string.
    pub fn extension(&self) -> &str {
        extension_of(&self.inner.name)
    }
}

/// File durably associated with a committed record. Lives in the manager's
/// persistent root until superseded or its owning record is cleared.
#[derive(Clone)]
pub struct PersistentFile {
    inner: FileRef,
}

impl PersistentFile {
    pub(crate) fn new(
        root: impl Into<PathBuf>,
        name: impl Into<String>,
        url_prefix: Option<Arc<str>>,
    ) -> Self {
        Self {
            inner: FileRef::new(root, name, url_prefix),
        }
    }
}

stored_file_impl!(TransientFile);
stored_file_impl!(PersistentFile);

/// Extension of a file name including the leading dot. Dotfiles and bare
/// names yield an empty string.
pub(crate) fn extension_of(name: &str) -> &str {
    let base = name
        .rfind(['/', '\\'])
        .map(|i| &name[i + 1..])
        .unwrap_or(name);
    match base.rfind('.') {
        Some(i) if i > 0 => &base[i..],
        _ => "",
    }
}
