// ============================================================================
// File-Bearing Records
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::core::SessionError;
use crate::files::{PersistentFile, TransientFile};

/// Global record ID counter
static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity assigned to a record the first time it is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Allocates a new unique record ID.
    pub fn new() -> Self {
        RecordId(NEXT_RECORD_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of values a file attribute can hold.
///
/// Value transitions per field:
/// ```text
/// Absent ──assign──> Transient ──flush──> Persistent
///                                             │
///   <──────────────clear / delete─────────────┘
/// ```
#[derive(Debug, Clone, Default)]
pub enum FileValue {
    #[default]
    Absent,
    Transient(TransientFile),
    Persistent(PersistentFile),
}

impl FileValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FileValue::Absent)
    }

    pub fn as_transient(&self) -> Option<&TransientFile> {
        match self {
            FileValue::Transient(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_persistent(&self) -> Option<&PersistentFile> {
        match self {
            FileValue::Persistent(file) => Some(file),
            _ => None,
        }
    }
}

/// Static description of one file-valued attribute on a model.
#[derive(Debug)]
pub struct FileFieldSpec {
    /// Attribute name, unique within the model.
    pub name: &'static str,
    /// Template for the persistent name, supporting `{random}` and `{id}`.
    pub name_template: &'static str,
    /// Maintain the cached size column alongside the name column.
    pub cache_size: bool,
}

/// Per-record state of one file attribute: the assigned value plus the
/// backing name column and the optional cached size column.
#[derive(Debug)]
pub struct FileField {
    spec: &'static FileFieldSpec,
    value: FileValue,
    stored_name: Option<String>,
    cached_size: Option<u64>,
    // Last file durably stored for this field, used to decide what to
    // delete once a replacement is committed.
    committed: Option<PersistentFile>,
}

impl FileField {
    pub fn new(spec: &'static FileFieldSpec) -> Self {
        Self {
            spec,
            value: FileValue::Absent,
            stored_name: None,
            cached_size: None,
            committed: None,
        }
    }

    pub fn spec(&self) -> &'static FileFieldSpec {
        self.spec
    }

    pub fn value(&self) -> &FileValue {
        &self.value
    }

    pub fn set(&mut self, value: FileValue) {
        self.value = value;
    }

    pub fn set_transient(&mut self, file: TransientFile) {
        self.value = FileValue::Transient(file);
    }

    pub fn set_persistent(&mut self, file: PersistentFile) {
        self.value = FileValue::Persistent(file);
    }

    pub fn clear(&mut self) {
        self.value = FileValue::Absent;
    }

    /// Value of the backing name column.
    pub fn stored_name(&self) -> Option<&str> {
        self.stored_name.as_deref()
    }

    /// Value of the cached size column, when the spec maintains one.
    pub fn cached_size(&self) -> Option<u64> {
        self.cached_size
    }

    pub(crate) fn committed(&self) -> Option<&PersistentFile> {
        self.committed.as_ref()
    }

    pub(crate) fn record_committed(&mut self, file: Option<PersistentFile>) {
        self.committed = file;
    }

    pub(crate) fn write_columns(&mut self, name: Option<String>, size: Option<u64>) {
        self.stored_name = name;
        if self.spec.cache_size {
            self.cached_size = size;
        }
    }
}

/// Implemented by model types carrying managed file attributes. The session
/// reaches every file field through this trait during flush.
pub trait FileRecord: Send {
    /// Stable model name used for file-manager resolution.
    fn model(&self) -> &'static str;

    /// Persistence unit the model belongs to.
    fn unit(&self) -> &'static str {
        "default"
    }

    fn id(&self) -> Option<RecordId>;

    fn assign_id(&mut self, id: RecordId);

    /// Mutable views of every managed file field on the record.
    fn file_fields(&mut self) -> Vec<&mut FileField>;
}

enum TemplateToken {
    Literal(String),
    Random,
    Id,
}

/// Parsed persistent-name template. Literal segments are kept verbatim;
/// `{random}` draws a fresh hex token per render and `{id}` interpolates
/// the owning record's identity.
pub struct NameTemplate {
    raw: String,
    tokens: Vec<TemplateToken>,
}

impl NameTemplate {
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let bad = |reason: &str| SessionError::BadTemplate {
            template: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let mut tokens = Vec::new();
        let mut rest = raw;
        while let Some(open) = rest.find('{') {
            if !rest[..open].is_empty() {
                tokens.push(TemplateToken::Literal(rest[..open].to_owned()));
            }
            let close = rest[open..]
                .find('}')
                .ok_or_else(|| bad("unbalanced '{'"))?;
            match &rest[open + 1..open + close] {
                "random" => tokens.push(TemplateToken::Random),
                "id" => tokens.push(TemplateToken::Id),
                other => return Err(bad(&format!("unknown placeholder '{{{}}}'", other))),
            }
            rest = &rest[open + close + 1..];
        }
        if rest.contains('}') {
            return Err(bad("unbalanced '}'"));
        }
        if !rest.is_empty() {
            tokens.push(TemplateToken::Literal(rest.to_owned()));
        }
        if tokens.is_empty() {
            return Err(bad("empty template"));
        }
        Ok(Self {
            raw: raw.to_owned(),
            tokens,
        })
    }

    pub fn has_random(&self) -> bool {
        self.tokens
            .iter()
            .any(|token| matches!(token, TemplateToken::Random))
    }

    /// Renders the template; `{random}` draws a fresh token on every call.
    pub fn render(&self, id: Option<RecordId>) -> Result<String, SessionError> {
        let mut name = String::new();
        for token in &self.tokens {
            match token {
                TemplateToken::Literal(text) => name.push_str(text),
                TemplateToken::Random => {
                    name.push_str(&Uuid::new_v4().simple().to_string());
                }
                TemplateToken::Id => {
                    let id = id.ok_or_else(|| SessionError::MissingIdentity {
                        template: self.raw.clone(),
                    })?;
                    name.push_str(&id.to_string());
                }
            }
        }
        Ok(name)
    }
}
