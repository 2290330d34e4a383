use std::path::PathBuf;

use workbench_kernel::CollaboratorError;

/// Failures that abort a whole save or restore.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration {path}: {message}")]
    Config { path: PathBuf, message: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch { file_version: u32, expected_version: u32 },
}

/// Structurally malformed session text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("unterminated tag")]
    UnterminatedTag,
    #[error("malformed tag: {0}")]
    MalformedTag(String),
    #[error("closing tag </{found}> does not match <{expected}>")]
    MismatchedTag { expected: String, found: String },
    #[error("unexpected closing tag </{0}>")]
    UnexpectedClose(String),
    #[error("unexpected end of input inside <{0}>")]
    UnexpectedEof(String),
    #[error("missing root element")]
    MissingRoot,
    #[error("<{element}> is missing required attribute {attribute:?}")]
    MissingAttribute { element: String, attribute: String },
    #[error("<{element}> attribute {attribute:?} has invalid value {value:?}")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },
    #[error("unexpected content after the root element")]
    TrailingContent,
}

/// A per-item failure absorbed during restore.
///
/// These are recorded in the restore report and logged; they never fail the
/// restore as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RestoreFailure {
    #[error("entity {unique_id} failed validation: {message}")]
    Validation { unique_id: String, message: String },
    #[error("entity {unique_id} no longer exists in its datastore")]
    Existence { unique_id: String },
    #[error("{element} references missing {target}")]
    Reference { element: String, target: String },
    #[error("entity {unique_id}: unknown model class {class_name:?}")]
    UnknownModelClass { unique_id: String, class_name: String },
    #[error("entity {unique_id}: could not unpickle model: {source}")]
    Unpickle {
        unique_id: String,
        #[source]
        source: CollaboratorError,
    },
    #[error("{item}: {source}")]
    Collaborator {
        item: String,
        #[source]
        source: CollaboratorError,
    },
}

impl RestoreFailure {
    pub fn collaborator(item: impl Into<String>, source: CollaboratorError) -> Self {
        Self::Collaborator {
            item: item.into(),
            source,
        }
    }

    /// Whether the failure means the entity's index record is stale.
    pub fn invalidates_index(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Existence { .. })
    }
}
