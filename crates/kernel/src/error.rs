/// Failure reported by a live collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("unknown class: {0}")]
    UnknownClass(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("{0}")]
    Failed(String),
}
