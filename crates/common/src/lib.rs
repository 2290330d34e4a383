//! Shared value types used by the live collaborators and the session engine.

mod types;

pub use types::{AlgorithmAction, PropertyBag, Severity, UnknownAction, Validation, ValidationMessage};
