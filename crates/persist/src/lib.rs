//! Session persistence: capture the live workbench into a session file and
//! replay one back.
//!
//! A session file is a line-oriented markup document followed by one opaque
//! layout blob per window. [`SnapshotEncoder`] captures and writes it,
//! [`decoder::parse`] reads it into a [`Snapshot`], and
//! [`RestoreOrchestrator`] replays that into the collaborators.
//!
//! # Invariants
//! - `escape::decode(escape::encode(s)) == s` for every string.
//! - Parsing an encoded snapshot yields the same snapshot.
//! - Excluded, dirty or model-less entities are never written.
//! - Restore phases run in order; a failing item never stops the ones after it.
//! - Encoding is deterministic: algorithm parameters are written sorted by key.

pub mod collaborators;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod escape;
pub mod index_store;
pub mod model;
pub mod restore;
pub mod session;

pub use collaborators::Collaborators;
pub use config::{Exclusions, SessionConfig};
pub use decoder::{parse, parse_file};
pub use encoder::{SaveMode, SnapshotEncoder, encode};
pub use error::{ParseError, ParseErrorKind, RestoreFailure, SessionError};
pub use index_store::{EntityIndexStore, IndexNode, IndexRestore};
pub use model::{
    AlgorithmRecord, EntityRecord, LayerRecord, PerspectiveRecord, PreferencePageRecord, ReferenceGap,
    RendererRecord, Snapshot, SnapshotHeader, ViewerId, ViewerPartRecord, ViewerRecord,
};
pub use restore::{Phase, RestoreOptions, RestoreOrchestrator, RestoreReport, materialize_entity};
pub use session::SessionService;
