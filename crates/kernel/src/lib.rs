//! Live workbench state: the collaborators a session snapshot is captured from
//! and replayed into.
//!
//! Each concern is a trait so the session engine never depends on a concrete
//! UI. The in-memory implementations back the CLI and the test suites.
//!
//! # Invariants
//! - Every collaborator is `Send + Sync`; mutation goes through `&self`.
//! - `EntityRepository::get_all` returns a copy, never a live view.

pub mod algorithms;
pub mod entity;
pub mod error;
pub mod preferences;
pub mod progress;
pub mod repository;
pub mod viewers;
pub mod windows;
pub mod workbench;

pub use algorithms::{AlgorithmHost, AlgorithmRegistry, AlgorithmSpec, RegisteredAlgorithm};
pub use entity::{Datastore, Entity, Model, ModelCatalog, ModelFactory, PropertyModel};
pub use error::CollaboratorError;
pub use preferences::{PreferencePageState, PreferenceRegistry, PreferenceStore};
pub use progress::{CancelToken, LoggingProgress, NullProgress, ProgressReporter};
pub use repository::{EntityRepository, Repository};
pub use viewers::{LayerState, RendererState, ViewerHandle, ViewerPartState, ViewerRegistry, ViewerState};
pub use windows::{PerspectiveState, WindowGeometry, WindowManager, WindowState};
pub use workbench::Workbench;
