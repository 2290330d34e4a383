use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use workbench_common::{PropertyBag, Validation};

use crate::error::CollaboratorError;

/// Serializable persistence state of an entity (a "mapper model").
///
/// A model knows how to turn itself into a property bag and back, how to
/// check itself, and whether the data it points at still exists.
pub trait Model: Send + Sync + fmt::Debug {
    /// Name the model factory uses to construct this model type.
    fn class_name(&self) -> &str;

    fn pickle(&self) -> PropertyBag;

    fn unpickle(&mut self, properties: &PropertyBag) -> Result<(), CollaboratorError>;

    fn validate(&self, validation: &mut Validation);

    /// Whether the backing store still holds the data this model refers to.
    fn exists_in_store(&self) -> bool;
}

/// A domain data object tracked by the repository.
#[derive(Debug)]
pub struct Entity {
    unique_id: String,
    entity_type: String,
    model: Option<Box<dyn Model>>,
    dirty: AtomicBool,
}

impl Entity {
    pub fn new(unique_id: impl Into<String>, entity_type: impl Into<String>, model: Box<dyn Model>) -> Self {
        Self {
            unique_id: unique_id.into(),
            entity_type: entity_type.into(),
            model: Some(model),
            dirty: AtomicBool::new(false),
        }
    }

    /// An entity with no backing model (e.g. a computed, in-memory product).
    pub fn transient(unique_id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            entity_type: entity_type.into(),
            model: None,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn model(&self) -> Option<&dyn Model> {
        self.model.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Flag unsaved in-memory edits; a dirty entity cannot be persisted.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }
}

/// Constructs models by class name and turns restored models into entities.
pub trait ModelFactory: Send + Sync {
    /// Create an empty model of `class_name` bound to the backing-store
    /// identity `unique_id`. `None` when the class is unknown.
    fn create_model(&self, class_name: &str, unique_id: &str) -> Option<Box<dyn Model>>;

    /// Build the live entity for a populated, validated model.
    fn materialize(&self, unique_id: &str, model: Box<dyn Model>) -> Result<Entity, CollaboratorError>;
}

/// In-memory stand-in for the backing stores: the set of unique IDs whose
/// data still exists.
#[derive(Debug, Default)]
pub struct Datastore {
    present: RwLock<HashSet<String>>,
}

impl Datastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for id in ids {
            store.insert(id);
        }
        store
    }

    pub fn insert(&self, unique_id: impl Into<String>) {
        self.present
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(unique_id.into());
    }

    pub fn remove(&self, unique_id: &str) -> bool {
        self.present
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(unique_id)
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.present
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(unique_id)
    }
}

/// Generic property-bag model used by the in-memory catalog.
///
/// Validation fails when any of the class's required keys is missing or
/// empty.
#[derive(Debug)]
pub struct PropertyModel {
    class_name: String,
    unique_id: String,
    required: Vec<String>,
    properties: PropertyBag,
    store: Arc<Datastore>,
}

impl PropertyModel {
    pub fn new(
        class_name: impl Into<String>,
        unique_id: impl Into<String>,
        properties: PropertyBag,
        store: Arc<Datastore>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            unique_id: unique_id.into(),
            required: Vec::new(),
            properties,
            store,
        }
    }

    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }
}

impl Model for PropertyModel {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn pickle(&self) -> PropertyBag {
        self.properties.clone()
    }

    fn unpickle(&mut self, properties: &PropertyBag) -> Result<(), CollaboratorError> {
        self.properties = properties.clone();
        Ok(())
    }

    fn validate(&self, validation: &mut Validation) {
        for key in &self.required {
            match self.properties.get(key) {
                Some(v) if !v.trim().is_empty() => {}
                _ => validation.error(key.clone(), "required property is missing"),
            }
        }
    }

    fn exists_in_store(&self) -> bool {
        self.store.contains(&self.unique_id)
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    entity_type: String,
    required: Vec<String>,
}

/// In-memory model factory: a table of known model classes, each mapped to
/// the entity type it produces.
#[derive(Debug)]
pub struct ModelCatalog {
    classes: HashMap<String, CatalogEntry>,
    store: Arc<Datastore>,
}

impl ModelCatalog {
    pub fn new(store: Arc<Datastore>) -> Self {
        Self {
            classes: HashMap::new(),
            store,
        }
    }

    /// Register a model class. `required` keys must be non-empty for a model
    /// of this class to validate.
    pub fn register(&mut self, class_name: &str, entity_type: &str, required: &[&str]) -> &mut Self {
        self.classes.insert(
            class_name.to_string(),
            CatalogEntry {
                entity_type: entity_type.to_string(),
                required: required.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn store(&self) -> &Arc<Datastore> {
        &self.store
    }

    /// Build an entity directly, as a loader would after reading the store.
    pub fn load(&self, class_name: &str, unique_id: &str, properties: PropertyBag) -> Result<Entity, CollaboratorError> {
        let mut model = self
            .create_model(class_name, unique_id)
            .ok_or_else(|| CollaboratorError::UnknownClass(class_name.to_string()))?;
        model.unpickle(&properties)?;
        self.materialize(unique_id, model)
    }
}

impl ModelFactory for ModelCatalog {
    fn create_model(&self, class_name: &str, unique_id: &str) -> Option<Box<dyn Model>> {
        let entry = self.classes.get(class_name)?;
        let mut model = PropertyModel::new(class_name, unique_id, PropertyBag::new(), Arc::clone(&self.store));
        model.required = entry.required.clone();
        Some(Box::new(model))
    }

    fn materialize(&self, unique_id: &str, model: Box<dyn Model>) -> Result<Entity, CollaboratorError> {
        let entry = self
            .classes
            .get(model.class_name())
            .ok_or_else(|| CollaboratorError::UnknownClass(model.class_name().to_string()))?;
        Ok(Entity::new(unique_id, entry.entity_type.clone(), model))
    }
}
