use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use workbench_common::{AlgorithmAction, PropertyBag};

use crate::error::CollaboratorError;

/// Everything needed to recreate one algorithm instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmSpec {
    pub name: String,
    pub class_name: String,
    pub window_id: String,
    pub action: AlgorithmAction,
    pub parameters: PropertyBag,
}

impl AlgorithmSpec {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>, window_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            window_id: window_id.into(),
            action: AlgorithmAction::Load,
            parameters: PropertyBag::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredAlgorithm {
    pub id: u32,
    pub spec: AlgorithmSpec,
}

/// Active algorithm instances.
pub trait AlgorithmRegistry: Send + Sync {
    /// Create and register an instance, returning its id.
    fn activate(&self, spec: AlgorithmSpec) -> Result<u32, CollaboratorError>;

    /// Remove an instance. Returns whether it was registered.
    fn deactivate(&self, id: u32) -> bool;

    /// Registered instances ordered by id.
    fn registered(&self) -> Vec<RegisteredAlgorithm>;
}

#[derive(Debug, Default)]
struct HostState {
    instances: BTreeMap<u32, AlgorithmSpec>,
    next_id: u32,
}

/// In-memory algorithm registry.
///
/// When constructed with a class list, activating any other class fails with
/// [`CollaboratorError::UnknownClass`].
#[derive(Debug, Default)]
pub struct AlgorithmHost {
    known: Option<HashSet<String>>,
    state: RwLock<HostState>,
}

impl AlgorithmHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classes<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: Some(classes.into_iter().map(Into::into).collect()),
            state: RwLock::default(),
        }
    }

    pub fn get(&self, id: u32) -> Option<AlgorithmSpec> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlgorithmRegistry for AlgorithmHost {
    fn activate(&self, spec: AlgorithmSpec) -> Result<u32, CollaboratorError> {
        if let Some(known) = &self.known {
            if !known.contains(&spec.class_name) {
                return Err(CollaboratorError::UnknownClass(spec.class_name));
            }
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.next_id += 1;
        let id = state.next_id;
        tracing::debug!(id, class = %spec.class_name, window = %spec.window_id, "algorithm activated");
        state.instances.insert(id, spec);
        Ok(id)
    }

    fn deactivate(&self, id: u32) -> bool {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .remove(&id)
            .is_some()
    }

    fn registered(&self) -> Vec<RegisteredAlgorithm> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .iter()
            .map(|(id, spec)| RegisteredAlgorithm {
                id: *id,
                spec: spec.clone(),
            })
            .collect()
    }
}
