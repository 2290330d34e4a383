use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::entity::Entity;

/// The live set of loaded entities, each exposed under a short alias
/// ("var name").
pub trait EntityRepository: Send + Sync {
    /// Copy of the current contents in insertion order, as `(var name, entity)`.
    fn get_all(&self) -> Vec<(String, Arc<Entity>)>;

    /// Add an entity and return the var name it was filed under.
    ///
    /// When a var-name map is installed and holds the entity's unique ID, that
    /// alias is used. An entity whose unique ID is already present replaces
    /// the existing one.
    fn add(&self, entity: Entity) -> String;

    fn clear(&self);

    /// Install the `unique id -> var name` map consulted by `add`.
    fn set_var_name_map(&self, map: HashMap<String, String>);

    fn lookup_variable_name(&self, unique_id: &str) -> Option<String>;

    fn get(&self, var_name: &str) -> Option<Arc<Entity>>;

    fn find_by_unique_id(&self, unique_id: &str) -> Option<Arc<Entity>>;
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<(String, Arc<Entity>)>,
    var_names: HashMap<String, String>,
    next_index: u64,
}

impl Inner {
    fn generate_name(&mut self, entity_type: &str) -> String {
        let stem: String = entity_type
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let stem = if stem.is_empty() { "entity".to_string() } else { stem };
        loop {
            self.next_index += 1;
            let candidate = format!("{stem}{}", self.next_index);
            if !self.entries.iter().any(|(name, _)| *name == candidate) {
                return candidate;
            }
        }
    }
}

/// In-memory repository.
///
/// Readers take a copy under a read lock, so a save can walk the contents
/// while a loader keeps adding.
#[derive(Debug, Default)]
pub struct Repository {
    inner: RwLock<Inner>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Var names in insertion order.
    pub fn var_names(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Add under an explicit alias, bypassing the var-name map.
    pub fn add_named(&self, var_name: impl Into<String>, entity: Entity) {
        let var_name = var_name.into();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .retain(|(name, e)| *name != var_name && e.unique_id() != entity.unique_id());
        inner.entries.push((var_name, Arc::new(entity)));
    }

    pub fn remove(&self, var_name: &str) -> Option<Arc<Entity>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let pos = inner.entries.iter().position(|(name, _)| name == var_name)?;
        Some(inner.entries.remove(pos).1)
    }
}

impl EntityRepository for Repository {
    fn get_all(&self) -> Vec<(String, Arc<Entity>)> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }

    fn add(&self, entity: Entity) -> String {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let existing = inner
            .entries
            .iter()
            .position(|(_, e)| e.unique_id() == entity.unique_id());
        let mapped = inner.var_names.get(entity.unique_id()).cloned();

        if let Some(pos) = existing {
            let name = mapped.unwrap_or_else(|| inner.entries[pos].0.clone());
            tracing::debug!(unique_id = entity.unique_id(), var_name = %name, "replacing entity");
            inner.entries[pos] = (name.clone(), Arc::new(entity));
            return name;
        }

        let name = match mapped {
            Some(name) if !inner.entries.iter().any(|(n, _)| *n == name) => name,
            _ => inner.generate_name(entity.entity_type()),
        };
        inner.entries.push((name.clone(), Arc::new(entity)));
        name
    }

    fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
    }

    fn set_var_name_map(&self, map: HashMap<String, String>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .var_names = map;
    }

    fn lookup_variable_name(&self, unique_id: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .iter()
            .find(|(_, e)| e.unique_id() == unique_id)
            .map(|(name, _)| name.clone())
            .or_else(|| inner.var_names.get(unique_id).cloned())
    }

    fn get(&self, var_name: &str) -> Option<Arc<Entity>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .find(|(name, _)| name == var_name)
            .map(|(_, e)| Arc::clone(e))
    }

    fn find_by_unique_id(&self, unique_id: &str) -> Option<Arc<Entity>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .find(|(_, e)| e.unique_id() == unique_id)
            .map(|(_, e)| Arc::clone(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_starts_empty() {
        let repo = Repository::new();
        assert!(repo.is_empty());
        assert!(repo.get_all().is_empty());
    }

    #[test]
    fn add_uses_var_name_map() {
        let repo = Repository::new();
        repo.set_var_name_map(HashMap::from([("well/42".to_string(), "w1".to_string())]));
        let name = repo.add(Entity::transient("well/42", "Well"));
        assert_eq!(name, "w1");
        assert_eq!(repo.get("w1").unwrap().unique_id(), "well/42");
        assert_eq!(repo.lookup_variable_name("well/42").as_deref(), Some("w1"));
    }

    #[test]
    fn add_generates_names_when_unmapped() {
        let repo = Repository::new();
        let a = repo.add(Entity::transient("a", "Grid3d"));
        let b = repo.add(Entity::transient("b", "Grid3d"));
        assert_eq!(a, "grid3d1");
        assert_eq!(b, "grid3d2");
    }

    #[test]
    fn add_same_unique_id_overwrites() {
        let repo = Repository::new();
        repo.add(Entity::transient("grid/7", "Grid"));
        repo.add(Entity::transient("grid/7", "Grid"));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn mapped_name_collision_falls_back_to_generated() {
        let repo = Repository::new();
        repo.add_named("g1", Entity::transient("grid/1", "Grid"));
        repo.set_var_name_map(HashMap::from([("grid/2".to_string(), "g1".to_string())]));
        let name = repo.add(Entity::transient("grid/2", "Grid"));
        assert_ne!(name, "g1");
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn get_all_is_a_copy() {
        let repo = Repository::new();
        repo.add(Entity::transient("a", "Well"));
        let copy = repo.get_all();
        repo.add(Entity::transient("b", "Well"));
        assert_eq!(copy.len(), 1);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn clear_keeps_var_name_map() {
        let repo = Repository::new();
        repo.set_var_name_map(HashMap::from([("a".to_string(), "x".to_string())]));
        repo.add(Entity::transient("a", "Well"));
        repo.clear();
        assert!(repo.is_empty());
        assert_eq!(repo.add(Entity::transient("a", "Well")), "x");
    }
}
