//! Persistent index of the entity repository.
//!
//! A single JSON file holds one node per entity:
//! ```text
//! {
//!   "schema_version": 1,
//!   "nodes": {
//!     "well.42": {
//!       "identity":   { "well/42": "well/42" },
//!       "alias":      { "w1@*%": "well/42" },
//!       "properties": { "class": "WellModel", ... }
//!     }
//!   }
//! }
//! ```
//! Identity and alias records live in separate maps, so a unique ID can never
//! collide with an alias key.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use workbench_common::PropertyBag;
use workbench_kernel::{EntityRepository, ModelFactory};

use crate::config::Exclusions;
use crate::encoder::{persistable_entities, pickle_model};
use crate::error::{RestoreFailure, SessionError};
use crate::restore::materialize_entity;

const INDEX_SCHEMA_VERSION: u32 = 1;
const ALIAS_SUFFIX: &str = "@*%";

/// Node key for a unique ID: path separators become dots.
pub fn node_key(unique_id: &str) -> String {
    unique_id.replace('/', ".")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexNode {
    pub identity: BTreeMap<String, String>,
    pub alias: BTreeMap<String, String>,
    pub properties: BTreeMap<String, String>,
}

impl IndexNode {
    fn new(var_name: &str, unique_id: &str, properties: &PropertyBag) -> Self {
        Self {
            identity: BTreeMap::from([(unique_id.to_string(), unique_id.to_string())]),
            alias: BTreeMap::from([(format!("{var_name}{ALIAS_SUFFIX}"), unique_id.to_string())]),
            properties: properties.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.identity.keys().next().map(String::as_str)
    }

    /// `(var name, unique id)` pairs recorded for this node.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.alias
            .iter()
            .filter_map(|(k, v)| k.strip_suffix(ALIAS_SUFFIX).map(|var| (var, v.as_str())))
    }

    fn property_bag(&self) -> PropertyBag {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IndexFile {
    schema_version: u32,
    nodes: BTreeMap<String, IndexNode>,
}

/// Result of repopulating a repository from the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRestore {
    pub restored: Vec<String>,
    pub failures: Vec<RestoreFailure>,
    /// Nodes dropped because their entity is gone or invalid.
    pub pruned: Vec<String>,
}

/// File-backed entity index.
#[derive(Debug)]
pub struct EntityIndexStore {
    path: PathBuf,
    file: IndexFile,
}

impl EntityIndexStore {
    /// Open the index at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let file = if path.exists() {
            let file: IndexFile = serde_json::from_reader(std::io::BufReader::new(std::fs::File::open(&path)?))?;
            if file.schema_version != INDEX_SCHEMA_VERSION {
                return Err(SessionError::SchemaMismatch {
                    file_version: file.schema_version,
                    expected_version: INDEX_SCHEMA_VERSION,
                });
            }
            file
        } else {
            IndexFile {
                schema_version: INDEX_SCHEMA_VERSION,
                nodes: BTreeMap::new(),
            }
        };
        tracing::debug!(path = %path.display(), nodes = file.nodes.len(), "entity index opened");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.file.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.nodes.is_empty()
    }

    pub fn node(&self, unique_id: &str) -> Option<&IndexNode> {
        self.file.nodes.get(&node_key(unique_id))
    }

    /// Sorted unique IDs of all indexed entities.
    pub fn unique_ids(&self) -> BTreeSet<String> {
        self.file
            .nodes
            .values()
            .filter_map(|n| n.unique_id().map(str::to_string))
            .collect()
    }

    pub fn var_name_map(&self) -> HashMap<String, String> {
        self.file
            .nodes
            .values()
            .flat_map(|n| n.aliases())
            .map(|(var, uid)| (uid.to_string(), var.to_string()))
            .collect()
    }

    /// Replace the whole index with the persistable contents of `repository`.
    pub fn save(&mut self, repository: &dyn EntityRepository, exclusions: &Exclusions) -> Result<usize, SessionError> {
        let entries = repository.get_all();
        self.file.nodes.clear();
        for (var_name, entity) in persistable_entities(&entries, exclusions) {
            let Some(model) = entity.model() else { continue };
            let node = IndexNode::new(var_name, entity.unique_id(), &pickle_model(model));
            self.file.nodes.insert(node_key(entity.unique_id()), node);
        }
        self.flush()?;
        tracing::info!(nodes = self.len(), path = %self.path.display(), "entity index saved");
        Ok(self.len())
    }

    /// Whether the persistable repository content differs from the index by
    /// unique ID.
    pub fn is_modified(&self, repository: &dyn EntityRepository, exclusions: &Exclusions) -> bool {
        let entries = repository.get_all();
        let live: BTreeSet<String> = persistable_entities(&entries, exclusions)
            .map(|(_, e)| e.unique_id().to_string())
            .collect();
        live != self.unique_ids()
    }

    /// Drop the node for `unique_id` and rewrite the file.
    pub fn remove_node(&mut self, unique_id: &str) -> Result<bool, SessionError> {
        let removed = self.file.nodes.remove(&node_key(unique_id)).is_some();
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    /// Drop several nodes with one rewrite. Returns how many existed.
    pub fn remove_nodes<'a>(&mut self, unique_ids: impl IntoIterator<Item = &'a str>) -> Result<usize, SessionError> {
        let removed = unique_ids
            .into_iter()
            .filter(|uid| self.file.nodes.remove(&node_key(uid)).is_some())
            .count();
        if removed > 0 {
            self.flush()?;
        }
        Ok(removed)
    }

    /// Repopulate `repository` from the index. Entities that fail validation
    /// or are gone from the backing store have their nodes pruned.
    pub fn restore(
        &mut self,
        models: &dyn ModelFactory,
        repository: &dyn EntityRepository,
    ) -> Result<IndexRestore, SessionError> {
        repository.set_var_name_map(self.var_name_map());
        let mut outcome = IndexRestore::default();
        for node in self.file.nodes.values() {
            let Some(unique_id) = node.unique_id() else {
                tracing::warn!("index node without identity record, skipped");
                continue;
            };
            match materialize_entity(models, repository, unique_id, &node.property_bag()) {
                Ok(_) => outcome.restored.push(unique_id.to_string()),
                Err(failure) => {
                    if failure.invalidates_index() {
                        outcome.pruned.push(unique_id.to_string());
                    }
                    outcome.failures.push(failure);
                }
            }
        }
        let pruned = outcome.pruned.clone();
        self.remove_nodes(pruned.iter().map(String::as_str))?;
        tracing::info!(
            restored = outcome.restored.len(),
            pruned = outcome.pruned.len(),
            "entity index restored"
        );
        Ok(outcome)
    }

    fn flush(&self) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(&self.path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &self.file)?;
        Ok(())
    }
}
