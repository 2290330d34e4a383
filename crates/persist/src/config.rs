use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use workbench_kernel::Entity;

use crate::error::SessionError;

/// Entity and model classes that are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exclusions {
    /// Matched against `Entity::entity_type`.
    pub entity_classes: Vec<String>,
    /// Matched against `Model::class_name`.
    pub model_classes: Vec<String>,
}

impl Default for Exclusions {
    fn default() -> Self {
        Self {
            entity_classes: vec!["SeismicSurvey3d".into(), "SeismicSurvey2d".into()],
            model_classes: vec!["InMemoryMapperModel".into()],
        }
    }
}

impl Exclusions {
    pub fn none() -> Self {
        Self {
            entity_classes: Vec::new(),
            model_classes: Vec::new(),
        }
    }

    /// Whether an entity may be written to a session or the index store:
    /// it has a model, is not dirty, and neither its type nor its model
    /// class is deny-listed.
    pub fn allows(&self, entity: &Entity) -> bool {
        let Some(model) = entity.model() else {
            return false;
        };
        !entity.is_dirty()
            && !self.entity_classes.iter().any(|c| c == entity.entity_type())
            && !self.model_classes.iter().any(|c| c == model.class_name())
    }
}

/// Session engine configuration.
///
/// Every field has a default, so a JSON config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root directory for sessions, batch files and engine state.
    pub workspace_dir: PathBuf,
    pub sessions_dir: String,
    pub batch_dir: String,
    pub session_suffix: String,
    pub batch_suffix: String,
    /// Per-user settings file, records the last active session.
    pub preferences_file: String,
    /// Entity index store file.
    pub index_file: String,
    pub exclusions: Exclusions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("."),
            sessions_dir: "savesets".into(),
            batch_dir: "batch".into(),
            session_suffix: ".gcs".into(),
            batch_suffix: ".gcb".into(),
            preferences_file: ".userPreferences.json".into(),
            index_file: "repository.session.json".into(),
            exclusions: Exclusions::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_workspace(dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| SessionError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), SessionError> {
        for (name, suffix) in [("session_suffix", &self.session_suffix), ("batch_suffix", &self.batch_suffix)] {
            if !suffix.starts_with('.') || suffix.len() < 2 {
                return Err(SessionError::Config {
                    path: path.to_path_buf(),
                    message: format!("{name} must look like \".ext\", got {suffix:?}"),
                });
            }
        }
        Ok(())
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.workspace_dir.join(&self.sessions_dir)
    }

    pub fn batch_path(&self) -> PathBuf {
        self.workspace_dir.join(&self.batch_dir)
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.workspace_dir.join(&self.preferences_file)
    }

    pub fn index_path(&self) -> PathBuf {
        self.workspace_dir.join(&self.index_file)
    }

    /// Path of a named interactive session; the suffix is appended when
    /// missing.
    pub fn session_file(&self, name: &str) -> PathBuf {
        self.sessions_path().join(with_suffix(name, &self.session_suffix))
    }

    pub fn batch_file(&self, name: &str) -> PathBuf {
        self.batch_path().join(with_suffix(name, &self.batch_suffix))
    }
}

fn with_suffix(name: &str, suffix: &str) -> String {
    if name.ends_with(suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use workbench_common::PropertyBag;
    use workbench_kernel::{Datastore, PropertyModel};

    fn entity(entity_type: &str, model_class: &str) -> Entity {
        let model = PropertyModel::new(model_class, "id/1", PropertyBag::new(), Arc::new(Datastore::new()));
        Entity::new("id/1", entity_type, Box::new(model))
    }

    #[test]
    fn defaults_match_file_conventions() {
        let config = SessionConfig::with_workspace("/ws");
        assert_eq!(config.session_file("demo"), PathBuf::from("/ws/savesets/demo.gcs"));
        assert_eq!(config.session_file("demo.gcs"), PathBuf::from("/ws/savesets/demo.gcs"));
        assert_eq!(config.batch_file("run"), PathBuf::from("/ws/batch/run.gcb"));
    }

    #[test]
    fn exclusions_cover_type_model_and_state() {
        let rules = Exclusions::default();
        assert!(rules.allows(&entity("Well", "WellModel")));
        assert!(!rules.allows(&entity("SeismicSurvey3d", "SurveyModel")));
        assert!(!rules.allows(&entity("Grid", "InMemoryMapperModel")));
        assert!(!rules.allows(&Entity::transient("tmp", "Grid")));

        let dirty = entity("Well", "WellModel");
        dirty.mark_dirty();
        assert!(!rules.allows(&dirty));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{ "session_suffix": ".sess" }"#).unwrap();
        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.session_suffix, ".sess");
        assert_eq!(config.batch_suffix, ".gcb");
        assert_eq!(config.exclusions, Exclusions::default());
    }

    #[test]
    fn bad_suffix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{ "batch_suffix": "gcb" }"#).unwrap();
        assert!(matches!(SessionConfig::load(&path), Err(SessionError::Config { .. })));
    }
}
