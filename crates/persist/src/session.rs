use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use workbench_kernel::{AlgorithmSpec, ProgressReporter};

use crate::collaborators::Collaborators;
use crate::config::SessionConfig;
use crate::encoder::{SaveMode, SnapshotEncoder};
use crate::error::SessionError;
use crate::index_store::{EntityIndexStore, IndexRestore};
use crate::model::Snapshot;
use crate::restore::{RestoreOptions, RestoreOrchestrator, RestoreReport};

/// Per-user settings persisted next to the sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserPreferences {
    last_active_session: Option<PathBuf>,
}

/// Saves and restores sessions for one set of live collaborators.
pub struct SessionService {
    config: SessionConfig,
    live: Collaborators,
    encoder: SnapshotEncoder,
}

impl SessionService {
    pub fn new(config: SessionConfig, live: Collaborators) -> Self {
        let encoder = SnapshotEncoder::new(config.exclusions.clone());
        Self { config, live, encoder }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.live
    }

    pub fn capture(&self, mode: SaveMode) -> Snapshot {
        self.encoder.capture(&self.live, mode)
    }

    /// Capture the live state and write it to `path`.
    pub fn save_session(&self, path: impl AsRef<Path>, mode: SaveMode) -> Result<Snapshot, SessionError> {
        let path = path.as_ref();
        let _span = tracing::info_span!("save", path = %path.display(), ?mode).entered();
        ensure_parent(path)?;
        let snapshot = self.capture(mode);
        self.encoder.write_file(path, &snapshot)?;
        Ok(snapshot)
    }

    /// Save under the sessions directory and remember it as the last active
    /// session.
    pub fn save_session_as(&self, name: &str) -> Result<PathBuf, SessionError> {
        let path = self.config.session_file(name);
        self.save_session(&path, SaveMode::Interactive)?;
        self.record_last_active(&path)?;
        Ok(path)
    }

    pub fn save_batch_as(&self, name: &str) -> Result<PathBuf, SessionError> {
        let path = self.config.batch_file(name);
        self.save_session(&path, SaveMode::Batch)?;
        Ok(path)
    }

    /// Write a batch file containing only the given algorithms.
    pub fn save_algorithms_as_batch(
        &self,
        path: impl AsRef<Path>,
        algorithms: &[AlgorithmSpec],
    ) -> Result<Snapshot, SessionError> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let snapshot = self.encoder.capture_algorithms(algorithms);
        self.encoder.write_file(path, &snapshot)?;
        Ok(snapshot)
    }

    /// Restore a session file. Entities that turned out stale are dropped
    /// from the entity index as well.
    pub fn restore_session(
        &self,
        path: impl AsRef<Path>,
        options: RestoreOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<RestoreReport, SessionError> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), launching = options.launching, "restoring session");
        let report = RestoreOrchestrator::new(&self.live, progress)
            .with_options(options)
            .run_file(path)?;

        let stale = report.stale_entities();
        if !stale.is_empty() && self.config.index_path().exists() {
            let removed = self.index_store()?.remove_nodes(stale)?;
            tracing::debug!(removed, "stale entities dropped from index");
        }
        if report.is_complete() {
            self.record_last_active(path)?;
        }
        Ok(report)
    }

    /// The session most recently saved or restored, if recorded.
    pub fn last_active_session(&self) -> Result<Option<PathBuf>, SessionError> {
        Ok(self.read_preferences()?.last_active_session)
    }

    pub fn index_store(&self) -> Result<EntityIndexStore, SessionError> {
        EntityIndexStore::open(self.config.index_path())
    }

    /// Snapshot the repository into the entity index.
    pub fn save_index(&self) -> Result<usize, SessionError> {
        self.index_store()?
            .save(self.live.repository.as_ref(), &self.config.exclusions)
    }

    /// Repopulate the repository from the entity index.
    pub fn restore_index(&self) -> Result<IndexRestore, SessionError> {
        self.index_store()?
            .restore(self.live.models.as_ref(), self.live.repository.as_ref())
    }

    fn read_preferences(&self) -> Result<UserPreferences, SessionError> {
        let path = self.config.preferences_path();
        if !path.exists() {
            return Ok(UserPreferences::default());
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn record_last_active(&self, session: &Path) -> Result<(), SessionError> {
        let mut prefs = self.read_preferences()?;
        prefs.last_active_session = Some(session.to_path_buf());
        let path = self.config.preferences_path();
        ensure_parent(&path)?;
        std::fs::write(&path, serde_json::to_string_pretty(&prefs)?)?;
        tracing::debug!(session = %session.display(), "last active session recorded");
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder;
    use std::sync::Arc;
    use workbench_common::AlgorithmAction;
    use workbench_kernel::{
        AlgorithmHost, AlgorithmRegistry, Datastore, EntityRepository, ModelCatalog, NullProgress, PreferenceStore,
        Repository, Workbench,
    };

    fn service(dir: &Path) -> (SessionService, Arc<Repository>, Arc<AlgorithmHost>) {
        let store = Arc::new(Datastore::with_ids(["grid/1"]));
        let mut catalog = ModelCatalog::new(store);
        catalog.register("GridModel", "Grid", &[]);
        let repo = Arc::new(Repository::new());
        let algorithms = Arc::new(AlgorithmHost::new());
        let live = Collaborators::with_workbench(
            repo.clone(),
            Arc::new(catalog),
            algorithms.clone(),
            Arc::new(PreferenceStore::new()),
            Arc::new(Workbench::new()),
        );
        (SessionService::new(SessionConfig::with_workspace(dir), live), repo, algorithms)
    }

    #[test]
    fn save_as_appends_suffix_and_records_last_active() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, _) = service(dir.path());
        assert_eq!(service.last_active_session().unwrap(), None);

        let path = service.save_session_as("monday").unwrap();
        assert_eq!(path, dir.path().join("savesets").join("monday.gcs"));
        assert!(path.exists());
        assert_eq!(service.last_active_session().unwrap(), Some(path));
    }

    #[test]
    fn batch_files_execute_algorithms() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, algorithms) = service(dir.path());
        algorithms
            .activate(AlgorithmSpec::new("Smooth", "pkg.Smoother", "w1").with_parameter("passes", "3"))
            .unwrap();

        let path = service.save_batch_as("nightly").unwrap();
        assert!(path.ends_with("batch/nightly.gcb"));
        let snapshot = decoder::parse_file(&path).unwrap();
        assert!(snapshot.is_batch());
        assert_eq!(snapshot.algorithms[0].action, AlgorithmAction::Execute);
        assert_eq!(snapshot.algorithms[0].properties.get("passes"), Some("3"));
    }

    #[test]
    fn selected_algorithms_are_numbered_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, _) = service(dir.path());
        let path = dir.path().join("out").join("pick.gcb");
        let specs = [
            AlgorithmSpec::new("A", "pkg.A", "w"),
            AlgorithmSpec::new("B", "pkg.B", "w"),
        ];
        service.save_algorithms_as_batch(&path, &specs).unwrap();
        let snapshot = decoder::parse_file(&path).unwrap();
        let ids: Vec<u32> = snapshot.algorithms.iter().map(|a| a.unique_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(snapshot.entities.is_empty());
    }

    #[test]
    fn restore_of_missing_file_fails_without_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, _) = service(dir.path());
        let result = service.restore_session(dir.path().join("nope.gcs"), RestoreOptions::default(), &NullProgress);
        assert!(matches!(result, Err(SessionError::Io(_))));
        assert_eq!(service.last_active_session().unwrap(), None);
    }

    #[test]
    fn index_round_trip_through_service() {
        let dir = tempfile::tempdir().unwrap();
        let (service, repo, _) = service(dir.path());
        let catalog = {
            let mut c = ModelCatalog::new(Arc::new(Datastore::with_ids(["grid/1"])));
            c.register("GridModel", "Grid", &[]);
            c
        };
        repo.add_named("g", catalog.load("GridModel", "grid/1", Default::default()).unwrap());
        assert_eq!(service.save_index().unwrap(), 1);

        repo.clear();
        let outcome = service.restore_index().unwrap();
        assert_eq!(outcome.restored, vec!["grid/1"]);
        assert_eq!(repo.var_names(), vec!["g"]);
    }
}
