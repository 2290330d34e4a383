//! Replays a [`Snapshot`] into the live workbench.
//!
//! Phases run strictly in order: preferences, entities, windows, algorithms,
//! viewers. A failing item is recorded in the [`RestoreReport`] and the
//! restore moves on to the next one.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use workbench_common::{PropertyBag, Validation};
use workbench_kernel::{
    AlgorithmSpec, EntityRepository, LayerState, ModelFactory, PerspectiveState, ProgressReporter, ViewerHandle,
};

use crate::collaborators::Collaborators;
use crate::decoder;
use crate::error::{RestoreFailure, SessionError};
use crate::model::{Snapshot, ViewerPartRecord};

const CLASS_KEY: &str = "class";
const CLASS_PREFIX: &str = "class ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    ParsePreferences,
    RestoreEntities,
    RestoreWindows,
    RestoreAlgorithms,
    RestoreViewers,
    Done,
    /// The session could not be read or parsed.
    Aborted,
    /// Stopped between items at the caller's request.
    Cancelled,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ParsePreferences => "preferences",
            Self::RestoreEntities => "entities",
            Self::RestoreWindows => "windows",
            Self::RestoreAlgorithms => "algorithms",
            Self::RestoreViewers => "viewers",
            Self::Done => "done",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreOptions {
    /// Restoring at application start-up. Existing windows are kept open
    /// while restoring and closed afterwards if the session did not recreate
    /// them. Otherwise every window but the active one is closed first.
    pub launching: bool,
}

/// Outcome of a restore that was not aborted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub phase: Phase,
    /// `(unique id, var name)` of every entity added.
    pub entities: Vec<(String, String)>,
    /// Registry ids of the activated algorithms.
    pub algorithms: Vec<u32>,
    /// Old window id to new window id.
    pub windows: HashMap<String, String>,
    pub viewers: usize,
    pub renderers: usize,
    pub failures: Vec<RestoreFailure>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Unique IDs whose index records went stale during this restore.
    pub fn stale_entities(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter_map(|f| match f {
                RestoreFailure::Validation { unique_id, .. } | RestoreFailure::Existence { unique_id } => {
                    Some(unique_id.as_str())
                }
                _ => None,
            })
            .collect()
    }

    pub fn count_failures(&self, pred: impl Fn(&RestoreFailure) -> bool) -> usize {
        self.failures.iter().filter(|f| pred(f)).count()
    }
}

/// Rebuild one entity from its pickled properties and add it to the
/// repository, returning the var name it was filed under.
///
/// The entity is added only when the backing store still holds its data and
/// its model then validates without errors.
pub fn materialize_entity(
    models: &dyn ModelFactory,
    repository: &dyn EntityRepository,
    unique_id: &str,
    properties: &PropertyBag,
) -> Result<String, RestoreFailure> {
    let class_name = properties
        .get(CLASS_KEY)
        .map(|c| c.strip_prefix(CLASS_PREFIX).unwrap_or(c).trim())
        .unwrap_or_default();
    let unknown = || RestoreFailure::UnknownModelClass {
        unique_id: unique_id.to_string(),
        class_name: class_name.to_string(),
    };
    if class_name.is_empty() {
        tracing::error!(unique_id, "entity has no model class");
        return Err(unknown());
    }
    let Some(mut model) = models.create_model(class_name, unique_id) else {
        tracing::error!(unique_id, class_name, "unknown model class");
        return Err(unknown());
    };

    model.unpickle(properties).map_err(|source| {
        tracing::error!(unique_id, error = %source, "could not unpickle model");
        RestoreFailure::Unpickle {
            unique_id: unique_id.to_string(),
            source,
        }
    })?;

    if !model.exists_in_store() {
        tracing::warn!(unique_id, "could not restore entity: no longer exists in datastore");
        return Err(RestoreFailure::Existence {
            unique_id: unique_id.to_string(),
        });
    }

    let mut validation = Validation::new();
    model.validate(&mut validation);
    if validation.contains_error() {
        let message = validation.error_summary();
        tracing::error!(unique_id, %message, "could not restore entity: model validation failed");
        return Err(RestoreFailure::Validation {
            unique_id: unique_id.to_string(),
            message,
        });
    }

    let entity = models
        .materialize(unique_id, model)
        .map_err(|source| RestoreFailure::collaborator(format!("entity {unique_id}"), source))?;
    let var_name = repository.add(entity);
    tracing::info!(unique_id, var_name = %var_name, "entity restored");
    Ok(var_name)
}

/// Drives one restore through its phases.
pub struct RestoreOrchestrator<'a> {
    live: &'a Collaborators,
    progress: &'a dyn ProgressReporter,
    options: RestoreOptions,
    report: RestoreReport,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(live: &'a Collaborators, progress: &'a dyn ProgressReporter) -> Self {
        Self {
            live,
            progress,
            options: RestoreOptions::default(),
            report: RestoreReport::default(),
        }
    }

    pub fn with_options(mut self, options: RestoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn phase(&self) -> Phase {
        self.report.phase
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = %self.report.phase, to = %phase, "restore phase");
        self.report.phase = phase;
    }

    fn fail(&mut self, failure: RestoreFailure) {
        self.report.failures.push(failure);
    }

    /// Checked between items only.
    fn cancelled(&mut self) -> bool {
        if self.progress.is_cancelled() {
            tracing::warn!(phase = %self.report.phase, "restore cancelled");
            self.report.phase = Phase::Cancelled;
            self.progress.done();
            return true;
        }
        false
    }

    /// Read, parse and restore a session file. A read or parse failure
    /// aborts before anything live is touched.
    pub fn run_file(mut self, path: impl AsRef<Path>) -> Result<RestoreReport, SessionError> {
        let path = path.as_ref();
        match decoder::parse_file(path) {
            Ok(snapshot) => Ok(self.run(&snapshot)),
            Err(e) => {
                self.enter(Phase::Aborted);
                tracing::error!(path = %path.display(), error = %e, "restore aborted");
                Err(e)
            }
        }
    }

    pub fn run(mut self, snapshot: &Snapshot) -> RestoreReport {
        let _span = tracing::info_span!(
            "restore",
            entities = snapshot.entities.len(),
            algorithms = snapshot.algorithms.len(),
            windows = snapshot.window_ids.len()
        )
        .entered();

        self.live.repository.clear();

        let steps: [(Phase, fn(&mut Self, &Snapshot) -> bool); 5] = [
            (Phase::ParsePreferences, Self::restore_preferences),
            (Phase::RestoreEntities, Self::restore_entities),
            (Phase::RestoreWindows, Self::restore_windows),
            (Phase::RestoreAlgorithms, Self::restore_algorithms),
            (Phase::RestoreViewers, Self::restore_viewers),
        ];
        for (phase, step) in steps {
            self.enter(phase);
            if !step(&mut self, snapshot) {
                return self.report;
            }
        }

        if self.options.launching && !snapshot.is_batch() {
            let restored: HashSet<&String> = self.report.windows.values().collect();
            for window in self.live.windows.windows() {
                if !restored.contains(&window.id) {
                    tracing::debug!(window_id = %window.id, "closing window not part of the session");
                    self.live.windows.close_window(&window.id);
                }
            }
        }

        self.enter(Phase::Done);
        tracing::info!(
            entities = self.report.entities.len(),
            algorithms = self.report.algorithms.len(),
            viewers = self.report.viewers,
            failures = self.report.failures.len(),
            "restore finished"
        );
        self.report
    }

    fn restore_preferences(&mut self, snapshot: &Snapshot) -> bool {
        self.progress.begin_task("Restoring preferences", snapshot.preference_pages.len() as u64);
        for page in &snapshot.preference_pages {
            if self.cancelled() {
                return false;
            }
            self.progress.sub_task(&page.page_name);
            tracing::info!(page = %page.page_name, "restoring preferences");
            if let Err(source) = self.live.preferences.apply(&page.page_class_name, &page.preferences) {
                tracing::warn!(page = %page.page_class_name, error = %source, "cannot apply preferences");
                self.fail(RestoreFailure::collaborator(
                    format!("preference page {}", page.page_class_name),
                    source,
                ));
            }
            self.progress.worked(1);
        }
        self.progress.done();
        true
    }

    fn restore_entities(&mut self, snapshot: &Snapshot) -> bool {
        self.live.repository.set_var_name_map(snapshot.var_name_map());
        self.progress.begin_task("Restoring entities", snapshot.entities.len() as u64);
        for record in &snapshot.entities {
            if self.cancelled() {
                return false;
            }
            self.progress.sub_task(&record.unique_id);
            match materialize_entity(
                self.live.models.as_ref(),
                self.live.repository.as_ref(),
                &record.unique_id,
                &record.properties,
            ) {
                Ok(var_name) => self.report.entities.push((record.unique_id.clone(), var_name)),
                Err(failure) => self.fail(failure),
            }
            self.progress.worked(1);
        }
        self.progress.done();
        true
    }

    fn restore_windows(&mut self, snapshot: &Snapshot) -> bool {
        if snapshot.is_batch() {
            return true;
        }
        let windows = &self.live.windows;
        if !self.options.launching {
            windows.close_other_windows();
        }
        windows.set_geometry(snapshot.header.geometry);

        self.progress.begin_task("Restoring windows", snapshot.window_ids.len() as u64);
        for old_id in &snapshot.window_ids {
            if self.cancelled() {
                return false;
            }
            let perspective = snapshot.perspectives_in_window(old_id).next().map(|p| PerspectiveState {
                id: p.id.clone(),
                name: p.name.clone(),
                class_name: p.class_name.clone(),
                editor_area_visible: p.editor_area_visible,
            });
            let new_id = match windows.open_window(perspective.as_ref()) {
                Ok(id) => id,
                Err(source) => {
                    tracing::error!(window_id = %old_id, error = %source, "cannot open window");
                    self.fail(RestoreFailure::collaborator(format!("window {old_id}"), source));
                    self.progress.worked(1);
                    continue;
                }
            };
            tracing::debug!(old = %old_id, new = %new_id, "window recreated");
            self.report.windows.insert(old_id.clone(), new_id.clone());

            if let Some(blob) = snapshot.window_layout(old_id) {
                if let Err(source) = windows.restore_layout(&new_id, blob) {
                    tracing::error!(window_id = %old_id, error = %source, "cannot restore window layout");
                    self.fail(RestoreFailure::collaborator(format!("layout of window {old_id}"), source));
                }
            }
            self.progress.worked(1);
        }

        if let Some(old_plot) = &snapshot.plot_window {
            match self.report.windows.get(old_plot) {
                Some(new_plot) => {
                    if let Err(source) = windows.set_plot_window(new_plot) {
                        self.fail(RestoreFailure::collaborator("plot window", source));
                    }
                }
                None => self.fail(RestoreFailure::Reference {
                    element: "plotWindow".into(),
                    target: format!("window {old_plot}"),
                }),
            }
        }
        self.progress.done();
        true
    }

    /// New id for a recorded window. Ids that were not recreated map to the
    /// active window, or stay as recorded when there is none.
    fn remap_window(&self, old_id: &str) -> String {
        self.report
            .windows
            .get(old_id)
            .cloned()
            .or_else(|| self.live.windows.active_window())
            .unwrap_or_else(|| old_id.to_string())
    }

    fn restore_algorithms(&mut self, snapshot: &Snapshot) -> bool {
        let before: Vec<u32> = self.live.algorithms.registered().iter().map(|a| a.id).collect();

        self.progress.begin_task("Restoring algorithms", snapshot.algorithms.len() as u64);
        for record in &snapshot.algorithms {
            if self.cancelled() {
                return false;
            }
            self.progress.sub_task(&record.name);
            let spec = AlgorithmSpec {
                name: record.name.clone(),
                class_name: record.class_name.clone(),
                window_id: self.remap_window(&record.window_id),
                action: record.action,
                parameters: record.properties.clone(),
            };
            match self.live.algorithms.activate(spec) {
                Ok(id) => {
                    tracing::info!(id, class = %record.class_name, action = %record.action, "algorithm restored");
                    self.report.algorithms.push(id);
                }
                Err(source) => {
                    tracing::error!(class = %record.class_name, error = %source, "cannot restore algorithm");
                    self.fail(RestoreFailure::collaborator(format!("algorithm {}", record.class_name), source));
                }
            }
            self.progress.worked(1);
        }

        let restored: HashSet<u32> = self.report.algorithms.iter().copied().collect();
        for id in before.into_iter().filter(|id| !restored.contains(id)) {
            self.live.algorithms.deactivate(id);
        }
        self.progress.done();
        true
    }

    fn restore_viewers(&mut self, snapshot: &Snapshot) -> bool {
        for gap in &snapshot.reference_gaps {
            tracing::warn!(line = gap.line, element = %gap.element, "{}", gap.detail);
            self.fail(RestoreFailure::Reference {
                element: gap.element.clone(),
                target: format!("{} (line {})", gap.detail, gap.line),
            });
        }
        if snapshot.is_batch() {
            return true;
        }

        self.progress.begin_task("Restoring viewers", snapshot.viewer_parts.len() as u64);
        for part in &snapshot.viewer_parts {
            if self.cancelled() {
                return false;
            }
            self.progress.sub_task(&part.part_id);
            self.restore_part(snapshot, part);
            self.progress.worked(1);
        }
        self.progress.done();
        true
    }

    fn restore_part(&mut self, snapshot: &Snapshot, part: &ViewerPartRecord) {
        let Some(window_id) = self.report.windows.get(&part.window_id).cloned() else {
            self.fail(RestoreFailure::Reference {
                element: format!("viewerPart {}", part.part_id),
                target: format!("window {}", part.window_id),
            });
            return;
        };
        let handles = self.live.viewers.find_viewers(&window_id, &part.part_id);
        if handles.is_empty() {
            tracing::warn!(part_id = %part.part_id, "cannot find viewer in perspective");
            self.fail(RestoreFailure::Reference {
                element: format!("viewerPart {}", part.part_id),
                target: format!("live viewer in window {window_id}"),
            });
            return;
        }

        let records: Vec<_> = snapshot.viewers_of(&part.unique_id).collect();
        if records.len() > handles.len() {
            tracing::warn!(
                part_id = %part.part_id,
                recorded = records.len(),
                live = handles.len(),
                "more recorded viewers than live ones"
            );
            for record in &records[handles.len()..] {
                self.fail(RestoreFailure::Reference {
                    element: format!("viewer {:?}", record.title),
                    target: format!("live viewer in part {}", part.part_id),
                });
            }
        }

        for (record, handle) in records.into_iter().zip(&handles) {
            let layers: Vec<LayerState> = record
                .layers
                .iter()
                .map(|l| LayerState {
                    name: l.name.clone(),
                    checked: l.checked,
                })
                .collect();
            if let Err(source) = self.live.viewers.update_layers(handle, &layers) {
                self.fail(RestoreFailure::collaborator(format!("layers of viewer {:?}", record.title), source));
            }
            if let Err(source) = self.live.viewers.update_viewer_model(handle, &record.properties) {
                self.fail(RestoreFailure::collaborator(format!("model of viewer {:?}", record.title), source));
            }
            for renderer in snapshot.renderers_of(record.id) {
                self.restore_renderer(handle, &renderer.class_name, &renderer.rendered_entity_id, &renderer.properties);
            }
            self.live.viewers.refresh(handle);
            self.live.viewers.register(handle);
            self.report.viewers += 1;
        }
    }

    fn restore_renderer(&mut self, handle: &ViewerHandle, class_name: &str, entity_id: &str, properties: &PropertyBag) {
        let Some(entity) = self.live.repository.find_by_unique_id(entity_id) else {
            tracing::error!(renderer = class_name, unique_id = entity_id, "rendered entity is not loaded");
            self.fail(RestoreFailure::Reference {
                element: format!("renderer {class_name}"),
                target: format!("entity {entity_id}"),
            });
            return;
        };
        match self.live.viewers.add_renderer(handle, class_name, properties, &entity) {
            Ok(_) => self.report.renderers += 1,
            Err(source) => {
                tracing::error!(renderer = class_name, error = %source, "cannot add renderer");
                self.fail(RestoreFailure::collaborator(format!("renderer {class_name}"), source));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlgorithmRecord, EntityRecord, PerspectiveRecord, RendererRecord};
    use std::sync::{Arc, Mutex};
    use workbench_kernel::{
        AlgorithmHost, AlgorithmRegistry, CancelToken, Datastore, LoggingProgress, ModelCatalog, NullProgress,
        PreferenceStore, Repository, ViewerPartState, ViewerRegistry, ViewerState, WindowManager, Workbench,
    };

    struct Live {
        collab: Collaborators,
        repo: Arc<Repository>,
        algorithms: Arc<AlgorithmHost>,
        bench: Arc<Workbench>,
    }

    fn live() -> Live {
        let store = Arc::new(Datastore::with_ids(["well/42", "grid/7", "well/9"]));
        let mut catalog = ModelCatalog::new(store);
        catalog
            .register("WellModel", "Well", &["name"])
            .register("GridModel", "Grid", &[]);
        let repo = Arc::new(Repository::new());
        let algorithms = Arc::new(AlgorithmHost::with_classes(["pkg.Smoother"]));
        let bench = Arc::new(Workbench::with_renderer_classes(["render.Well"]));
        let collab = Collaborators::with_workbench(
            repo.clone(),
            Arc::new(catalog),
            algorithms.clone(),
            Arc::new(PreferenceStore::new()),
            bench.clone(),
        );
        Live {
            collab,
            repo,
            algorithms,
            bench,
        }
    }

    fn bag(pairs: &[(&str, &str)]) -> PropertyBag {
        pairs.iter().copied().collect()
    }

    #[test]
    fn class_prefix_is_stripped() {
        let live = live();
        let var = materialize_entity(
            live.collab.models.as_ref(),
            live.repo.as_ref(),
            "grid/7",
            &bag(&[("class", "class GridModel")]),
        )
        .unwrap();
        assert_eq!(live.repo.get(&var).unwrap().entity_type(), "Grid");
    }

    #[test]
    fn materialize_reports_each_failure_kind() {
        let live = live();
        let models = live.collab.models.as_ref();
        let repo = live.repo.as_ref();
        assert!(matches!(
            materialize_entity(models, repo, "x", &bag(&[])),
            Err(RestoreFailure::UnknownModelClass { .. })
        ));
        assert!(matches!(
            materialize_entity(models, repo, "x", &bag(&[("class", "Nope")])),
            Err(RestoreFailure::UnknownModelClass { .. })
        ));
        assert!(matches!(
            materialize_entity(models, repo, "well/42", &bag(&[("class", "WellModel")])),
            Err(RestoreFailure::Validation { .. })
        ));
        assert!(matches!(
            materialize_entity(models, repo, "well/1", &bag(&[("class", "WellModel"), ("name", "W")])),
            Err(RestoreFailure::Existence { .. })
        ));
        assert!(repo.is_empty());
    }

    #[test]
    fn missing_store_entry_is_reported_before_validation() {
        let live = live();
        let result = materialize_entity(
            live.collab.models.as_ref(),
            live.repo.as_ref(),
            "well/gone",
            &bag(&[("class", "WellModel")]),
        );
        match result {
            Err(RestoreFailure::Existence { unique_id }) => assert_eq!(unique_id, "well/gone"),
            other => panic!("expected existence failure, got {other:?}"),
        }
        assert!(live.repo.is_empty());
    }

    #[test]
    fn one_invalid_entity_does_not_stop_the_others() {
        let live = live();
        let mut snap = Snapshot::new();
        snap.add_entity(EntityRecord::new("w1", "well/42").with_property("class", "WellModel").with_property("name", "A"));
        snap.add_entity(EntityRecord::new("bad", "well/9").with_property("class", "WellModel"));
        snap.add_entity(EntityRecord::new("g1", "grid/7").with_property("class", "GridModel"));

        let report = RestoreOrchestrator::new(&live.collab, &NullProgress).run(&snap);
        assert!(report.is_complete());
        assert_eq!(live.repo.var_names(), vec!["w1", "g1"]);
        assert_eq!(report.count_failures(|f| matches!(f, RestoreFailure::Validation { .. })), 1);
        assert_eq!(report.stale_entities(), vec!["well/9"]);
    }

    #[test]
    fn algorithms_are_remapped_and_old_ones_deactivated() {
        let live = live();
        let stale = live
            .algorithms
            .activate(AlgorithmSpec::new("Old", "pkg.Smoother", "w"))
            .unwrap();

        let mut snap = Snapshot::new();
        snap.add_perspective(PerspectiveRecord {
            id: "map".into(),
            name: "Map".into(),
            class_name: "ui.Map".into(),
            window_id: "old-1".into(),
            editor_area_visible: true,
        });
        snap.add_algorithm(AlgorithmRecord::new("Smoother", "pkg.Smoother", "old-1", 1).with_property("window", "5"));
        snap.add_algorithm(AlgorithmRecord::new("Missing", "pkg.Missing", "old-1", 2));

        let report = RestoreOrchestrator::new(&live.collab, &NullProgress).run(&snap);
        let new_window = report.windows.get("old-1").unwrap();
        let registered = live.algorithms.registered();
        assert_eq!(registered.len(), 1);
        assert_ne!(registered[0].id, stale);
        assert_eq!(&registered[0].spec.window_id, new_window);
        assert_eq!(registered[0].spec.parameters.get("window"), Some("5"));
        assert_eq!(report.failures.len(), 1);
    }

    fn viewer_snapshot(live: &Live) -> Snapshot {
        // Capture a real layout so restore_layout can recreate the part.
        let old = live.bench.open_window(None).unwrap();
        live.bench
            .add_viewer_part(
                &old,
                ViewerPartState {
                    class_name: "ui.MapPart".into(),
                    part_id: "map.view".into(),
                    perspective_id: "map".into(),
                    unique_id: "5".into(),
                    viewers: vec![ViewerState {
                        title: "Map".into(),
                        class_name: "ui.MapViewer".into(),
                        ..ViewerState::default()
                    }],
                    ..ViewerPartState::default()
                },
            )
            .unwrap();
        let blob = live.bench.layout_state(&old).unwrap();

        let mut snap = Snapshot::new();
        snap.add_entity(EntityRecord::new("w1", "well/42").with_property("class", "WellModel").with_property("name", "A"));
        snap.add_viewer_part(ViewerPartRecord {
            class_name: "ui.MapPart".into(),
            part_id: "map.view".into(),
            window_id: "old".into(),
            perspective_id: "map".into(),
            unique_id: "5".into(),
        });
        let viewer = snap.add_viewer("5", "Map", "ui.MapViewer");
        snap.viewer_mut(viewer).unwrap().layers.push(crate::model::LayerRecord {
            name: "Wells".into(),
            checked: true,
        });
        for (uid, class, entity) in [
            ("r1", "render.Well", "well/missing"),
            ("r2", "render.Grid", "well/42"),
            ("r3", "render.Well", "well/42"),
        ] {
            snap.add_renderer(RendererRecord {
                viewer,
                class_name: class.into(),
                unique_id: uid.into(),
                rendered_entity_id: entity.into(),
                properties: PropertyBag::new(),
            });
        }
        snap.set_window_layout("old", blob);
        snap.plot_window = Some("old".into());
        snap
    }

    #[test]
    fn renderer_failures_are_isolated() {
        let live = live();
        let snap = viewer_snapshot(&live);
        let report = RestoreOrchestrator::new(&live.collab, &NullProgress).run(&snap);

        assert!(report.is_complete());
        assert_eq!(report.viewers, 1);
        assert_eq!(live.bench.refresh_count(), 1);
        assert_eq!(report.renderers, 1);
        assert_eq!(report.count_failures(|f| matches!(f, RestoreFailure::Reference { .. })), 1);
        assert_eq!(report.count_failures(|f| matches!(f, RestoreFailure::Collaborator { .. })), 1);

        let new_window = report.windows.get("old").unwrap();
        assert_eq!(live.bench.plot_window().as_ref(), Some(new_window));
        let handle = live.bench.find_viewers(new_window, "map.view").remove(0);
        let viewer = live.bench.viewer(&handle).unwrap();
        assert_eq!(viewer.layers.len(), 1);
        assert_eq!(viewer.renderers.len(), 1);
        assert!(live.bench.is_registered(&handle));
    }

    #[test]
    fn non_launch_restore_closes_other_windows_first() {
        let live = live();
        let snap = viewer_snapshot(&live);
        live.bench.open_window(None).unwrap();
        let report = RestoreOrchestrator::new(&live.collab, &NullProgress).run(&snap);
        // the active window survives, plus the one recreated window
        assert_eq!(live.bench.windows().len(), 2);
        assert_eq!(report.windows.len(), 1);
    }

    #[test]
    fn launching_closes_windows_not_in_the_session() {
        let live = live();
        let snap = viewer_snapshot(&live);
        let report = RestoreOrchestrator::new(&live.collab, &NullProgress)
            .with_options(RestoreOptions { launching: true })
            .run(&snap);
        let ids: Vec<String> = live.bench.windows().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![report.windows["old"].clone()]);
    }

    #[test]
    fn part_without_live_viewers_is_a_reference_failure() {
        let live = live();
        let mut snap = Snapshot::new();
        snap.add_viewer_part(ViewerPartRecord {
            class_name: "ui.MapPart".into(),
            part_id: "map.view".into(),
            window_id: "old".into(),
            perspective_id: "map".into(),
            unique_id: "5".into(),
        });
        snap.add_viewer("5", "Map", "ui.MapViewer");
        let report = RestoreOrchestrator::new(&live.collab, &NullProgress).run(&snap);
        assert!(report.is_complete());
        assert_eq!(report.viewers, 0);
        assert_eq!(report.count_failures(|f| matches!(f, RestoreFailure::Reference { .. })), 1);
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Step {
        Begin(String, u64),
        Sub(String),
        Worked(u64),
        Done,
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Step>>);

    impl Recorder {
        fn push(&self, step: Step) {
            self.0.lock().unwrap().push(step);
        }

        fn steps(&self) -> Vec<Step> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ProgressReporter for Recorder {
        fn begin_task(&self, name: &str, total_work: u64) {
            self.push(Step::Begin(name.to_string(), total_work));
        }

        fn sub_task(&self, name: &str) {
            self.push(Step::Sub(name.to_string()));
        }

        fn worked(&self, units: u64) {
            self.push(Step::Worked(units));
        }

        fn done(&self) {
            self.push(Step::Done);
        }
    }

    #[test]
    fn progress_is_reported_per_phase_and_item() {
        let live = live();
        let mut snap = Snapshot::new();
        snap.add_entity(EntityRecord::new("w1", "well/42").with_property("class", "WellModel").with_property("name", "A"));
        snap.add_entity(EntityRecord::new("g1", "grid/7").with_property("class", "GridModel"));
        snap.add_algorithm(AlgorithmRecord::new("Smoother", "pkg.Smoother", "w", 1));
        snap.add_perspective(PerspectiveRecord {
            id: "map".into(),
            name: "Map".into(),
            class_name: "ui.Map".into(),
            window_id: "w".into(),
            editor_area_visible: true,
        });

        let recorder = Recorder::default();
        let report = RestoreOrchestrator::new(&live.collab, &recorder).run(&snap);
        assert!(report.is_complete());
        assert!(report.failures.is_empty(), "{:?}", report.failures);

        let begin = |name: &str, total| Step::Begin(name.to_string(), total);
        let sub = |name: &str| Step::Sub(name.to_string());
        assert_eq!(
            recorder.steps(),
            vec![
                begin("Restoring preferences", 0),
                Step::Done,
                begin("Restoring entities", 2),
                sub("well/42"),
                Step::Worked(1),
                sub("grid/7"),
                Step::Worked(1),
                Step::Done,
                begin("Restoring windows", 1),
                Step::Worked(1),
                Step::Done,
                begin("Restoring algorithms", 1),
                sub("Smoother"),
                Step::Worked(1),
                Step::Done,
                begin("Restoring viewers", 0),
                Step::Done,
            ]
        );
    }

    #[test]
    fn batch_restore_reports_no_window_or_viewer_progress() {
        let live = live();
        let mut snap = Snapshot::new();
        snap.add_entity(EntityRecord::new("g1", "grid/7").with_property("class", "GridModel"));
        snap.add_algorithm(AlgorithmRecord::new("Smoother", "pkg.Smoother", "w", 1));
        assert!(snap.is_batch());

        let recorder = Recorder::default();
        RestoreOrchestrator::new(&live.collab, &recorder).run(&snap);
        let begun: Vec<String> = recorder
            .steps()
            .into_iter()
            .filter_map(|s| match s {
                Step::Begin(name, _) => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(begun, vec!["Restoring preferences", "Restoring entities", "Restoring algorithms"]);
    }

    #[test]
    fn cancellation_stops_between_items() {
        let live = live();
        let token = CancelToken::new();
        token.cancel();
        let progress = LoggingProgress::with_cancel(token);
        let mut snap = Snapshot::new();
        snap.add_entity(EntityRecord::new("g1", "grid/7").with_property("class", "GridModel"));
        let report = RestoreOrchestrator::new(&live.collab, &progress).run(&snap);
        assert_eq!(report.phase, Phase::Cancelled);
        assert!(live.repo.is_empty());
    }

    #[test]
    fn unreadable_file_aborts() {
        let live = live();
        let err = RestoreOrchestrator::new(&live.collab, &NullProgress)
            .run_file("/definitely/not/here.gcs")
            .unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
    }
}
