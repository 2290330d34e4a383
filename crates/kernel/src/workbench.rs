use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use workbench_common::PropertyBag;

use crate::entity::Entity;
use crate::error::CollaboratorError;
use crate::viewers::{LayerState, RendererState, ViewerHandle, ViewerPartState, ViewerRegistry, ViewerState};
use crate::windows::{PerspectiveState, WindowGeometry, WindowManager, WindowState};

/// What a layout blob carries: the window's perspectives and the shape of
/// its viewer parts. Viewer content is restored separately.
#[derive(Debug, Serialize, Deserialize)]
struct LayoutBlob {
    perspectives: Vec<PerspectiveState>,
    parts: Vec<PartLayout>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PartLayout {
    class_name: String,
    part_id: String,
    perspective_id: String,
    unique_id: String,
    viewers: Vec<ViewerLayout>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ViewerLayout {
    title: String,
    class_name: String,
}

#[derive(Debug)]
struct Window {
    id: String,
    perspectives: Vec<PerspectiveState>,
    parts: Vec<ViewerPartState>,
}

impl Window {
    fn new(id: String) -> Self {
        Self {
            id,
            perspectives: Vec::new(),
            parts: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    windows: Vec<Window>,
    active: Option<String>,
    plot: Option<String>,
    geometry: WindowGeometry,
    registered: HashSet<ViewerHandle>,
    refreshes: usize,
}

impl State {
    fn window(&self, id: &str) -> Option<&Window> {
        self.windows.iter().find(|w| w.id == id)
    }

    fn window_mut(&mut self, id: &str) -> Result<&mut Window, CollaboratorError> {
        self.windows
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("window {id}")))
    }

    fn viewer_mut(&mut self, handle: &ViewerHandle) -> Result<&mut ViewerState, CollaboratorError> {
        self.window_mut(&handle.window_id)?
            .parts
            .iter_mut()
            .find(|p| p.part_id == handle.part_id)
            .and_then(|p| p.viewers.get_mut(handle.index))
            .ok_or_else(|| {
                CollaboratorError::NotFound(format!("viewer {}#{} in {}", handle.part_id, handle.index, handle.window_id))
            })
    }
}

/// In-memory window manager and viewer registry.
///
/// Layout blobs are single-line JSON. Window identifiers are fresh UUIDs, so
/// every restore yields new ids.
#[derive(Debug, Default)]
pub struct Workbench {
    state: RwLock<State>,
    renderer_classes: Option<HashSet<String>>,
}

impl Workbench {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject renderers whose class is not listed.
    pub fn with_renderer_classes<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: RwLock::default(),
            renderer_classes: Some(classes.into_iter().map(Into::into).collect()),
        }
    }

    /// Place a viewer part into an open window. The part's `window_id` is
    /// overwritten with `window_id`.
    pub fn add_viewer_part(&self, window_id: &str, mut part: ViewerPartState) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let window = state.window_mut(window_id)?;
        part.window_id = window_id.to_string();
        window.parts.retain(|p| p.part_id != part.part_id);
        window.parts.push(part);
        Ok(())
    }

    pub fn viewer(&self, handle: &ViewerHandle) -> Option<ViewerState> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .window(&handle.window_id)?
            .parts
            .iter()
            .find(|p| p.part_id == handle.part_id)?
            .viewers
            .get(handle.index)
            .cloned()
    }

    pub fn is_registered(&self, handle: &ViewerHandle) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .registered
            .contains(handle)
    }

    pub fn refresh_count(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).refreshes
    }
}

impl WindowManager for Workbench {
    fn windows(&self) -> Vec<WindowState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .windows
            .iter()
            .map(|w| WindowState {
                id: w.id.clone(),
                perspectives: w.perspectives.clone(),
            })
            .collect()
    }

    fn active_window(&self) -> Option<String> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).active.clone()
    }

    fn geometry(&self) -> WindowGeometry {
        self.state.read().unwrap_or_else(PoisonError::into_inner).geometry
    }

    fn set_geometry(&self, geometry: WindowGeometry) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).geometry = geometry;
    }

    fn plot_window(&self) -> Option<String> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).plot.clone()
    }

    fn set_plot_window(&self, window_id: &str) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.window_mut(window_id)?;
        state.plot = Some(window_id.to_string());
        Ok(())
    }

    fn layout_state(&self, window_id: &str) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let window = state.window(window_id)?;
        let blob = LayoutBlob {
            perspectives: window.perspectives.clone(),
            parts: window
                .parts
                .iter()
                .map(|p| PartLayout {
                    class_name: p.class_name.clone(),
                    part_id: p.part_id.clone(),
                    perspective_id: p.perspective_id.clone(),
                    unique_id: p.unique_id.clone(),
                    viewers: p
                        .viewers
                        .iter()
                        .map(|v| ViewerLayout {
                            title: v.title.clone(),
                            class_name: v.class_name.clone(),
                        })
                        .collect(),
                })
                .collect(),
        };
        match serde_json::to_string(&blob) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!(window_id, error = %e, "failed to capture window layout");
                None
            }
        }
    }

    fn restore_layout(&self, window_id: &str, blob: &str) -> Result<(), CollaboratorError> {
        let layout: LayoutBlob = serde_json::from_str(blob.trim()).map_err(|e| CollaboratorError::InvalidValue {
            key: "layout".into(),
            message: e.to_string(),
        })?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let window = state.window_mut(window_id)?;
        for perspective in layout.perspectives {
            if !window.perspectives.iter().any(|p| p.id == perspective.id) {
                window.perspectives.push(perspective);
            }
        }
        window.parts = layout
            .parts
            .into_iter()
            .map(|p| ViewerPartState {
                class_name: p.class_name,
                part_id: p.part_id,
                window_id: window_id.to_string(),
                perspective_id: p.perspective_id,
                unique_id: p.unique_id,
                viewers: p
                    .viewers
                    .into_iter()
                    .map(|v| ViewerState {
                        title: v.title,
                        class_name: v.class_name,
                        ..ViewerState::default()
                    })
                    .collect(),
            })
            .collect();
        Ok(())
    }

    fn open_window(&self, perspective: Option<&PerspectiveState>) -> Result<String, CollaboratorError> {
        let id = Uuid::new_v4().to_string();
        let mut window = Window::new(id.clone());
        window.perspectives.extend(perspective.cloned());
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.windows.push(window);
        state.active = Some(id.clone());
        tracing::debug!(window_id = %id, "window opened");
        Ok(id)
    }

    fn close_other_windows(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let active = state.active.clone();
        state.windows.retain(|w| Some(&w.id) == active.as_ref());
        if state.plot.is_some() && state.plot != active {
            state.plot = None;
        }
        state.registered.retain(|h| Some(&h.window_id) == active.as_ref());
    }

    fn close_window(&self, window_id: &str) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let before = state.windows.len();
        state.windows.retain(|w| w.id != window_id);
        if state.windows.len() == before {
            return false;
        }
        if state.active.as_deref() == Some(window_id) {
            state.active = state.windows.last().map(|w| w.id.clone());
        }
        if state.plot.as_deref() == Some(window_id) {
            state.plot = None;
        }
        state.registered.retain(|h| h.window_id != window_id);
        true
    }
}

impl ViewerRegistry for Workbench {
    fn viewer_parts(&self, window_id: &str) -> Vec<ViewerPartState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .window(window_id)
            .map(|w| w.parts.clone())
            .unwrap_or_default()
    }

    fn find_viewers(&self, window_id: &str, part_id: &str) -> Vec<ViewerHandle> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let Some(part) = state
            .window(window_id)
            .and_then(|w| w.parts.iter().find(|p| p.part_id == part_id))
        else {
            return Vec::new();
        };
        (0..part.viewers.len())
            .map(|index| ViewerHandle {
                window_id: window_id.to_string(),
                part_id: part_id.to_string(),
                index,
            })
            .collect()
    }

    fn update_layers(&self, viewer: &ViewerHandle, layers: &[LayerState]) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let viewer = state.viewer_mut(viewer)?;
        for layer in layers {
            match viewer.layers.iter_mut().find(|l| l.name == layer.name) {
                Some(existing) => existing.checked = layer.checked,
                None => viewer.layers.push(layer.clone()),
            }
        }
        Ok(())
    }

    fn update_viewer_model(&self, viewer: &ViewerHandle, properties: &PropertyBag) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let viewer = state.viewer_mut(viewer)?;
        for (key, value) in properties {
            viewer.properties.insert(key, value);
        }
        Ok(())
    }

    fn add_renderer(
        &self,
        viewer: &ViewerHandle,
        class_name: &str,
        properties: &PropertyBag,
        entity: &Arc<Entity>,
    ) -> Result<String, CollaboratorError> {
        if let Some(known) = &self.renderer_classes {
            if !known.contains(class_name) {
                return Err(CollaboratorError::UnknownClass(class_name.to_string()));
            }
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let viewer = state.viewer_mut(viewer)?;
        let unique_id = Uuid::new_v4().to_string();
        viewer.renderers.push(RendererState {
            class_name: class_name.to_string(),
            unique_id: unique_id.clone(),
            rendered_entity: entity.unique_id().to_string(),
            properties: properties.clone(),
        });
        Ok(unique_id)
    }

    fn refresh(&self, _viewer: &ViewerHandle) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).refreshes += 1;
    }

    fn register(&self, viewer: &ViewerHandle) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .registered
            .insert(viewer.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perspective(id: &str) -> PerspectiveState {
        PerspectiveState {
            id: id.into(),
            name: "Map".into(),
            class_name: "ui.MapPerspective".into(),
            editor_area_visible: false,
        }
    }

    fn map_part() -> ViewerPartState {
        ViewerPartState {
            class_name: "ui.MapPart".into(),
            part_id: "map.view".into(),
            perspective_id: "map".into(),
            unique_id: "part-1".into(),
            viewers: vec![ViewerState {
                title: "Map".into(),
                class_name: "ui.MapViewer".into(),
                ..ViewerState::default()
            }],
            ..ViewerPartState::default()
        }
    }

    #[test]
    fn open_window_assigns_fresh_ids() {
        let bench = Workbench::new();
        let a = bench.open_window(None).unwrap();
        let b = bench.open_window(Some(&perspective("map"))).unwrap();
        assert_ne!(a, b);
        assert_eq!(bench.active_window().as_deref(), Some(b.as_str()));
        assert_eq!(bench.windows()[1].perspectives.len(), 1);
    }

    #[test]
    fn layout_blob_recreates_parts_in_new_window() {
        let bench = Workbench::new();
        let old = bench.open_window(Some(&perspective("map"))).unwrap();
        bench.add_viewer_part(&old, map_part()).unwrap();
        let blob = bench.layout_state(&old).unwrap();
        assert!(!blob.contains('\n'));

        let new = bench.open_window(None).unwrap();
        bench.restore_layout(&new, &blob).unwrap();
        let handles = bench.find_viewers(&new, "map.view");
        assert_eq!(handles.len(), 1);
        assert_eq!(bench.viewer(&handles[0]).unwrap().class_name, "ui.MapViewer");
        assert_eq!(bench.windows()[1].perspectives[0].id, "map");
    }

    #[test]
    fn restore_layout_rejects_garbage() {
        let bench = Workbench::new();
        let id = bench.open_window(None).unwrap();
        assert!(matches!(
            bench.restore_layout(&id, "not json"),
            Err(CollaboratorError::InvalidValue { .. })
        ));
    }

    #[test]
    fn renderer_class_filter_applies() {
        let bench = Workbench::with_renderer_classes(["render.Well"]);
        let id = bench.open_window(None).unwrap();
        bench.add_viewer_part(&id, map_part()).unwrap();
        let handle = &bench.find_viewers(&id, "map.view")[0];
        let entity = Arc::new(Entity::transient("well/42", "Well"));
        assert!(bench.add_renderer(handle, "render.Grid", &PropertyBag::new(), &entity).is_err());
        bench.add_renderer(handle, "render.Well", &PropertyBag::new(), &entity).unwrap();
        let viewer = bench.viewer(handle).unwrap();
        assert_eq!(viewer.renderers.len(), 1);
        assert_eq!(viewer.renderers[0].rendered_entity, "well/42");
    }

    #[test]
    fn layers_update_in_place() {
        let bench = Workbench::new();
        let id = bench.open_window(None).unwrap();
        bench.add_viewer_part(&id, map_part()).unwrap();
        let handle = bench.find_viewers(&id, "map.view").remove(0);
        let on = LayerState { name: "Wells".into(), checked: true };
        let off = LayerState { name: "Wells".into(), checked: false };
        bench.update_layers(&handle, &[on]).unwrap();
        bench.update_layers(&handle, &[off.clone()]).unwrap();
        assert_eq!(bench.viewer(&handle).unwrap().layers, vec![off]);
    }

    #[test]
    fn close_other_windows_keeps_active() {
        let bench = Workbench::new();
        let a = bench.open_window(None).unwrap();
        bench.set_plot_window(&a).unwrap();
        let b = bench.open_window(None).unwrap();
        bench.close_other_windows();
        let ids: Vec<String> = bench.windows().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![b]);
        assert!(bench.plot_window().is_none());
        assert!(!bench.close_window(&a));
    }
}
