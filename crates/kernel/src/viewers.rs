use std::sync::Arc;

use serde::{Deserialize, Serialize};
use workbench_common::PropertyBag;

use crate::entity::Entity;
use crate::error::CollaboratorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerState {
    pub name: String,
    pub checked: bool,
}

/// A renderer drawing one entity inside a viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererState {
    pub class_name: String,
    pub unique_id: String,
    /// Unique ID of the rendered entity.
    pub rendered_entity: String,
    pub properties: PropertyBag,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewerState {
    pub title: String,
    pub class_name: String,
    pub properties: PropertyBag,
    pub layers: Vec<LayerState>,
    pub renderers: Vec<RendererState>,
}

/// A UI part hosting one or more viewers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewerPartState {
    pub class_name: String,
    pub part_id: String,
    pub window_id: String,
    pub perspective_id: String,
    pub unique_id: String,
    pub viewers: Vec<ViewerState>,
}

/// Addresses one live viewer: the `index`-th viewer of a part in a window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewerHandle {
    pub window_id: String,
    pub part_id: String,
    pub index: usize,
}

/// Live viewers, their layers and renderers.
pub trait ViewerRegistry: Send + Sync {
    /// Full state of the viewer parts open in a window.
    fn viewer_parts(&self, window_id: &str) -> Vec<ViewerPartState>;

    /// Live viewers of a part, in display order. Empty when the part does
    /// not exist in that window.
    fn find_viewers(&self, window_id: &str, part_id: &str) -> Vec<ViewerHandle>;

    fn update_layers(&self, viewer: &ViewerHandle, layers: &[LayerState]) -> Result<(), CollaboratorError>;

    fn update_viewer_model(&self, viewer: &ViewerHandle, properties: &PropertyBag) -> Result<(), CollaboratorError>;

    /// Create a renderer for `entity` and return its new unique ID.
    fn add_renderer(
        &self,
        viewer: &ViewerHandle,
        class_name: &str,
        properties: &PropertyBag,
        entity: &Arc<Entity>,
    ) -> Result<String, CollaboratorError>;

    fn refresh(&self, viewer: &ViewerHandle);

    /// Make a restored viewer known to the rest of the workbench.
    fn register(&self, viewer: &ViewerHandle);
}
