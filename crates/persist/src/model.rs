//! In-memory form of a session file.
//!
//! Viewers and renderers are stored flat in arenas. A viewer points at its
//! part through the part's unique ID and a renderer points at its viewer
//! through a [`ViewerId`], so every record can be compared on its own.

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use workbench_common::{AlgorithmAction, PropertyBag};
use workbench_kernel::WindowGeometry;

pub const FORMAT_VERSION: &str = "1.0";

/// Attributes of the root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub version: String,
    pub geometry: WindowGeometry,
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            geometry: WindowGeometry::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub var_name: String,
    pub unique_id: String,
    pub properties: PropertyBag,
}

impl EntityRecord {
    pub fn new(var_name: impl Into<String>, unique_id: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
            unique_id: unique_id.into(),
            properties: PropertyBag::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmRecord {
    pub name: String,
    pub class_name: String,
    pub window_id: String,
    pub unique_id: u32,
    pub action: AlgorithmAction,
    pub properties: PropertyBag,
}

impl AlgorithmRecord {
    pub fn new(
        name: impl Into<String>,
        class_name: impl Into<String>,
        window_id: impl Into<String>,
        unique_id: u32,
    ) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            window_id: window_id.into(),
            unique_id,
            action: AlgorithmAction::Load,
            properties: PropertyBag::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferencePageRecord {
    pub page_name: String,
    pub page_class_name: String,
    pub preferences: PropertyBag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerspectiveRecord {
    pub id: String,
    pub name: String,
    pub class_name: String,
    pub window_id: String,
    pub editor_area_visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerPartRecord {
    pub class_name: String,
    pub part_id: String,
    pub window_id: String,
    pub perspective_id: String,
    pub unique_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewerId(pub u32);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewer#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRecord {
    pub name: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerRecord {
    pub id: ViewerId,
    /// Unique ID of the owning viewer part.
    pub part: String,
    pub title: String,
    pub class_name: String,
    pub properties: PropertyBag,
    pub layers: Vec<LayerRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererRecord {
    pub viewer: ViewerId,
    pub class_name: String,
    pub unique_id: String,
    /// May name an entity that is not in the snapshot.
    pub rendered_entity_id: String,
    pub properties: PropertyBag,
}

/// Something the decoder found outside the context it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceGap {
    pub line: usize,
    pub element: String,
    pub detail: String,
}

/// A complete session: entities, algorithms, preferences and, for
/// interactive sessions, the window/viewer layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub header: SnapshotHeader,
    pub entities: Vec<EntityRecord>,
    pub algorithms: Vec<AlgorithmRecord>,
    pub preference_pages: Vec<PreferencePageRecord>,
    pub perspectives: Vec<PerspectiveRecord>,
    pub viewer_parts: Vec<ViewerPartRecord>,
    pub viewers: Vec<ViewerRecord>,
    pub renderers: Vec<RendererRecord>,
    /// Window identifiers in first-appearance order.
    pub window_ids: Vec<String>,
    pub plot_window: Option<String>,
    /// Raw layout blob per window, in file order.
    pub window_layouts: Vec<(String, String)>,
    pub reference_gaps: Vec<ReferenceGap>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity. A record with the same unique ID is replaced in place
    /// and returned.
    pub fn add_entity(&mut self, record: EntityRecord) -> Option<EntityRecord> {
        match self.entities.iter_mut().find(|e| e.unique_id == record.unique_id) {
            Some(slot) => Some(std::mem::replace(slot, record)),
            None => {
                self.entities.push(record);
                None
            }
        }
    }

    pub fn add_algorithm(&mut self, record: AlgorithmRecord) {
        self.note_window(&record.window_id);
        self.algorithms.push(record);
    }

    pub fn add_preference_page(&mut self, record: PreferencePageRecord) {
        self.preference_pages.push(record);
    }

    pub fn add_perspective(&mut self, record: PerspectiveRecord) {
        self.note_window(&record.window_id);
        self.perspectives.push(record);
    }

    /// Add a viewer part, replacing one with the same unique ID.
    pub fn add_viewer_part(&mut self, record: ViewerPartRecord) {
        self.note_window(&record.window_id);
        match self.viewer_parts.iter_mut().find(|p| p.unique_id == record.unique_id) {
            Some(slot) => *slot = record,
            None => self.viewer_parts.push(record),
        }
    }

    /// Add an empty viewer to a part and return its id.
    pub fn add_viewer(&mut self, part: impl Into<String>, title: impl Into<String>, class_name: impl Into<String>) -> ViewerId {
        let id = ViewerId(self.viewers.len() as u32);
        self.viewers.push(ViewerRecord {
            id,
            part: part.into(),
            title: title.into(),
            class_name: class_name.into(),
            properties: PropertyBag::new(),
            layers: Vec::new(),
        });
        id
    }

    pub fn viewer_mut(&mut self, id: ViewerId) -> Option<&mut ViewerRecord> {
        self.viewers.iter_mut().find(|v| v.id == id)
    }

    /// Add a renderer. Within one viewer renderers are keyed by unique ID.
    pub fn add_renderer(&mut self, record: RendererRecord) {
        match self
            .renderers
            .iter_mut()
            .find(|r| r.viewer == record.viewer && r.unique_id == record.unique_id)
        {
            Some(slot) => *slot = record,
            None => self.renderers.push(record),
        }
    }

    pub fn renderer_mut(&mut self, viewer: ViewerId, unique_id: &str) -> Option<&mut RendererRecord> {
        self.renderers
            .iter_mut()
            .find(|r| r.viewer == viewer && r.unique_id == unique_id)
    }

    /// Record a window identifier; empty and repeated ids are ignored.
    pub fn note_window(&mut self, window_id: &str) {
        if !window_id.is_empty() && !self.window_ids.iter().any(|w| w == window_id) {
            self.window_ids.push(window_id.to_string());
        }
    }

    pub fn set_window_layout(&mut self, window_id: impl Into<String>, blob: impl Into<String>) {
        let window_id = window_id.into();
        let blob = blob.into();
        self.note_window(&window_id);
        match self.window_layouts.iter_mut().find(|(id, _)| *id == window_id) {
            Some((_, slot)) => *slot = blob,
            None => self.window_layouts.push((window_id, blob)),
        }
    }

    pub fn entity(&self, unique_id: &str) -> Option<&EntityRecord> {
        self.entities.iter().find(|e| e.unique_id == unique_id)
    }

    pub fn algorithms_in_window<'a>(&'a self, window_id: &'a str) -> impl Iterator<Item = &'a AlgorithmRecord> + 'a {
        self.algorithms.iter().filter(move |a| a.window_id == window_id)
    }

    pub fn perspectives_in_window<'a>(&'a self, window_id: &'a str) -> impl Iterator<Item = &'a PerspectiveRecord> + 'a {
        self.perspectives.iter().filter(move |p| p.window_id == window_id)
    }

    pub fn viewer_parts_in_window<'a>(&'a self, window_id: &'a str) -> impl Iterator<Item = &'a ViewerPartRecord> + 'a {
        self.viewer_parts.iter().filter(move |p| p.window_id == window_id)
    }

    pub fn viewer_part(&self, unique_id: &str) -> Option<&ViewerPartRecord> {
        self.viewer_parts.iter().find(|p| p.unique_id == unique_id)
    }

    pub fn viewers_of<'a>(&'a self, part_unique_id: &'a str) -> impl Iterator<Item = &'a ViewerRecord> + 'a {
        self.viewers.iter().filter(move |v| v.part == part_unique_id)
    }

    pub fn renderers_of(&self, viewer: ViewerId) -> impl Iterator<Item = &RendererRecord> + '_ {
        self.renderers.iter().filter(move |r| r.viewer == viewer)
    }

    pub fn window_layout(&self, window_id: &str) -> Option<&str> {
        self.window_layouts
            .iter()
            .find(|(id, _)| id == window_id)
            .map(|(_, blob)| blob.as_str())
    }

    /// `unique id -> var name` for every entity record.
    pub fn var_name_map(&self) -> HashMap<String, String> {
        self.entities
            .iter()
            .map(|e| (e.unique_id.clone(), e.var_name.clone()))
            .collect()
    }

    /// A batch snapshot carries no window, perspective or viewer sections.
    pub fn is_batch(&self) -> bool {
        self.perspectives.is_empty()
            && self.viewer_parts.is_empty()
            && self.window_layouts.is_empty()
            && self.plot_window.is_none()
    }

    /// Human-readable dump, one record per line.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let g = &self.header.geometry;
        let _ = writeln!(
            out,
            "session v{} ({}x{} at {},{})",
            self.header.version, g.width, g.height, g.x, g.y
        );
        let _ = writeln!(out, "entities: {}", self.entities.len());
        for e in &self.entities {
            let _ = writeln!(out, "  {} = {}", e.var_name, e.unique_id);
            for (k, v) in &e.properties {
                let _ = writeln!(out, "    {k} = {v:?}");
            }
        }
        let _ = writeln!(out, "algorithms: {}", self.algorithms.len());
        for a in &self.algorithms {
            let _ = writeln!(
                out,
                "  [{}] {} ({}) window={} action={}",
                a.unique_id, a.name, a.class_name, a.window_id, a.action
            );
            for (k, v) in &a.properties {
                let _ = writeln!(out, "    {k} = {v:?}");
            }
        }
        let _ = writeln!(out, "preference pages: {}", self.preference_pages.len());
        for p in &self.preference_pages {
            let _ = writeln!(out, "  {} ({}) {} values", p.page_name, p.page_class_name, p.preferences.len());
        }
        if self.is_batch() {
            return out;
        }
        let _ = writeln!(out, "windows: {}", self.window_ids.join(", "));
        if let Some(plot) = &self.plot_window {
            let _ = writeln!(out, "plot window: {plot}");
        }
        for p in &self.perspectives {
            let _ = writeln!(
                out,
                "  perspective {} ({}) window={} editor={}",
                p.id, p.name, p.window_id, p.editor_area_visible
            );
        }
        for part in &self.viewer_parts {
            let _ = writeln!(
                out,
                "  part {} [{}] window={} perspective={}",
                part.part_id, part.unique_id, part.window_id, part.perspective_id
            );
            for v in self.viewers_of(&part.unique_id) {
                let _ = writeln!(out, "    {} {:?} ({}) layers={}", v.id, v.title, v.class_name, v.layers.len());
                for r in self.renderers_of(v.id) {
                    let _ = writeln!(out, "      renderer {} ({}) -> {}", r.unique_id, r.class_name, r.rendered_entity_id);
                }
            }
        }
        for (id, blob) in &self.window_layouts {
            let _ = writeln!(out, "  layout for {id}: {} bytes", blob.len());
        }
        for gap in &self.reference_gaps {
            let _ = writeln!(out, "  gap at line {}: <{}> {}", gap.line, gap.element, gap.detail);
        }
        out
    }
}
