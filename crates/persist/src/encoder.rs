//! Live state to session text.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use workbench_common::{AlgorithmAction, PropertyBag};
use workbench_kernel::{AlgorithmSpec, Entity, Model};

use crate::collaborators::Collaborators;
use crate::config::Exclusions;
use crate::escape;
use crate::model::{
    AlgorithmRecord, EntityRecord, LayerRecord, PerspectiveRecord, PreferencePageRecord, RendererRecord, Snapshot,
    ViewerPartRecord,
};

pub const PROLOGUE: &str = r#"<?xml version="1.0" ?>"#;
pub const WINDOW_MARKER_PREFIX: &str = "<!-- Start of state for window: ";
pub const WINDOW_MARKER_SUFFIX: &str = " -->";

/// Which kind of file a save produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Everything, including window layout and viewers.
    #[default]
    Interactive,
    /// Entities, algorithms and preferences only; algorithms are marked to
    /// execute on restore.
    Batch,
}

impl SaveMode {
    pub fn includes_layout(self) -> bool {
        self == Self::Interactive
    }

    fn action(self) -> AlgorithmAction {
        match self {
            Self::Interactive => AlgorithmAction::Load,
            Self::Batch => AlgorithmAction::Execute,
        }
    }
}

/// A model's pickled properties with its `class` key filled in.
pub(crate) fn pickle_model(model: &dyn Model) -> PropertyBag {
    let mut properties = model.pickle();
    if !properties.contains_key("class") {
        properties.insert("class", model.class_name());
    }
    properties
}

/// Entities that may be persisted, as `(var name, entity)`.
pub(crate) fn persistable_entities<'a>(
    entries: &'a [(String, std::sync::Arc<Entity>)],
    exclusions: &'a Exclusions,
) -> impl Iterator<Item = (&'a str, &'a Entity)> + 'a {
    entries.iter().filter_map(move |(var, entity)| {
        if exclusions.allows(entity) {
            Some((var.as_str(), entity.as_ref()))
        } else {
            tracing::debug!(unique_id = entity.unique_id(), var_name = %var, "entity not persistable, skipped");
            None
        }
    })
}

/// Builds snapshots from live collaborators and writes them out.
#[derive(Debug, Clone, Default)]
pub struct SnapshotEncoder {
    exclusions: Exclusions,
}

impl SnapshotEncoder {
    pub fn new(exclusions: Exclusions) -> Self {
        Self { exclusions }
    }

    /// Capture the current live state.
    pub fn capture(&self, live: &Collaborators, mode: SaveMode) -> Snapshot {
        let mut snapshot = Snapshot::new();

        // get_all hands back a copy, so loaders may keep adding meanwhile.
        let entries = live.repository.get_all();
        let mut seen = std::collections::HashSet::new();
        for (var, entity) in persistable_entities(&entries, &self.exclusions) {
            if !seen.insert(entity.unique_id().to_string()) {
                continue;
            }
            let Some(model) = entity.model() else { continue };
            snapshot.add_entity(EntityRecord {
                var_name: var.to_string(),
                unique_id: entity.unique_id().to_string(),
                properties: pickle_model(model),
            });
        }

        for registered in live.algorithms.registered() {
            let spec = registered.spec;
            snapshot.add_algorithm(AlgorithmRecord {
                name: spec.name,
                class_name: spec.class_name,
                window_id: spec.window_id,
                unique_id: registered.id,
                action: mode.action(),
                properties: sorted_parameters(&spec.parameters),
            });
        }

        for page in live.preferences.exportable_pages() {
            snapshot.add_preference_page(PreferencePageRecord {
                page_name: page.name,
                page_class_name: page.class_name,
                preferences: page.preferences,
            });
        }

        if mode.includes_layout() {
            self.capture_layout(live, &mut snapshot);
        }

        tracing::debug!(
            entities = snapshot.entities.len(),
            algorithms = snapshot.algorithms.len(),
            windows = snapshot.window_ids.len(),
            "captured session state"
        );
        snapshot
    }

    /// A batch snapshot holding only `algorithms`, numbered from 1 in the
    /// order given.
    pub fn capture_algorithms(&self, algorithms: &[AlgorithmSpec]) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for (index, spec) in algorithms.iter().enumerate() {
            snapshot.add_algorithm(AlgorithmRecord {
                name: spec.name.clone(),
                class_name: spec.class_name.clone(),
                window_id: spec.window_id.clone(),
                unique_id: index as u32 + 1,
                action: SaveMode::Batch.action(),
                properties: sorted_parameters(&spec.parameters),
            });
        }
        snapshot
    }

    fn capture_layout(&self, live: &Collaborators, snapshot: &mut Snapshot) {
        snapshot.header.geometry = live.windows.geometry();
        let windows = live.windows.windows();

        for window in &windows {
            snapshot.note_window(&window.id);
            for p in &window.perspectives {
                snapshot.add_perspective(PerspectiveRecord {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    class_name: p.class_name.clone(),
                    window_id: window.id.clone(),
                    editor_area_visible: p.editor_area_visible,
                });
            }
        }

        snapshot.plot_window = live
            .windows
            .plot_window()
            .filter(|plot| windows.iter().any(|w| w.id == *plot));

        for window in &windows {
            for part in live.viewers.viewer_parts(&window.id) {
                snapshot.add_viewer_part(ViewerPartRecord {
                    class_name: part.class_name,
                    part_id: part.part_id,
                    window_id: window.id.clone(),
                    perspective_id: part.perspective_id,
                    unique_id: part.unique_id.clone(),
                });
                for viewer in part.viewers {
                    let id = snapshot.add_viewer(part.unique_id.clone(), viewer.title, viewer.class_name);
                    if let Some(record) = snapshot.viewer_mut(id) {
                        record.properties = viewer.properties;
                        record.layers = viewer
                            .layers
                            .into_iter()
                            .map(|l| LayerRecord {
                                name: l.name,
                                checked: l.checked,
                            })
                            .collect();
                    }
                    for renderer in viewer.renderers {
                        snapshot.add_renderer(RendererRecord {
                            viewer: id,
                            class_name: renderer.class_name,
                            unique_id: renderer.unique_id,
                            rendered_entity_id: renderer.rendered_entity,
                            properties: renderer.properties,
                        });
                    }
                }
            }
        }

        for window in &windows {
            match live.windows.layout_state(&window.id) {
                Some(blob) => snapshot.set_window_layout(window.id.clone(), blob),
                None => tracing::warn!(window_id = %window.id, "no layout state for window"),
            }
        }
    }

    /// Write a snapshot to `path`.
    ///
    /// The structured section is written and closed first; layout blobs are
    /// then appended through a second handle.
    pub fn write_file(&self, path: impl AsRef<Path>, snapshot: &Snapshot) -> io::Result<()> {
        let path = path.as_ref();
        {
            let mut out = BufWriter::new(File::create(path)?);
            write_structured(&mut out, snapshot)?;
            out.flush()?;
        }
        if !snapshot.window_layouts.is_empty() {
            let mut out = BufWriter::new(OpenOptions::new().append(true).open(path)?);
            write_layouts(&mut out, snapshot)?;
            out.flush()?;
        }
        tracing::info!(path = %path.display(), entities = snapshot.entities.len(), "session written");
        Ok(())
    }
}

/// Whole file text for a snapshot.
pub fn encode(snapshot: &Snapshot) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_structured(&mut buf, snapshot).and_then(|()| write_layouts(&mut buf, snapshot));
    String::from_utf8_lossy(&buf).into_owned()
}

fn sorted_parameters(parameters: &PropertyBag) -> PropertyBag {
    parameters.sorted().iter().filter(|(k, _)| !k.is_empty()).collect()
}

/// Indenting element writer. All attribute values pass through the escape
/// codec.
struct ElementWriter<'w, W: Write> {
    out: &'w mut W,
    depth: usize,
}

impl<'w, W: Write> ElementWriter<'w, W> {
    fn new(out: &'w mut W) -> Self {
        Self { out, depth: 0 }
    }

    fn tag(&mut self, name: &str, attrs: &[(&str, &str)], close: &str) -> io::Result<()> {
        write!(self.out, "{:width$}<{name}", "", width = self.depth * 2)?;
        for (key, value) in attrs {
            write!(self.out, " {key}=\"{}\"", escape::encode(value))?;
        }
        writeln!(self.out, "{close}")
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> io::Result<()> {
        self.tag(name, attrs, ">")?;
        self.depth += 1;
        Ok(())
    }

    fn close(&mut self, name: &str) -> io::Result<()> {
        self.depth = self.depth.saturating_sub(1);
        writeln!(self.out, "{:width$}</{name}>", "", width = self.depth * 2)
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> io::Result<()> {
        self.tag(name, attrs, "/>")
    }

    fn pairs(&mut self, name: &str, bag: &PropertyBag) -> io::Result<()> {
        for (key, value) in bag {
            self.empty(name, &[("key", key), ("value", value)])?;
        }
        Ok(())
    }
}

fn bool_str(b: bool) -> &'static str {
    if b { "true" } else { "false" }
}

/// Write the prologue and the root element with everything inside it.
pub fn write_structured<W: Write>(out: &mut W, snapshot: &Snapshot) -> io::Result<()> {
    writeln!(out, "{PROLOGUE}")?;
    let mut w = ElementWriter::new(out);
    let g = &snapshot.header.geometry;
    let (width, height, x, y) = (g.width.to_string(), g.height.to_string(), g.x.to_string(), g.y.to_string());
    w.open(
        "geocraft",
        &[
            ("version", snapshot.header.version.as_str()),
            ("width", width.as_str()),
            ("height", height.as_str()),
            ("x", x.as_str()),
            ("y", y.as_str()),
        ],
    )?;

    w.open("repository", &[])?;
    w.open("entities", &[])?;
    for e in &snapshot.entities {
        w.open("entity", &[("varName", e.var_name.as_str()), ("uniqueId", e.unique_id.as_str())])?;
        w.pairs("property", &e.properties)?;
        w.close("entity")?;
    }
    w.close("entities")?;
    w.close("repository")?;

    w.open("algorithms", &[])?;
    for a in &snapshot.algorithms {
        let uid = a.unique_id.to_string();
        w.open(
            "algorithm",
            &[
                ("name", a.name.as_str()),
                ("class", a.class_name.as_str()),
                ("windowID", a.window_id.as_str()),
                ("uniqueID", uid.as_str()),
                ("action", a.action.as_str()),
            ],
        )?;
        w.pairs("parameter", &sorted_parameters(&a.properties))?;
        w.close("algorithm")?;
    }
    w.close("algorithms")?;

    for page in &snapshot.preference_pages {
        w.open("preferencePage", &[("name", page.page_name.as_str()), ("class", page.page_class_name.as_str())])?;
        w.pairs("preference", &page.preferences)?;
        w.close("preferencePage")?;
    }

    for p in &snapshot.perspectives {
        w.empty(
            "perspective",
            &[
                ("id", p.id.as_str()),
                ("name", p.name.as_str()),
                ("class", p.class_name.as_str()),
                ("windowID", p.window_id.as_str()),
                ("isEditorAreaVisible", bool_str(p.editor_area_visible)),
            ],
        )?;
    }

    if let Some(plot) = &snapshot.plot_window {
        w.empty("plotWindow", &[("windowID", plot.as_str())])?;
    }

    for part in &snapshot.viewer_parts {
        w.open(
            "viewerPart",
            &[
                ("class", part.class_name.as_str()),
                ("partID", part.part_id.as_str()),
                ("windowID", part.window_id.as_str()),
                ("perspectiveID", part.perspective_id.as_str()),
                ("uniqueID", part.unique_id.as_str()),
            ],
        )?;
        for viewer in snapshot.viewers_of(&part.unique_id) {
            w.open("viewer", &[("title", viewer.title.as_str()), ("class", viewer.class_name.as_str())])?;
            for layer in &viewer.layers {
                w.empty("viewerLayer", &[("layerName", layer.name.as_str()), ("checked", bool_str(layer.checked))])?;
            }
            w.pairs("viewerProperty", &viewer.properties)?;
            for r in snapshot.renderers_of(viewer.id) {
                w.open("renderer", &[("class", r.class_name.as_str()), ("uniqueID", r.unique_id.as_str())])?;
                w.empty("entityRendered", &[("uniqueId", r.rendered_entity_id.as_str())])?;
                w.pairs("modelProperty", &r.properties)?;
                w.close("renderer")?;
            }
            w.close("viewer")?;
        }
        w.close("viewerPart")?;
    }

    w.close("geocraft")
}

/// Append one marker line plus raw blob per window.
pub fn write_layouts<W: Write>(out: &mut W, snapshot: &Snapshot) -> io::Result<()> {
    for (window_id, blob) in &snapshot.window_layouts {
        if blob.lines().any(|l| l.trim_start().starts_with("<!--")) {
            tracing::warn!(window_id = %window_id, "layout blob contains a comment line and will be truncated on read");
        }
        writeln!(out, "{WINDOW_MARKER_PREFIX}{window_id}{WINDOW_MARKER_SUFFIX}")?;
        writeln!(out, "{blob}")?;
    }
    Ok(())
}
