//! Session text to [`Snapshot`].
//!
//! The structured section runs up to the first line starting with `<!--`.
//! Everything after it is a sequence of window layout blobs, each introduced
//! by a marker line naming its window.

use std::path::Path;

use workbench_common::AlgorithmAction;

use crate::error::{ParseError, ParseErrorKind, SessionError};
use crate::escape;
use crate::model::{
    AlgorithmRecord, EntityRecord, FORMAT_VERSION, LayerRecord, PerspectiveRecord, PreferencePageRecord,
    ReferenceGap, RendererRecord, Snapshot, ViewerId, ViewerPartRecord,
};

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        empty: bool,
        line: usize,
    },
    End {
        name: String,
        line: usize,
    },
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0, line: 1 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn advance(&mut self, n: usize) {
        self.line += self.src[self.pos..self.pos + n].matches('\n').count();
        self.pos += n;
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.advance(end);
        &rest[..end]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        loop {
            // Text between tags carries nothing in this format.
            let Some(offset) = self.rest().find('<') else {
                self.advance(self.rest().len());
                return Ok(None);
            };
            self.advance(offset);
            let rest = self.rest();
            let line = self.line;
            let unterminated = || ParseError::new(line, ParseErrorKind::UnterminatedTag);

            if rest.starts_with("<?") {
                let end = rest.find("?>").ok_or_else(unterminated)?;
                self.advance(end + 2);
                continue;
            }
            if rest.starts_with("<!--") {
                let end = rest.find("-->").ok_or_else(unterminated)?;
                self.advance(end + 3);
                continue;
            }
            if let Some(body) = rest.strip_prefix("</") {
                let end = body.find('>').ok_or_else(unterminated)?;
                let name = body[..end].trim();
                if name.is_empty() || name.contains(char::is_whitespace) {
                    return Err(ParseError::new(
                        line,
                        ParseErrorKind::MalformedTag(format!("bad closing tag </{name}>")),
                    ));
                }
                let name = name.to_string();
                self.advance(2 + end + 1);
                return Ok(Some(Token::End { name, line }));
            }
            return self.start_tag(line).map(Some);
        }
    }

    fn start_tag(&mut self, line: usize) -> Result<Token, ParseError> {
        let malformed = |msg: String| ParseError::new(line, ParseErrorKind::MalformedTag(msg));
        let unterminated = || ParseError::new(line, ParseErrorKind::UnterminatedTag);

        self.advance(1);
        let name = self.take_while(|c| !c.is_whitespace() && c != '/' && c != '>');
        if name.is_empty() {
            return Err(malformed("element without a name".into()));
        }
        let name = name.to_string();
        let mut attrs = Vec::new();
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(unterminated());
            }
            if rest.starts_with("/>") {
                self.advance(2);
                return Ok(Token::Start {
                    name,
                    attrs,
                    empty: true,
                    line,
                });
            }
            if rest.starts_with('>') {
                self.advance(1);
                return Ok(Token::Start {
                    name,
                    attrs,
                    empty: false,
                    line,
                });
            }

            let key = self.take_while(|c| c != '=' && c != '>' && c != '/' && !c.is_whitespace());
            if key.is_empty() {
                return Err(malformed(format!("unexpected character in <{name}>")));
            }
            self.skip_whitespace();
            if !self.rest().starts_with('=') {
                return Err(malformed(format!("attribute {key:?} of <{name}> has no value")));
            }
            self.advance(1);
            self.skip_whitespace();
            let quote = match self.rest().chars().next() {
                Some(q @ ('"' | '\'')) => q,
                Some(_) => return Err(malformed(format!("attribute {key:?} of <{name}> is not quoted"))),
                None => return Err(unterminated()),
            };
            self.advance(1);
            let Some(end) = self.rest().find(quote) else {
                return Err(unterminated());
            };
            let value = escape::decode(&self.rest()[..end]);
            self.advance(end + 1);
            attrs.push((key.to_string(), value));
        }
    }
}

/// One open element and what it contributes to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Root,
    Container,
    Entity(usize),
    Algorithm(usize),
    PreferencePage(usize),
    Perspective,
    ViewerPart(String),
    Viewer(ViewerId),
    Renderer(ViewerId, String),
    Leaf,
    /// Unknown or out-of-context subtree; its descendants are ignored.
    Skipped,
}

struct Element<'t> {
    name: &'t str,
    attrs: &'t [(String, String)],
    line: usize,
}

impl Element<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn required(&self, key: &str) -> Result<String, ParseError> {
        self.get(key).map(str::to_string).ok_or_else(|| {
            ParseError::new(
                self.line,
                ParseErrorKind::MissingAttribute {
                    element: self.name.to_string(),
                    attribute: key.to_string(),
                },
            )
        })
    }

    fn or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    fn invalid(&self, key: &str, value: &str) -> ParseError {
        ParseError::new(
            self.line,
            ParseErrorKind::InvalidAttribute {
                element: self.name.to_string(),
                attribute: key.to_string(),
                value: value.to_string(),
            },
        )
    }

    fn int_or(&self, key: &str, default: i32) -> Result<i32, ParseError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|_| self.invalid(key, v)),
        }
    }
}

/// Decoder state: the snapshot being built plus the stack of open elements.
#[derive(Default)]
struct ParserState {
    snapshot: Snapshot,
    stack: Vec<(String, Frame)>,
    root_closed: bool,
}

impl ParserState {
    fn parent(&self) -> Option<&Frame> {
        self.stack.last().map(|(_, frame)| frame)
    }

    fn gap(&mut self, el: &Element<'_>, detail: &str) -> Frame {
        tracing::warn!(line = el.line, element = el.name, detail, "reference gap in session file");
        self.snapshot.reference_gaps.push(ReferenceGap {
            line: el.line,
            element: el.name.to_string(),
            detail: detail.to_string(),
        });
        Frame::Skipped
    }

    fn start(&mut self, el: &Element<'_>) -> Result<Frame, ParseError> {
        let Some(parent) = self.parent().cloned() else {
            if el.name != "geocraft" {
                return Err(ParseError::new(el.line, ParseErrorKind::MissingRoot));
            }
            let header = &mut self.snapshot.header;
            header.version = el.get("version").unwrap_or(FORMAT_VERSION).to_string();
            header.geometry.width = el.int_or("width", 1000)?;
            header.geometry.height = el.int_or("height", 1000)?;
            header.geometry.x = el.int_or("x", 0)?;
            header.geometry.y = el.int_or("y", 0)?;
            return Ok(Frame::Root);
        };
        if parent == Frame::Skipped {
            return Ok(Frame::Skipped);
        }

        let frame = match el.name {
            "repository" | "entities" | "algorithms" => Frame::Container,

            "entity" => {
                let record = EntityRecord::new(el.required("varName")?, el.required("uniqueId")?);
                let unique_id = record.unique_id.clone();
                if self.snapshot.add_entity(record).is_some() {
                    tracing::warn!(line = el.line, unique_id = %unique_id, "duplicate entity, later record wins");
                }
                let index = self
                    .snapshot
                    .entities
                    .iter()
                    .position(|e| e.unique_id == unique_id)
                    .unwrap_or_default();
                Frame::Entity(index)
            }
            "property" => match parent {
                Frame::Entity(i) => {
                    self.snapshot.entities[i]
                        .properties
                        .insert(el.required("key")?, el.or_empty("value"));
                    Frame::Leaf
                }
                _ => self.gap(el, "no enclosing entity"),
            },

            "algorithm" => {
                let raw_id = el.required("uniqueID")?;
                let unique_id: u32 = raw_id.trim().parse().map_err(|_| el.invalid("uniqueID", &raw_id))?;
                let action = match el.get("action") {
                    None => AlgorithmAction::Load,
                    Some(v) => v.parse().map_err(|_| el.invalid("action", v))?,
                };
                let mut record =
                    AlgorithmRecord::new(el.or_empty("name"), el.required("class")?, el.or_empty("windowID"), unique_id);
                record.action = action;
                self.snapshot.add_algorithm(record);
                Frame::Algorithm(self.snapshot.algorithms.len() - 1)
            }
            "parameter" => match parent {
                Frame::Algorithm(i) => {
                    self.snapshot.algorithms[i]
                        .properties
                        .insert(el.required("key")?, el.or_empty("value"));
                    Frame::Leaf
                }
                _ => self.gap(el, "no enclosing algorithm"),
            },

            "preferencePage" => {
                self.snapshot.add_preference_page(PreferencePageRecord {
                    page_name: el.or_empty("name"),
                    page_class_name: el.required("class")?,
                    preferences: Default::default(),
                });
                Frame::PreferencePage(self.snapshot.preference_pages.len() - 1)
            }
            "preference" => match parent {
                Frame::PreferencePage(i) => {
                    self.snapshot.preference_pages[i]
                        .preferences
                        .insert(el.required("key")?, el.or_empty("value"));
                    Frame::Leaf
                }
                _ => self.gap(el, "no enclosing preferencePage"),
            },

            "perspective" => {
                self.snapshot.add_perspective(PerspectiveRecord {
                    id: el.required("id")?,
                    name: el.or_empty("name"),
                    class_name: el.or_empty("class"),
                    window_id: el.or_empty("windowID"),
                    editor_area_visible: el.flag("isEditorAreaVisible"),
                });
                Frame::Perspective
            }
            "plotWindow" => {
                self.snapshot.plot_window = Some(el.required("windowID")?);
                Frame::Leaf
            }

            "viewerPart" => {
                let record = ViewerPartRecord {
                    class_name: el.or_empty("class"),
                    part_id: el.required("partID")?,
                    window_id: el.or_empty("windowID"),
                    perspective_id: el.or_empty("perspectiveID"),
                    unique_id: el.required("uniqueID")?,
                };
                let unique_id = record.unique_id.clone();
                self.snapshot.add_viewer_part(record);
                Frame::ViewerPart(unique_id)
            }
            "viewer" => match parent {
                Frame::ViewerPart(part) => {
                    Frame::Viewer(self.snapshot.add_viewer(part, el.or_empty("title"), el.or_empty("class")))
                }
                _ => self.gap(el, "no enclosing viewerPart"),
            },
            "viewerLayer" | "viewerProperty" => match parent {
                Frame::Viewer(id) => {
                    let layer = if el.name == "viewerLayer" {
                        Some(LayerRecord {
                            name: el.required("layerName")?,
                            checked: el.flag("checked"),
                        })
                    } else {
                        None
                    };
                    let property = if layer.is_none() {
                        Some((el.required("key")?, el.or_empty("value")))
                    } else {
                        None
                    };
                    if let Some(viewer) = self.snapshot.viewer_mut(id) {
                        viewer.layers.extend(layer);
                        if let Some((key, value)) = property {
                            viewer.properties.insert(key, value);
                        }
                    }
                    Frame::Leaf
                }
                _ => self.gap(el, "no enclosing viewer"),
            },
            "renderer" => match parent {
                Frame::Viewer(id) => {
                    let unique_id = el.required("uniqueID")?;
                    self.snapshot.add_renderer(RendererRecord {
                        viewer: id,
                        class_name: el.required("class")?,
                        unique_id: unique_id.clone(),
                        rendered_entity_id: String::new(),
                        properties: Default::default(),
                    });
                    Frame::Renderer(id, unique_id)
                }
                _ => self.gap(el, "no enclosing viewer"),
            },
            "entityRendered" | "modelProperty" => match parent {
                Frame::Renderer(viewer, uid) => {
                    let entity = if el.name == "entityRendered" {
                        Some(el.required("uniqueId")?)
                    } else {
                        None
                    };
                    let property = if entity.is_none() {
                        Some((el.required("key")?, el.or_empty("value")))
                    } else {
                        None
                    };
                    if let Some(renderer) = self.snapshot.renderer_mut(viewer, &uid) {
                        if let Some(entity) = entity {
                            renderer.rendered_entity_id = entity;
                        }
                        if let Some((key, value)) = property {
                            renderer.properties.insert(key, value);
                        }
                    }
                    Frame::Leaf
                }
                _ => self.gap(el, "no enclosing renderer"),
            },

            other => {
                tracing::debug!(line = el.line, element = other, "ignoring unknown element");
                Frame::Skipped
            }
        };
        Ok(frame)
    }

    fn finish(&mut self, frame: &Frame) {
        if *frame == Frame::Root {
            self.root_closed = true;
        }
    }
}

/// Split at the first line that starts with `<!--`.
fn split_sections(source: &str) -> (&str, &str) {
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        if line.trim_start().starts_with("<!--") {
            return source.split_at(offset);
        }
        offset += line.len();
    }
    (source, "")
}

fn window_marker_id(line: &str) -> Option<String> {
    let inner = line.trim().strip_prefix("<!--")?.strip_suffix("-->")?.trim();
    let (_, id) = inner.strip_prefix("Start of state for")?.split_once("window:")?;
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Each blob runs from its marker line to the next comment line. Bytes are
/// kept as written except the single newline `write_layouts` appends.
fn parse_layouts(text: &str, snapshot: &mut Snapshot) {
    fn flush(snapshot: &mut Snapshot, id: String, body: &str) {
        let body = body.strip_suffix('\n').unwrap_or(body);
        snapshot.set_window_layout(id, body);
    }

    let mut current: Option<(String, usize)> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if !line.trim_start().starts_with("<!--") {
            continue;
        }
        if let Some((id, body_start)) = current.take() {
            flush(snapshot, id, &text[body_start..start]);
        }
        current = window_marker_id(line).map(|id| (id, offset));
        if current.is_none() {
            tracing::debug!(line = line.trim_end(), "ignoring comment outside the structured section");
        }
    }
    if let Some((id, body_start)) = current {
        flush(snapshot, id, &text[body_start..]);
    }
}

/// Parse session text. Nothing is returned unless the whole structured
/// section is well formed.
pub fn parse(source: &str) -> Result<Snapshot, ParseError> {
    let (structured, layouts) = split_sections(source);
    let mut tokens = Tokenizer::new(structured);
    let mut state = ParserState::default();

    while let Some(token) = tokens.next_token()? {
        match token {
            Token::Start {
                name,
                attrs,
                empty,
                line,
            } => {
                if state.root_closed {
                    return Err(ParseError::new(line, ParseErrorKind::TrailingContent));
                }
                let frame = state.start(&Element {
                    name: &name,
                    attrs: &attrs,
                    line,
                })?;
                if empty {
                    state.finish(&frame);
                } else {
                    state.stack.push((name, frame));
                }
            }
            Token::End { name, line } => {
                let Some((open, frame)) = state.stack.pop() else {
                    return Err(ParseError::new(line, ParseErrorKind::UnexpectedClose(name)));
                };
                if open != name {
                    return Err(ParseError::new(
                        line,
                        ParseErrorKind::MismatchedTag {
                            expected: open,
                            found: name,
                        },
                    ));
                }
                state.finish(&frame);
            }
        }
    }

    if let Some((open, _)) = state.stack.last() {
        return Err(ParseError::new(tokens.line, ParseErrorKind::UnexpectedEof(open.clone())));
    }
    if !state.root_closed {
        return Err(ParseError::new(tokens.line, ParseErrorKind::MissingRoot));
    }

    let mut snapshot = state.snapshot;
    parse_layouts(layouts, &mut snapshot);
    Ok(snapshot)
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<Snapshot, SessionError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let snapshot = parse(&text)?;
    tracing::debug!(
        path = %path.display(),
        entities = snapshot.entities.len(),
        gaps = snapshot.reference_gaps.len(),
        "session parsed"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use workbench_common::PropertyBag;
    use workbench_kernel::WindowGeometry;

    fn full_snapshot() -> Snapshot {
        let mut snap = Snapshot::new();
        snap.header.geometry = WindowGeometry {
            width: 1280,
            height: 800,
            x: -5,
            y: 20,
        };
        snap.add_entity(
            EntityRecord::new("w1", "well/42")
                .with_property("class", "WellModel")
                .with_property("name", "Well \"42\"\r\nline2 <b> & &#xA;"),
        );
        snap.add_entity(EntityRecord::new("g1", "grid/7").with_property("class", "GridModel"));
        snap.add_algorithm(
            AlgorithmRecord::new("Smoother", "pkg.Smoother", "win1", 1)
                .with_property("alpha", "x\ny")
                .with_property("window", "5"),
        );
        snap.add_preference_page(PreferencePageRecord {
            page_name: "Units".into(),
            page_class_name: "prefs.Units".into(),
            preferences: [("depth", "m")].into_iter().collect(),
        });
        snap.add_perspective(PerspectiveRecord {
            id: "map".into(),
            name: "Map".into(),
            class_name: "ui.MapPerspective".into(),
            window_id: "win1".into(),
            editor_area_visible: false,
        });
        snap.plot_window = Some("win1".into());
        snap.add_viewer_part(ViewerPartRecord {
            class_name: "ui.MapPart".into(),
            part_id: "map.view".into(),
            window_id: "win1".into(),
            perspective_id: "map".into(),
            unique_id: "3".into(),
        });
        let viewer = snap.add_viewer("3", "Map <1>", "ui.MapViewer");
        if let Some(v) = snap.viewer_mut(viewer) {
            v.layers.push(LayerRecord {
                name: "Wells".into(),
                checked: true,
            });
            v.properties.insert("zoom", "2.5");
        }
        snap.add_renderer(RendererRecord {
            viewer,
            class_name: "render.Well".into(),
            unique_id: "r-1".into(),
            rendered_entity_id: "well/42".into(),
            properties: [("color", "red")].into_iter().collect(),
        });
        snap.set_window_layout("win1", "{\"perspectives\":[],\n\"parts\":[]}");
        snap
    }

    #[test]
    fn full_snapshot_round_trips() {
        let snap = full_snapshot();
        let decoded = parse(&encode(&snap)).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let snap = Snapshot::new();
        assert_eq!(parse(&encode(&snap)).unwrap(), snap);
    }

    #[test]
    fn attribute_order_does_not_matter() {
        let text = r#"<?xml version="1.0" ?>
<geocraft>
  <repository><entities>
    <entity uniqueId="a/1" varName="a1">
      <property value="v" key="k"/>
    </entity>
  </entities></repository>
</geocraft>
"#;
        let snap = parse(text).unwrap();
        assert_eq!(snap.entities[0].var_name, "a1");
        assert_eq!(snap.entities[0].properties.get("k"), Some("v"));
        assert_eq!(snap.header.geometry, WindowGeometry::default());
        assert_eq!(snap.header.version, FORMAT_VERSION);
    }

    #[test]
    fn renderer_without_viewer_is_a_gap() {
        let text = r#"<geocraft>
  <viewerPart partID="p" uniqueID="1">
    <renderer class="render.Well" uniqueID="r">
      <entityRendered uniqueId="well/42"/>
    </renderer>
    <viewer title="t" class="c">
      <renderer class="render.Grid" uniqueID="r2"/>
    </viewer>
  </viewerPart>
  <viewer title="orphan" class="c"/>
</geocraft>"#;
        let snap = parse(text).unwrap();
        let gaps: Vec<(&str, usize)> = snap.reference_gaps.iter().map(|g| (g.element.as_str(), g.line)).collect();
        assert_eq!(gaps, vec![("renderer", 3), ("viewer", 10)]);
        assert_eq!(snap.viewers.len(), 1);
        assert_eq!(snap.renderers.len(), 1);
        assert_eq!(snap.renderers[0].class_name, "render.Grid");
    }

    #[test]
    fn missing_required_attribute_fails() {
        let err = parse(r#"<geocraft><repository><entities><entity varName="x"></entity></entities></repository></geocraft>"#)
            .unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::MissingAttribute {
                element: "entity".into(),
                attribute: "uniqueId".into()
            }
        );
    }

    #[test]
    fn non_integer_algorithm_id_fails() {
        let err = parse("<geocraft>\n<algorithms>\n<algorithm class=\"c\" uniqueID=\"abc\"/>\n</algorithms>\n</geocraft>")
            .unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.kind, ParseErrorKind::InvalidAttribute { .. }));
    }

    #[test]
    fn structural_errors_are_reported() {
        let cases = [
            ("", ParseErrorKind::MissingRoot),
            ("<other/>", ParseErrorKind::MissingRoot),
            ("<geocraft><algorithms></geocraft>", ParseErrorKind::MismatchedTag {
                expected: "algorithms".into(),
                found: "geocraft".into(),
            }),
            ("<geocraft>", ParseErrorKind::UnexpectedEof("geocraft".into())),
            ("<geocraft></geocraft></x>", ParseErrorKind::UnexpectedClose("x".into())),
            ("<geocraft></geocraft><geocraft>", ParseErrorKind::TrailingContent),
            ("<geocraft version=\"1", ParseErrorKind::UnterminatedTag),
        ];
        for (text, kind) in cases {
            assert_eq!(parse(text).unwrap_err().kind, kind, "input {text:?}");
        }
    }

    #[test]
    fn layout_blobs_split_on_markers() {
        let text = "<geocraft></geocraft>\n\
                    <!-- Start of state for window: A -->\n\
                    line a1\n\
                    line a2\n\
                    <!-- Start of state for Eclipse window: B -->\n\
                    line b\n";
        let snap = parse(text).unwrap();
        assert_eq!(snap.window_layout("A"), Some("line a1\nline a2"));
        assert_eq!(snap.window_layout("B"), Some("line b"));
        assert_eq!(snap.window_ids, vec!["A", "B"]);
    }

    #[test]
    fn layout_blobs_keep_line_endings() {
        let mut snap = Snapshot::new();
        snap.set_window_layout("w1", "<memento>\r\n  <part/>\r\n</memento>\r\n");
        snap.set_window_layout("w2", "");
        snap.set_window_layout("w3", "tail without newline");
        let decoded = parse(&encode(&snap)).unwrap();
        assert_eq!(decoded.window_layout("w1"), Some("<memento>\r\n  <part/>\r\n</memento>\r\n"));
        assert_eq!(decoded.window_layout("w2"), Some(""));
        assert_eq!(decoded, snap);
    }

    #[test]
    fn structured_section_stops_at_first_comment_line() {
        let text = "<geocraft>\n<!-- Start of state for window: A -->\n</geocraft>\n";
        assert_eq!(parse(text).unwrap_err().kind, ParseErrorKind::UnexpectedEof("geocraft".into()));
    }

    #[test]
    fn duplicate_entity_keeps_later_record() {
        let text = r#"<geocraft><repository><entities>
<entity varName="a" uniqueId="x"><property key="k" value="1"/></entity>
<entity varName="b" uniqueId="x"><property key="k" value="2"/></entity>
</entities></repository></geocraft>"#;
        let snap = parse(text).unwrap();
        assert_eq!(snap.entities.len(), 1);
        assert_eq!(snap.entities[0].var_name, "b");
        assert_eq!(snap.entities[0].properties, [("k", "2")].into_iter().collect::<PropertyBag>());
    }

    #[test]
    fn single_quotes_and_xml_entities_are_accepted() {
        let text = "<geocraft><algorithms><algorithm class='a&amp;b' uniqueID='4' action='execute'/></algorithms></geocraft>";
        let snap = parse(text).unwrap();
        assert_eq!(snap.algorithms[0].class_name, "a&b");
        assert_eq!(snap.algorithms[0].action, AlgorithmAction::Execute);
    }

    #[test]
    fn unknown_elements_are_skipped_with_children() {
        let text = r#"<geocraft><extension><property key="k" value="v"/></extension></geocraft>"#;
        let snap = parse(text).unwrap();
        assert!(snap.reference_gaps.is_empty());
        assert!(snap.entities.is_empty());
    }
}
