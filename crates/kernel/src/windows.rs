use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// An open perspective inside a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerspectiveState {
    pub id: String,
    pub name: String,
    pub class_name: String,
    pub editor_area_visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowState {
    pub id: String,
    pub perspectives: Vec<PerspectiveState>,
}

/// Outer bounds of the active window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub width: i32,
    pub height: i32,
    pub x: i32,
    pub y: i32,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1000,
            x: 0,
            y: 0,
        }
    }
}

/// The windowing subsystem.
///
/// Layout blobs are produced and consumed here; nothing else interprets them.
pub trait WindowManager: Send + Sync {
    /// Open windows in creation order.
    fn windows(&self) -> Vec<WindowState>;

    fn active_window(&self) -> Option<String>;

    fn geometry(&self) -> WindowGeometry;

    fn set_geometry(&self, geometry: WindowGeometry);

    fn plot_window(&self) -> Option<String>;

    fn set_plot_window(&self, window_id: &str) -> Result<(), CollaboratorError>;

    /// Raw layout blob for a window.
    fn layout_state(&self, window_id: &str) -> Option<String>;

    /// Replay a blob captured by `layout_state` into a (new) window.
    fn restore_layout(&self, window_id: &str, blob: &str) -> Result<(), CollaboratorError>;

    /// Open a new window, optionally showing `perspective`, and return the
    /// identifier the system assigned to it.
    fn open_window(&self, perspective: Option<&PerspectiveState>) -> Result<String, CollaboratorError>;

    /// Close every window except the active one.
    fn close_other_windows(&self);

    fn close_window(&self, window_id: &str) -> bool;
}
