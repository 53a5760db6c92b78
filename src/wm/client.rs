use x11rb::protocol::xproto::Window;

use crate::wm::geometry::Geometry;
use crate::wm::workspace::WorkspaceId;

/// Window Manager client state
/// Represents a window being managed by the WM
#[derive(Debug, Clone)]
pub struct Client {
    /// X11 window ID
    pub window: Window,

    /// Geometry to restore when leaving floating/fullscreen.
    /// Stale unless `floating || fullscreen`.
    pub saved: Geometry,

    pub floating: bool,
    pub fullscreen: bool,

    /// Workspace the client belongs to
    pub workspace: WorkspaceId,
}

impl Client {
    pub fn new(window: Window, workspace: WorkspaceId) -> Self {
        Self {
            window,
            saved: Geometry::default(),
            floating: false,
            fullscreen: false,
            workspace,
        }
    }

    /// Whether the tiling pass places this client
    pub fn is_tiled(&self) -> bool {
        !self.floating && !self.fullscreen
    }

    /// The saved geometry, if it is meaningful
    pub fn restore_geometry(&self) -> Option<Geometry> {
        (self.floating || self.fullscreen).then_some(self.saved)
    }
}
