//! Drag Reorder
//!
//! Modifier+Button1 drags a tiled client around the screen; releasing it
//! over another client swaps their registry positions, and the next
//! `arrange()` reflows master/stack assignment from the new order.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{ButtonIndex, ModMask, Window};

use crate::wm::WindowManager;
use crate::wm::display::DisplayServer;
use crate::wm::error::log_rejection;
use crate::wm::geometry::Geometry;
use crate::wm::keyboard::clean_mask;

/// State captured when a drag starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSession {
    /// Window being dragged
    pub window: Window,
    /// Pointer position at press (root coordinates)
    pub start_x: i32,
    pub start_y: i32,
    /// Window geometry at press
    pub start_geometry: Geometry,
}

impl DragSession {
    /// Window position after the pointer moved to `(root_x, root_y)`
    pub fn position_for(&self, root_x: i32, root_y: i32) -> (i32, i32) {
        (
            self.start_geometry.x + (root_x - self.start_x),
            self.start_geometry.y + (root_y - self.start_y),
        )
    }
}

/// Idle when `session` is `None`
#[derive(Debug)]
pub struct DragController {
    session: Option<DragSession>,
    modifier: ModMask,
    border_width: u32,
}

impl DragController {
    pub fn new(modifier: ModMask, border_width: u32) -> Self {
        Self {
            session: None,
            modifier,
            border_width,
        }
    }

    pub fn modifier(&self) -> ModMask {
        self.modifier
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Whether a press starts a drag
    pub fn qualifies(&self, button: u8, state: u16) -> bool {
        let modifier = u16::from(self.modifier);
        button == u8::from(ButtonIndex::M1) && clean_mask(state) & modifier == modifier
    }

    fn highlight_width(&self) -> u32 {
        self.border_width * 2
    }

    /// Drop the session, returning it
    pub fn cancel(&mut self) -> Option<DragSession> {
        self.session.take()
    }
}

impl WindowManager {
    /// Idle -> Dragging on a qualifying press over a managed client
    pub fn begin_drag(
        &mut self,
        display: &impl DisplayServer,
        window: Window,
        button: u8,
        state: u16,
        root_x: i32,
        root_y: i32,
    ) -> Result<()> {
        let checked = self.validator.check_position(root_x, root_y);
        if log_rejection(checked, "button press").is_none() {
            return Ok(());
        }
        if self.drag.is_active() || !self.registry.contains(window) {
            return Ok(());
        }
        if !self.drag.qualifies(button, state) {
            return Ok(());
        }
        let Some(info) = display.window_info(window)? else {
            return Ok(());
        };
        if !display.grab_pointer()? {
            warn!("Pointer grab refused, not dragging 0x{:x}", window);
            return Ok(());
        }

        self.focus_window(display, Some(window))?;
        display.set_border_width(window, self.drag.highlight_width())?;
        self.drag.session = Some(DragSession {
            window,
            start_x: root_x,
            start_y: root_y,
            start_geometry: info.geometry,
        });
        debug!("Drag started on 0x{:x} at {},{}", window, root_x, root_y);
        Ok(())
    }

    /// Move the dragged window by the pointer delta
    pub fn drag_motion(&mut self, display: &impl DisplayServer, root_x: i32, root_y: i32) -> Result<()> {
        let Some(session) = self.drag.session else {
            return Ok(());
        };
        let checked = self.validator.check_position(root_x, root_y);
        if log_rejection(checked, "pointer motion").is_none() {
            return Ok(());
        }
        let (x, y) = session.position_for(root_x, root_y);
        if self.validator.valid_position(x, y) {
            display.move_window(session.window, x, y)?;
        }
        Ok(())
    }

    /// Dragging -> Idle: swap with the client whose tiled slot holds the
    /// release point. The dragged window itself sits on top of that slot,
    /// so it is skipped.
    pub fn end_drag(&mut self, display: &impl DisplayServer, root_x: i32, root_y: i32) -> Result<()> {
        let Some(session) = self.drag.cancel() else {
            return Ok(());
        };
        display.ungrab_pointer()?;
        let dragged = session.window;

        let target = self
            .layout
            .plan(&self.registry, self.workspaces.active(), self.screen)
            .window_at(root_x, root_y, self.focus.border_width(), dragged);
        if let Some(target) = target {
            self.registry.swap_order(dragged, target);
            info!("Swapped 0x{:x} with 0x{:x}", dragged, target);
        } else {
            debug!("Drag of 0x{:x} ended without a target", dragged);
        }

        display.set_border_width(dragged, self.focus.border_width())?;
        self.arrange(display)?;
        self.focus_window(display, Some(dragged))
    }

    /// Return to Idle without reordering. `destroyed` names a window that
    /// no longer exists; the session is only dropped if it was the one
    /// being dragged. Returns whether a session was aborted; the caller
    /// re-arranges.
    pub fn abort_drag(&mut self, display: &impl DisplayServer, destroyed: Option<Window>) -> Result<bool> {
        let Some(session) = self.drag.session else {
            return Ok(false);
        };
        if destroyed.is_some_and(|w| w != session.window) {
            return Ok(false);
        }
        self.drag.cancel();
        warn!("Drag of 0x{:x} aborted", session.window);

        display.ungrab_pointer()?;
        if destroyed.is_none() && self.registry.contains(session.window) {
            display.set_border_width(session.window, self.focus.border_width())?;
        }
        Ok(true)
    }
}
