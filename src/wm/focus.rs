//! Focus Management
//!
//! Input focus and border state. Everything visual about focus is decided
//! here; the drag highlight is the only other place borders change.

use anyhow::Result;
use tracing::debug;
use x11rb::protocol::xproto::Window;

use crate::config::BorderColors;
use crate::wm::WindowManager;
use crate::wm::display::DisplayServer;

#[derive(Debug, Clone)]
pub struct FocusController {
    border_width: u32,
    active_color: u32,
    inactive_color: u32,
}

impl FocusController {
    pub fn new(border_width: u32, colors: &BorderColors) -> Self {
        Self {
            border_width,
            active_color: colors.active_border,
            inactive_color: colors.inactive_border,
        }
    }

    pub fn border_width(&self) -> u32 {
        self.border_width
    }

    pub fn active_color(&self) -> u32 {
        self.active_color
    }

    pub fn inactive_color(&self) -> u32 {
        self.inactive_color
    }
}

impl WindowManager {
    /// Focus `window` and redraw borders for the active workspace.
    /// `None` and unknown windows are ignored.
    pub fn focus_window(&mut self, display: &impl DisplayServer, window: Option<Window>) -> Result<()> {
        let Some(target) = window.and_then(|w| self.registry.get(w)) else {
            return Ok(());
        };
        let window = target.window;
        let fullscreen = target.fullscreen;
        let active = self.workspaces.active();
        let visible = self.registry.count_in_workspace(active);

        if visible > 1 && !fullscreen {
            let border_width = self.focus.border_width();
            for client in self.registry.in_workspace(active) {
                display.set_border_width(client.window, border_width)?;
                display.set_border_color(client.window, self.focus.inactive_color())?;
            }
            display.set_border_width(window, border_width)?;
            display.set_border_color(window, self.focus.active_color())?;
        } else {
            display.set_border_width(window, 0)?;
        }

        self.registry.set_selection(window);
        display.set_input_focus(window)?;
        display.raise_window(window)?;
        debug!("Focused window 0x{:x}", window);
        Ok(())
    }

    /// Focus the next client of the active workspace in registry order
    pub fn focus_next(&mut self, display: &impl DisplayServer) -> Result<()> {
        let next = self.registry.selected().and_then(|w| self.registry.next_of(w));
        self.focus_window(display, next)
    }

    /// Focus the previous client of the active workspace in registry order
    pub fn focus_prev(&mut self, display: &impl DisplayServer) -> Result<()> {
        let prev = self.registry.selected().and_then(|w| self.registry.prev_of(w));
        self.focus_window(display, prev)
    }
}
