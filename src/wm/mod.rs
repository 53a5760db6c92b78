//! Window Manager Module
//!
//! The window-management core: client registry, master/stack layout,
//! workspaces, focus policy and drag reordering, driven by [`WmEvent`]s.
//! All protocol traffic goes through a [`DisplayServer`].

pub mod client;
pub mod display;
pub mod drag;
pub mod error;
pub mod events;
pub mod focus;
pub mod geometry;
pub mod keyboard;
pub mod layout;
pub mod registry;
pub mod spawn;
pub mod workspace;

#[cfg(test)]
pub mod testing;

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::Window;

use crate::config::Config;
use crate::wm::display::DisplayServer;
use crate::wm::drag::DragController;
use crate::wm::error::{Rejection, WmError, log_rejection};
use crate::wm::focus::FocusController;
use crate::wm::geometry::{Geometry, GeometryValidator, ScreenSize};
use crate::wm::keyboard::{KeyBinding, resolve_bindings};
use crate::wm::layout::LayoutEngine;
use crate::wm::registry::ClientRegistry;
use crate::wm::spawn::Spawner;
use crate::wm::workspace::{WorkspaceId, WorkspaceManager};

pub use events::WmEvent;

/// Request from the core to the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Reload configuration and re-register key grabs
    Reload,
    /// Tear down and leave the event loop
    Quit,
}

/// Whole window-manager state, owned by the event loop
pub struct WindowManager {
    pub(crate) screen: ScreenSize,
    pub(crate) validator: GeometryValidator,
    pub(crate) registry: ClientRegistry,
    pub(crate) workspaces: WorkspaceManager,
    pub(crate) layout: LayoutEngine,
    pub(crate) focus: FocusController,
    pub(crate) drag: DragController,
    pub(crate) bindings: Vec<KeyBinding>,
    pub(crate) spawner: Spawner,
    control: Option<Control>,
}

impl WindowManager {
    /// Build the core once the screen geometry is known
    pub fn new(config: &Config, screen: ScreenSize) -> Result<Self> {
        let wm_config = &config.window_manager;
        let bindings = resolve_bindings(&config.keybindings)?;
        info!(
            "Window manager: {}x{}, {} bindings, {} windows per workspace",
            screen.width,
            screen.height,
            bindings.len(),
            wm_config.max_windows
        );

        Ok(Self {
            screen,
            validator: GeometryValidator::new(
                screen,
                wm_config.min_window_size,
                wm_config.border_width,
            ),
            registry: ClientRegistry::new(wm_config.max_windows),
            workspaces: WorkspaceManager::new(config.indicator.clone()),
            layout: LayoutEngine::new(wm_config),
            focus: FocusController::new(wm_config.border_width, &config.colors),
            drag: DragController::new(config.input.drag_modifier()?, wm_config.border_width),
            bindings,
            spawner: Spawner::new(),
            control: None,
        })
    }

    /// Register key grabs and adopt windows that already exist
    pub fn start(&mut self, display: &impl DisplayServer) -> Result<()> {
        display.grab_keys(&self.bindings)?;
        self.scan(display)?;
        display.flush()
    }

    /// Manage pre-existing top-level windows through the same validated path
    /// as map requests
    pub fn scan(&mut self, display: &impl DisplayServer) -> Result<()> {
        let windows = display.top_level_windows()?;
        info!("Scanning {} existing windows", windows.len());

        for window in windows {
            let Some(info) = display.window_info(window)? else {
                continue;
            };
            if info.override_redirect || !info.viewable {
                debug!("Skipping window 0x{:x} during scan", window);
                continue;
            }
            self.manage(display, window, info.geometry)?;
        }
        if self.registry.is_empty() {
            debug!("No existing windows adopted");
        }
        Ok(())
    }

    /// Validate and register a window on the active workspace, then map it.
    /// Rejections are logged; the window stays unmanaged and unmapped.
    pub(crate) fn manage(
        &mut self,
        display: &impl DisplayServer,
        window: Window,
        geometry: Geometry,
    ) -> Result<()> {
        let active = self.workspaces.active();
        let checked = self
            .validator
            .check_size(geometry.width as i32, geometry.height as i32)
            .and_then(|_| self.validator.check_position(geometry.x, geometry.y))
            .and_then(|_| self.registry.check_room(active));
        if log_rejection(checked, "map request").is_none() {
            return Ok(());
        }

        let Some(client) = log_rejection(self.registry.insert(window, active), "map request")
        else {
            return Ok(());
        };
        debug!("Managing window 0x{:x} on workspace {}", client.window, active);
        if let Some(client) = self.registry.get_mut(window) {
            client.saved = geometry;
        }

        display.prepare_client(
            window,
            self.focus.border_width(),
            self.focus.inactive_color(),
            self.drag.modifier(),
        )?;
        display.map_window(window)?;

        // Keep an existing fullscreen client on top
        if let Some(fullscreen) = self.registry.find_fullscreen_in_workspace(active) {
            display.raise_window(fullscreen.window)?;
        }

        self.arrange(display)?;
        self.focus_window(display, self.registry.selected())
    }

    /// Ask the event loop to reload or quit
    pub(crate) fn request(&mut self, control: Control) {
        debug!("Control requested: {:?}", control);
        self.control = Some(control);
    }

    /// Pending reload/quit request, if any
    pub fn take_control(&mut self) -> Option<Control> {
        self.control.take()
    }

    /// Swap in a freshly loaded configuration without losing any client.
    /// All key and button grabs are released and reacquired from the new
    /// settings. A `max_windows` below the current occupancy of a workspace
    /// is refused before anything changes.
    pub fn reload(&mut self, display: &impl DisplayServer, config: &Config) -> Result<()> {
        let bindings = resolve_bindings(&config.keybindings)?;
        let drag_modifier = config.input.drag_modifier()?;
        let wm_config = &config.window_manager;
        self.registry
            .check_capacity(wm_config.max_windows)
            .map_err(WmError::Rejected)?;

        if self.abort_drag(display, None)? {
            debug!("Drag aborted by reload");
        }

        display.ungrab_keys()?;
        self.bindings = bindings;
        display.grab_keys(&self.bindings)?;
        for client in self.registry.iter() {
            display.ungrab_drag_button(client.window)?;
            display.grab_drag_button(client.window, drag_modifier)?;
        }

        self.validator =
            GeometryValidator::new(self.screen, wm_config.min_window_size, wm_config.border_width);
        self.registry.set_capacity(wm_config.max_windows);
        self.layout.reconfigure(wm_config);
        self.focus = FocusController::new(wm_config.border_width, &config.colors);
        self.drag = DragController::new(drag_modifier, wm_config.border_width);
        self.workspaces.set_indicator(config.indicator.clone());

        info!(
            "Reloaded configuration: {} bindings, master factor {:.2}",
            self.bindings.len(),
            self.layout.master_factor()
        );
        self.arrange(display)?;
        let target = self.resolve_focus_target();
        self.focus_window(display, target)
    }

    /// Release every grab and unmap every client
    pub fn teardown(&mut self, display: &impl DisplayServer) -> Result<()> {
        if self.drag.is_active() {
            self.drag.cancel();
            display.ungrab_pointer()?;
        }
        info!("Releasing {} clients", self.registry.len());
        for client in self.registry.drain() {
            if let Err(e) = display.unmap_window(client.window) {
                warn!("Failed to unmap window 0x{:x}: {}", client.window, e);
            }
        }
        display.ungrab_keys()?;
        display.flush()?;
        info!("Window manager state torn down");
        Ok(())
    }

    /// Selection if it is on the active workspace, else the workspace head
    pub(crate) fn resolve_focus_target(&self) -> Option<Window> {
        let active = self.workspaces.active();
        self.registry
            .selected_client()
            .filter(|c| c.workspace == active)
            .or_else(|| self.registry.in_workspace(active).next())
            .map(|c| c.window)
    }

    pub fn active_workspace(&self) -> WorkspaceId {
        self.workspaces.active()
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Workspace index from a binding argument
    pub(crate) fn workspace_arg(n: u8) -> Result<WorkspaceId, Rejection> {
        WorkspaceId::new(n as i64).ok_or(Rejection::WorkspaceOutOfRange(n as i64))
    }
}
