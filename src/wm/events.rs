//! Events Module
//!
//! The core's event vocabulary and the dispatcher that routes each event,
//! and each fired key action, to its handler.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{ButtonIndex, Keysym, StackMode, Window};

use crate::wm::display::DisplayServer;
use crate::wm::error::log_rejection;
use crate::wm::geometry::Geometry;
use crate::wm::keyboard::{Action, matching_actions};
use crate::wm::{Control, WindowManager};

/// Forwarded fields of a client's ConfigureRequest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureRequest {
    pub window: Window,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub value_mask: u16,
    pub sibling: Option<Window>,
    pub stack_mode: Option<StackMode>,
}

/// Events the window-management core reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmEvent {
    MapRequest {
        window: Window,
    },
    DestroyNotify {
        window: Window,
    },
    ConfigureRequest(ConfigureRequest),
    /// Pointer entered a window; `normal` is false for grab-related and
    /// inferior crossings
    EnterNotify {
        window: Window,
        normal: bool,
    },
    KeyPress {
        keysym: Keysym,
        state: u16,
    },
    ButtonPress {
        window: Window,
        button: u8,
        state: u16,
        root_x: i32,
        root_y: i32,
    },
    ButtonRelease {
        button: u8,
        root_x: i32,
        root_y: i32,
    },
    MotionNotify {
        root_x: i32,
        root_y: i32,
    },
    /// A pointer grab ended
    PointerUngrabbed,
    /// Keyboard mapping changed; keycodes of the grabs are stale
    KeymapChanged,
    /// Asynchronous protocol error
    ProtocolError {
        error_code: u8,
        major_opcode: u8,
        bad_value: u32,
    },
}

/// Result of event handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    /// Event was handled
    Handled,
    /// Event did not concern the core
    Ignored,
}

impl WindowManager {
    /// Route one event to its handler
    pub fn handle_event(&mut self, display: &impl DisplayServer, event: WmEvent) -> Result<EventResult> {
        debug!("Event: {:?}", event);
        match event {
            WmEvent::MapRequest { window } => self.on_map_request(display, window),
            WmEvent::DestroyNotify { window } => self.on_destroy_notify(display, window),
            WmEvent::ConfigureRequest(request) => self.on_configure_request(display, &request),
            WmEvent::EnterNotify { window, normal } => self.on_enter_notify(display, window, normal),
            WmEvent::KeyPress { keysym, state } => {
                let actions = matching_actions(&self.bindings, keysym, state);
                if actions.is_empty() {
                    return Ok(EventResult::Ignored);
                }
                for action in actions {
                    self.run_action(display, action)?;
                }
                Ok(EventResult::Handled)
            }
            WmEvent::ButtonPress {
                window,
                button,
                state,
                root_x,
                root_y,
            } => {
                self.begin_drag(display, window, button, state, root_x, root_y)?;
                Ok(EventResult::Handled)
            }
            WmEvent::ButtonRelease {
                button,
                root_x,
                root_y,
            } => {
                if button != u8::from(ButtonIndex::M1) || !self.drag.is_active() {
                    return Ok(EventResult::Ignored);
                }
                self.end_drag(display, root_x, root_y)?;
                Ok(EventResult::Handled)
            }
            WmEvent::MotionNotify { root_x, root_y } => {
                self.drag_motion(display, root_x, root_y)?;
                Ok(EventResult::Handled)
            }
            WmEvent::PointerUngrabbed => {
                if !self.abort_drag(display, None)? {
                    return Ok(EventResult::Ignored);
                }
                self.arrange(display)?;
                Ok(EventResult::Handled)
            }
            WmEvent::KeymapChanged => {
                display.ungrab_keys()?;
                display.grab_keys(&self.bindings)?;
                Ok(EventResult::Handled)
            }
            WmEvent::ProtocolError {
                error_code,
                major_opcode,
                bad_value,
            } => {
                warn!(
                    "X11 error: code {}, request {}, resource 0x{:x}",
                    error_code, major_opcode, bad_value
                );
                Ok(EventResult::Handled)
            }
        }
    }

    fn on_map_request(&mut self, display: &impl DisplayServer, window: Window) -> Result<EventResult> {
        let Some(info) = display.window_info(window)? else {
            return Ok(EventResult::Ignored);
        };
        if info.override_redirect {
            return Ok(EventResult::Ignored);
        }
        if self.registry.contains(window) {
            // Only clients of the active workspace are shown
            let visible = self
                .registry
                .get(window)
                .is_some_and(|c| c.workspace == self.workspaces.active());
            if visible {
                display.map_window(window)?;
            }
            return Ok(EventResult::Handled);
        }
        self.manage(display, window, info.geometry)?;
        Ok(EventResult::Handled)
    }

    /// The only path that removes a client
    fn on_destroy_notify(&mut self, display: &impl DisplayServer, window: Window) -> Result<EventResult> {
        if !self.registry.contains(window) {
            return Ok(EventResult::Ignored);
        }
        self.abort_drag(display, Some(window))?;
        self.registry.remove(window);
        info!("Window 0x{:x} destroyed", window);

        self.arrange(display)?;
        let active = self.workspaces.active();
        let selected = self
            .registry
            .selected_client()
            .filter(|c| c.workspace == active)
            .map(|c| c.window);
        self.focus_window(display, selected)?;
        Ok(EventResult::Handled)
    }

    fn on_configure_request(
        &mut self,
        display: &impl DisplayServer,
        request: &ConfigureRequest,
    ) -> Result<EventResult> {
        let checked = self
            .validator
            .check_size(request.width, request.height)
            .and_then(|_| self.validator.check_position(request.x, request.y));
        if log_rejection(checked, "configure request").is_none() {
            return Ok(EventResult::Ignored);
        }

        display.configure_window(request, self.focus.border_width())?;

        let Some(client) = self.registry.get_mut(request.window) else {
            return Ok(EventResult::Handled);
        };
        if client.floating && !client.fullscreen {
            client.saved = Geometry::new(
                request.x,
                request.y,
                request.width as u32,
                request.height as u32,
            );
        }
        if client.workspace == self.workspaces.active() {
            self.arrange(display)?;
        }
        Ok(EventResult::Handled)
    }

    fn on_enter_notify(
        &mut self,
        display: &impl DisplayServer,
        window: Window,
        normal: bool,
    ) -> Result<EventResult> {
        if !normal || self.drag.is_active() || self.registry.selected() == Some(window) {
            return Ok(EventResult::Ignored);
        }
        let active = self.workspaces.active();
        if !self.registry.get(window).is_some_and(|c| c.workspace == active) {
            return Ok(EventResult::Ignored);
        }
        self.focus_window(display, Some(window))?;
        Ok(EventResult::Handled)
    }

    /// Execute one key action
    pub fn run_action(&mut self, display: &impl DisplayServer, action: Action) -> Result<()> {
        debug!("Action: {:?}", action);
        match action {
            Action::Spawn { argv } => {
                if let Err(e) = self.spawner.spawn(&argv) {
                    warn!("Spawn failed: {:#}", e);
                }
                Ok(())
            }
            Action::Reload => {
                self.request(Control::Reload);
                Ok(())
            }
            Action::Quit => {
                self.request(Control::Quit);
                Ok(())
            }
            Action::FocusNext => self.focus_next(display),
            Action::FocusPrev => self.focus_prev(display),
            Action::ToggleFullscreen => self.toggle_fullscreen(display),
            Action::ToggleFloating => self.toggle_floating(display),
            Action::KillClient => self.kill_client(display),
            Action::SetMasterFactor { delta } => self.set_master_factor(display, delta),
            Action::SwapMaster => self.swap_master(display),
            Action::SwitchWorkspace { workspace } => self.switch_workspace(display, workspace),
            Action::SendToWorkspace { workspace } => self.send_to_workspace(display, workspace),
            Action::ClearWorkspace { workspace } => self.clear_workspace(display, workspace),
            Action::ShowWorkspace => {
                self.show_workspace_indicator();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::keyboard::keysyms::XK_RETURN;
    use crate::wm::testing::{RecordingDisplay, Request, test_wm};
    use crate::wm::workspace::WorkspaceId;
    use x11rb::protocol::xproto::{ConfigWindow, ModMask};

    const SUPER: u16 = 1 << 6;

    fn map(wm: &mut WindowManager, display: &RecordingDisplay, window: Window) -> EventResult {
        display.add_window(window, Geometry::new(10, 10, 640, 480));
        wm.handle_event(display, WmEvent::MapRequest { window }).unwrap()
    }

    fn key(keysym: Keysym, state: u16) -> WmEvent {
        WmEvent::KeyPress { keysym, state }
    }

    #[test]
    fn test_first_map_gets_full_screen() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);

        assert_eq!(map(&mut wm, &display, 1), EventResult::Handled);
        assert_eq!(wm.registry.len(), 1);
        assert_eq!(wm.registry.selected(), Some(1));
        assert!(display.is_mapped(1));
        assert_eq!(display.geometry_of(1), Some(Geometry::new(0, 0, 1920, 1080)));
        assert_eq!(display.border_of(1), Some(0));
    }

    #[test]
    fn test_second_map_tiles_newest_as_master() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        map(&mut wm, &display, 1);
        map(&mut wm, &display, 2);

        assert_eq!(wm.registry.len(), 2);
        assert_eq!(display.geometry_of(2), Some(Geometry::new(5, 5, 846, 1060)));
        assert_eq!(display.geometry_of(1), Some(Geometry::new(866, 5, 1038, 1060)));
    }

    #[test]
    fn test_tiny_window_rejected() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        display.add_window(1, Geometry::new(0, 0, 10, 10));
        wm.handle_event(&display, WmEvent::MapRequest { window: 1 })
            .unwrap();
        assert!(wm.registry.is_empty());
        assert!(!display.is_mapped(1));
        assert!(display.requests().is_empty());
    }

    #[test]
    fn test_capacity_rejection_leaves_window_unmapped() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        for window in 1..=5 {
            map(&mut wm, &display, window);
        }
        map(&mut wm, &display, 6);
        assert_eq!(wm.registry.count_in_workspace(WorkspaceId::FIRST), 5);
        assert!(!wm.registry.contains(6));
        assert!(!display.is_mapped(6));
    }

    #[test]
    fn test_override_redirect_ignored() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        display.add_override_redirect(9, Geometry::new(0, 0, 200, 200));
        let result = wm
            .handle_event(&display, WmEvent::MapRequest { window: 9 })
            .unwrap();
        assert_eq!(result, EventResult::Ignored);
        assert!(wm.registry.is_empty());
    }

    #[test]
    fn test_duplicate_map_does_not_duplicate_client() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        map(&mut wm, &display, 1);
        map(&mut wm, &display, 1);
        assert_eq!(wm.registry.len(), 1);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        map(&mut wm, &display, 1);
        map(&mut wm, &display, 2);

        let destroy = WmEvent::DestroyNotify { window: 2 };
        assert_eq!(wm.handle_event(&display, destroy).unwrap(), EventResult::Handled);
        assert_eq!(wm.registry.selected(), Some(1));
        assert_eq!(display.focused(), Some(1));
        assert_eq!(display.geometry_of(1), Some(Geometry::new(0, 0, 1920, 1080)));

        display.clear();
        assert_eq!(wm.handle_event(&display, destroy).unwrap(), EventResult::Ignored);
        assert!(display.requests().is_empty());
    }

    #[test]
    fn test_configure_request_forces_border() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        let request = ConfigureRequest {
            window: 42,
            x: 100,
            y: 100,
            width: 300,
            height: 200,
            value_mask: u16::from(ConfigWindow::X | ConfigWindow::Y | ConfigWindow::WIDTH | ConfigWindow::HEIGHT),
            sibling: None,
            stack_mode: None,
        };
        wm.handle_event(&display, WmEvent::ConfigureRequest(request))
            .unwrap();
        assert_eq!(display.requests(), vec![Request::Configure(request, 5)]);

        display.clear();
        let bad = ConfigureRequest {
            width: 5000,
            ..request
        };
        let result = wm
            .handle_event(&display, WmEvent::ConfigureRequest(bad))
            .unwrap();
        assert_eq!(result, EventResult::Ignored);
        assert!(display.requests().is_empty());
    }

    #[test]
    fn test_configure_request_of_tiled_client_is_reasserted() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        map(&mut wm, &display, 1);
        let request = ConfigureRequest {
            window: 1,
            x: 50,
            y: 50,
            width: 300,
            height: 200,
            value_mask: u16::from(ConfigWindow::WIDTH | ConfigWindow::HEIGHT),
            sibling: None,
            stack_mode: None,
        };
        wm.handle_event(&display, WmEvent::ConfigureRequest(request))
            .unwrap();
        assert_eq!(display.geometry_of(1), Some(Geometry::new(0, 0, 1920, 1080)));
    }

    #[test]
    fn test_enter_focuses_only_in_normal_mode() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        map(&mut wm, &display, 1);
        map(&mut wm, &display, 2);

        wm.handle_event(&display, WmEvent::EnterNotify { window: 1, normal: false })
            .unwrap();
        assert_eq!(wm.registry.selected(), Some(2));

        wm.handle_event(&display, WmEvent::EnterNotify { window: 1, normal: true })
            .unwrap();
        assert_eq!(wm.registry.selected(), Some(1));
        assert_eq!(display.focused(), Some(1));
    }

    #[test]
    fn test_key_press_fires_every_match() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        wm.bindings = vec![
            crate::wm::keyboard::KeyBinding {
                modifiers: ModMask::M4,
                keysym: XK_RETURN,
                action: Action::SwitchWorkspace { workspace: 3 },
            },
            crate::wm::keyboard::KeyBinding {
                modifiers: ModMask::M4,
                keysym: XK_RETURN,
                action: Action::Quit,
            },
        ];

        // NumLock held
        let result = wm
            .handle_event(&display, key(XK_RETURN, SUPER | u16::from(ModMask::M2)))
            .unwrap();
        assert_eq!(result, EventResult::Handled);
        assert_eq!(wm.active_workspace().get(), 3);
        assert_eq!(wm.take_control(), Some(Control::Quit));
        assert_eq!(wm.take_control(), None);

        let result = wm.handle_event(&display, key(XK_RETURN, 0)).unwrap();
        assert_eq!(result, EventResult::Ignored);
    }

    #[test]
    fn test_default_bindings_switch_workspace() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        // super+2
        wm.handle_event(&display, key(0x32, SUPER)).unwrap();
        assert_eq!(wm.active_workspace().get(), 2);
    }

    #[test]
    fn test_keymap_change_regrabs() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        wm.handle_event(&display, WmEvent::KeymapChanged).unwrap();
        assert_eq!(
            display.requests(),
            vec![Request::UngrabKeys, Request::GrabKeys(wm.bindings.len())]
        );
    }

    #[test]
    fn test_protocol_error_is_not_fatal() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        let result = wm.handle_event(
            &display,
            WmEvent::ProtocolError {
                error_code: 3,
                major_opcode: 12,
                bad_value: 0x1234,
            },
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_spawn_rejection_is_not_fatal() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        let action = Action::Spawn {
            argv: vec!["sh".to_string(), "-c".to_string(), "rm -rf ~;".to_string()],
        };
        assert!(wm.run_action(&display, action).is_ok());
    }
}
