//! Display Module
//!
//! The seam between the window-management core and the X server. The core
//! only ever talks to a [`DisplayServer`]; [`X11Display`] implements it over
//! an x11rb connection and translates raw protocol events into [`WmEvent`]s.

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::ErrorKind;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::wm::error::WmError;
use crate::wm::events::{ConfigureRequest, WmEvent};
use crate::wm::geometry::{Geometry, ScreenSize};
use crate::wm::keyboard::{KeyBinding, Keymap, lock_variants};

/// What the core needs to know about a window before managing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowInfo {
    pub geometry: Geometry,
    pub override_redirect: bool,
    pub viewable: bool,
}

/// Requests the window-management core issues to the display server
pub trait DisplayServer {
    /// Attributes and geometry of a window, `None` if it no longer exists
    fn window_info(&self, window: Window) -> Result<Option<WindowInfo>>;

    /// Top-level children of the root window, bottom to top
    fn top_level_windows(&self) -> Result<Vec<Window>>;

    /// Subscribe to a new client's events, set its border and install the
    /// modifier+button grab used for drag reordering
    fn prepare_client(
        &self,
        window: Window,
        border_width: u32,
        border_color: u32,
        drag_modifier: ModMask,
    ) -> Result<()>;

    /// Modifier+Button1 grab that starts a drag on `window`
    fn grab_drag_button(&self, window: Window, drag_modifier: ModMask) -> Result<()>;
    fn ungrab_drag_button(&self, window: Window) -> Result<()>;

    fn map_window(&self, window: Window) -> Result<()>;
    fn unmap_window(&self, window: Window) -> Result<()>;
    fn move_resize(&self, window: Window, geometry: Geometry) -> Result<()>;
    fn move_window(&self, window: Window, x: i32, y: i32) -> Result<()>;
    fn set_border_width(&self, window: Window, width: u32) -> Result<()>;
    fn set_border_color(&self, window: Window, color: u32) -> Result<()>;
    fn raise_window(&self, window: Window) -> Result<()>;
    fn set_input_focus(&self, window: Window) -> Result<()>;

    /// Forced close; the server destroys the client's resources
    fn kill_client(&self, window: Window) -> Result<()>;

    /// Forward a client's configure request with the border forced
    fn configure_window(&self, request: &ConfigureRequest, border_width: u32) -> Result<()>;

    /// Capture the pointer on the root window; `false` if the grab failed
    fn grab_pointer(&self) -> Result<bool>;
    fn ungrab_pointer(&self) -> Result<()>;

    fn grab_keys(&self, bindings: &[KeyBinding]) -> Result<()>;
    fn ungrab_keys(&self) -> Result<()>;

    fn flush(&self) -> Result<()>;
}

/// x11rb-backed display server
pub struct X11Display {
    conn: Arc<RustConnection>,
    root: Window,
    screen: ScreenSize,
    keymap: RefCell<Keymap>,
}

impl X11Display {
    /// Take over window management of `screen_num`.
    ///
    /// Selecting `SubstructureRedirect` on the root only succeeds for one
    /// client at a time, so a `BadAccess` reply means another window manager
    /// is already running.
    pub fn new(conn: Arc<RustConnection>, screen_num: usize) -> Result<Self> {
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let size = ScreenSize::new(
            screen.width_in_pixels as u32,
            screen.height_in_pixels as u32,
        );
        info!("Screen {}: root 0x{:x}, {}x{}", screen_num, root, size.width, size.height);

        let mask = EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY;
        let result = conn
            .change_window_attributes(root, &ChangeWindowAttributesAux::new().event_mask(mask))?
            .check();
        match result {
            Ok(()) => {}
            Err(ReplyError::X11Error(e)) if e.error_kind == ErrorKind::Access => {
                return Err(WmError::AnotherWmRunning.into());
            }
            Err(e) => return Err(e).context("Failed to select root window events"),
        }

        let display = Self {
            conn,
            root,
            screen: size,
            keymap: RefCell::new(Keymap::default()),
        };
        display.refresh_keymap()?;
        Ok(display)
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }

    pub fn root(&self) -> Window {
        self.root
    }

    /// Re-read the keyboard mapping from the server
    pub fn refresh_keymap(&self) -> Result<()> {
        let setup = self.conn.setup();
        let min_keycode = setup.min_keycode;
        let max_keycode = setup.max_keycode;
        let reply = self
            .conn
            .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)?
            .reply()
            .context("Failed to read keyboard mapping")?;
        debug!(
            "Keyboard mapping: keycodes {}..={}, {} keysyms per keycode",
            min_keycode, max_keycode, reply.keysyms_per_keycode
        );
        *self.keymap.borrow_mut() =
            Keymap::new(min_keycode, reply.keysyms_per_keycode, reply.keysyms);
        Ok(())
    }

    /// Translate a protocol event into the core's event vocabulary.
    /// Events the core does not handle map to `None`.
    pub fn translate(&self, event: &Event) -> Option<WmEvent> {
        let translated = match event {
            Event::MapRequest(e) => WmEvent::MapRequest { window: e.window },
            Event::DestroyNotify(e) => WmEvent::DestroyNotify { window: e.window },
            Event::ConfigureRequest(e) => WmEvent::ConfigureRequest(ConfigureRequest {
                window: e.window,
                x: e.x as i32,
                y: e.y as i32,
                width: e.width as i32,
                height: e.height as i32,
                value_mask: u16::from(e.value_mask),
                sibling: e
                    .value_mask
                    .contains(ConfigWindow::SIBLING)
                    .then_some(e.sibling),
                stack_mode: e
                    .value_mask
                    .contains(ConfigWindow::STACK_MODE)
                    .then_some(e.stack_mode),
            }),
            Event::EnterNotify(e) if e.mode == NotifyMode::UNGRAB => WmEvent::PointerUngrabbed,
            Event::LeaveNotify(e) if e.mode == NotifyMode::UNGRAB => WmEvent::PointerUngrabbed,
            Event::EnterNotify(e) => WmEvent::EnterNotify {
                window: e.event,
                normal: e.mode == NotifyMode::NORMAL && e.detail != NotifyDetail::INFERIOR,
            },
            Event::KeyPress(e) => {
                let keysym = self.keymap.borrow().keysym(e.detail)?;
                WmEvent::KeyPress {
                    keysym,
                    state: u16::from(e.state),
                }
            }
            Event::ButtonPress(e) => WmEvent::ButtonPress {
                window: e.event,
                button: e.detail,
                state: u16::from(e.state),
                root_x: e.root_x as i32,
                root_y: e.root_y as i32,
            },
            Event::ButtonRelease(e) => WmEvent::ButtonRelease {
                button: e.detail,
                root_x: e.root_x as i32,
                root_y: e.root_y as i32,
            },
            Event::MotionNotify(e) => WmEvent::MotionNotify {
                root_x: e.root_x as i32,
                root_y: e.root_y as i32,
            },
            Event::MappingNotify(e) if e.request != Mapping::POINTER => {
                if let Err(err) = self.refresh_keymap() {
                    warn!("Failed to refresh keyboard mapping: {}", err);
                }
                WmEvent::KeymapChanged
            }
            Event::Error(e) => WmEvent::ProtocolError {
                error_code: e.error_code,
                major_opcode: e.major_opcode,
                bad_value: e.bad_value,
            },
            _ => return None,
        };
        Some(translated)
    }
}

impl DisplayServer for X11Display {
    fn window_info(&self, window: Window) -> Result<Option<WindowInfo>> {
        let attrs = match self.conn.get_window_attributes(window)?.reply() {
            Ok(attrs) => attrs,
            Err(ReplyError::X11Error(e)) => {
                debug!("get_window_attributes(0x{:x}) failed: {:?}", window, e.error_kind);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let geometry = match self.conn.get_geometry(window)?.reply() {
            Ok(geometry) => geometry,
            Err(ReplyError::X11Error(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(WindowInfo {
            geometry: Geometry::new(
                geometry.x as i32,
                geometry.y as i32,
                geometry.width as u32,
                geometry.height as u32,
            ),
            override_redirect: attrs.override_redirect,
            viewable: attrs.map_state == MapState::VIEWABLE,
        }))
    }

    fn top_level_windows(&self) -> Result<Vec<Window>> {
        let tree = self
            .conn
            .query_tree(self.root)?
            .reply()
            .context("Failed to query root window tree")?;
        Ok(tree.children)
    }

    fn prepare_client(
        &self,
        window: Window,
        border_width: u32,
        border_color: u32,
        drag_modifier: ModMask,
    ) -> Result<()> {
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new()
                .event_mask(EventMask::ENTER_WINDOW | EventMask::STRUCTURE_NOTIFY)
                .border_pixel(border_color),
        )?;
        self.set_border_width(window, border_width)?;
        self.grab_drag_button(window, drag_modifier)
    }

    fn grab_drag_button(&self, window: Window, drag_modifier: ModMask) -> Result<()> {
        for extra in lock_variants() {
            self.conn.grab_button(
                true,
                window,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                ButtonIndex::M1,
                drag_modifier | ModMask::from(extra),
            )?;
        }
        Ok(())
    }

    fn ungrab_drag_button(&self, window: Window) -> Result<()> {
        self.conn
            .ungrab_button(ButtonIndex::M1, window, ModMask::ANY)?;
        Ok(())
    }

    fn map_window(&self, window: Window) -> Result<()> {
        self.conn.map_window(window)?;
        Ok(())
    }

    fn unmap_window(&self, window: Window) -> Result<()> {
        self.conn.unmap_window(window)?;
        Ok(())
    }

    fn move_resize(&self, window: Window, geometry: Geometry) -> Result<()> {
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(geometry.x)
                .y(geometry.y)
                .width(geometry.width)
                .height(geometry.height),
        )?;
        Ok(())
    }

    fn move_window(&self, window: Window, x: i32, y: i32) -> Result<()> {
        self.conn
            .configure_window(window, &ConfigureWindowAux::new().x(x).y(y))?;
        Ok(())
    }

    fn set_border_width(&self, window: Window, width: u32) -> Result<()> {
        self.conn
            .configure_window(window, &ConfigureWindowAux::new().border_width(width))?;
        Ok(())
    }

    fn set_border_color(&self, window: Window, color: u32) -> Result<()> {
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().border_pixel(color),
        )?;
        Ok(())
    }

    fn raise_window(&self, window: Window) -> Result<()> {
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
        )?;
        Ok(())
    }

    fn set_input_focus(&self, window: Window) -> Result<()> {
        self.conn
            .set_input_focus(InputFocus::PARENT, window, x11rb::CURRENT_TIME)?;
        Ok(())
    }

    fn kill_client(&self, window: Window) -> Result<()> {
        self.conn.kill_client(window)?;
        Ok(())
    }

    fn configure_window(&self, request: &ConfigureRequest, border_width: u32) -> Result<()> {
        let mask = ConfigWindow::from(request.value_mask);
        let mut aux = ConfigureWindowAux::new().border_width(border_width);
        if mask.contains(ConfigWindow::X) {
            aux = aux.x(request.x);
        }
        if mask.contains(ConfigWindow::Y) {
            aux = aux.y(request.y);
        }
        if mask.contains(ConfigWindow::WIDTH) {
            aux = aux.width(request.width as u32);
        }
        if mask.contains(ConfigWindow::HEIGHT) {
            aux = aux.height(request.height as u32);
        }
        if let Some(sibling) = request.sibling {
            aux = aux.sibling(sibling);
        }
        if let Some(stack_mode) = request.stack_mode {
            aux = aux.stack_mode(stack_mode);
        }
        self.conn.configure_window(request.window, &aux)?;
        Ok(())
    }

    fn grab_pointer(&self) -> Result<bool> {
        let reply = self
            .conn
            .grab_pointer(
                true,
                self.root,
                EventMask::POINTER_MOTION | EventMask::BUTTON_RELEASE,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                self.root,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )?
            .reply()
            .context("Failed to grab pointer")?;
        Ok(reply.status == GrabStatus::SUCCESS)
    }

    fn ungrab_pointer(&self) -> Result<()> {
        self.conn.ungrab_pointer(x11rb::CURRENT_TIME)?;
        Ok(())
    }

    fn grab_keys(&self, bindings: &[KeyBinding]) -> Result<()> {
        let table = self.keymap.borrow().grab_table(bindings);
        let mut grabbed = 0;
        for binding in bindings {
            let Some(keycodes) = table.get(&binding.keysym) else {
                continue;
            };
            if keycodes.is_empty() {
                warn!("No keycode for keysym 0x{:x}, binding skipped", binding.keysym);
                continue;
            }
            for &keycode in keycodes {
                for extra in lock_variants() {
                    self.conn.grab_key(
                        true,
                        self.root,
                        binding.modifiers | ModMask::from(extra),
                        keycode,
                        GrabMode::ASYNC,
                        GrabMode::ASYNC,
                    )?;
                }
                grabbed += 1;
            }
        }
        info!("Grabbed {} key combinations for {} bindings", grabbed, bindings.len());
        Ok(())
    }

    fn ungrab_keys(&self) -> Result<()> {
        self.conn.ungrab_key(Grab::ANY, self.root, ModMask::ANY)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}
