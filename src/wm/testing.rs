//! In-memory display server for tests
//!
//! Records every request the core issues and keeps just enough window state
//! (geometry, border, mapping) to answer queries the way a server would.

use anyhow::Result;
use std::cell::RefCell;
use std::collections::BTreeMap;
use x11rb::protocol::xproto::{ConfigWindow, ModMask, Window};

use crate::config::Config;
use crate::wm::WindowManager;
use crate::wm::display::{DisplayServer, WindowInfo};
use crate::wm::events::ConfigureRequest;
use crate::wm::geometry::{Geometry, ScreenSize};
use crate::wm::keyboard::KeyBinding;

/// A request as seen by the fake server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Prepare(Window, u32, u32),
    Map(Window),
    Unmap(Window),
    MoveResize(Window, Geometry),
    Move(Window, i32, i32),
    BorderWidth(Window, u32),
    BorderColor(Window, u32),
    Raise(Window),
    Focus(Window),
    Kill(Window),
    Configure(ConfigureRequest, u32),
    GrabButton(Window, u16),
    UngrabButton(Window),
    GrabPointer,
    UngrabPointer,
    GrabKeys(usize),
    UngrabKeys,
}

#[derive(Debug, Clone)]
struct FakeWindow {
    geometry: Geometry,
    border: Option<u32>,
    color: Option<u32>,
    mapped: bool,
    override_redirect: bool,
}

#[derive(Debug, Default)]
struct State {
    windows: BTreeMap<Window, FakeWindow>,
    stacking: Vec<Window>,
    requests: Vec<Request>,
    focused: Option<Window>,
    grab_refused: bool,
}

#[derive(Default)]
pub struct RecordingDisplay {
    state: RefCell<State>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, window: Window, geometry: Geometry, mapped: bool, override_redirect: bool) {
        let mut state = self.state.borrow_mut();
        state.windows.insert(
            window,
            FakeWindow {
                geometry,
                border: None,
                color: None,
                mapped,
                override_redirect,
            },
        );
        if !state.stacking.contains(&window) {
            state.stacking.push(window);
        }
    }

    /// A freshly created, unmapped window
    pub fn add_window(&self, window: Window, geometry: Geometry) {
        self.insert(window, geometry, false, false);
    }

    /// A window that was already mapped before the window manager started
    pub fn add_existing(&self, window: Window, geometry: Geometry) {
        self.insert(window, geometry, true, false);
    }

    pub fn add_override_redirect(&self, window: Window, geometry: Geometry) {
        self.insert(window, geometry, true, true);
    }

    pub fn set_grab_result(&self, granted: bool) {
        self.state.borrow_mut().grab_refused = !granted;
    }

    /// Forget recorded requests, keeping window state
    pub fn clear(&self) {
        self.state.borrow_mut().requests.clear();
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.borrow().requests.clone()
    }

    pub fn geometry_of(&self, window: Window) -> Option<Geometry> {
        self.state.borrow().windows.get(&window).map(|w| w.geometry)
    }

    pub fn border_of(&self, window: Window) -> Option<u32> {
        self.state.borrow().windows.get(&window).and_then(|w| w.border)
    }

    pub fn color_of(&self, window: Window) -> Option<u32> {
        self.state.borrow().windows.get(&window).and_then(|w| w.color)
    }

    pub fn is_mapped(&self, window: Window) -> bool {
        self.state
            .borrow()
            .windows
            .get(&window)
            .is_some_and(|w| w.mapped)
    }

    pub fn focused(&self) -> Option<Window> {
        self.state.borrow().focused
    }

    fn record(&self, request: Request) {
        self.state.borrow_mut().requests.push(request);
    }

    fn update(&self, window: Window, f: impl FnOnce(&mut FakeWindow)) {
        if let Some(w) = self.state.borrow_mut().windows.get_mut(&window) {
            f(w);
        }
    }
}

impl DisplayServer for RecordingDisplay {
    fn window_info(&self, window: Window) -> Result<Option<WindowInfo>> {
        Ok(self.state.borrow().windows.get(&window).map(|w| WindowInfo {
            geometry: w.geometry,
            override_redirect: w.override_redirect,
            viewable: w.mapped,
        }))
    }

    fn top_level_windows(&self) -> Result<Vec<Window>> {
        Ok(self.state.borrow().stacking.clone())
    }

    fn prepare_client(
        &self,
        window: Window,
        border_width: u32,
        border_color: u32,
        _drag_modifier: ModMask,
    ) -> Result<()> {
        self.record(Request::Prepare(window, border_width, border_color));
        self.update(window, |w| {
            w.border = Some(border_width);
            w.color = Some(border_color);
        });
        Ok(())
    }

    fn grab_drag_button(&self, window: Window, drag_modifier: ModMask) -> Result<()> {
        self.record(Request::GrabButton(window, u16::from(drag_modifier)));
        Ok(())
    }

    fn ungrab_drag_button(&self, window: Window) -> Result<()> {
        self.record(Request::UngrabButton(window));
        Ok(())
    }

    fn map_window(&self, window: Window) -> Result<()> {
        self.record(Request::Map(window));
        self.update(window, |w| w.mapped = true);
        Ok(())
    }

    fn unmap_window(&self, window: Window) -> Result<()> {
        self.record(Request::Unmap(window));
        self.update(window, |w| w.mapped = false);
        Ok(())
    }

    fn move_resize(&self, window: Window, geometry: Geometry) -> Result<()> {
        self.record(Request::MoveResize(window, geometry));
        self.update(window, |w| w.geometry = geometry);
        Ok(())
    }

    fn move_window(&self, window: Window, x: i32, y: i32) -> Result<()> {
        self.record(Request::Move(window, x, y));
        self.update(window, |w| {
            w.geometry.x = x;
            w.geometry.y = y;
        });
        Ok(())
    }

    fn set_border_width(&self, window: Window, width: u32) -> Result<()> {
        self.record(Request::BorderWidth(window, width));
        self.update(window, |w| w.border = Some(width));
        Ok(())
    }

    fn set_border_color(&self, window: Window, color: u32) -> Result<()> {
        self.record(Request::BorderColor(window, color));
        self.update(window, |w| w.color = Some(color));
        Ok(())
    }

    fn raise_window(&self, window: Window) -> Result<()> {
        self.record(Request::Raise(window));
        let mut state = self.state.borrow_mut();
        if let Some(pos) = state.stacking.iter().position(|&w| w == window) {
            state.stacking.remove(pos);
            state.stacking.push(window);
        }
        Ok(())
    }

    fn set_input_focus(&self, window: Window) -> Result<()> {
        self.record(Request::Focus(window));
        self.state.borrow_mut().focused = Some(window);
        Ok(())
    }

    fn kill_client(&self, window: Window) -> Result<()> {
        self.record(Request::Kill(window));
        Ok(())
    }

    fn configure_window(&self, request: &ConfigureRequest, border_width: u32) -> Result<()> {
        self.record(Request::Configure(*request, border_width));
        let mask = ConfigWindow::from(request.value_mask);
        self.update(request.window, |w| {
            if mask.contains(ConfigWindow::X) {
                w.geometry.x = request.x;
            }
            if mask.contains(ConfigWindow::Y) {
                w.geometry.y = request.y;
            }
            if mask.contains(ConfigWindow::WIDTH) {
                w.geometry.width = request.width as u32;
            }
            if mask.contains(ConfigWindow::HEIGHT) {
                w.geometry.height = request.height as u32;
            }
            w.border = Some(border_width);
        });
        Ok(())
    }

    fn grab_pointer(&self) -> Result<bool> {
        self.record(Request::GrabPointer);
        Ok(!self.state.borrow().grab_refused)
    }

    fn ungrab_pointer(&self) -> Result<()> {
        self.record(Request::UngrabPointer);
        Ok(())
    }

    fn grab_keys(&self, bindings: &[KeyBinding]) -> Result<()> {
        self.record(Request::GrabKeys(bindings.len()));
        Ok(())
    }

    fn ungrab_keys(&self) -> Result<()> {
        self.record(Request::UngrabKeys);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Window manager with default settings on a `width` x `height` screen
pub fn test_wm(width: u32, height: u32) -> WindowManager {
    WindowManager::new(&Config::default(), ScreenSize::new(width, height)).unwrap()
}
