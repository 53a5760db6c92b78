//! Layout Module
//!
//! Master/stack tiling with floating and fullscreen overrides. Planning is a
//! pure function of the registry, the active workspace and the master factor;
//! the resulting [`Arrangement`] is then replayed against the display server.

use anyhow::Result;
use tracing::{debug, warn};
use x11rb::protocol::xproto::Window;

use crate::config::WindowManagerConfig;
use crate::wm::WindowManager;
use crate::wm::display::DisplayServer;
use crate::wm::error::{Rejection, log_rejection};
use crate::wm::geometry::{Geometry, ScreenSize};
use crate::wm::registry::ClientRegistry;
use crate::wm::workspace::WorkspaceId;

/// One display request produced by the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutOp {
    BorderWidth(Window, u32),
    MoveResize(Window, Geometry),
    Raise(Window),
}

/// Ordered list of requests for one `arrange()` pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Arrangement {
    pub ops: Vec<LayoutOp>,
}

impl Arrangement {
    /// Final geometry assigned to `window` in this pass
    #[cfg(test)]
    pub fn geometry_of(&self, window: Window) -> Option<Geometry> {
        self.ops.iter().rev().find_map(|op| match op {
            LayoutOp::MoveResize(w, g) if *w == window => Some(*g),
            _ => None,
        })
    }

    #[cfg(test)]
    pub fn touches(&self, window: Window) -> bool {
        self.ops.iter().any(|op| match op {
            LayoutOp::BorderWidth(w, _) | LayoutOp::MoveResize(w, _) | LayoutOp::Raise(w) => {
                *w == window
            }
        })
    }

    /// Last placed window other than `skip` whose frame holds the point
    pub fn window_at(&self, x: i32, y: i32, border: u32, skip: Window) -> Option<Window> {
        self.ops.iter().rev().find_map(|op| match *op {
            LayoutOp::MoveResize(window, geometry)
                if window != skip && geometry.contains(x, y, border) =>
            {
                Some(window)
            }
            _ => None,
        })
    }

    fn push(&mut self, op: LayoutOp) {
        self.ops.push(op);
    }
}

/// Tiling parameters and the adjustable master factor
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    master_factor: f64,
    min_factor: f64,
    max_factor: f64,
    gap: u32,
    border: u32,
}

impl LayoutEngine {
    pub fn new(config: &WindowManagerConfig) -> Self {
        Self {
            master_factor: config.master_factor,
            min_factor: config.master_factor_min,
            max_factor: config.master_factor_max,
            gap: config.gap_width,
            border: config.border_width,
        }
    }

    /// Apply new constants; the current factor survives if still in bounds
    pub fn reconfigure(&mut self, config: &WindowManagerConfig) {
        let current = self.master_factor;
        *self = Self::new(config);
        if (self.min_factor..=self.max_factor).contains(&current) {
            self.master_factor = current;
        }
    }

    pub fn master_factor(&self) -> f64 {
        self.master_factor
    }

    /// Shift the master factor by `delta`; out-of-bounds results are refused
    /// and leave the factor untouched.
    pub fn adjust_master_factor(&mut self, delta: f64) -> Result<f64, Rejection> {
        let factor = self.master_factor + delta;
        // Tolerate float noise right at the bounds (0.45 - 0.35 == 0.1)
        const EPSILON: f64 = 1e-9;
        if !factor.is_finite()
            || factor < self.min_factor - EPSILON
            || factor > self.max_factor + EPSILON
        {
            return Err(Rejection::MasterFactorOutOfRange(factor));
        }
        self.master_factor = factor.clamp(self.min_factor, self.max_factor);
        Ok(self.master_factor)
    }

    /// Compute the arrangement of the active workspace
    pub fn plan(
        &self,
        registry: &ClientRegistry,
        active: WorkspaceId,
        screen: ScreenSize,
    ) -> Arrangement {
        let mut arrangement = Arrangement::default();
        let full = screen.rect();

        // A fullscreen client owns the screen; nothing else is touched.
        if let Some(fullscreen) = registry.find_fullscreen_in_workspace(active) {
            arrangement.push(LayoutOp::BorderWidth(fullscreen.window, 0));
            arrangement.push(LayoutOp::MoveResize(fullscreen.window, full));
            arrangement.push(LayoutOp::Raise(fullscreen.window));
            return arrangement;
        }

        let visible: Vec<_> = registry.in_workspace(active).collect();
        let tiled: Vec<Window> = visible
            .iter()
            .filter(|c| c.is_tiled())
            .map(|c| c.window)
            .collect();

        for client in visible.iter().filter(|c| c.floating) {
            if let Some(saved) = client.restore_geometry() {
                arrangement.push(LayoutOp::MoveResize(client.window, saved));
            }
        }

        if let [only] = visible.as_slice() {
            arrangement.push(LayoutOp::BorderWidth(only.window, 0));
            arrangement.push(LayoutOp::MoveResize(only.window, full));
            return arrangement;
        }

        match tiled.as_slice() {
            [] => {}
            [only] => arrangement.push(LayoutOp::MoveResize(*only, full)),
            [master, stack @ ..] => {
                arrangement.push(LayoutOp::MoveResize(*master, self.master_rect(screen)));
                arrangement.push(LayoutOp::Raise(*master));
                for (i, &window) in stack.iter().enumerate() {
                    arrangement.push(LayoutOp::MoveResize(
                        window,
                        self.stack_rect(screen, i, stack.len()),
                    ));
                    arrangement.push(LayoutOp::Raise(window));
                }
            }
        }
        arrangement
    }

    fn master_rect(&self, screen: ScreenSize) -> Geometry {
        let gap = self.gap as f64;
        let border = self.border as f64;
        let width = screen.width as f64 * self.master_factor - gap * 1.5 - border * 2.0;
        let height = screen.height as i64 - 2 * self.gap as i64 - 2 * self.border as i64;
        Geometry::new(
            self.gap as i32,
            self.gap as i32,
            at_least_one(width as i64),
            at_least_one(height),
        )
    }

    fn stack_rect(&self, screen: ScreenSize, index: usize, count: usize) -> Geometry {
        let gap = self.gap as f64;
        let border = self.border as f64;
        let x = screen.width as f64 * self.master_factor + gap * 0.5;
        let width = screen.width as f64 * (1.0 - self.master_factor) - gap * 1.5 - border * 2.0;
        let height = (screen.height as usize / count) as i64
            - 2 * self.gap as i64
            - 2 * self.border as i64;
        let height = at_least_one(height);
        let y = index as i64 * (height as i64 + self.gap as i64) + self.gap as i64;
        Geometry::new(x as i32, y as i32, at_least_one(width as i64), height)
    }
}

fn at_least_one(value: i64) -> u32 {
    value.clamp(1, u32::MAX as i64) as u32
}

impl WindowManager {
    /// Recompute and apply the geometry of the active workspace
    pub fn arrange(&self, display: &impl DisplayServer) -> Result<()> {
        let arrangement =
            self.layout
                .plan(&self.registry, self.workspaces.active(), self.screen);
        debug!(
            "Arrange workspace {}: {} requests",
            self.workspaces.active(),
            arrangement.ops.len()
        );
        for op in &arrangement.ops {
            match *op {
                LayoutOp::BorderWidth(window, width) => display.set_border_width(window, width)?,
                LayoutOp::MoveResize(window, geometry) => display.move_resize(window, geometry)?,
                LayoutOp::Raise(window) => display.raise_window(window)?,
            }
        }
        Ok(())
    }

    /// Relative master-factor change; rejected deltas do not re-arrange
    pub fn set_master_factor(&mut self, display: &impl DisplayServer, delta: f64) -> Result<()> {
        if let Some(factor) = log_rejection(self.layout.adjust_master_factor(delta), "set_mfact") {
            debug!("Master factor now {:.2}", factor);
            self.arrange(display)?;
        }
        Ok(())
    }

    /// Float or re-tile the selection. Turning floating on snapshots the
    /// current server geometry so the window stays where it is.
    pub fn toggle_floating(&mut self, display: &impl DisplayServer) -> Result<()> {
        let Some(window) = self.registry.selected() else {
            return Ok(());
        };
        let info = display.window_info(window)?;
        let Some(client) = self.registry.get_mut(window) else {
            return Ok(());
        };
        if !client.floating {
            match info {
                Some(info) => client.saved = info.geometry,
                None => {
                    warn!("Window 0x{:x} vanished before floating", window);
                    return Ok(());
                }
            }
        }
        client.floating = !client.floating;
        debug!("Window 0x{:x} floating: {}", window, client.floating);
        self.arrange(display)
    }

    /// Enter or leave fullscreen for the selection
    pub fn toggle_fullscreen(&mut self, display: &impl DisplayServer) -> Result<()> {
        let Some(window) = self.registry.selected() else {
            return Ok(());
        };
        let info = display.window_info(window)?;
        let border_width = self.focus.border_width();
        let active_color = self.focus.active_color();
        let full = self.screen.rect();
        let Some(client) = self.registry.get_mut(window) else {
            return Ok(());
        };

        if !client.fullscreen {
            let Some(info) = info else {
                warn!("Window 0x{:x} vanished before fullscreen", window);
                return Ok(());
            };
            client.fullscreen = true;
            client.saved = info.geometry;
            display.set_border_width(window, 0)?;
            display.move_resize(window, full)?;
            display.raise_window(window)?;
        } else {
            client.fullscreen = false;
            let saved = client.saved;
            display.set_border_width(window, border_width)?;
            display.set_border_color(window, active_color)?;
            display.move_resize(window, saved)?;
        }
        debug!("Window 0x{:x} fullscreen toggled", window);

        self.arrange(display)?;
        self.focus_window(display, Some(window))
    }

    /// Swap the first two clients of the active workspace so the selection
    /// can trade places with the master
    pub fn swap_master(&mut self, display: &impl DisplayServer) -> Result<()> {
        let active = self.workspaces.active();
        let heads: Vec<Window> = self
            .registry
            .in_workspace(active)
            .map(|c| c.window)
            .take(2)
            .collect();
        let &[first, second] = heads.as_slice() else {
            return Ok(());
        };
        self.registry.swap_order(first, second);
        debug!("Swapped master 0x{:x} with 0x{:x}", first, second);
        self.arrange(display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::wm::testing::{Request, RecordingDisplay, test_wm};

    fn ws(n: u8) -> WorkspaceId {
        WorkspaceId::new(n as i64).unwrap()
    }

    fn engine() -> LayoutEngine {
        LayoutEngine::new(&Config::default().window_manager)
    }

    fn screen() -> ScreenSize {
        ScreenSize::new(1920, 1080)
    }

    #[test]
    fn test_single_window_fills_screen_without_border() {
        let mut registry = ClientRegistry::new(5);
        registry.insert(1, ws(1)).unwrap();
        let plan = engine().plan(&registry, ws(1), screen());
        assert_eq!(plan.geometry_of(1), Some(Geometry::new(0, 0, 1920, 1080)));
        assert!(plan.ops.contains(&LayoutOp::BorderWidth(1, 0)));
    }

    #[test]
    fn test_master_and_stack_geometry() {
        let mut registry = ClientRegistry::new(5);
        registry.insert(1, ws(1)).unwrap();
        registry.insert(2, ws(1)).unwrap();
        registry.insert(3, ws(1)).unwrap();
        // order: 3 (master), 2, 1
        let plan = engine().plan(&registry, ws(1), screen());

        // 1920 * 0.45 - 7.5 - 10 = 846.5
        assert_eq!(plan.geometry_of(3), Some(Geometry::new(5, 5, 846, 1060)));
        // x = 864 + 2.5; width = 1056 - 17.5; height = 540 - 20
        assert_eq!(plan.geometry_of(2), Some(Geometry::new(866, 5, 1038, 520)));
        assert_eq!(plan.geometry_of(1), Some(Geometry::new(866, 530, 1038, 520)));

        // Master raised before the stack
        let raises: Vec<_> = plan
            .ops
            .iter()
            .filter_map(|op| match op {
                LayoutOp::Raise(w) => Some(*w),
                _ => None,
            })
            .collect();
        assert_eq!(raises, vec![3, 2, 1]);
    }

    #[test]
    fn test_fullscreen_dominates_and_touches_nothing_else() {
        let mut registry = ClientRegistry::new(5);
        registry.insert(1, ws(1)).unwrap();
        registry.insert(2, ws(1)).unwrap();
        registry.insert(3, ws(1)).unwrap();
        registry.get_mut(2).unwrap().fullscreen = true;

        let plan = engine().plan(&registry, ws(1), screen());
        assert_eq!(
            plan.ops,
            vec![
                LayoutOp::BorderWidth(2, 0),
                LayoutOp::MoveResize(2, Geometry::new(0, 0, 1920, 1080)),
                LayoutOp::Raise(2),
            ]
        );
        assert!(!plan.touches(1));
        assert!(!plan.touches(3));
    }

    #[test]
    fn test_floating_uses_saved_geometry() {
        let mut registry = ClientRegistry::new(5);
        registry.insert(1, ws(1)).unwrap();
        registry.insert(2, ws(1)).unwrap();
        registry.insert(3, ws(1)).unwrap();
        let floating = Geometry::new(100, 100, 400, 300);
        let client = registry.get_mut(3).unwrap();
        client.floating = true;
        client.saved = floating;

        let plan = engine().plan(&registry, ws(1), screen());
        assert_eq!(plan.geometry_of(3), Some(floating));
        // 2 becomes master because 3 floats
        assert_eq!(plan.geometry_of(2).map(|g| g.x), Some(5));
        assert_eq!(plan.geometry_of(1).map(|g| g.x), Some(866));
    }

    #[test]
    fn test_single_tiled_beside_floating_gets_full_screen() {
        let mut registry = ClientRegistry::new(5);
        registry.insert(1, ws(1)).unwrap();
        registry.insert(2, ws(1)).unwrap();
        registry.get_mut(2).unwrap().floating = true;
        let plan = engine().plan(&registry, ws(1), screen());
        assert_eq!(plan.geometry_of(1), Some(Geometry::new(0, 0, 1920, 1080)));
    }

    #[test]
    fn test_only_floating_windows_are_not_tiled() {
        let mut registry = ClientRegistry::new(5);
        registry.insert(1, ws(1)).unwrap();
        registry.insert(2, ws(1)).unwrap();
        for w in [1, 2] {
            let client = registry.get_mut(w).unwrap();
            client.floating = true;
            client.saved = Geometry::new(10, 10, 200, 200);
        }
        let plan = engine().plan(&registry, ws(1), screen());
        assert_eq!(plan.ops.len(), 2);
        assert!(plan.ops.iter().all(|op| matches!(op, LayoutOp::MoveResize(..))));
    }

    #[test]
    fn test_other_workspaces_ignored() {
        let mut registry = ClientRegistry::new(5);
        registry.insert(1, ws(2)).unwrap();
        let plan = engine().plan(&registry, ws(1), screen());
        assert!(plan.ops.is_empty());
    }

    #[test]
    fn test_master_factor_bounds() {
        let mut layout = engine();
        assert_eq!(
            layout.adjust_master_factor(0.5),
            Err(Rejection::MasterFactorOutOfRange(0.95))
        );
        assert!((layout.master_factor() - 0.45).abs() < 1e-9);

        assert!(layout.adjust_master_factor(0.45).is_ok());
        assert!((layout.master_factor() - 0.9).abs() < 1e-9);
        assert!(layout.adjust_master_factor(0.05).is_err());
        assert!(layout.adjust_master_factor(-0.8).is_ok());
        assert!((layout.master_factor() - 0.1).abs() < 1e-9);
        assert!(layout.adjust_master_factor(f64::NAN).is_err());
    }

    #[test]
    fn test_rejected_master_factor_does_not_arrange() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        display.add_window(1, Geometry::new(0, 0, 400, 300));
        wm.handle_event(&display, crate::wm::WmEvent::MapRequest { window: 1 })
            .unwrap();
        display.clear();

        wm.set_master_factor(&display, 0.5).unwrap();
        assert!(display.requests().is_empty());
        assert!((wm.layout.master_factor() - 0.45).abs() < 1e-9);

        wm.set_master_factor(&display, 0.05).unwrap();
        assert!(!display.requests().is_empty());
    }

    #[test]
    fn test_toggle_fullscreen_saves_and_restores() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        display.add_window(1, Geometry::new(0, 0, 400, 300));
        display.add_window(2, Geometry::new(0, 0, 400, 300));
        wm.handle_event(&display, crate::wm::WmEvent::MapRequest { window: 1 }).unwrap();
        wm.handle_event(&display, crate::wm::WmEvent::MapRequest { window: 2 }).unwrap();

        let tiled = display.geometry_of(2).unwrap();
        wm.toggle_fullscreen(&display).unwrap();
        assert!(wm.registry.get(2).unwrap().fullscreen);
        assert_eq!(display.geometry_of(2), Some(Geometry::new(0, 0, 1920, 1080)));
        assert_eq!(display.border_of(2), Some(0));

        wm.toggle_fullscreen(&display).unwrap();
        assert!(!wm.registry.get(2).unwrap().fullscreen);
        assert!(display.requests().contains(&Request::MoveResize(2, tiled)));
        assert_eq!(display.border_of(2), Some(5));
    }

    #[test]
    fn test_swap_master_stays_in_workspace() {
        let display = RecordingDisplay::new();
        let mut wm = test_wm(1920, 1080);
        for w in 1..=3 {
            display.add_window(w, Geometry::new(0, 0, 400, 300));
            wm.handle_event(&display, crate::wm::WmEvent::MapRequest { window: w })
                .unwrap();
        }
        wm.swap_master(&display).unwrap();
        let order: Vec<_> = wm.registry.iter().map(|c| c.window).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(display.geometry_of(2).map(|g| g.x), Some(5));
    }
}
