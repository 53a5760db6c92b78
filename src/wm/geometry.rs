//! Geometry Module
//!
//! Window rectangles and the validator that every externally supplied
//! geometry (map requests, configure requests, pointer coordinates) must pass
//! before it is allowed to touch window state.

use crate::wm::error::Rejection;

/// Window geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Whether a root point falls on the window or its `border`
    pub fn contains(&self, x: i32, y: i32, border: u32) -> bool {
        let (x, y) = (x as i64, y as i64);
        let (left, top) = (self.x as i64, self.y as i64);
        let right = left + self.width as i64 + 2 * border as i64;
        let bottom = top + self.height as i64 + 2 * border as i64;
        x >= left && x < right && y >= top && y < bottom
    }
}

/// Screen dimensions of the single managed output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The whole screen as a rectangle at the origin
    pub fn rect(&self) -> Geometry {
        Geometry::new(0, 0, self.width, self.height)
    }
}

/// Pure size/position predicates against the screen bounds
#[derive(Debug, Clone, Copy)]
pub struct GeometryValidator {
    screen: ScreenSize,
    min_size: u32,
    border_width: u32,
}

impl GeometryValidator {
    pub fn new(screen: ScreenSize, min_size: u32, border_width: u32) -> Self {
        Self {
            screen,
            min_size,
            border_width,
        }
    }

    /// Both dimensions must lie in `[min_size, screen dimension]`.
    pub fn valid_size(&self, width: i32, height: i32) -> bool {
        let min = self.min_size as i64;
        let (w, h) = (width as i64, height as i64);
        w >= min && h >= min && w <= self.screen.width as i64 && h <= self.screen.height as i64
    }

    /// Both coordinates must lie in `[-border_width, screen dimension]`.
    pub fn valid_position(&self, x: i32, y: i32) -> bool {
        let low = -(self.border_width as i64);
        let (x, y) = (x as i64, y as i64);
        x >= low && y >= low && x <= self.screen.width as i64 && y <= self.screen.height as i64
    }

    /// Size check reported as a rejection
    pub fn check_size(&self, width: i32, height: i32) -> Result<(), Rejection> {
        if self.valid_size(width, height) {
            Ok(())
        } else {
            Err(Rejection::InvalidSize { width, height })
        }
    }

    /// Position check reported as a rejection
    pub fn check_position(&self, x: i32, y: i32) -> Result<(), Rejection> {
        if self.valid_position(x, y) {
            Ok(())
        } else {
            Err(Rejection::InvalidPosition { x, y })
        }
    }
}
