//! Axis-aligned rectangles in geographic, Mercator and tile space.
//!
//! All three share the antimeridian rule: `right < left` means the rectangle
//! crosses the wrap seam and `right_fixed` adds one full period to `right`.

use serde::{Deserialize, Serialize};

use super::coords::{GeoPoint, MercatorPoint, wrap_delta};
use super::tile::{TilePoint, max_tiles};

/// Operations shared by every wrapped rectangle.
///
/// Horizontal tests all go through `wrap_delta` against the rectangle's
/// center so that the three spaces cannot drift apart.
pub trait WrappedRect {
    /// `(left, top, right, bottom)`
    fn edges(&self) -> (f64, f64, f64, f64);
    fn set_edges(&mut self, left: f64, top: f64, right: f64, bottom: f64);
    /// Length of one horizontal revolution
    fn period(&self) -> f64;

    fn left(&self) -> f64 {
        self.edges().0
    }

    fn right(&self) -> f64 {
        self.edges().2
    }

    /// `right`, moved one period east when the rectangle wraps
    fn right_fixed(&self) -> f64 {
        let (left, _, right, _) = self.edges();
        if right < left { right + self.period() } else { right }
    }

    fn width(&self) -> f64 {
        self.right_fixed() - self.left()
    }

    /// Absolute vertical extent
    fn height(&self) -> f64 {
        let (_, top, _, bottom) = self.edges();
        (bottom - top).abs()
    }

    fn center_x(&self) -> f64 {
        self.left() + self.width() / 2.0
    }

    fn center_y(&self) -> f64 {
        let (_, top, _, bottom) = self.edges();
        (top + bottom) / 2.0
    }

    fn contains_xy(&self, x: f64, y: f64) -> bool {
        let (_, top, _, bottom) = self.edges();
        let dx = wrap_delta(x - self.center_x(), self.period());
        dx.abs() <= self.width() / 2.0 && y >= top.min(bottom) && y <= top.max(bottom)
    }

    fn intersects(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        let dx = wrap_delta(other.center_x() - self.center_x(), self.period());
        let dy = (other.center_y() - self.center_y()).abs();
        dx.abs() <= (self.width() + other.width()) / 2.0
            && dy <= (self.height() + other.height()) / 2.0
    }

    /// Grow just enough to contain the point. Horizontally the shorter side
    /// around the circle is extended.
    fn encapsulate_xy(&mut self, x: f64, y: f64) {
        let (mut left, mut top, mut right, mut bottom) = self.edges();
        let half = self.width() / 2.0;
        let dx = wrap_delta(x - self.center_x(), self.period());
        if dx < -half {
            left = x;
        } else if dx > half {
            right = x;
        }
        if top <= bottom {
            top = top.min(y);
            bottom = bottom.max(y);
        } else {
            top = top.max(y);
            bottom = bottom.min(y);
        }
        self.set_edges(left, top, right, bottom);
    }

    /// Position of the point relative to the rectangle: 0 at left/top,
    /// 1 at right/bottom
    fn fraction_xy(&self, x: f64, y: f64) -> (f64, f64) {
        let (_, top, _, bottom) = self.edges();
        let width = self.width();
        let fx = if width == 0.0 {
            0.0
        } else {
            (wrap_delta(x - self.center_x(), self.period()) + width / 2.0) / width
        };
        let fy = if bottom == top { 0.0 } else { (y - top) / (bottom - top) };
        (fx, fy)
    }
}

/// Rectangle in degrees. `top` is the northern edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl GeoRect {
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    /// Normalized copy where `right` no longer wraps
    pub fn fix_wrap(&self) -> GeoRect {
        GeoRect::new(self.left, self.top, self.right_fixed(), self.bottom)
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        self.contains_xy(p.lng, p.lat)
    }

    pub fn encapsulate(&mut self, p: &GeoPoint) {
        self.encapsulate_xy(p.lng, p.lat)
    }

    pub fn fraction(&self, p: &GeoPoint) -> (f64, f64) {
        self.fraction_xy(p.lng, p.lat)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.center_x(), self.center_y())
    }

    /// Grow by `margin` (fraction of the size) on every side
    pub fn expanded(&self, margin: f64) -> GeoRect {
        let dx = self.width() * margin;
        let dy = (self.top - self.bottom) * margin;
        GeoRect::new(
            self.left - dx,
            (self.top + dy).min(90.0),
            self.right_fixed() + dx,
            (self.bottom - dy).max(-90.0),
        )
    }
}

impl WrappedRect for GeoRect {
    fn edges(&self) -> (f64, f64, f64, f64) {
        (self.left, self.top, self.right, self.bottom)
    }

    fn set_edges(&mut self, left: f64, top: f64, right: f64, bottom: f64) {
        *self = GeoRect::new(left, top, right, bottom);
    }

    fn period(&self) -> f64 {
        360.0
    }
}

/// Rectangle in normalized Mercator space, `top < bottom`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MercatorRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl MercatorRect {
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn contains(&self, p: &MercatorPoint) -> bool {
        self.contains_xy(p.x, p.y)
    }

    pub fn encapsulate(&mut self, p: &MercatorPoint) {
        self.encapsulate_xy(p.x, p.y)
    }

    pub fn fraction(&self, p: &MercatorPoint) -> (f64, f64) {
        self.fraction_xy(p.x, p.y)
    }
}

impl WrappedRect for MercatorRect {
    fn edges(&self) -> (f64, f64, f64, f64) {
        (self.left, self.top, self.right, self.bottom)
    }

    fn set_edges(&mut self, left: f64, top: f64, right: f64, bottom: f64) {
        *self = MercatorRect::new(left, top, right, bottom);
    }

    fn period(&self) -> f64 {
        1.0
    }
}

/// Rectangle on the tile grid of `zoom`, `top < bottom`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TileRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub zoom: i32,
}

impl TileRect {
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64, zoom: i32) -> Self {
        Self { left, top, right, bottom, zoom }
    }

    pub fn contains(&self, p: &TilePoint) -> bool {
        let p = p.to_zoom(self.zoom);
        self.contains_xy(p.x, p.y)
    }

    pub fn encapsulate(&mut self, p: &TilePoint) {
        let p = p.to_zoom(self.zoom);
        self.encapsulate_xy(p.x, p.y)
    }

    pub fn fraction(&self, p: &TilePoint) -> (f64, f64) {
        let p = p.to_zoom(self.zoom);
        self.fraction_xy(p.x, p.y)
    }

    pub fn top_left(&self) -> TilePoint {
        TilePoint::new(self.left, self.top, self.zoom)
    }

    pub fn bottom_right(&self) -> TilePoint {
        TilePoint::new(self.right, self.bottom, self.zoom)
    }

    pub fn to_mercator(&self) -> MercatorRect {
        let n = max_tiles(self.zoom);
        MercatorRect::new(self.left / n, self.top / n, self.right / n, self.bottom / n)
    }
}

impl WrappedRect for TileRect {
    fn edges(&self) -> (f64, f64, f64, f64) {
        (self.left, self.top, self.right, self.bottom)
    }

    fn set_edges(&mut self, left: f64, top: f64, right: f64, bottom: f64) {
        *self = TileRect::new(left, top, right, bottom, self.zoom);
    }

    fn period(&self) -> f64 {
        max_tiles(self.zoom)
    }
}
