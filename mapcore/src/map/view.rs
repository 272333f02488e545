//! Map view state: center, zoom and the visible rectangle derived from them.
//!
//! Every mutation goes through a clamp (zoom range, tile count, location
//! range, poles) instead of failing. Callers observe the clamped value.

use serde::{Deserialize, Serialize};

use super::coords::{
    GeoPoint, MAX_ZOOM, MAX_ZOOM_EXT, MIN_ZOOM, MercatorPoint, clamp_latitude, meters_per_tile,
    normalize_longitude, repeat, wrap_delta,
};
use super::projection::{Projection, SphericalMercator, mercator_to_tile, tile_to_mercator};
use super::rect::{GeoRect, MercatorRect, TileRect, WrappedRect};
use super::tile::{TileId, TilePoint, is_valid_tile_y, max_tiles, wrap_tile_x};

/// Tile size in pixels (standard OSM tile size)
pub const TILE_SIZE: f64 = 256.0;

/// Center moves smaller than this (degrees) are ignored
pub const POSITION_EPSILON: f64 = 1e-10;
/// Zoom changes smaller than this are ignored
pub const ZOOM_EPSILON: f64 = 1e-7;
/// Nudge applied when left and right edges coincide (tile units)
pub const BOUNDS_EPSILON: f64 = 1e-9;

/// User supplied zoom limits, applied before the tile count limit
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    pub fn contains(&self, zoom: f64) -> bool {
        zoom >= self.min && zoom <= self.max
    }
}

/// Edge-triggered change signal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewChange {
    Position,
    Zoom,
}

/// Changes accumulated since the last `take_changes`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    pub position: bool,
    pub zoom: bool,
}

impl ChangeFlags {
    pub fn any(&self) -> bool {
        self.position || self.zoom
    }
}

/// Visible area in every coordinate space
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewBounds {
    /// At the integer zoom
    pub tile: TileRect,
    pub mercator: MercatorRect,
    pub geo: GeoRect,
}

/// Derive the visible rectangle from a center and zoom.
///
/// Pure. The second value is the center after vertical clamping: when the
/// viewport would extend past a pole it is pushed back, which moves the
/// center. `MapView` writes that back through `clamp_to_poles`.
pub fn compute_bounds(
    projection: &dyn Projection,
    center: GeoPoint,
    zoom: f64,
    tile_count_x: u32,
    tile_count_y: u32,
) -> (ViewBounds, GeoPoint) {
    let izoom = zoom.floor() as i32;
    let factor = 2.0_f64.powf(zoom - izoom as f64);
    let max = max_tiles(izoom);

    let m = projection.location_to_mercator(center.lng, center.lat).normalized();
    let c = mercator_to_tile(m, izoom);

    let half_x = tile_count_x as f64 / 2.0 / factor;
    let half_y = tile_count_y as f64 / 2.0 / factor;

    let left = repeat(c.x - half_x, max);
    let mut right = repeat(c.x + half_x, max);
    if (right - left).abs() < BOUNDS_EPSILON {
        // whole world visible: keep the rect one epsilon short of a full turn
        right = left - BOUNDS_EPSILON;
    }

    let mut top = c.y - half_y;
    let mut bottom = c.y + half_y;
    if bottom - top >= max {
        top = 0.0;
        bottom = max;
    } else if top < 0.0 {
        bottom -= top;
        top = 0.0;
    } else if bottom > max {
        top -= bottom - max;
        bottom = max;
    }

    let cy = (top + bottom) / 2.0;
    let corrected = if (cy - c.y).abs() > f64::EPSILON * max {
        let lat = projection.tile_to_location(c.x, cy, izoom).lat;
        GeoPoint::new(center.lng, lat)
    } else {
        center
    };

    let tile = TileRect::new(left, top, right, bottom, izoom);
    let tl = projection.tile_to_location(left, top, izoom);
    let br = projection.tile_to_location(right, bottom, izoom);
    let geo = GeoRect::new(
        normalize_longitude(tl.lng),
        tl.lat,
        normalize_longitude(br.lng),
        br.lat,
    );

    (ViewBounds { tile, mercator: tile.to_mercator(), geo }, corrected)
}

/// Whether two centers are within `POSITION_EPSILON`, across the antimeridian
fn same_position(a: GeoPoint, b: GeoPoint) -> bool {
    wrap_delta(a.lng - b.lng, 360.0).abs() < POSITION_EPSILON
        && (a.lat - b.lat).abs() < POSITION_EPSILON
}

/// Map view state
pub struct MapView {
    center: GeoPoint,
    zoom: f64,
    tile_count_x: u32,
    tile_count_y: u32,
    zoom_range: Option<ZoomRange>,
    location_range: Option<GeoRect>,
    projection: Box<dyn Projection>,
    bounds: ViewBounds,
    listeners: Vec<Box<dyn FnMut(ViewChange)>>,
    changes: ChangeFlags,
}

impl MapView {
    /// View at (0, 0) and the lowest zoom the tile counts allow
    pub fn new(tile_count_x: u32, tile_count_y: u32) -> Self {
        let mut view = Self {
            center: GeoPoint::default(),
            zoom: MIN_ZOOM,
            tile_count_x: tile_count_x.max(1),
            tile_count_y: tile_count_y.max(1),
            zoom_range: None,
            location_range: None,
            projection: Box::new(SphericalMercator),
            bounds: ViewBounds::default(),
            listeners: Vec::new(),
            changes: ChangeFlags::default(),
        };
        view.zoom = view.clamp_zoom(MIN_ZOOM);
        view.clamp_to_poles();
        view
    }

    pub fn with_zoom_range(mut self, range: ZoomRange) -> Self {
        self.set_zoom_range(Some(range));
        self.changes = ChangeFlags::default();
        self
    }

    pub fn with_location_range(mut self, range: GeoRect) -> Self {
        self.set_location_range(Some(range));
        self.changes = ChangeFlags::default();
        self
    }

    pub fn with_projection(mut self, projection: impl Projection + 'static) -> Self {
        self.projection = Box::new(projection);
        self.clamp_to_poles();
        self
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Zoom used for tile indices
    pub fn int_zoom(&self) -> i32 {
        self.zoom.floor() as i32
    }

    /// On-screen scale of one integer-zoom tile, in [1, 2)
    pub fn zoom_factor(&self) -> f64 {
        2.0_f64.powf(self.zoom - self.zoom.floor())
    }

    pub fn tile_count(&self) -> (u32, u32) {
        (self.tile_count_x, self.tile_count_y)
    }

    pub fn zoom_range(&self) -> Option<ZoomRange> {
        self.zoom_range
    }

    pub fn location_range(&self) -> Option<GeoRect> {
        self.location_range
    }

    pub fn projection(&self) -> &dyn Projection {
        self.projection.as_ref()
    }

    pub fn bounds(&self) -> &ViewBounds {
        &self.bounds
    }

    /// Geographic top-left corner of the viewport
    pub fn top_left(&self) -> GeoPoint {
        GeoPoint::new(self.bounds.geo.left, self.bounds.geo.top)
    }

    /// Geographic bottom-right corner of the viewport
    pub fn bottom_right(&self) -> GeoPoint {
        GeoPoint::new(self.bounds.geo.right, self.bounds.geo.bottom)
    }

    pub fn center_mercator(&self) -> MercatorPoint {
        self.projection
            .location_to_mercator(self.center.lng, self.center.lat)
            .normalized()
    }

    /// Center on the tile grid of the integer zoom
    pub fn center_tile(&self) -> TilePoint {
        mercator_to_tile(self.center_mercator(), self.int_zoom())
    }

    /// Viewport size in pixels
    pub fn screen_size(&self) -> (f64, f64) {
        (self.tile_count_x as f64 * TILE_SIZE, self.tile_count_y as f64 * TILE_SIZE)
    }

    /// On-screen size of one integer-zoom tile in pixels
    pub fn tile_screen_size(&self) -> f64 {
        TILE_SIZE * self.zoom_factor()
    }

    /// Meters per pixel at current zoom and latitude
    pub fn meters_per_pixel(&self) -> f64 {
        meters_per_tile(self.center.lat, self.int_zoom()) / self.tile_screen_size()
    }

    /// Register a listener for position and zoom changes
    pub fn subscribe(&mut self, listener: impl FnMut(ViewChange) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Drain the changes accumulated since the last call
    pub fn take_changes(&mut self) -> ChangeFlags {
        std::mem::take(&mut self.changes)
    }

    pub fn set_center(&mut self, location: GeoPoint) {
        if !location.lng.is_finite() || !location.lat.is_finite() {
            return;
        }
        let location = self.clamp_location(location);
        if same_position(location, self.center) {
            return;
        }
        let old = self.center;
        self.center = location;
        self.clamp_to_poles();
        // the pole clamp can pull the request back onto the old center
        if !same_position(old, self.center) {
            self.notify(ViewChange::Position);
        }
    }

    pub fn set_center_mercator(&mut self, m: MercatorPoint) {
        let m = m.normalized();
        let location = self.projection.mercator_to_location(m.x, m.y);
        self.set_center(location);
    }

    pub fn set_center_tile(&mut self, t: TilePoint) {
        self.set_center_mercator(tile_to_mercator(&t));
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        let zoom = self.clamp_zoom(zoom);
        if (zoom - self.zoom).abs() < ZOOM_EPSILON {
            return;
        }
        let old = self.center;
        self.zoom = zoom;
        self.clamp_to_poles();
        self.notify(ViewChange::Zoom);
        if !same_position(old, self.center) {
            self.notify(ViewChange::Position);
        }
    }

    /// Move and zoom in one step; bounds are derived once
    pub fn set_center_and_zoom(&mut self, location: GeoPoint, zoom: f64) {
        let zoom = self.clamp_zoom(zoom);
        let zoom_changed = (zoom - self.zoom).abs() >= ZOOM_EPSILON;
        let location = if location.lng.is_finite() && location.lat.is_finite() {
            self.clamp_location(location)
        } else {
            self.center
        };
        if !zoom_changed && same_position(location, self.center) {
            return;
        }
        let old = self.center;
        self.zoom = zoom;
        self.center = location;
        self.clamp_to_poles();
        let position_changed = !same_position(old, self.center);
        if !zoom_changed && !position_changed {
            return;
        }
        if zoom_changed {
            self.notify(ViewChange::Zoom);
        }
        if position_changed {
            self.notify(ViewChange::Position);
        }
    }

    /// Resize the viewport, in tiles
    pub fn set_tile_count(&mut self, tile_count_x: u32, tile_count_y: u32) {
        self.tile_count_x = tile_count_x.max(1);
        self.tile_count_y = tile_count_y.max(1);
        self.reclamp();
    }

    pub fn set_zoom_range(&mut self, range: Option<ZoomRange>) {
        self.zoom_range = range;
        self.reclamp();
    }

    pub fn set_location_range(&mut self, range: Option<GeoRect>) {
        self.location_range = range;
        self.reclamp();
    }

    /// Clamp a requested zoom: user zoom range first, then the lowest zoom
    /// with at least as many tiles per axis as the viewport shows, then the
    /// absolute limits.
    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return self.zoom;
        }
        let mut zoom = zoom;
        if let Some(range) = self.zoom_range {
            zoom = zoom.clamp(range.min, range.max);
        }
        let needed_x = (self.tile_count_x as f64).log2().ceil();
        let needed_y = (self.tile_count_y as f64).log2().ceil();
        let min = MIN_ZOOM.max(needed_x).max(needed_y);
        zoom.max(min).min(MAX_ZOOM_EXT)
    }

    /// Clamp a requested center into valid coordinates and the location range
    pub fn clamp_location(&self, location: GeoPoint) -> GeoPoint {
        let mut p = location.normalized();
        p.lat = clamp_latitude(p.lat);
        if let Some(range) = self.location_range {
            let (lo, hi) = (range.top.min(range.bottom), range.top.max(range.bottom));
            p.lat = p.lat.clamp(lo, hi);
            if !range.contains_xy(p.lng, p.lat) {
                let to_left = wrap_delta(p.lng - range.left, 360.0).abs();
                let to_right = wrap_delta(p.lng - range.right, 360.0).abs();
                let edge = if to_left <= to_right { range.left } else { range.right };
                p.lng = normalize_longitude(edge);
            }
        }
        p
    }

    /// Recompute the bounds and apply the vertical clamp to the center.
    /// Returns whether the center moved.
    pub fn clamp_to_poles(&mut self) -> bool {
        let (bounds, corrected) = compute_bounds(
            self.projection.as_ref(),
            self.center,
            self.zoom,
            self.tile_count_x,
            self.tile_count_y,
        );
        self.bounds = bounds;
        let moved = corrected != self.center;
        self.center = corrected;
        moved
    }

    /// Pan the map by pixel delta (content follows the pointer)
    pub fn pan(&mut self, dx_pixels: f64, dy_pixels: f64) {
        let size = self.tile_screen_size();
        let c = self.center_tile();
        self.set_center_tile(TilePoint::new(
            c.x - dx_pixels / size,
            c.y - dy_pixels / size,
            c.zoom,
        ));
    }

    /// Simple zoom (centered)
    pub fn zoom_by(&mut self, delta: f64) {
        self.set_zoom(self.zoom + delta);
    }

    /// Zoom keeping the location under the given screen point in place
    pub fn zoom_at(&mut self, delta: f64, screen_x: f64, screen_y: f64) {
        let anchor = self.screen_to_location(screen_x, screen_y);
        let old_zoom = self.zoom;
        self.set_zoom(self.zoom + delta);
        if (self.zoom - old_zoom).abs() < ZOOM_EPSILON {
            return;
        }
        let (ax, ay) = self.location_to_screen(anchor);
        self.pan(screen_x - ax, screen_y - ay);
    }

    /// Screen pixel to tile point at the integer zoom
    pub fn screen_to_tile(&self, screen_x: f64, screen_y: f64) -> TilePoint {
        let size = self.tile_screen_size();
        let t = &self.bounds.tile;
        TilePoint::new(
            repeat(t.left + screen_x / size, t.period()),
            t.top + screen_y / size,
            t.zoom,
        )
    }

    pub fn screen_to_location(&self, screen_x: f64, screen_y: f64) -> GeoPoint {
        let t = self.screen_to_tile(screen_x, screen_y);
        self.projection.tile_to_location(t.x, t.y, t.zoom)
    }

    /// Pixel position of a location, measured from the viewport's top-left
    pub fn location_to_screen(&self, location: GeoPoint) -> (f64, f64) {
        let izoom = self.int_zoom();
        let t = self.projection.location_to_tile(location.lng, location.lat, izoom);
        let c = self.center_tile();
        let size = self.tile_screen_size();
        let (width, height) = self.screen_size();
        let dx = wrap_delta(t.x - c.x, max_tiles(izoom));
        let dy = t.y - self.bounds.tile.center_y();
        (width / 2.0 + dx * size, height / 2.0 + dy * size)
    }

    /// Raster tiles covering the viewport plus `buffer` tiles on every side.
    /// Past `MAX_ZOOM` the covering parents at `MAX_ZOOM` are returned.
    pub fn visible_tiles(&self, buffer: i64) -> Vec<TileId> {
        let t = &self.bounds.tile;
        let z = t.zoom.max(0) as u8;
        let n = 1_i64 << z;

        let mut min_x = t.left.floor() as i64 - buffer;
        let mut max_x = (t.left + t.width()).ceil() as i64 - 1 + buffer;
        if max_x - min_x + 1 > n {
            min_x = 0;
            max_x = n - 1;
        }
        let min_y = t.top.floor() as i64 - buffer;
        let max_y = t.bottom.ceil() as i64 - 1 + buffer;

        let mut tiles = Vec::new();
        for ty in min_y..=max_y {
            if !is_valid_tile_y(ty, z) {
                continue;
            }
            for tx in min_x..=max_x {
                let tile = TileId::new(wrap_tile_x(tx, z), ty as u32, z);
                let tile = tile.parent_at_zoom(MAX_ZOOM as u8).unwrap_or(tile);
                if !tiles.contains(&tile) {
                    tiles.push(tile);
                }
            }
        }
        tiles
    }

    fn reclamp(&mut self) {
        let zoom = self.clamp_zoom(self.zoom);
        let zoom_changed = (zoom - self.zoom).abs() >= ZOOM_EPSILON;
        let old = self.center;
        self.zoom = zoom;
        self.center = self.clamp_location(self.center);
        self.clamp_to_poles();
        let position_changed = !same_position(old, self.center);
        if zoom_changed {
            self.notify(ViewChange::Zoom);
        }
        if position_changed {
            self.notify(ViewChange::Position);
        }
    }

    fn notify(&mut self, change: ViewChange) {
        match change {
            ViewChange::Position => self.changes.position = true,
            ViewChange::Zoom => self.changes.zoom = true,
        }
        for listener in &mut self.listeners {
            (*listener)(change);
        }
    }
}

impl Default for MapView {
    fn default() -> Self {
        Self::new(4, 3)
    }
}
