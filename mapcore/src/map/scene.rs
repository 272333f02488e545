//! Mapping from map coordinates to the host's local scene space

use super::coords::{MercatorPoint, meters_per_tile};
use super::projection::mercator_to_tile;
use super::rect::{MercatorRect, WrappedRect};
use super::view::MapView;

/// What the building generator needs to know about the scene it feeds.
///
/// Local positions are 2D: `[x, z]` with x growing east and z growing south,
/// the vertical axis of the emitted meshes being y.
pub trait SceneContext {
    /// Scene extent covered by the viewport, in scene units
    fn size(&self) -> [f64; 2];

    /// Offset of a Mercator point from the viewport's top-left corner
    fn mercator_to_local(&self, m: MercatorPoint) -> [f64; 2];

    /// Scene units per meter of ground at latitude `lat`
    fn units_per_meter(&self, lat: f64) -> f64;

    /// Visible area, for culling
    fn visible_mercator(&self) -> MercatorRect;

    /// Scene units per normalized Mercator unit
    fn units_per_mercator(&self) -> f64 {
        let width = self.visible_mercator().width();
        if width > 0.0 { self.size()[0] / width } else { 0.0 }
    }
}

/// Scene that stretches the view's visible tiles over a fixed size
pub struct TiledScene<'a> {
    view: &'a MapView,
    size: [f64; 2],
}

impl<'a> TiledScene<'a> {
    pub fn new(view: &'a MapView, size: [f64; 2]) -> Self {
        Self { view, size }
    }
}

impl SceneContext for TiledScene<'_> {
    fn size(&self) -> [f64; 2] {
        self.size
    }

    fn mercator_to_local(&self, m: MercatorPoint) -> [f64; 2] {
        let rect = &self.view.bounds().tile;
        let t = mercator_to_tile(m, rect.zoom);
        let (fx, fy) = rect.fraction_xy(t.x, t.y);
        [fx * self.size[0], fy * self.size[1]]
    }

    fn units_per_meter(&self, lat: f64) -> f64 {
        let rect = &self.view.bounds().tile;
        let meters = rect.width() * meters_per_tile(lat, rect.zoom);
        if meters > 0.0 { self.size[0] / meters } else { 0.0 }
    }

    fn visible_mercator(&self) -> MercatorRect {
        self.view.bounds().mercator
    }
}
