//! Map projections. Web Mercator (EPSG:3857) is the only one OSM tiles use.

use std::f64::consts::PI;

use super::coords::{GeoPoint, MercatorPoint};
use super::tile::TilePoint;

/// Converts between geographic and normalized Mercator space.
///
/// Tile conversions are derived from the Mercator ones by `2^zoom` scaling,
/// so implementors only need the two core transforms.
pub trait Projection: Send + Sync {
    /// Forward projection. Not clamped: `MercatorPoint::normalized` does that.
    fn location_to_mercator(&self, lng: f64, lat: f64) -> MercatorPoint;

    /// Exact inverse of `location_to_mercator`
    fn mercator_to_location(&self, mx: f64, my: f64) -> GeoPoint;

    fn location_to_tile(&self, lng: f64, lat: f64, zoom: i32) -> TilePoint {
        mercator_to_tile(self.location_to_mercator(lng, lat), zoom)
    }

    fn tile_to_location(&self, tx: f64, ty: f64, zoom: i32) -> GeoPoint {
        let m = tile_to_mercator(&TilePoint::new(tx, ty, zoom));
        self.mercator_to_location(m.x, m.y)
    }
}

/// Spherical (Web) Mercator
#[derive(Clone, Copy, Debug, Default)]
pub struct SphericalMercator;

impl Projection for SphericalMercator {
    fn location_to_mercator(&self, lng: f64, lat: f64) -> MercatorPoint {
        let x = (lng + 180.0) / 360.0;
        let sin_lat = lat.to_radians().sin();
        let y = 0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI);
        MercatorPoint::new(x, y)
    }

    fn mercator_to_location(&self, mx: f64, my: f64) -> GeoPoint {
        let lng = mx * 360.0 - 180.0;
        let lat = 90.0 - 360.0 * ((my - 0.5) * 2.0 * PI).exp().atan() / PI;
        GeoPoint::new(lng, lat)
    }
}

/// Scale-only conversion, no trig. Used on drag and zoom paths.
pub fn mercator_to_tile(m: MercatorPoint, zoom: i32) -> TilePoint {
    let n = 2.0_f64.powi(zoom);
    TilePoint::new(m.x * n, m.y * n, zoom)
}

/// Inverse of `mercator_to_tile`
pub fn tile_to_mercator(t: &TilePoint) -> MercatorPoint {
    let n = 2.0_f64.powi(t.zoom);
    MercatorPoint::new(t.x / n, t.y / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_round_trip() {
        let p = SphericalMercator;
        let mut lat = -85.0;
        while lat <= 85.0 {
            let mut lng = -180.0;
            while lng < 180.0 {
                let m = p.location_to_mercator(lng, lat);
                let g = p.mercator_to_location(m.x, m.y);
                assert_abs_diff_eq!(g.lng, lng, epsilon = 1e-9);
                assert_abs_diff_eq!(g.lat, lat, epsilon = 1e-9);
                lng += 13.7;
            }
            lat += 4.25;
        }
    }

    #[test]
    fn test_mercator_edges() {
        let p = SphericalMercator;
        let m = p.location_to_mercator(0.0, 0.0);
        assert_abs_diff_eq!(m.x, 0.5);
        assert_abs_diff_eq!(m.y, 0.5);
        // north edge of the square is y = 0
        let north = p.location_to_mercator(-180.0, 85.05112878);
        assert_abs_diff_eq!(north.x, 0.0);
        assert_abs_diff_eq!(north.y, 0.0, epsilon = 1e-8);
        let south = p.location_to_mercator(180.0, -85.05112878);
        assert_abs_diff_eq!(south.x, 1.0);
        assert_abs_diff_eq!(south.y, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_pole_is_clamped_by_normalization() {
        let m = SphericalMercator.location_to_mercator(10.0, 90.0).normalized();
        assert_eq!(m.y, 0.0);
    }

    #[test]
    fn test_location_to_tile() {
        // Seoul (approx 126.9780, 37.5665)
        let t = SphericalMercator.location_to_tile(126.9780, 37.5665, 10);
        assert_eq!(t.x.floor() as u32, 873);
        assert_eq!(t.y.floor() as u32, 396);
        let g = SphericalMercator.tile_to_location(t.x, t.y, 10);
        assert_abs_diff_eq!(g.lng, 126.9780, epsilon = 1e-9);
        assert_abs_diff_eq!(g.lat, 37.5665, epsilon = 1e-9);
    }

    #[test]
    fn test_tile_mercator_scale() {
        let m = MercatorPoint::new(0.3141, 0.7182);
        for zoom in 0..=24 {
            let back = tile_to_mercator(&mercator_to_tile(m, zoom));
            assert_abs_diff_eq!(back.x, m.x, epsilon = 1e-15);
            assert_abs_diff_eq!(back.y, m.y, epsilon = 1e-15);
        }
    }
}
