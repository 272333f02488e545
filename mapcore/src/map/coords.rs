//! Geographic and normalized Mercator coordinates, plus the wraparound helpers
//! every other module shares

use serde::{Deserialize, Serialize};

/// Lowest zoom the view accepts
pub const MIN_ZOOM: f64 = 1.0;
/// Highest zoom with real raster tiles
pub const MAX_ZOOM: f64 = 20.0;
/// Highest zoom the view can be pushed to (over-zoomed tiles)
pub const MAX_ZOOM_EXT: f64 = 24.0;

/// Latitude where the Mercator square ends
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Equatorial circumference in meters
pub const EARTH_CIRCUMFERENCE: f64 = 40075016.686;

const EARTH_RADIUS: f64 = 6378137.0;

/// Longitude / latitude pair in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Longitude repeated into [-180, 180), latitude clamped into [-90, 90]
    pub fn normalized(self) -> Self {
        Self {
            lng: normalize_longitude(self.lng),
            lat: self.lat.clamp(-90.0, 90.0),
        }
    }

    /// Great-circle distance in meters (haversine)
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = wrap_delta(other.lng - self.lng, 360.0).to_radians();
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS * a.sqrt().min(1.0).asin()
    }
}

/// Web Mercator position normalized to the unit square, y grows southwards
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MercatorPoint {
    pub x: f64,
    pub y: f64,
}

impl MercatorPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// x repeated into [0, 1), y clamped into [0, 1]
    pub fn normalized(self) -> Self {
        let y = if self.y.is_nan() { 0.5 } else { self.y.clamp(0.0, 1.0) };
        Self { x: repeat01(self.x), y }
    }
}

/// Repeat `value` into [0, period)
pub fn repeat(value: f64, period: f64) -> f64 {
    let r = value - (value / period).floor() * period;
    // float rounding can land exactly on the period
    if r >= period { 0.0 } else { r }
}

/// Repeat into [0, 1)
pub fn repeat01(value: f64) -> f64 {
    repeat(value, 1.0)
}

/// Shortest signed equivalent of `delta` on a circle of length `period`.
///
/// Any difference of two longitudes (period 360) or two tile x coordinates
/// (period `2^zoom`) must go through here, otherwise motion across the
/// antimeridian jumps by a full revolution.
pub fn wrap_delta(delta: f64, period: f64) -> f64 {
    let half = period / 2.0;
    if delta > half {
        delta - period * ((delta + half) / period).floor()
    } else if delta < -half {
        delta + period * ((half - delta) / period).floor()
    } else {
        delta
    }
}

/// Normalize longitude to [-180, 180)
pub fn normalize_longitude(lng: f64) -> f64 {
    repeat(lng + 180.0, 360.0) - 180.0
}

/// Clamp latitude to the Mercator square
pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
}

/// Ground length of one tile edge in meters at `lat` and integer `zoom`
pub fn meters_per_tile(lat: f64, zoom: i32) -> f64 {
    EARTH_CIRCUMFERENCE * lat.to_radians().cos() / 2.0_f64.powi(zoom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_wrap_delta_across_dateline() {
        // from 179 to -179 is two degrees east, not 358 west
        assert_abs_diff_eq!(wrap_delta(-179.0 - 179.0, 360.0), 2.0);
        assert_abs_diff_eq!(wrap_delta(179.0 - -179.0, 360.0), -2.0);
        assert_abs_diff_eq!(wrap_delta(90.0, 360.0), 90.0);
        assert_abs_diff_eq!(wrap_delta(-725.0, 360.0), -5.0);
    }

    #[test]
    fn test_wrap_delta_tiles() {
        // zoom 3: 8 tiles around
        assert_abs_diff_eq!(wrap_delta(7.5, 8.0), -0.5);
        assert_abs_diff_eq!(wrap_delta(-6.0, 8.0), 2.0);
    }

    #[test]
    fn test_wrap_delta_is_bounded() {
        let mut a = -540.0;
        while a <= 540.0 {
            let mut b = -540.0;
            while b <= 540.0 {
                assert!(wrap_delta(b - a, 360.0).abs() <= 180.0);
                b += 37.0;
            }
            a += 29.0;
        }
    }

    #[test]
    fn test_repeat() {
        assert_abs_diff_eq!(repeat01(1.25), 0.25);
        assert_abs_diff_eq!(repeat01(-0.25), 0.75);
        assert_abs_diff_eq!(repeat(-1.0, 8.0), 7.0);
        assert_eq!(repeat01(1.0), 0.0);
    }

    #[test]
    fn test_normalize_longitude() {
        assert!((normalize_longitude(190.0) - (-170.0)).abs() < 0.001);
        assert!((normalize_longitude(-190.0) - 170.0).abs() < 0.001);
        assert_eq!(normalize_longitude(180.0), -180.0);
    }

    #[test]
    fn test_mercator_normalized() {
        let m = MercatorPoint::new(1.5, -0.2).normalized();
        assert_abs_diff_eq!(m.x, 0.5);
        assert_eq!(m.y, 0.0);
    }

    #[test]
    fn test_distance_across_dateline() {
        let a = GeoPoint::new(179.5, 0.0);
        let b = GeoPoint::new(-179.5, 0.0);
        // one degree of equator
        assert!((a.distance_meters(&b) - 111_319.49).abs() < 1.0);
    }
}
