//! Drag inertia: sample the view center while dragging, keep it gliding
//! after release

use std::collections::VecDeque;

use super::coords::wrap_delta;
use super::tile::TilePoint;
use super::view::MapView;
use crate::config::InertiaConfig;

const MAX_SAMPLES: usize = 5;

/// Velocity tracker for a dragged view
#[derive(Debug, Clone)]
pub struct Inertia {
    config: InertiaConfig,
    /// (time in seconds, center in tile units)
    samples: VecDeque<(f64, TilePoint)>,
    /// Tiles per second at `zoom`
    velocity: (f64, f64),
    zoom: i32,
}

impl Inertia {
    pub fn new(config: InertiaConfig) -> Self {
        Self {
            config,
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            velocity: (0.0, 0.0),
            zoom: 0,
        }
    }

    /// Record the view center during a drag. Stops any running glide.
    pub fn record(&mut self, time: f64, view: &MapView) {
        let center = view.center_tile();
        if self.samples.back().is_some_and(|(_, p)| p.zoom != center.zoom) {
            self.samples.clear();
        }
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back((time, center));
        self.velocity = (0.0, 0.0);
    }

    /// End the drag and derive the release velocity
    pub fn release(&mut self) {
        let velocity = match (self.samples.front(), self.samples.back()) {
            (Some((t0, first)), Some((t1, last))) if t1 > t0 => {
                let dt = t1 - t0;
                let dx = wrap_delta(last.x - first.x, last.max_tiles());
                self.zoom = last.zoom;
                (dx / dt, (last.y - first.y) / dt)
            }
            _ => (0.0, 0.0),
        };
        self.velocity = velocity;
        self.samples.clear();
    }

    pub fn is_moving(&self) -> bool {
        self.velocity.0 != 0.0 || self.velocity.1 != 0.0
    }

    pub fn velocity(&self) -> (f64, f64) {
        self.velocity
    }

    pub fn stop(&mut self) {
        self.velocity = (0.0, 0.0);
        self.samples.clear();
    }

    /// Advance the glide by `dt` seconds. Returns whether the view moved.
    pub fn tick(&mut self, dt: f64, view: &mut MapView) -> bool {
        if !self.is_moving() || dt <= 0.0 {
            return false;
        }
        let center = view.center_tile().to_zoom(self.zoom);
        view.set_center_tile(TilePoint::new(
            center.x + self.velocity.0 * dt,
            center.y + self.velocity.1 * dt,
            self.zoom,
        ));

        let decay = (-self.config.decay * dt).exp();
        self.velocity = (self.velocity.0 * decay, self.velocity.1 * decay);
        let speed = self.velocity.0.hypot(self.velocity.1);
        if speed < self.config.min_speed {
            self.velocity = (0.0, 0.0);
        }
        true
    }
}

impl Default for Inertia {
    fn default() -> Self {
        Self::new(InertiaConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::coords::GeoPoint;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_velocity_across_dateline() {
        let mut view = MapView::new(2, 2);
        view.set_center_and_zoom(GeoPoint::new(179.0, 0.0), 4.0);
        let mut inertia = Inertia::default();
        inertia.record(0.0, &view);
        view.set_center(GeoPoint::new(-179.0, 0.0));
        inertia.record(0.5, &view);
        inertia.release();

        // 2 degrees east at zoom 4 is 2/360*16 tiles in half a second
        let (vx, vy) = inertia.velocity();
        assert_abs_diff_eq!(vx, 2.0 / 360.0 * 16.0 / 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(vy, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_glide_decays_to_rest() {
        let mut view = MapView::new(2, 2);
        view.set_center_and_zoom(GeoPoint::new(0.0, 0.0), 6.0);
        let mut inertia = Inertia::default();
        inertia.record(0.0, &view);
        view.pan(-64.0, 0.0);
        inertia.record(0.1, &view);
        inertia.release();
        assert!(inertia.is_moving());

        let start = view.center().lng;
        let mut steps = 0;
        while inertia.tick(1.0 / 60.0, &mut view) {
            steps += 1;
            assert!(steps < 10_000);
        }
        assert!(view.center().lng > start);
        assert!(!inertia.is_moving());
    }

    #[test]
    fn test_single_sample_has_no_velocity() {
        let view = MapView::new(2, 2);
        let mut inertia = Inertia::default();
        inertia.record(1.0, &view);
        inertia.release();
        assert!(!inertia.is_moving());
    }
}
