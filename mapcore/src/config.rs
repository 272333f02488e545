//! Runtime configuration, loadable from JSON

use std::path::Path;

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::building::footprint::WindingRule;
use crate::map::coords::{GeoPoint, MAX_ZOOM_EXT};
use crate::map::rect::GeoRect;
use crate::map::view::{MapView, ZoomRange};

/// Everything a map instance can be configured with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub view: ViewConfig,
    pub buildings: BuildingConfig,
    pub inertia: InertiaConfig,
}

impl MapConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: MapConfig = serde_json::from_str(json).context("invalid map config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let v = &self.view;
        ensure!(v.tile_count_x > 0 && v.tile_count_y > 0, "tile counts must be positive");
        ensure!(
            v.scene_size[0] > 0.0 && v.scene_size[1] > 0.0,
            "scene size must be positive"
        );
        let b = &self.buildings;
        ensure!(b.level_height > 0.0, "level_height must be positive");
        ensure!(
            b.levels_range.min <= b.levels_range.max,
            "levels_range min exceeds max"
        );
        ensure!(b.height_scale > 0.0, "height_scale must be positive");
        ensure!(
            b.wall_texture_size[0] > 0.0 && b.wall_texture_size[1] > 0.0,
            "wall_texture_size must be positive"
        );
        ensure!(b.dispose_distance > 0.0, "dispose_distance must be positive");
        ensure!(self.inertia.decay >= 0.0, "inertia decay must not be negative");
        Ok(())
    }
}

/// Initial view state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub tile_count_x: u32,
    pub tile_count_y: u32,
    pub center: GeoPoint,
    pub zoom: f64,
    pub zoom_range: Option<ZoomRange>,
    pub location_range: Option<GeoRect>,
    /// Scene units the viewport is stretched over
    pub scene_size: [f64; 2],
}

impl ViewConfig {
    pub fn build_view(&self) -> MapView {
        let mut view = MapView::new(self.tile_count_x, self.tile_count_y);
        if let Some(range) = self.zoom_range {
            view = view.with_zoom_range(range);
        }
        if let Some(range) = self.location_range {
            view = view.with_location_range(range);
        }
        view.set_center_and_zoom(self.center, self.zoom);
        view.take_changes();
        view
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            tile_count_x: 4,
            tile_count_y: 3,
            center: GeoPoint::new(0.0, 0.0),
            zoom: 3.0,
            zoom_range: None,
            location_range: None,
            scene_size: [1024.0, 768.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelsRange {
    pub min: u32,
    pub max: u32,
}

impl LevelsRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    /// Inclusive bounds, lowest first even when the fields were set inverted
    pub fn ordered(&self) -> (u32, u32) {
        (self.min.min(self.max), self.min.max(self.max))
    }
}

/// Building generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingConfig {
    /// Buildings are only requested and shown inside this zoom range
    pub zoom_range: ZoomRange,
    /// Meters per level
    pub level_height: f64,
    /// Level count drawn at random when no tag gives a height
    pub levels_range: LevelsRange,
    /// Lowest total height in meters
    pub min_height: f64,
    pub height_scale: f64,
    /// Vertices whose edges turn by less than this (degrees) are dropped
    pub collinear_angle: f64,
    pub winding: WindingRule,
    /// Wall texture repeat size in meters (along the perimeter, up)
    pub wall_texture_size: [f64; 2],
    pub use_colour_tag: bool,
    /// Number of interchangeable wall/roof materials the host provides
    pub material_variants: usize,
    /// Pooled buildings farther than this many viewport widths are disposed
    pub dispose_distance: f64,
    /// Most pooled buildings kept before the oldest are disposed
    pub max_pooled: usize,
    /// Requests cover the viewport grown by this fraction on every side
    pub request_margin: f64,
    /// Time the manager may spend baking meshes per tick
    pub bake_budget_ms: u64,
}

impl BuildingConfig {
    pub fn bake_budget(&self) -> Duration {
        Duration::from_millis(self.bake_budget_ms)
    }
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            zoom_range: ZoomRange::new(17.0, MAX_ZOOM_EXT),
            level_height: 3.0,
            levels_range: LevelsRange::new(3, 7),
            min_height: 4.0,
            height_scale: 1.0,
            collinear_angle: 5.0,
            winding: WindingRule::default(),
            wall_texture_size: [10.0, 10.0],
            use_colour_tag: true,
            material_variants: 1,
            dispose_distance: 3.0,
            max_pooled: 256,
            request_margin: 0.25,
            bake_budget_ms: 5,
        }
    }
}

/// Drag glide settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InertiaConfig {
    /// Exponential velocity decay per second
    pub decay: f64,
    /// Tiles per second below which the glide stops
    pub min_speed: f64,
}

impl Default for InertiaConfig {
    fn default() -> Self {
        Self { decay: 4.0, min_speed: 1e-3 }
    }
}
