//! Map system tying the view, drag inertia and buildings together

use web_time::Duration;

use crate::building::{
    Building, BuildingHooks, BuildingManager, FootprintSource, Placement, TickReport,
};
use crate::config::MapConfig;
use crate::map::inertia::Inertia;
use crate::map::scene::TiledScene;
use crate::map::view::{ChangeFlags, MapView};

/// What one frame changed
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    pub changes: ChangeFlags,
    pub gliding: bool,
    pub buildings: TickReport,
}

impl FrameReport {
    /// Whether the host should redraw
    pub fn needs_redraw(&self) -> bool {
        self.changes.any()
            || self.gliding
            || self.buildings.baked > 0
            || self.buildings.activated > 0
    }
}

/// Integrated map system
pub struct MapSystem {
    view: MapView,
    inertia: Inertia,
    buildings: BuildingManager,
    scene_size: [f64; 2],
    bake_budget: Duration,
    /// Viewport moved since buildings were last requested
    viewport_dirty: bool,
}

impl MapSystem {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            view: config.view.build_view(),
            inertia: Inertia::new(config.inertia),
            buildings: BuildingManager::new(config.buildings.clone()),
            scene_size: config.view.scene_size,
            bake_budget: config.buildings.bake_budget(),
            viewport_dirty: true,
        }
    }

    pub fn with_source(mut self, source: impl FootprintSource + 'static) -> Self {
        self.buildings = self.buildings.with_source(source);
        self
    }

    pub fn with_hooks(mut self, hooks: BuildingHooks) -> Self {
        self.buildings = self.buildings.with_hooks(hooks);
        self
    }

    /// Update the map system (call each frame)
    pub fn update(&mut self, dt: Duration) -> FrameReport {
        // 1. Keep gliding after a drag
        let gliding = self.inertia.tick(dt.as_secs_f64(), &mut self.view);

        // 2. Request buildings for a moved viewport
        let changes = self.view.take_changes();
        if changes.any() || self.viewport_dirty {
            self.viewport_dirty = false;
            self.buildings.on_viewport_changed(&self.view);
        }

        // 3. Bake, cull and dispose
        let scene = TiledScene::new(&self.view, self.scene_size);
        let buildings = self.buildings.tick(&self.view, &scene, self.bake_budget);
        if buildings.failed_requests > 0 {
            log::warn!("{} building requests failed this frame", buildings.failed_requests);
        }

        FrameReport { changes, gliding, buildings }
    }

    /// Active buildings with their placement in the current scene
    pub fn visible_buildings(&self) -> Vec<(&Building, Placement)> {
        let scene = TiledScene::new(&self.view, self.scene_size);
        self.buildings
            .active()
            .map(|b| (b, b.placement(&scene)))
            .collect()
    }

    /// Handle viewport resize
    pub fn resize(&mut self, tile_count_x: u32, tile_count_y: u32, scene_size: [f64; 2]) {
        self.view.set_tile_count(tile_count_x, tile_count_y);
        self.scene_size = scene_size;
        self.viewport_dirty = true;
    }

    /// Pan by a pixel delta while dragging at `time` seconds
    pub fn drag(&mut self, time: f64, dx: f64, dy: f64) {
        self.view.pan(dx, dy);
        self.inertia.record(time, &self.view);
    }

    /// End a drag and let the view glide
    pub fn release(&mut self) {
        self.inertia.release();
    }

    /// Pan the map by pixel delta
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.inertia.stop();
        self.view.pan(dx, dy);
    }

    /// Zoom at screen position
    pub fn zoom_at(&mut self, delta: f64, screen_x: f64, screen_y: f64) {
        self.inertia.stop();
        self.view.zoom_at(delta, screen_x, screen_y);
    }

    /// Zoom centered
    pub fn zoom(&mut self, delta: f64) {
        self.inertia.stop();
        self.view.zoom_by(delta);
    }

    pub fn view(&self) -> &MapView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut MapView {
        &mut self.view
    }

    pub fn buildings(&self) -> &BuildingManager {
        &self.buildings
    }

    pub fn buildings_mut(&mut self) -> &mut BuildingManager {
        &mut self.buildings
    }
}
