//! OSM buildings: footprint resolution, mesh baking and lifetime management

pub mod footprint;
pub mod loader;
pub mod mesh;
pub mod osm;
pub mod pool;
pub mod tags;
pub mod triangulate;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use web_time::{Duration, Instant};

pub use footprint::WindingRule;
pub use loader::{BuildingLoader, FootprintSource, JsonFileSource, LoadResult, PendingQueue};
pub use mesh::{BuildingGenerator, BuildingMesh, BuildingVertex, MeshScale};
pub use osm::{BuildingCandidate, BuildingId, OsmData, Resolution, resolve_buildings};
pub use pool::{BuildingPool, PoolStats};
pub use tags::{BuildingTags, HeightProfile, RoofKind};

use crate::config::BuildingConfig;
use crate::map::coords::{GeoPoint, MercatorPoint, repeat01, wrap_delta};
use crate::map::rect::{GeoRect, MercatorRect, WrappedRect};
use crate::map::scene::SceneContext;
use crate::map::view::MapView;

/// Most recent `Requested` and `Disposed` ids remembered by a manager
const STATE_LOG_CAPACITY: usize = 4096;

/// Lifecycle of a single building
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildingState {
    /// Seen in a response without all of its nodes or member ways
    Requested,
    /// Outline resolved to coordinates, waiting in the pending queue
    NodesResolved,
    /// Outline cleaned up, about to be meshed
    FootprintCleaned,
    /// Baked, published to the active set or the pool on the next tick
    MeshBuilt,
    /// In the viewport
    Active,
    /// Out of the viewport, mesh retained
    Pooled,
    /// Evicted, cleared or discarded by the pipeline
    Disposed,
}

/// Material slots picked for a building
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaterialChoice {
    pub wall: usize,
    pub roof: usize,
    /// Tint from `building:colour`
    pub colour: Option<[u8; 4]>,
}

/// Where to draw a baked mesh in the current scene
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Local scene position of the mesh origin
    pub offset: [f64; 2],
    /// Uniform scale relative to the scene the mesh was baked in
    pub scale: f64,
}

/// A baked building
#[derive(Debug, Clone)]
pub struct Building {
    pub id: BuildingId,
    pub state: BuildingState,
    pub tags: BuildingTags,
    pub heights: HeightProfile,
    pub material: MaterialChoice,
    pub mesh: BuildingMesh,
    /// Mesh origin in normalized Mercator
    pub anchor: MercatorPoint,
    pub geo_center: GeoPoint,
    /// Footprint extent, for culling
    pub extent: MercatorRect,
    /// Scene units per Mercator unit at bake time
    baked_units: f64,
    pooled_at: Option<Instant>,
}

impl Building {
    pub fn placement(&self, scene: &dyn SceneContext) -> Placement {
        let scale = if self.baked_units > 0.0 {
            scene.units_per_mercator() / self.baked_units
        } else {
            1.0
        };
        Placement { offset: scene.mercator_to_local(self.anchor), scale }
    }

    /// Time since the building was pooled
    pub fn pooled_for(&self) -> Option<Duration> {
        self.pooled_at.map(|t| t.elapsed())
    }

    pub fn memory_size(&self) -> usize {
        self.mesh.vertex_bytes().len()
            + self.mesh.wall_index_bytes().len()
            + self.mesh.roof_index_bytes().len()
    }
}

pub type FilterHook = Box<dyn FnMut(&BuildingCandidate) -> bool>;
pub type HeightHook = Box<dyn FnMut(&BuildingCandidate) -> Option<f64>>;
pub type CenterHook = Box<dyn Fn(&[[f64; 2]]) -> [f64; 2]>;
pub type MaterialHook = Box<dyn FnMut(&BuildingCandidate, &BuildingTags) -> MaterialChoice>;
pub type StateHook = Box<dyn FnMut(BuildingId, BuildingState)>;

/// Optional strategies overriding parts of the pipeline
#[derive(Default)]
pub struct BuildingHooks {
    /// Return false to skip a building before anything is computed
    pub filter: Option<FilterHook>,
    /// Total height in meters when no tag gives one
    pub height: Option<HeightHook>,
    /// Mesh origin from the cleaned local footprint
    pub center: Option<CenterHook>,
    pub material: Option<MaterialHook>,
    /// Called on every state transition
    pub state: Option<StateHook>,
}

impl BuildingHooks {
    pub fn with_filter(mut self, f: impl FnMut(&BuildingCandidate) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(f));
        self
    }

    pub fn with_height(
        mut self,
        f: impl FnMut(&BuildingCandidate) -> Option<f64> + 'static,
    ) -> Self {
        self.height = Some(Box::new(f));
        self
    }

    pub fn with_center(mut self, f: impl Fn(&[[f64; 2]]) -> [f64; 2] + 'static) -> Self {
        self.center = Some(Box::new(f));
        self
    }

    pub fn with_material(
        mut self,
        f: impl FnMut(&BuildingCandidate, &BuildingTags) -> MaterialChoice + 'static,
    ) -> Self {
        self.material = Some(Box::new(f));
        self
    }

    pub fn with_state(mut self, f: impl FnMut(BuildingId, BuildingState) + 'static) -> Self {
        self.state = Some(Box::new(f));
        self
    }

    fn transition(&mut self, id: BuildingId, state: BuildingState) {
        log::trace!("Building {} is {:?}", id, state);
        if let Some(f) = self.state.as_mut() {
            f(id, state);
        }
    }
}

/// Last state of buildings the manager no longer holds, oldest forgotten
/// first
struct StateLog {
    states: HashMap<BuildingId, BuildingState>,
    order: VecDeque<BuildingId>,
    capacity: usize,
}

impl StateLog {
    fn new(capacity: usize) -> Self {
        Self { states: HashMap::new(), order: VecDeque::new(), capacity }
    }

    fn get(&self, id: &BuildingId) -> Option<BuildingState> {
        self.states.get(id).copied()
    }

    fn set(&mut self, id: BuildingId, state: BuildingState) {
        if self.states.insert(id, state).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.states.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, id: &BuildingId) {
        if self.states.remove(id).is_some() {
            self.order.retain(|i| i != id);
        }
    }

    fn clear(&mut self) {
        self.states.clear();
        self.order.clear();
    }
}

/// What one `tick` did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub baked: usize,
    pub skipped: usize,
    pub activated: usize,
    pub pooled: usize,
    pub disposed: usize,
    pub failed_requests: usize,
}

/// Owns every building of one map
pub struct BuildingManager {
    config: BuildingConfig,
    generator: BuildingGenerator,
    hooks: BuildingHooks,
    queue: PendingQueue,
    loader: Option<BuildingLoader>,
    /// Baked this tick, not yet published
    staged: HashMap<BuildingId, Building>,
    active: HashMap<BuildingId, Building>,
    pool: BuildingPool,
    states: StateLog,
    requested_area: Option<GeoRect>,
    footprint: Vec<[f64; 2]>,
}

impl BuildingManager {
    pub fn new(config: BuildingConfig) -> Self {
        Self {
            generator: BuildingGenerator::new(&config),
            hooks: BuildingHooks::default(),
            queue: PendingQueue::new(),
            loader: None,
            staged: HashMap::new(),
            active: HashMap::new(),
            pool: BuildingPool::new(config.max_pooled),
            states: StateLog::new(STATE_LOG_CAPACITY),
            requested_area: None,
            footprint: Vec::new(),
            config,
        }
    }

    /// Fetch areas from `source` on a background loader
    pub fn with_source(mut self, source: impl FootprintSource + 'static) -> Self {
        self.loader = Some(BuildingLoader::new(Arc::new(source), self.queue.clone()));
        self
    }

    pub fn with_hooks(mut self, hooks: BuildingHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &BuildingConfig {
        &self.config
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    /// Resolve an extract directly into the pending queue
    pub fn ingest(&mut self, data: &OsmData) -> usize {
        let found = resolve_buildings(data);
        let count = found.buildings.len();
        for candidate in &found.buildings {
            self.states.remove(&candidate.id);
        }
        self.queue.push_all(found.buildings);
        self.mark_requested(found.unresolved);
        count
    }

    /// Record buildings still waiting for nodes, unless held already
    fn mark_requested(&mut self, ids: Vec<BuildingId>) {
        for id in ids {
            if matches!(self.state_of(&id), None | Some(BuildingState::Disposed)) {
                self.states.set(id, BuildingState::Requested);
                self.hooks.transition(id, BuildingState::Requested);
            }
        }
    }

    fn mark_disposed(&mut self, ids: Vec<BuildingId>, report: &mut TickReport) {
        report.disposed += ids.len();
        for id in ids {
            self.states.set(id, BuildingState::Disposed);
            self.hooks.transition(id, BuildingState::Disposed);
        }
    }

    /// Hand a building to the pool, recording whatever that evicts
    fn pool_building(&mut self, building: Building, report: &mut TickReport) {
        let id = building.id;
        let disposed = self.pool.insert(building);
        report.pooled += 1;
        if self.pool.contains(&id) {
            self.hooks.transition(id, BuildingState::Pooled);
        }
        self.mark_disposed(disposed, report);
    }

    fn activate(&mut self, mut building: Building, report: &mut TickReport) {
        building.state = BuildingState::Active;
        self.hooks.transition(building.id, BuildingState::Active);
        self.active.insert(building.id, building);
        report.activated += 1;
    }

    /// Request buildings for the viewport when it leaves the last requested
    /// area. Returns the newly requested area.
    pub fn on_viewport_changed(&mut self, view: &MapView) -> Option<GeoRect> {
        if !self.config.zoom_range.contains(view.zoom()) {
            return None;
        }

        let visible = view.bounds().geo;
        let covered = self.requested_area.is_some_and(|area| {
            area.contains(&GeoPoint::new(visible.left, visible.top))
                && area.contains(&GeoPoint::new(visible.right, visible.bottom))
        });
        if covered {
            return None;
        }

        let area = visible.expanded(self.config.request_margin);
        self.requested_area = Some(area);
        if let Some(loader) = self.loader.as_mut() {
            let id = loader.request(area);
            log::debug!("Requested buildings for {:?} (request {})", area, id);
        }
        Some(area)
    }

    /// Publish last tick's meshes, move buildings between the active set
    /// and the pool, dispose far away ones, then bake queued buildings until
    /// `budget` runs out.
    ///
    /// At least one queued building is baked per call.
    pub fn tick(
        &mut self,
        view: &MapView,
        scene: &dyn SceneContext,
        budget: Duration,
    ) -> TickReport {
        let mut report = TickReport::default();

        let results: Vec<LoadResult> = match self.loader.as_mut() {
            Some(loader) => std::iter::from_fn(|| loader.poll()).collect(),
            None => Vec::new(),
        };
        for result in results {
            match result {
                LoadResult::Loaded { unresolved, .. } => self.mark_requested(unresolved),
                LoadResult::Failed { .. } => report.failed_requests += 1,
            }
        }

        let in_range = self.config.zoom_range.contains(view.zoom());
        self.update_visibility(view, scene, in_range, &mut report);
        if !in_range {
            return report;
        }

        let start = Instant::now();
        while let Some(candidate) = self.queue.pop() {
            let id = candidate.id;
            if self.is_held(&id) {
                report.skipped += 1;
            } else {
                self.states.remove(&id);
                self.hooks.transition(id, BuildingState::NodesResolved);
                match self.bake(&candidate, view, scene) {
                    Ok(building) => {
                        log::debug!("Baked building {}", id);
                        report.baked += 1;
                        self.staged.insert(id, building);
                    }
                    Err(reached) => {
                        log::debug!("Dropped building {} after {:?}", id, reached);
                        report.skipped += 1;
                        self.states.set(id, BuildingState::Disposed);
                        self.hooks.transition(id, BuildingState::Disposed);
                    }
                }
            }
            if start.elapsed() >= budget {
                break;
            }
        }
        report
    }

    fn is_held(&self, id: &BuildingId) -> bool {
        self.staged.contains_key(id) || self.active.contains_key(id) || self.pool.contains(id)
    }

    fn update_visibility(
        &mut self,
        view: &MapView,
        scene: &dyn SceneContext,
        in_range: bool,
        report: &mut TickReport,
    ) {
        let visible = scene.visible_mercator();

        let staged: Vec<Building> = self.staged.drain().map(|(_, b)| b).collect();
        for building in staged {
            if in_range && visible.intersects(&building.extent) {
                self.activate(building, report);
            } else {
                self.pool_building(building, report);
            }
        }

        let leaving: Vec<BuildingId> = self
            .active
            .values()
            .filter(|b| !in_range || !visible.intersects(&b.extent))
            .map(|b| b.id)
            .collect();
        for id in leaving {
            if let Some(building) = self.active.remove(&id) {
                self.pool_building(building, report);
            }
        }

        if in_range {
            let returning: Vec<BuildingId> = self
                .pool
                .iter()
                .filter(|b| visible.intersects(&b.extent))
                .map(|b| b.id)
                .collect();
            for id in returning {
                if let Some(building) = self.pool.take(&id) {
                    self.activate(building, report);
                }
            }
        }

        let center = view.center();
        let limit = self.config.dispose_distance * view.meters_per_pixel() * view.screen_size().0;
        let far = self
            .pool
            .retain(|b| b.geo_center.distance_meters(&center) <= limit);
        self.mark_disposed(far, report);
    }

    /// Run one resolved candidate through the pipeline. On failure returns
    /// the last state reached.
    fn bake(
        &mut self,
        candidate: &BuildingCandidate,
        view: &MapView,
        scene: &dyn SceneContext,
    ) -> Result<Building, BuildingState> {
        if let Some(filter) = self.hooks.filter.as_mut() {
            if !filter(candidate) {
                return Err(BuildingState::NodesResolved);
            }
        }

        let units = scene.units_per_mercator();
        let Some(first) = candidate.outline.first().filter(|_| units > 0.0) else {
            return Err(BuildingState::NodesResolved);
        };

        // footprint in scene units around the first node
        let projection = view.projection();
        let origin = projection.location_to_mercator(first.lng, first.lat);
        let mut min = [0.0_f64; 2];
        let mut max = [0.0_f64; 2];
        self.footprint.clear();
        for p in &candidate.outline {
            let m = projection.location_to_mercator(p.lng, p.lat);
            let d = [wrap_delta(m.x - origin.x, 1.0), m.y - origin.y];
            min = [min[0].min(d[0]), min[1].min(d[1])];
            max = [max[0].max(d[0]), max[1].max(d[1])];
            self.footprint.push([d[0] * units, d[1] * units]);
        }

        let tags = BuildingTags::from_tags(&candidate.tags);
        let mut rng = StdRng::seed_from_u64(candidate.id.seed());
        let height_hook = &mut self.hooks.height;
        let heights = tags::analyze(
            &tags,
            &self.config,
            || height_hook.as_mut().and_then(|f| f(candidate)),
            &mut rng,
        );

        let upm = scene.units_per_meter(first.lat);
        let scale = MeshScale {
            units_per_meter: upm,
            height_units: upm * self.config.height_scale,
        };
        let center = self.hooks.center.as_deref();
        let Some(mesh) = self.generator.build(&self.footprint, &heights, scale, center) else {
            log::warn!(
                "Skipping building {}: fewer than 3 usable footprint points",
                candidate.id
            );
            return Err(BuildingState::NodesResolved);
        };
        self.hooks.transition(candidate.id, BuildingState::FootprintCleaned);
        if mesh.has_errors {
            log::warn!("Skipping building {}: roof triangulation failed", candidate.id);
            return Err(BuildingState::FootprintCleaned);
        }

        let material = match self.hooks.material.as_mut() {
            Some(f) => f(candidate, &tags),
            None => {
                let variants = self.config.material_variants.max(1);
                MaterialChoice {
                    wall: rng.random_range(0..variants),
                    roof: rng.random_range(0..variants),
                    colour: if self.config.use_colour_tag { tags.colour } else { None },
                }
            }
        };

        let anchor = MercatorPoint::new(
            repeat01(origin.x + mesh.center[0] / units),
            origin.y + mesh.center[1] / units,
        );
        let geo_center = projection.mercator_to_location(anchor.x, anchor.y);
        let extent = MercatorRect::new(
            repeat01(origin.x + min[0]),
            origin.y + min[1],
            repeat01(origin.x + max[0]),
            origin.y + max[1],
        );

        self.hooks.transition(candidate.id, BuildingState::MeshBuilt);
        Ok(Building {
            id: candidate.id,
            state: BuildingState::MeshBuilt,
            tags,
            heights,
            material,
            mesh,
            anchor,
            geo_center,
            extent,
            baked_units: units,
            pooled_at: None,
        })
    }

    pub fn get(&self, id: &BuildingId) -> Option<&Building> {
        self.active
            .get(id)
            .or_else(|| self.pool.get(id))
            .or_else(|| self.staged.get(id))
    }

    /// Current state of a building, `None` when it was never seen or has
    /// been forgotten
    pub fn state_of(&self, id: &BuildingId) -> Option<BuildingState> {
        self.get(id)
            .map(|b| b.state)
            .or_else(|| self.queue.contains(id).then_some(BuildingState::NodesResolved))
            .or_else(|| self.states.get(id))
    }

    /// Buildings currently in the viewport
    pub fn active(&self) -> impl Iterator<Item = &Building> {
        self.active.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn pooled_count(&self) -> usize {
        self.pool.len()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Dispose everything and forget the requested area
    pub fn clear(&mut self) {
        let ids: Vec<BuildingId> = self
            .staged
            .keys()
            .chain(self.active.keys())
            .chain(self.pool.ids())
            .copied()
            .collect();
        self.staged.clear();
        self.active.clear();
        self.pool.clear();
        self.queue.clear();
        self.states.clear();
        self.requested_area = None;
        log::debug!("Disposed {} buildings", ids.len());
        self.mark_disposed(ids, &mut TickReport::default());
    }
}

#[cfg(test)]
pub(crate) fn test_building(id: i64, x: f64, y: f64) -> Building {
    let square = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
    let heights = HeightProfile { total: 12.0, wall: 12.0, roof: 0.0, roof_kind: RoofKind::Flat };
    let mesh = BuildingGenerator::new(&BuildingConfig::default())
        .build(&square, &heights, MeshScale::uniform(1.0), None)
        .unwrap();
    Building {
        id: BuildingId::Way(id),
        state: BuildingState::Active,
        tags: BuildingTags::default(),
        heights,
        material: MaterialChoice::default(),
        mesh,
        anchor: MercatorPoint::new(x, y),
        geo_center: GeoPoint::new(x * 360.0 - 180.0, 0.0),
        extent: MercatorRect::new(x - 1e-6, y - 1e-6, x + 1e-6, y + 1e-6),
        baked_units: 1e6,
        pooled_at: None,
    }
}
