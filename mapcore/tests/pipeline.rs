use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use web_time::Duration;

use mapcore::building::{BuildingHooks, BuildingId, BuildingState, FootprintSource, OsmData};
use mapcore::map::{GeoRect, WrappedRect};
use mapcore::{FrameReport, GeoPoint, MapConfig, MapSystem};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serves a block of buildings around the requested area's center and
/// counts the calls
struct BlockSource {
    calls: Arc<AtomicUsize>,
}

impl FootprintSource for BlockSource {
    fn fetch(&self, area: &GeoRect) -> anyhow::Result<OsmData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let c = area.center();
        Ok(block(c.lng, c.lat))
    }
}

struct DownSource;

impl FootprintSource for DownSource {
    fn fetch(&self, _area: &GeoRect) -> anyhow::Result<OsmData> {
        anyhow::bail!("503 from overpass")
    }
}

fn block(lng: f64, lat: f64) -> OsmData {
    let d = 0.0001;
    let square = |id: i64, cx: f64, tags: serde_json::Value| {
        serde_json::json!({
            "nodes": [
                { "id": id * 10 + 1, "lng": cx - d, "lat": lat - d },
                { "id": id * 10 + 2, "lng": cx + d, "lat": lat - d },
                { "id": id * 10 + 3, "lng": cx + d, "lat": lat + d },
                { "id": id * 10 + 4, "lng": cx - d, "lat": lat + d }
            ],
            "ways": [{
                "id": id,
                "nodes": [id * 10 + 1, id * 10 + 2, id * 10 + 3, id * 10 + 4, id * 10 + 1],
                "tags": tags
            }]
        })
    };
    let parts = [
        square(1, lng, serde_json::json!({ "building": "yes", "height": "30" })),
        square(2, lng + 0.0005, serde_json::json!({ "building": "yes", "roof:shape": "dome" })),
        // collinear sliver: dropped during cleanup
        serde_json::json!({
            "nodes": [
                { "id": 31, "lng": lng, "lat": lat + 0.0005 },
                { "id": 32, "lng": lng + 0.0001, "lat": lat + 0.0005 },
                { "id": 33, "lng": lng + 0.0002, "lat": lat + 0.0005 }
            ],
            "ways": [{ "id": 3, "nodes": [31, 32, 33, 31], "tags": { "building": "yes" } }]
        }),
    ];

    let mut data = OsmData::default();
    for part in parts {
        let part: OsmData = serde_json::from_value(part).unwrap();
        data.nodes.extend(part.nodes);
        data.ways.extend(part.ways);
    }
    data
}

fn config() -> MapConfig {
    let mut config = MapConfig::default();
    config.view.center = GeoPoint::new(2.3522, 48.8566);
    config.view.zoom = 18.0;
    config.buildings.bake_budget_ms = 100;
    config
}

fn run_until(system: &mut MapSystem, done: impl Fn(&FrameReport, &MapSystem) -> bool) -> bool {
    for _ in 0..500 {
        let report = system.update(Duration::from_millis(16));
        if done(&report, system) {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    false
}

#[test]
fn test_buildings_load_and_bake() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut system = MapSystem::new(&config()).with_source(BlockSource { calls: calls.clone() });

    assert!(run_until(&mut system, |_, s| s.buildings().active_count() == 2));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let buildings = system.buildings();
    let tall = buildings.get(&BuildingId::Way(1)).unwrap();
    assert_eq!(tall.heights.total, 30.0);
    assert_eq!(tall.state, BuildingState::Active);
    let dome = buildings.get(&BuildingId::Way(2)).unwrap();
    assert!(dome.heights.roof > 0.0);
    assert!(buildings.get(&BuildingId::Way(3)).is_none());

    let visible = system.visible_buildings();
    assert_eq!(visible.len(), 2);
    for (building, placement) in visible {
        assert!(!building.mesh.has_errors);
        assert!(placement.offset[0] > 0.0 && placement.offset[0] < 1024.0);
    }
}

#[test]
fn test_zooming_out_pools_buildings() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut system = MapSystem::new(&config()).with_source(BlockSource { calls });
    assert!(run_until(&mut system, |_, s| s.buildings().active_count() == 2));

    // below the buildings zoom range everything leaves the viewport
    system.zoom(-3.0);
    let report = system.update(Duration::from_millis(16));
    assert_eq!(report.buildings.pooled, 2);
    assert_eq!(system.buildings().active_count(), 0);

    system.zoom(3.0);
    let report = system.update(Duration::from_millis(16));
    assert_eq!(report.buildings.activated, 2);

    // zoomed placement keeps meshes proportional
    system.zoom(1.0);
    system.update(Duration::from_millis(16));
    for (_, placement) in system.visible_buildings() {
        assert!((placement.scale - 2.0).abs() < 1e-9);
    }
}

#[test]
fn test_moving_far_requests_again() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut system =
        MapSystem::new(&config()).with_source(BlockSource { calls: calls.clone() });
    assert!(run_until(&mut system, |_, s| s.buildings().active_count() == 2));

    let before = system.view().bounds().geo;
    system.view_mut().set_center(GeoPoint::new(2.4, 48.8566));
    assert!(run_until(&mut system, |_, s| s.buildings().active_count() == 2
        && s.buildings().pooled_count() == 0));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!before.intersects(&system.view().bounds().geo));
}

#[test]
fn test_source_failure_is_not_fatal() {
    init_logging();
    let mut system = MapSystem::new(&config()).with_source(DownSource);
    assert!(run_until(&mut system, |r, _| r.buildings.failed_requests == 1));
    assert_eq!(system.buildings().active_count(), 0);
}

#[test]
fn test_hooks_reach_the_pipeline() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let hooks = BuildingHooks::default()
        .with_filter(|c| c.id != BuildingId::Way(2))
        .with_height(|_| Some(50.0));
    let mut system = MapSystem::new(&config())
        .with_hooks(hooks)
        .with_source(BlockSource { calls });

    assert!(run_until(&mut system, |_, s| s.buildings().active_count() == 1));
    // the height tag wins over the generator
    let building = system.buildings().get(&BuildingId::Way(1)).unwrap();
    assert_eq!(building.heights.total, 30.0);
}
