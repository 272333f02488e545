//! Headless run of the map core: drag a view over a block of buildings and
//! report what gets baked.
//!
//! Usage: `mapcore-demo [config.json] [buildings.json]`

use std::collections::HashMap;

use anyhow::Context;
use log::info;
use mapcore::building::osm::{OsmNode, OsmWay};
use mapcore::building::{JsonFileSource, OsmData};
use mapcore::{GeoPoint, MapConfig, MapSystem};
use web_time::Duration;

/// A grid of small rectangular buildings around `center`
fn synthetic_block(center: GeoPoint, rows: i64, cols: i64) -> OsmData {
    let mut data = OsmData::default();
    let step = 0.0004;
    let half = 0.00012;
    for r in 0..rows {
        for c in 0..cols {
            let id = r * cols + c + 1;
            let lng = center.lng + (c - cols / 2) as f64 * step;
            let lat = center.lat + (r - rows / 2) as f64 * step;
            let corners = [(-half, -half), (half, -half), (half, half), (-half, half)];
            let first = id * 10;
            for (i, (dx, dy)) in corners.iter().enumerate() {
                data.nodes.push(OsmNode { id: first + i as i64, lng: lng + dx, lat: lat + dy });
            }
            let mut tags = HashMap::from([("building".to_string(), "yes".to_string())]);
            if id % 3 == 0 {
                tags.insert("roof:shape".into(), "dome".into());
            }
            if id % 2 == 0 {
                tags.insert("building:levels".into(), (2 + id % 5).to_string());
            }
            data.ways.push(OsmWay {
                id,
                nodes: vec![first, first + 1, first + 2, first + 3, first],
                tags,
            });
        }
    }
    data
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => MapConfig::load(&path)?,
        None => {
            let mut config = MapConfig::default();
            config.view.center = GeoPoint::new(126.978, 37.5665);
            config.view.zoom = 18.0;
            config
        }
    };

    let system = MapSystem::new(&config);
    let mut system = match args.next() {
        Some(path) => system.with_source(JsonFileSource::new(path)),
        None => system.with_source(synthetic_block(config.view.center, 6, 6)),
    };

    let frame = Duration::from_millis(16);
    let mut time = 0.0;
    for step in 0..120 {
        if (20..30).contains(&step) {
            system.drag(time, -12.0, 4.0);
        } else if step == 30 {
            system.release();
        }

        let report = system.update(frame);
        if report.needs_redraw() {
            log::debug!("frame {}: {:?}", step, report);
        }
        time += frame.as_secs_f64();
        // give the loader thread a moment on the first frames
        if step < 5 {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    let view = system.view();
    let center = view.center();
    info!("center ({:.6}, {:.6}) zoom {:.2}", center.lng, center.lat, view.zoom());

    let buildings = system.buildings();
    let stats = buildings.pool_stats();
    info!(
        "{} active, {} pooled ({} bytes), {} pending",
        buildings.active_count(),
        stats.pooled,
        stats.memory_used,
        buildings.pending_count()
    );

    let visible = system.visible_buildings();
    let triangles: usize = visible
        .iter()
        .map(|(b, _)| b.mesh.wall_triangle_count() + b.mesh.roof_triangle_count())
        .sum();
    let (building, placement) = visible.first().context("no buildings in view")?;
    info!(
        "{} triangles in view; {} at {:?} x{:.3}, {:.1} m tall",
        triangles, building.id, placement.offset, placement.scale, building.heights.total
    );

    Ok(())
}
