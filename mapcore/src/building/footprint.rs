//! Footprint polygon cleanup and planar polygon measures.
//!
//! Points are `[x, z]` in local scene units, z growing south.

use serde::{Deserialize, Serialize};

use crate::map::coords::wrap_delta;

/// Fewest vertices a footprint may keep
pub const MIN_POINTS: usize = 3;

/// Points closer than this are the same point
const COINCIDENT_EPSILON: f64 = 1e-9;

/// How wall winding is decided
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindingRule {
    /// Sign of the shoelace area
    #[default]
    SignedArea,
    /// Turn direction at the southmost vertex. Cheaper, but unreliable on
    /// self-intersecting footprints.
    SouthmostVertex,
}

/// Clean `points` into `out`: drop the closing duplicate, coincident points
/// and vertices where the outline turns by less than `min_angle` degrees.
///
/// Returns false when fewer than three points survive.
pub fn cleanup_into(points: &[[f64; 2]], min_angle: f64, out: &mut Vec<[f64; 2]>) -> bool {
    out.clear();
    out.extend_from_slice(points);
    if out.len() >= 2 && coincident(out[0], out[out.len() - 1]) {
        out.pop();
    }

    loop {
        let mut removed = false;
        let mut i = 0;
        while i < out.len() && out.len() >= MIN_POINTS {
            let n = out.len();
            let prev = out[(i + n - 1) % n];
            let cur = out[i];
            let next = out[(i + 1) % n];

            if coincident(prev, cur) || turn_angle(prev, cur, next).abs() < min_angle {
                out.remove(i);
                removed = true;
            } else {
                i += 1;
            }
        }
        if !removed || out.len() < MIN_POINTS {
            break;
        }
    }

    out.len() >= MIN_POINTS
}

/// Allocating variant of `cleanup_into`
pub fn cleanup(points: &[[f64; 2]], min_angle: f64) -> Option<Vec<[f64; 2]>> {
    let mut out = Vec::with_capacity(points.len());
    cleanup_into(points, min_angle, &mut out).then_some(out)
}

/// Signed turn in degrees when walking prev -> cur -> next
fn turn_angle(prev: [f64; 2], cur: [f64; 2], next: [f64; 2]) -> f64 {
    let a_in = (cur[1] - prev[1]).atan2(cur[0] - prev[0]).to_degrees();
    let a_out = (next[1] - cur[1]).atan2(next[0] - cur[0]).to_degrees();
    wrap_delta(a_out - a_in, 360.0)
}

fn coincident(a: [f64; 2], b: [f64; 2]) -> bool {
    (a[0] - b[0]).abs() < COINCIDENT_EPSILON && (a[1] - b[1]).abs() < COINCIDENT_EPSILON
}

/// Shoelace area, positive when x -> z turns counter-clockwise on paper
pub fn signed_area(points: &[[f64; 2]]) -> f64 {
    let n = points.len();
    let mut sum = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        sum += a[0] * b[1] - b[0] * a[1];
    }
    sum / 2.0
}

/// Whether the outline has positive orientation under `rule`
pub fn is_positive(points: &[[f64; 2]], rule: WindingRule) -> bool {
    match rule {
        WindingRule::SignedArea => signed_area(points) > 0.0,
        WindingRule::SouthmostVertex => southmost_turn(points) < 0.0,
    }
}

/// Angle between the edges around the southmost vertex (largest z, then
/// largest x)
fn southmost_turn(points: &[[f64; 2]]) -> f64 {
    let n = points.len();
    let Some(i) = (0..n).max_by(|&a, &b| {
        let (pa, pb) = (points[a], points[b]);
        pa[1].total_cmp(&pb[1]).then(pa[0].total_cmp(&pb[0]))
    }) else {
        return 0.0;
    };
    let cur = points[i];
    let prev = points[(i + n - 1) % n];
    let next = points[(i + 1) % n];
    let a_in = (prev[1] - cur[1]).atan2(prev[0] - cur[0]).to_degrees();
    let a_out = (next[1] - cur[1]).atan2(next[0] - cur[0]).to_degrees();
    wrap_delta(a_out - a_in, 360.0)
}

/// Closed outline length
pub fn perimeter(points: &[[f64; 2]]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| distance(points[i], points[(i + 1) % n]))
        .sum()
}

pub fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (b[0] - a[0]).hypot(b[1] - a[1])
}

/// Average of the vertices
pub fn centroid(points: &[[f64; 2]]) -> [f64; 2] {
    if points.is_empty() {
        return [0.0, 0.0];
    }
    let (sx, sz) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sz), p| (sx + p[0], sz + p[1]));
    let n = points.len() as f64;
    [sx / n, sz / n]
}

/// `(min, max)` corners
pub fn bounds(points: &[[f64; 2]]) -> ([f64; 2], [f64; 2]) {
    let mut min = [f64::INFINITY, f64::INFINITY];
    let mut max = [f64::NEG_INFINITY, f64::NEG_INFINITY];
    for p in points {
        min = [min[0].min(p[0]), min[1].min(p[1])];
        max = [max[0].max(p[0]), max[1].max(p[1])];
    }
    (min, max)
}
