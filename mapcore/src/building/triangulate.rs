//! Roof triangulation via `geo`'s earcut

use geo::{Coord, LineString, Polygon, TriangulateEarcut};

use super::footprint::signed_area;

const AREA_EPSILON: f64 = 1e-12;
/// Relative slack when comparing covered area to outline area
const COVERAGE_TOLERANCE: f64 = 1e-6;

/// z component of (a - o) x (b - o) in the plane
fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

/// Triangulate `points` into `out`.
///
/// Indices refer to `points`. Triangles keep the winding of the input.
/// Returns false, with `out` cleared, when the outline has no area or the
/// triangles do not cover it (self-intersecting outlines).
pub fn triangulate_into(points: &[[f64; 2]], out: &mut Vec<[usize; 3]>) -> bool {
    out.clear();
    let n = points.len();
    let area = signed_area(points);
    if n < 3 || area.abs() < AREA_EPSILON {
        return false;
    }

    let ring: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p[0], y: p[1] }).collect();
    let polygon = Polygon::new(LineString::new(ring), vec![]);
    let raw = polygon.earcut_triangles_raw();

    let mut covered = 0.0;
    for t in raw.triangle_indices.chunks_exact(3) {
        if t.iter().any(|&i| i >= n) {
            out.clear();
            return false;
        }
        let twice = cross(points[t[0]], points[t[1]], points[t[2]]);
        if twice * area < 0.0 {
            out.push([t[0], t[2], t[1]]);
        } else {
            out.push([t[0], t[1], t[2]]);
        }
        covered += twice.abs() / 2.0;
    }

    if out.is_empty() || (covered - area.abs()).abs() > COVERAGE_TOLERANCE * area.abs() {
        out.clear();
        return false;
    }
    true
}

/// Allocating variant of `triangulate_into`
pub fn triangulate(points: &[[f64; 2]]) -> Option<Vec<[usize; 3]>> {
    let mut out = Vec::with_capacity(points.len().saturating_sub(2));
    triangulate_into(points, &mut out).then_some(out)
}
