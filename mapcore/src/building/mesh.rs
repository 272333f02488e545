//! Wall and roof mesh baking
//!
//! Meshes are y-up. Horizontal positions are `[x, z]` in local scene units
//! relative to the building center, triangles wind counter-clockwise when
//! seen from outside.

use bytemuck::{Pod, Zeroable};

use super::footprint::{self, WindingRule};
use super::tags::{HeightProfile, RoofKind};
use super::triangulate::triangulate_into;
use crate::config::BuildingConfig;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BuildingVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl BuildingVertex {
    fn new(x: f64, y: f64, z: f64, u: f64, v: f64) -> Self {
        Self {
            position: [x as f32, y as f32, z as f32],
            uv: [u as f32, v as f32],
        }
    }
}

/// A baked building: one vertex buffer, two submeshes
#[derive(Clone, Debug, Default)]
pub struct BuildingMesh {
    pub vertices: Vec<BuildingVertex>,
    pub wall_indices: Vec<u32>,
    pub roof_indices: Vec<u32>,
    /// Footprint outline length in scene units
    pub perimeter: f64,
    /// Wall texture repeats along the perimeter and up
    pub material_scale: [f64; 2],
    /// `(min, max)` of the vertex positions
    pub bounds: ([f64; 3], [f64; 3]),
    /// Footprint center in local scene units, the origin of `vertices`
    pub center: [f64; 2],
    pub has_errors: bool,
}

impl BuildingMesh {
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn wall_index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.wall_indices)
    }

    pub fn roof_index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.roof_indices)
    }

    pub fn wall_triangle_count(&self) -> usize {
        self.wall_indices.len() / 3
    }

    pub fn roof_triangle_count(&self) -> usize {
        self.roof_indices.len() / 3
    }
}

/// Per-build scale factors
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshScale {
    /// Horizontal scene units per meter at the building's latitude
    pub units_per_meter: f64,
    /// Vertical scene units per meter
    pub height_units: f64,
}

impl MeshScale {
    pub fn uniform(units_per_meter: f64) -> Self {
        Self { units_per_meter, height_units: units_per_meter }
    }
}

/// Intermediate buffers kept between builds
#[derive(Default)]
struct MeshScratch {
    cleaned: Vec<[f64; 2]>,
    relative: Vec<[f64; 2]>,
    triangles: Vec<[usize; 3]>,
}

pub type CenterFn<'a> = &'a dyn Fn(&[[f64; 2]]) -> [f64; 2];

/// Turns footprints into meshes, reusing its scratch buffers.
pub struct BuildingGenerator {
    collinear_angle: f64,
    winding: WindingRule,
    wall_texture_size: [f64; 2],
    scratch: MeshScratch,
}

impl BuildingGenerator {
    pub fn new(config: &BuildingConfig) -> Self {
        Self {
            collinear_angle: config.collinear_angle,
            winding: config.winding,
            wall_texture_size: config.wall_texture_size,
            scratch: MeshScratch::default(),
        }
    }

    /// Bake a footprint given in local scene units.
    ///
    /// Returns `None` when fewer than three usable points remain after
    /// cleanup. `center` overrides the vertex-average center.
    pub fn build(
        &mut self,
        footprint: &[[f64; 2]],
        heights: &HeightProfile,
        scale: MeshScale,
        center: Option<CenterFn<'_>>,
    ) -> Option<BuildingMesh> {
        let s = &mut self.scratch;
        if !footprint::cleanup_into(footprint, self.collinear_angle, &mut s.cleaned) {
            return None;
        }

        let center = match center {
            Some(f) => f(&s.cleaned),
            None => footprint::centroid(&s.cleaned),
        };
        s.relative.clear();
        s.relative
            .extend(s.cleaned.iter().map(|p| [p[0] - center[0], p[1] - center[1]]));
        let points = &s.relative;

        let wall_top = heights.wall * scale.height_units;
        let perimeter = footprint::perimeter(points);
        let n = points.len();

        let mut mesh = BuildingMesh {
            vertices: Vec::with_capacity(n * 5 + 1),
            wall_indices: Vec::with_capacity(n * 6),
            roof_indices: Vec::with_capacity(n * 3),
            perimeter,
            center,
            ..Default::default()
        };

        // walls
        let positive = footprint::is_positive(points, self.winding);
        let mut walked = 0.0;
        for i in 0..n {
            let a = points[i];
            let b = points[(i + 1) % n];
            let u0 = walked / perimeter;
            walked += footprint::distance(a, b);
            let u1 = walked / perimeter;

            let k = mesh.vertices.len() as u32;
            mesh.vertices.extend([
                BuildingVertex::new(a[0], 0.0, a[1], u0, 0.0),
                BuildingVertex::new(a[0], wall_top, a[1], u0, 1.0),
                BuildingVertex::new(b[0], wall_top, b[1], u1, 1.0),
                BuildingVertex::new(b[0], 0.0, b[1], u1, 0.0),
            ]);
            if positive {
                mesh.wall_indices.extend([k, k + 1, k + 2, k, k + 2, k + 3]);
            } else {
                mesh.wall_indices.extend([k, k + 2, k + 1, k, k + 3, k + 2]);
            }
        }

        // roof
        let (min, max) = footprint::bounds(points);
        let span = [(max[0] - min[0]).max(f64::EPSILON), (max[1] - min[1]).max(f64::EPSILON)];
        let roof_uv = |p: [f64; 2]| ((p[0] - min[0]) / span[0], (p[1] - min[1]) / span[1]);

        let first = mesh.vertices.len() as u32;
        for &p in points.iter() {
            let (u, v) = roof_uv(p);
            mesh.vertices.push(BuildingVertex::new(p[0], wall_top, p[1], u, v));
        }

        match heights.roof_kind {
            RoofKind::Flat => {
                if triangulate_into(points, &mut s.triangles) {
                    for t in &s.triangles {
                        let [a, b, c] = t.map(|i| first + i as u32);
                        push_upward(&mut mesh, [a, b, c]);
                    }
                }
            }
            RoofKind::Dome => {
                let c = footprint::centroid(points);
                let (u, v) = roof_uv(c);
                let apex = mesh.vertices.len() as u32;
                let apex_y = wall_top + heights.roof * scale.height_units;
                mesh.vertices.push(BuildingVertex::new(c[0], apex_y, c[1], u, v));
                for i in 0..n as u32 {
                    let j = (i + 1) % n as u32;
                    push_upward(&mut mesh, [apex, first + i, first + j]);
                }
            }
        }

        mesh.has_errors = mesh.roof_indices.is_empty();
        mesh.bounds = vertex_bounds(&mesh.vertices);

        let meters = if scale.units_per_meter > 0.0 {
            perimeter / scale.units_per_meter
        } else {
            0.0
        };
        mesh.material_scale = [
            meters / self.wall_texture_size[0],
            heights.wall / self.wall_texture_size[1],
        ];

        Some(mesh)
    }
}

/// Push a roof triangle, flipped if its normal points down
fn push_upward(mesh: &mut BuildingMesh, [a, b, c]: [u32; 3]) {
    let pa = mesh.vertices[a as usize].position;
    let pb = mesh.vertices[b as usize].position;
    let pc = mesh.vertices[c as usize].position;
    let e1 = [pb[0] - pa[0], pb[2] - pa[2]];
    let e2 = [pc[0] - pa[0], pc[2] - pa[2]];
    let normal_y = e1[1] * e2[0] - e1[0] * e2[1];
    if normal_y < 0.0 {
        mesh.roof_indices.extend([a, c, b]);
    } else {
        mesh.roof_indices.extend([a, b, c]);
    }
}

fn vertex_bounds(vertices: &[BuildingVertex]) -> ([f64; 3], [f64; 3]) {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for v in vertices {
        for axis in 0..3 {
            let p = v.position[axis] as f64;
            min[axis] = min[axis].min(p);
            max[axis] = max[axis].max(p);
        }
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SQUARE: [[f64; 2]; 4] = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];

    fn flat(wall: f64) -> HeightProfile {
        HeightProfile { total: wall, wall, roof: 0.0, roof_kind: RoofKind::Flat }
    }

    fn generator() -> BuildingGenerator {
        BuildingGenerator::new(&BuildingConfig::default())
    }

    fn normal(mesh: &BuildingMesh, tri: &[u32]) -> [f32; 3] {
        let p = |i: u32| mesh.vertices[i as usize].position;
        let (a, b, c) = (p(tri[0]), p(tri[1]), p(tri[2]));
        let e1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let e2 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        [
            e1[1] * e2[2] - e1[2] * e2[1],
            e1[2] * e2[0] - e1[0] * e2[2],
            e1[0] * e2[1] - e1[1] * e2[0],
        ]
    }

    #[test]
    fn test_square_walls() {
        let mesh = generator()
            .build(&SQUARE, &flat(12.0), MeshScale::uniform(1.0), None)
            .unwrap();
        assert_eq!(mesh.wall_triangle_count(), 8);
        assert_eq!(mesh.roof_triangle_count(), 2);
        // 16 wall vertices plus the 4 roof corners
        assert_eq!(mesh.vertices.len(), 20);
        assert_eq!(mesh.perimeter, 40.0);
        assert_eq!(mesh.center, [5.0, 5.0]);
        assert!(!mesh.has_errors);
        assert_eq!(mesh.bounds, ([-5.0, 0.0, -5.0], [5.0, 12.0, 5.0]));
    }

    #[test]
    fn test_wall_uvs_follow_perimeter() {
        let mesh = generator()
            .build(&SQUARE, &flat(12.0), MeshScale::uniform(1.0), None)
            .unwrap();
        let us: Vec<f32> = mesh.vertices[..16].iter().map(|v| v.uv[0]).collect();
        assert_eq!(&us[..4], &[0.0, 0.0, 0.25, 0.25]);
        assert_eq!(&us[12..], &[0.75, 0.75, 1.0, 1.0]);
        assert_eq!(mesh.vertices[1].uv[1], 1.0);
        assert_eq!(mesh.vertices[0].uv[1], 0.0);
        assert_abs_diff_eq!(mesh.material_scale[0], 4.0);
        assert_abs_diff_eq!(mesh.material_scale[1], 1.2);
    }

    #[test]
    fn test_normals_face_out_and_up() {
        for footprint in [SQUARE.to_vec(), SQUARE.iter().rev().copied().collect()] {
            let mesh = generator()
                .build(&footprint, &flat(12.0), MeshScale::uniform(1.0), None)
                .unwrap();
            for tri in mesh.wall_indices.chunks(3) {
                let n = normal(&mesh, tri);
                let mid = tri
                    .iter()
                    .map(|&i| mesh.vertices[i as usize].position)
                    .fold([0.0; 3], |acc, p| [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]]);
                // outward: normal points away from the center
                assert!(n[0] * mid[0] + n[2] * mid[2] > 0.0);
            }
            for tri in mesh.roof_indices.chunks(3) {
                assert!(normal(&mesh, tri)[1] > 0.0);
            }
        }
    }

    #[test]
    fn test_dome_roof() {
        let heights =
            HeightProfile { total: 17.0, wall: 12.0, roof: 5.0, roof_kind: RoofKind::Dome };
        let mesh = generator()
            .build(&SQUARE, &heights, MeshScale::uniform(1.0), None)
            .unwrap();
        assert_eq!(mesh.roof_triangle_count(), 4);
        let apexes: Vec<_> = mesh.vertices.iter().filter(|v| v.position[1] == 17.0).collect();
        assert_eq!(apexes.len(), 1);
        let apex = apexes[0].position;
        assert_eq!(
            [apex[0] as f64 + mesh.center[0], apex[2] as f64 + mesh.center[1]],
            [5.0, 5.0]
        );
        for tri in mesh.roof_indices.chunks(3) {
            assert!(normal(&mesh, tri)[1] > 0.0);
        }
    }

    #[test]
    fn test_degenerate_footprints() {
        let mut generator = generator();
        let scale = MeshScale::uniform(1.0);
        assert!(generator.build(&[[0.0, 0.0], [1.0, 1.0]], &flat(5.0), scale, None).is_none());
        assert!(
            generator
                .build(&[[0.0, 0.0], [5.0, 0.0], [10.0, 0.0]], &flat(5.0), scale, None)
                .is_none()
        );
    }

    #[test]
    fn test_self_intersecting_roof_flags_errors() {
        // bow tie: the lobes cancel out
        let bow = [[0.0, 0.0], [10.0, 10.0], [10.0, 0.0], [0.0, 10.0]];
        let mesh = generator()
            .build(&bow, &flat(5.0), MeshScale::uniform(1.0), None)
            .unwrap();
        assert!(mesh.has_errors);
    }

    #[test]
    fn test_center_override_and_scale() {
        let corner = |_: &[[f64; 2]]| [0.0, 0.0];
        let mesh = generator()
            .build(
                &SQUARE,
                &flat(12.0),
                MeshScale { units_per_meter: 2.0, height_units: 0.5 },
                Some(&corner),
            )
            .unwrap();
        assert_eq!(mesh.center, [0.0, 0.0]);
        assert_eq!(mesh.bounds.1, [10.0, 6.0, 10.0]);
        assert_abs_diff_eq!(mesh.material_scale[0], 2.0);
    }

    #[test]
    fn test_byte_views() {
        let mesh = generator()
            .build(&SQUARE, &flat(12.0), MeshScale::uniform(1.0), None)
            .unwrap();
        assert_eq!(mesh.vertex_bytes().len(), mesh.vertices.len() * 20);
        assert_eq!(mesh.wall_index_bytes().len(), 24 * 4);
    }
}
