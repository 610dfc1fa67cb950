//! Solids bounded by closed triangulated surfaces.
//!
//! A point is inside a solid when a ray cast from it crosses the surface an
//! odd number of times. The ray direction is fixed and deliberately skewed
//! off the coordinate axes so that it rarely grazes edges of axis-aligned
//! meshes.

use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::path::Path;

use crate::error::{GeometryError, Result};
use crate::search::{Aabb, SearchGrid};
use crate::universe::{Content, UniverseId};

/// Minimum ray parameter for a crossing to count.
const RAY_EPSILON: f64 = 1e-12;

#[cfg(test)]
mod tests {
    use super::*;

    /// Closed axis-aligned cube `[lo, hi]^3` as twelve triangles.
    fn cube(lo: f64, hi: f64) -> Vec<[[f64; 3]; 3]> {
        let v = |x: usize, y: usize, z: usize| {
            [
                if x == 1 { hi } else { lo },
                if y == 1 { hi } else { lo },
                if z == 1 { hi } else { lo },
            ]
        };
        let quads = [
            [v(0, 0, 0), v(0, 1, 0), v(1, 1, 0), v(1, 0, 0)],
            [v(0, 0, 1), v(1, 0, 1), v(1, 1, 1), v(0, 1, 1)],
            [v(0, 0, 0), v(1, 0, 0), v(1, 0, 1), v(0, 0, 1)],
            [v(0, 1, 0), v(0, 1, 1), v(1, 1, 1), v(1, 1, 0)],
            [v(0, 0, 0), v(0, 0, 1), v(0, 1, 1), v(0, 1, 0)],
            [v(1, 0, 0), v(1, 1, 0), v(1, 1, 1), v(1, 0, 1)],
        ];
        quads
            .iter()
            .flat_map(|q| [[q[0], q[1], q[2]], [q[0], q[2], q[3]]])
            .collect()
    }

    #[test]
    fn cube_parity() {
        let solid = Solid {
            name: "cube".to_string(),
            triangles: cube(-1.0, 1.0),
            content: Content::Void,
        };
        assert!(solid.contains(&Point3::new(0.0, 0.0, 0.0)));
        assert!(solid.contains(&Point3::new(0.9, -0.9, 0.5)));
        assert!(!solid.contains(&Point3::new(1.5, 0.0, 0.0)));
        assert!(!solid.contains(&Point3::new(-3.0, -3.0, -3.0)));
    }

    #[test]
    fn nested_solids_first_match_wins() {
        let set = SolidSet {
            solids: vec![
                Solid {
                    name: "inner".to_string(),
                    triangles: cube(-0.5, 0.5),
                    content: Content::material(0),
                },
                Solid {
                    name: "outer".to_string(),
                    triangles: cube(-2.0, 2.0),
                    content: Content::material(1),
                },
            ],
            background: UniverseId(0),
        };
        let grid = SearchGrid::build(&set.bounding_boxes());
        assert_eq!(set.find(&grid, &Point3::new(0.1, 0.1, 0.1)), Some(0));
        assert_eq!(set.find(&grid, &Point3::new(1.0, 0.1, 0.1)), Some(1));
        assert_eq!(set.find(&grid, &Point3::new(3.0, 0.1, 0.1)), None);
    }

    #[test]
    fn load_obj_cube() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.obj");
        let mut text = String::from("o box\n");
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    text.push_str(&format!("v {} {} {}\n", x, y, z));
                }
            }
        }
        // vertex k = 4 * ix + 2 * iy + iz + 1
        for face in [
            "1 3 4 2", "5 6 8 7", "1 2 6 5", "3 7 8 4", "1 5 7 3", "2 4 8 6",
        ] {
            text.push_str(&format!("f {}\n", face));
        }
        std::fs::write(&path, text).unwrap();

        let solids = Solid::from_obj(&path, Content::material(0)).unwrap();
        assert_eq!(solids.len(), 1);
        assert_eq!(solids[0].triangles.len(), 12);
        assert!(solids[0].contains(&Point3::new(0.2, 0.3, -0.4)));
        assert!(!solids[0].contains(&Point3::new(0.2, 1.3, -0.4)));
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Solid {
    pub name: String,
    pub triangles: Vec<[[f64; 3]; 3]>,
    pub content: Content,
}

impl Solid {
    /// Loads every object of a Wavefront OBJ file as a solid with the given content.
    pub fn from_obj(path: impl AsRef<Path>, content: Content) -> Result<Vec<Solid>> {
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let (models, _) = tobj::load_obj(path.as_ref(), &options)
            .map_err(|e| GeometryError::Parse(format!("{}: {}", path.as_ref().display(), e)))?;

        let solids = models
            .iter()
            .map(|model| {
                let mesh = &model.mesh;
                let vertex = |i: u32| {
                    let i = i as usize * 3;
                    [
                        mesh.positions[i] as f64,
                        mesh.positions[i + 1] as f64,
                        mesh.positions[i + 2] as f64,
                    ]
                };
                let triangles = mesh
                    .indices
                    .chunks_exact(3)
                    .map(|t| [vertex(t[0]), vertex(t[1]), vertex(t[2])])
                    .collect();
                Solid {
                    name: model.name.clone(),
                    triangles,
                    content: content.clone(),
                }
            })
            .collect();

        Ok(solids)
    }

    pub fn bounding_box(&self) -> Option<Aabb> {
        Aabb::from_points(
            self.triangles
                .iter()
                .flat_map(|t| t.iter().map(|v| Point3::from(*v))),
        )
    }

    /// Ray-parity point-in-solid test.
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        let dir = Vector3::new(0.577_215_664_9, 0.618_033_988_7, 0.533_956_165_3);
        let crossings = self
            .triangles
            .iter()
            .filter(|t| ray_hits_triangle(p, &dir, t))
            .count();
        crossings % 2 == 1
    }
}

/// Möller–Trumbore ray/triangle test for crossings ahead of the origin.
#[inline]
fn ray_hits_triangle(origin: &Point3<f64>, dir: &Vector3<f64>, tri: &[[f64; 3]; 3]) -> bool {
    let v0 = Point3::from(tri[0]);
    let e1 = Point3::from(tri[1]) - v0;
    let e2 = Point3::from(tri[2]) - v0;

    let h = dir.cross(&e2);
    let a = e1.dot(&h);
    if a.abs() < f64::EPSILON {
        return false;
    }
    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let q = s.cross(&e1);
    let v = f * dir.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    f * e2.dot(&q) > RAY_EPSILON
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SolidSet {
    pub solids: Vec<Solid>,
    pub background: UniverseId,
}

impl SolidSet {
    pub fn validate(&self, universe: &str) -> Result<()> {
        match self.solids.iter().find(|s| s.triangles.len() < 4) {
            Some(solid) => Err(GeometryError::inconsistency(
                universe,
                format!("solid '{}' cannot be closed with {} triangles", solid.name, solid.triangles.len()),
            )),
            None => Ok(()),
        }
    }

    /// Bounding boxes of every solid, in solid order.
    pub fn bounding_boxes(&self) -> Vec<Aabb> {
        self.solids
            .iter()
            .map(|s| {
                s.bounding_box()
                    .unwrap_or_else(|| Aabb::new(Point3::origin(), Point3::origin()))
            })
            .collect()
    }

    /// First solid containing the point, searched through `grid`.
    #[inline]
    pub fn find(&self, grid: &SearchGrid, p: &Point3<f64>) -> Option<usize> {
        grid.candidates(p)
            .iter()
            .map(|&i| i as usize)
            .find(|&i| self.solids[i].contains(p))
    }
}
