//! Unstructured tetrahedral mesh universes.
//!
//! Each tetrahedron holds its own content; points outside every element fall
//! through to the background universe.

use nalgebra::{Matrix3, Point3};
use serde::Deserialize;

use crate::error::{GeometryError, Result};
use crate::search::{Aabb, SearchGrid};
use crate::settings::GEOMETRY_EPSILON;
use crate::universe::{Content, UniverseId};


#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TetElement {
    pub nodes: [usize; 4],
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TetMesh {
    pub vertices: Vec<[f64; 3]>,
    pub elements: Vec<TetElement>,
    pub background: UniverseId,
}

impl TetMesh {
    pub fn validate(&self, universe: &str) -> Result<()> {
        for (index, element) in self.elements.iter().enumerate() {
            if let Some(node) = element.nodes.iter().find(|&&n| n >= self.vertices.len()) {
                return Err(GeometryError::inconsistency(
                    universe,
                    format!(
                        "element {} refers to node {} of {}",
                        index,
                        node,
                        self.vertices.len()
                    ),
                ));
            }
            if self.volume_det(index).abs() < GEOMETRY_EPSILON {
                return Err(GeometryError::inconsistency(
                    universe,
                    format!("element {} is degenerate", index),
                ));
            }
        }
        Ok(())
    }

    #[inline]
    fn corner(&self, element: usize, k: usize) -> Point3<f64> {
        Point3::from(self.vertices[self.elements[element].nodes[k]])
    }

    fn volume_det(&self, element: usize) -> f64 {
        let a = self.corner(element, 0);
        Matrix3::from_columns(&[
            self.corner(element, 1) - a,
            self.corner(element, 2) - a,
            self.corner(element, 3) - a,
        ])
        .determinant()
    }

    pub fn bounding_boxes(&self) -> Vec<Aabb> {
        (0..self.elements.len())
            .filter_map(|e| Aabb::from_points((0..4).map(|k| self.corner(e, k))))
            .collect()
    }

    /// Signed sub-volumes with the point replacing each corner in turn, each
    /// multiplied by the element's own signed volume.
    #[inline]
    fn barycentric_signs(&self, element: usize, p: &Point3<f64>) -> [f64; 4] {
        let c = [0, 1, 2, 3].map(|k| self.corner(element, k));
        let orient = |a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>| {
            (b - a).cross(&(c - a)).dot(&(d - a))
        };
        let total = orient(&c[0], &c[1], &c[2], &c[3]);
        [
            orient(p, &c[1], &c[2], &c[3]) * total,
            orient(&c[0], p, &c[2], &c[3]) * total,
            orient(&c[0], &c[1], p, &c[3]) * total,
            orient(&c[0], &c[1], &c[2], p) * total,
        ]
    }

    /// Whether the point lies inside (or on the boundary of) an element.
    #[inline]
    pub fn contains(&self, element: usize, p: &Point3<f64>) -> bool {
        self.barycentric_signs(element, p).iter().all(|v| *v >= 0.0)
    }

    /// Whether the point lies inside an element and off all of its faces.
    ///
    /// A point on a shared face belongs to whichever element the grid search
    /// meets first, so only strictly interior points may reuse a cached element.
    #[inline]
    pub fn contains_strictly(&self, element: usize, p: &Point3<f64>) -> bool {
        self.barycentric_signs(element, p).iter().all(|v| *v > 0.0)
    }

    /// Element containing the point, searched through `grid`.
    #[inline]
    pub fn find(&self, grid: &SearchGrid, p: &Point3<f64>) -> Option<usize> {
        grid.candidates(p)
            .iter()
            .map(|&i| i as usize)
            .find(|&i| self.contains(i, p))
    }
}
