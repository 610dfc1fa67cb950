//! Lattice payloads and the lattice region finder.
//!
//! A lattice tiles space into indexed elements. [`Lattice::find_region`] maps a
//! point in the lattice frame to the element containing it, recentres the
//! point into that element's frame and, when asked, publishes the surface
//! bounding the element.
//!
//! # Centering
//!
//! Finite lattices are centred on their origin. Along an axis with an odd
//! element count the origin sits at the centre of the middle element; with an
//! even count every cell centre is shifted by half a pitch so that the origin
//! falls on a boundary between two elements.

use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::f64::consts::PI;

use crate::surface::{HexOrientation, Surface};
use crate::transform::{normalise_angle, Transform};
use crate::universe::UniverseId;

const SIN60: f64 = 0.866_025_403_784_438_6;
const COS60: f64 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice(kind: LatticeKind) -> Lattice {
        let count = kind.element_count();
        Lattice::new(
            kind,
            [0.0; 3],
            (0..count).map(|i| Some(UniverseId(i))).collect(),
            vec![],
        )
    }

    fn locate(lat: &Lattice, x: f64, y: f64, z: f64) -> Option<(usize, Point3<f64>)> {
        let mut pos = Point3::new(x, y, z);
        lat.find_region(&mut pos, None).map(|idx| (idx, pos))
    }

    #[test]
    fn square_pitch_126() {
        let lat = lattice(LatticeKind::Square {
            nx: 3,
            ny: 3,
            pitch: 1.26,
        });
        // one pitch along x from the centre: column +1, row 0
        let (idx, local) = locate(&lat, 1.26, 0.0, 0.0).unwrap();
        assert_eq!(idx, 2 + 3);
        assert!(local.coords.norm() < 1e-12);

        assert_eq!(locate(&lat, 10.0, 10.0, 0.0), None);
    }

    #[test]
    fn square_publishes_surface() {
        let lat = lattice(LatticeKind::Square {
            nx: 3,
            ny: 3,
            pitch: 2.0,
        });
        let mut pos = Point3::new(-1.5, 2.5, 7.0);
        let mut surface = None;
        let idx = lat.find_region(&mut pos, Some(&mut surface)).unwrap();
        assert_eq!(idx, 2 * 3);
        assert_eq!(
            surface,
            Some(Surface::SquarePrism {
                centre: [-2.0, 2.0],
                half_width: 1.0
            })
        );
        assert!((pos - Point3::new(0.5, 0.5, 7.0)).norm() < 1e-12);
    }

    #[test]
    fn even_count_puts_origin_on_boundary() {
        let even = lattice(LatticeKind::Square {
            nx: 2,
            ny: 2,
            pitch: 1.0,
        });
        let (_, local) = locate(&even, 0.0, 0.0, 0.0).unwrap();
        assert!((local.x.abs() - 0.5).abs() < 1e-12);
        assert!((local.y.abs() - 0.5).abs() < 1e-12);

        let odd = lattice(LatticeKind::Square {
            nx: 3,
            ny: 3,
            pitch: 1.0,
        });
        let (idx, local) = locate(&odd, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(idx, 4);
        assert!(local.coords.norm() < 1e-12);
    }

    #[test]
    fn even_count_covers_both_halves() {
        let lat = lattice(LatticeKind::Square {
            nx: 2,
            ny: 1,
            pitch: 1.0,
        });
        assert_eq!(locate(&lat, -0.25, 0.0, 0.0).unwrap().0, 0);
        assert_eq!(locate(&lat, 0.25, 0.0, 0.0).unwrap().0, 1);
        assert_eq!(locate(&lat, -0.99, 0.0, 0.0).unwrap().0, 0);
        assert_eq!(locate(&lat, 1.01, 0.0, 0.0), None);
    }

    #[test]
    fn vertical_stack() {
        let lat = lattice(LatticeKind::Stack {
            boundaries: vec![0.0, 10.0, 20.0, 30.0],
        });
        let (idx, local) = locate(&lat, 3.0, 4.0, 15.0).unwrap();
        assert_eq!(idx, 1);
        assert!((local.z - 5.0).abs() < 1e-12);
        assert_eq!(local.x, 3.0);

        assert_eq!(locate(&lat, 0.0, 0.0, -1.0), None);
        // the last layer is open above
        assert_eq!(locate(&lat, 0.0, 0.0, 1e3).unwrap().0, 3);
    }

    #[test]
    fn hex_x_neighbours() {
        let lat = lattice(LatticeKind::Hex {
            orientation: HexOrientation::X,
            nx: 3,
            ny: 3,
            pitch: 2.0,
        });
        let (centre, local) = locate(&lat, 0.1, -0.1, 0.0).unwrap();
        assert_eq!(centre, 4);
        assert!((local - Point3::new(0.1, -0.1, 0.0)).norm() < 1e-12);

        // neighbour along the second basis vector (p/2, p sin60)
        let (idx, local) = locate(&lat, 1.0, 2.0 * SIN60, 0.0).unwrap();
        assert_eq!(idx, 1 + 2 * 3);
        assert!(local.coords.norm() < 1e-12);

        // a point in the corner of the rhombus belongs to the nearer hexagon
        let (idx, _) = locate(&lat, 1.9, 0.1, 0.0).unwrap();
        assert_eq!(idx, 5);
    }

    #[test]
    fn hex_y_neighbours() {
        let lat = lattice(LatticeKind::Hex {
            orientation: HexOrientation::Y,
            nx: 3,
            ny: 3,
            pitch: 1.0,
        });
        let (idx, local) = locate(&lat, 0.0, 1.0, 0.0).unwrap();
        assert_eq!(idx, 1 + 2 * 3);
        assert!(local.coords.norm() < 1e-12);
        let (idx, local) = locate(&lat, SIN60, COS60, 0.0).unwrap();
        assert_eq!(idx, 2 + 3);
        assert!(local.coords.norm() < 1e-12);
    }

    #[test]
    fn triangular_orientations() {
        let lat = lattice(LatticeKind::Triangular {
            nx: 3,
            ny: 3,
            pitch: 1.0,
        });
        let h = SIN60;
        // centre triangle points up, its centroid sits a third of the row height above the base
        let (idx, local) = locate(&lat, 0.0, -0.5 * h + h / 3.0, 0.0).unwrap();
        assert_eq!(idx, 4);
        assert!(local.coords.norm() < 1e-12);
        // its right-hand neighbour points down
        let (idx, local) = locate(&lat, 0.5, -0.5 * h + 2.0 * h / 3.0, 0.0).unwrap();
        assert_eq!(idx, 5);
        assert!(local.coords.norm() < 1e-12);
    }

    #[test]
    fn triangular_requires_odd_counts() {
        let mut lat = lattice(LatticeKind::Triangular {
            nx: 2,
            ny: 3,
            pitch: 1.0,
        });
        assert!(lat.validate("tri").is_err());
    }

    #[test]
    fn cluster_rings_and_sectors() {
        let lat = lattice(LatticeKind::Cluster {
            rings: vec![
                ClusterRing {
                    count: 1,
                    radius: 0.0,
                    tilt: 0.0,
                },
                ClusterRing {
                    count: 6,
                    radius: 2.0,
                    tilt: 0.0,
                },
            ],
        });
        assert_eq!(locate(&lat, 0.2, 0.1, 0.0).unwrap().0, 0);
        let (idx, local) = locate(&lat, 2.0, 0.0, 0.0).unwrap();
        assert_eq!(idx, 1);
        assert!(local.coords.norm() < 1e-12);
        // sector boundaries sit half a sector either side of each pin
        let just_before = 30.0_f64.to_radians() - 1e-6;
        let (idx, _) = locate(&lat, 2.0 * just_before.cos(), 2.0 * just_before.sin(), 0.0).unwrap();
        assert_eq!(idx, 1);
        let just_after = 30.0_f64.to_radians() + 1e-6;
        let (idx, _) = locate(&lat, 2.0 * just_after.cos(), 2.0 * just_after.sin(), 0.0).unwrap();
        assert_eq!(idx, 2);
        // just below the positive x axis wraps back to the first pin
        assert_eq!(locate(&lat, 2.0, -1e-6, 0.0).unwrap().0, 1);
    }

    #[test]
    fn element_centres_recentre_to_origin() {
        let kinds = [
            LatticeKind::Square {
                nx: 4,
                ny: 3,
                pitch: 1.26,
            },
            LatticeKind::Hex {
                orientation: HexOrientation::Y,
                nx: 5,
                ny: 4,
                pitch: 1.0,
            },
            LatticeKind::Triangular {
                nx: 5,
                ny: 3,
                pitch: 2.0,
            },
            LatticeKind::Cuboid {
                nx: 2,
                ny: 3,
                nz: 2,
                pitch: [1.0, 1.5, 2.0],
            },
            LatticeKind::HexPrism {
                orientation: HexOrientation::X,
                nx: 3,
                ny: 4,
                nz: 2,
                pitch: 1.0,
                axial_pitch: 2.0,
            },
            LatticeKind::Cluster {
                rings: vec![
                    ClusterRing {
                        count: 1,
                        radius: 0.0,
                        tilt: 0.0,
                    },
                    ClusterRing {
                        count: 6,
                        radius: 2.0,
                        tilt: 15.0,
                    },
                    ClusterRing {
                        count: 12,
                        radius: 4.0,
                        tilt: 0.0,
                    },
                ],
            },
            LatticeKind::Stack {
                boundaries: vec![-2.0, 0.5, 3.0],
            },
        ];
        for kind in kinds {
            let mut lat = lattice(kind);
            lat.origin = [0.3, -0.2, 1.0];
            for index in 0..lat.elements.len() {
                let mut pos = Point3::from(lat.element_centre(index).unwrap());
                assert_eq!(lat.find_region(&mut pos, None), Some(index), "{:?}", lat.kind);
                assert!(pos.coords.norm() < 1e-9);
            }
            assert!(lat.element_centre(lat.elements.len()).is_none());
        }
    }

    #[test]
    fn cuboid_composite_index() {
        let lat = lattice(LatticeKind::Cuboid {
            nx: 3,
            ny: 2,
            nz: 3,
            pitch: [1.0, 1.0, 2.0],
        });
        // column +1, row 0 of 2 (upper half), layer +1
        let (idx, local) = locate(&lat, 1.0, 0.5, 2.0).unwrap();
        assert_eq!(idx, 2 + 3 + 2 * 3 * 2);
        assert!(local.coords.norm() < 1e-12);
        assert_eq!(locate(&lat, 0.0, 0.0, 3.5), None);
    }

    #[test]
    fn hex_prism_composite_index() {
        let lat = lattice(LatticeKind::HexPrism {
            orientation: HexOrientation::X,
            nx: 3,
            ny: 3,
            nz: 3,
            pitch: 2.0,
            axial_pitch: 1.0,
        });
        // neighbour along the first basis vector, row 0, layer +1
        let mut pos = Point3::new(2.0, 0.0, 1.0);
        let mut surface = None;
        let idx = lat.find_region(&mut pos, Some(&mut surface)).unwrap();
        assert_eq!(idx, 2 + 3 + 2 * 3 * 3);
        assert!(pos.coords.norm() < 1e-12);
        assert_eq!(
            surface,
            Some(Surface::HexPrism {
                orientation: HexOrientation::X,
                centre: [2.0, 0.0],
                half_pitch: 1.0,
            })
        );

        // the centre column, one layer below the bottom
        assert_eq!(locate(&lat, 0.0, 0.0, -2.0), None);
        assert_eq!(locate(&lat, 0.0, 0.0, 1.49).unwrap().0, 4 + 2 * 3 * 3);
        assert_eq!(locate(&lat, 10.0, 0.0, 0.0), None);
    }

    #[test]
    fn far_points_are_outside() {
        let kinds = [
            LatticeKind::Square {
                nx: 3,
                ny: 3,
                pitch: 1.26,
            },
            LatticeKind::Hex {
                orientation: HexOrientation::Y,
                nx: 3,
                ny: 3,
                pitch: 1.0,
            },
            LatticeKind::Triangular {
                nx: 3,
                ny: 3,
                pitch: 1.0,
            },
            LatticeKind::Cuboid {
                nx: 2,
                ny: 2,
                nz: 2,
                pitch: [1.0; 3],
            },
            LatticeKind::HexPrism {
                orientation: HexOrientation::X,
                nx: 3,
                ny: 3,
                nz: 3,
                pitch: 1.0,
                axial_pitch: 1.0,
            },
        ];
        for kind in kinds {
            let lat = lattice(kind);
            for far in [1e20, -1e20, f64::MAX] {
                assert_eq!(locate(&lat, far, 0.0, 0.0), None, "{:?} at {}", lat.kind, far);
                assert_eq!(locate(&lat, 0.0, far, 0.0), None, "{:?} at {}", lat.kind, far);
                assert_eq!(locate(&lat, far, far, far), None, "{:?} at {}", lat.kind, far);
            }
        }
    }

    #[test]
    fn infinite_lattices_always_match() {
        let lat = lattice(LatticeKind::InfiniteSquare { pitch: 1.5 });
        let (idx, local) = locate(&lat, 100.2, -47.1, 3.0).unwrap();
        assert_eq!(idx, 0);
        assert!(local.x.abs() <= 0.75 && local.y.abs() <= 0.75);

        let lat = lattice(LatticeKind::InfiniteHex {
            orientation: HexOrientation::Y,
            pitch: 1.0,
        });
        let (idx, local) = locate(&lat, -13.3, 52.9, 0.0).unwrap();
        assert_eq!(idx, 0);
        assert!(local.x.hypot(local.y) <= 1.0 / (2.0 * SIN60) + 1e-12);
    }

    #[test]
    fn element_transforms_are_looked_up_by_index() {
        use nalgebra::Vector3;
        let lat = Lattice::new(
            LatticeKind::Square {
                nx: 2,
                ny: 1,
                pitch: 1.0,
            },
            [0.0; 3],
            vec![Some(UniverseId(0)), Some(UniverseId(0))],
            vec![Transform::translation(Vector3::new(0.1, 0.0, 0.0)).for_element(1)],
        );
        assert!(lat.element_transform(0).is_none());
        assert!(lat.element_transform(1).is_some());
    }
}

/// One ring of a circular cluster lattice. `tilt` is in degrees.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClusterRing {
    pub count: usize,
    pub radius: f64,
    #[serde(default)]
    pub tilt: f64,
}

/// Tiling rule of a lattice.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LatticeKind {
    Square {
        nx: usize,
        ny: usize,
        pitch: f64,
    },
    Hex {
        orientation: HexOrientation,
        nx: usize,
        ny: usize,
        pitch: f64,
    },
    Cluster {
        rings: Vec<ClusterRing>,
    },
    Triangular {
        nx: usize,
        ny: usize,
        pitch: f64,
    },
    /// Axial layers; `boundaries` are the ascending lower bounds, the last layer is open.
    Stack {
        boundaries: Vec<f64>,
    },
    Cuboid {
        nx: usize,
        ny: usize,
        nz: usize,
        pitch: [f64; 3],
    },
    HexPrism {
        orientation: HexOrientation,
        nx: usize,
        ny: usize,
        nz: usize,
        pitch: f64,
        axial_pitch: f64,
    },
    InfiniteSquare {
        pitch: f64,
    },
    InfiniteHex {
        orientation: HexOrientation,
        pitch: f64,
    },
}

impl LatticeKind {
    pub const NAMES: [&'static str; 9] = [
        "square",
        "hex",
        "cluster",
        "triangular",
        "stack",
        "cuboid",
        "hex_prism",
        "infinite_square",
        "infinite_hex",
    ];

    /// Number of elements the tiling declares.
    pub fn element_count(&self) -> usize {
        match self {
            LatticeKind::Square { nx, ny, .. }
            | LatticeKind::Hex { nx, ny, .. }
            | LatticeKind::Triangular { nx, ny, .. } => nx * ny,
            LatticeKind::Cluster { rings } => rings.iter().map(|r| r.count).sum(),
            LatticeKind::Stack { boundaries } => boundaries.len(),
            LatticeKind::Cuboid { nx, ny, nz, .. } | LatticeKind::HexPrism { nx, ny, nz, .. } => {
                nx * ny * nz
            }
            LatticeKind::InfiniteSquare { .. } | LatticeKind::InfiniteHex { .. } => 1,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(
            self,
            LatticeKind::InfiniteSquare { .. } | LatticeKind::InfiniteHex { .. }
        )
    }
}

/// A lattice payload: tiling rule, origin, element fills and element transforms.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Lattice {
    pub kind: LatticeKind,
    #[serde(default)]
    pub origin: [f64; 3],
    /// Universe filling each element, `None` for an empty element.
    pub elements: Vec<Option<UniverseId>>,
    /// Transforms restricted to single elements, sorted by element.
    #[serde(default)]
    pub transforms: Vec<Transform>,
}

impl Lattice {
    pub fn new(
        kind: LatticeKind,
        origin: [f64; 3],
        elements: Vec<Option<UniverseId>>,
        mut transforms: Vec<Transform>,
    ) -> Self {
        transforms.sort_by_key(|t| t.element);
        Self {
            kind,
            origin,
            elements,
            transforms,
        }
    }

    /// Checks the construction invariants the region finder relies on.
    pub fn validate(&mut self, universe: &str) -> Result<(), crate::error::GeometryError> {
        use crate::error::GeometryError;

        let positive = |name: &str, value: f64| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(GeometryError::invalid_lattice(
                    universe,
                    format!("{} must be positive, got {}", name, value),
                ))
            }
        };

        match &self.kind {
            LatticeKind::Square { pitch, .. }
            | LatticeKind::Hex { pitch, .. }
            | LatticeKind::InfiniteSquare { pitch }
            | LatticeKind::InfiniteHex { pitch, .. } => positive("pitch", *pitch)?,
            LatticeKind::Triangular { nx, ny, pitch } => {
                positive("pitch", *pitch)?;
                if nx % 2 == 0 || ny % 2 == 0 {
                    return Err(GeometryError::invalid_lattice(
                        universe,
                        format!("triangular lattice needs odd counts, got {} x {}", nx, ny),
                    ));
                }
            }
            LatticeKind::Cluster { rings } => {
                if rings.iter().any(|r| r.count == 0) {
                    return Err(GeometryError::invalid_lattice(
                        universe,
                        "cluster ring with no elements",
                    ));
                }
                if rings.windows(2).any(|w| w[1].radius < w[0].radius) {
                    return Err(GeometryError::invalid_lattice(
                        universe,
                        "cluster ring radii must be ascending",
                    ));
                }
            }
            LatticeKind::Stack { boundaries } => {
                if boundaries.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(GeometryError::invalid_lattice(
                        universe,
                        "stack boundaries must be strictly ascending",
                    ));
                }
            }
            LatticeKind::Cuboid { pitch, .. } => {
                for p in pitch {
                    positive("pitch", *p)?;
                }
            }
            LatticeKind::HexPrism {
                pitch, axial_pitch, ..
            } => {
                positive("pitch", *pitch)?;
                positive("axial pitch", *axial_pitch)?;
            }
        }

        let count = self.kind.element_count();
        if count == 0 {
            return Err(GeometryError::invalid_lattice(universe, "lattice has no elements"));
        }
        if self.elements.len() != count {
            return Err(GeometryError::invalid_lattice(
                universe,
                format!(
                    "tiling declares {} elements but {} were given",
                    count,
                    self.elements.len()
                ),
            ));
        }
        for transform in &self.transforms {
            match transform.element {
                Some(idx) if idx < count => {}
                other => {
                    return Err(GeometryError::invalid_lattice(
                        universe,
                        format!("element transform targets element {:?}", other),
                    ))
                }
            }
        }
        self.transforms.sort_by_key(|t| t.element);
        Ok(())
    }

    /// Universe filling an element, `None` when the element is empty.
    #[inline]
    pub fn element(&self, index: usize) -> Option<UniverseId> {
        self.elements.get(index).copied().flatten()
    }

    #[inline]
    pub fn element_transform(&self, index: usize) -> Option<&Transform> {
        self.transforms
            .binary_search_by_key(&Some(index), |t| t.element)
            .ok()
            .map(|i| &self.transforms[i])
    }

    /// Offset, in the lattice's parent frame, that [`Lattice::find_region`]
    /// subtracts from points it places in element `index`.
    pub fn element_centre(&self, index: usize) -> Option<Vector3<f64>> {
        if index >= self.kind.element_count() {
            return None;
        }
        let centre = match &self.kind {
            LatticeKind::Square { nx, ny, pitch } => {
                let (i, j) = planar_offsets(index, *nx, *ny);
                [axis_centre(i, *nx, *pitch), axis_centre(j, *ny, *pitch), 0.0]
            }
            LatticeKind::Hex {
                orientation,
                nx,
                ny,
                pitch,
            } => {
                let (i, j) = planar_offsets(index, *nx, *ny);
                let (basis, shifts) = hex_frame(*orientation, *pitch, Some((*nx, *ny)));
                let (cx, cy) = hex_centre(i as f64, j as f64, basis, shifts);
                [cx, cy, 0.0]
            }
            LatticeKind::Cluster { rings } => {
                let mut sector = index;
                let ring = rings.iter().find(|ring| {
                    if sector < ring.count {
                        true
                    } else {
                        sector -= ring.count;
                        false
                    }
                })?;
                let (cx, cy) = sector_centre(ring, sector);
                [cx, cy, 0.0]
            }
            LatticeKind::Triangular { nx, ny, pitch } => {
                let (k, j) = planar_offsets(index, *nx, *ny);
                let (cx, cy, _) = triangle_shape(k, j, *pitch);
                [cx, cy, 0.0]
            }
            LatticeKind::Stack { boundaries } => [0.0, 0.0, boundaries[index]],
            LatticeKind::Cuboid { nx, ny, nz, pitch } => {
                let (i, j) = planar_offsets(index % (nx * ny), *nx, *ny);
                let k = (index / (nx * ny)) as i64 - (nz / 2) as i64;
                [
                    axis_centre(i, *nx, pitch[0]),
                    axis_centre(j, *ny, pitch[1]),
                    axis_centre(k, *nz, pitch[2]),
                ]
            }
            LatticeKind::HexPrism {
                orientation,
                nx,
                ny,
                nz,
                pitch,
                axial_pitch,
            } => {
                let (i, j) = planar_offsets(index % (nx * ny), *nx, *ny);
                let k = (index / (nx * ny)) as i64 - (nz / 2) as i64;
                let (basis, shifts) = hex_frame(*orientation, *pitch, Some((*nx, *ny)));
                let (cx, cy) = hex_centre(i as f64, j as f64, basis, shifts);
                [cx, cy, axis_centre(k, *nz, *axial_pitch)]
            }
            LatticeKind::InfiniteSquare { .. } | LatticeKind::InfiniteHex { .. } => [0.0; 3],
        };
        Some(Vector3::from(centre) + Vector3::from(self.origin))
    }

    /// Finds the element containing `pos` and recentres `pos` into its frame.
    ///
    /// Returns `None` when the point lies outside a finite lattice. If `surface`
    /// is given, the element's bounding surface (in the lattice frame) is written
    /// to it, or cleared when the tiling has no simple bounding surface.
    pub fn find_region(
        &self,
        pos: &mut Point3<f64>,
        surface: Option<&mut Option<Surface>>,
    ) -> Option<usize> {
        let [x0, y0, z0] = self.origin;
        let (x, y, z) = (pos.x - x0, pos.y - y0, pos.z - z0);

        let (index, centre, bound) = match &self.kind {
            LatticeKind::Square { nx, ny, pitch } => {
                let (i, cx) = axis_cell(x, *nx, *pitch);
                let (j, cy) = axis_cell(y, *ny, *pitch);
                let index = planar_index(i, j, *nx, *ny)?;
                let bound = Surface::SquarePrism {
                    centre: [cx + x0, cy + y0],
                    half_width: 0.5 * pitch,
                };
                (index, [cx, cy, 0.0], Some(bound))
            }
            LatticeKind::Hex {
                orientation,
                nx,
                ny,
                pitch,
            } => {
                let (i, j, cx, cy) = hex_cell(x, y, *orientation, *pitch, Some((*nx, *ny)));
                let index = planar_index(i, j, *nx, *ny)?;
                let bound = Surface::HexPrism {
                    orientation: *orientation,
                    centre: [cx + x0, cy + y0],
                    half_pitch: 0.5 * pitch,
                };
                (index, [cx, cy, 0.0], Some(bound))
            }
            LatticeKind::Cluster { rings } => {
                let (index, cx, cy) = cluster_cell(x, y, rings);
                (index, [cx, cy, 0.0], None)
            }
            LatticeKind::Triangular { nx, ny, pitch } => {
                let (k, j, cx, cy, vertices) = triangle_cell(x, y, *pitch);
                let index = planar_index(k, j, *nx, *ny)?;
                let vertices = vertices.map(|[vx, vy]| [vx + x0, vy + y0]);
                (index, [cx, cy, 0.0], Some(Surface::TriangularPrism { vertices }))
            }
            LatticeKind::Stack { boundaries } => {
                let layer = boundaries.iter().rposition(|b| *b <= z)?;
                let upper = boundaries.get(layer + 1).copied().unwrap_or(f64::INFINITY);
                let lower = boundaries[layer];
                let bound = Surface::Slab {
                    lower: lower + z0,
                    upper: upper + z0,
                };
                (layer, [0.0, 0.0, lower], Some(bound))
            }
            LatticeKind::Cuboid { nx, ny, nz, pitch } => {
                let (i, cx) = axis_cell(x, *nx, pitch[0]);
                let (j, cy) = axis_cell(y, *ny, pitch[1]);
                let (k, cz) = axis_cell(z, *nz, pitch[2]);
                let planar = planar_index(i, j, *nx, *ny)?;
                let layer = axis_index(k, *nz)?;
                let half = pitch.map(|p| 0.5 * p);
                let bound = Surface::Cuboid {
                    min: [cx - half[0] + x0, cy - half[1] + y0, cz - half[2] + z0],
                    max: [cx + half[0] + x0, cy + half[1] + y0, cz + half[2] + z0],
                };
                (planar + layer * nx * ny, [cx, cy, cz], Some(bound))
            }
            LatticeKind::HexPrism {
                orientation,
                nx,
                ny,
                nz,
                pitch,
                axial_pitch,
            } => {
                let (i, j, cx, cy) = hex_cell(x, y, *orientation, *pitch, Some((*nx, *ny)));
                let (k, cz) = axis_cell(z, *nz, *axial_pitch);
                let planar = planar_index(i, j, *nx, *ny)?;
                let layer = axis_index(k, *nz)?;
                let bound = Surface::HexPrism {
                    orientation: *orientation,
                    centre: [cx + x0, cy + y0],
                    half_pitch: 0.5 * pitch,
                };
                (planar + layer * nx * ny, [cx, cy, cz], Some(bound))
            }
            LatticeKind::InfiniteSquare { pitch } => {
                let cx = (x / pitch + 0.5).floor() * pitch;
                let cy = (y / pitch + 0.5).floor() * pitch;
                let bound = Surface::SquarePrism {
                    centre: [cx + x0, cy + y0],
                    half_width: 0.5 * pitch,
                };
                (0, [cx, cy, 0.0], Some(bound))
            }
            LatticeKind::InfiniteHex { orientation, pitch } => {
                let (_, _, cx, cy) = hex_cell(x, y, *orientation, *pitch, None);
                let bound = Surface::HexPrism {
                    orientation: *orientation,
                    centre: [cx + x0, cy + y0],
                    half_pitch: 0.5 * pitch,
                };
                (0, [cx, cy, 0.0], Some(bound))
            }
        };

        pos.x = x - centre[0];
        pos.y = y - centre[1];
        pos.z = z - centre[2];

        if let Some(slot) = surface {
            *slot = bound;
        }

        Some(index)
    }
}

#[inline]
fn centring_shift(n: usize, pitch: f64) -> f64 {
    if n % 2 == 0 {
        0.5 * pitch
    } else {
        0.0
    }
}

/// Cell along one axis: signed offset from the middle cell and the cell centre.
#[inline]
fn axis_cell(x: f64, n: usize, pitch: f64) -> (i64, f64) {
    let shift = centring_shift(n, pitch);
    let i = ((x - shift) / pitch + 0.5).floor();
    (i as i64, i * pitch + shift)
}

#[inline]
fn axis_centre(offset: i64, n: usize, pitch: f64) -> f64 {
    offset as f64 * pitch + centring_shift(n, pitch)
}

/// Signed offsets from the middle cell of a row-major planar index.
#[inline]
fn planar_offsets(index: usize, nx: usize, ny: usize) -> (i64, i64) {
    (
        (index % nx) as i64 - (nx / 2) as i64,
        (index / nx) as i64 - (ny / 2) as i64,
    )
}

#[inline]
fn axis_index(offset: i64, n: usize) -> Option<usize> {
    // offsets saturate for far-away points
    let idx = offset.checked_add((n / 2) as i64)?;
    if idx >= 0 && (idx as usize) < n {
        Some(idx as usize)
    } else {
        None
    }
}

#[inline]
fn planar_index(i: i64, j: i64, nx: usize, ny: usize) -> Option<usize> {
    Some(axis_index(i, nx)? + axis_index(j, ny)? * nx)
}

/// Basis vectors of a hexagonal lattice with unit pitch.
#[inline]
fn hex_basis(orientation: HexOrientation) -> [(f64, f64); 2] {
    match orientation {
        HexOrientation::X => [(1.0, 0.0), (COS60, SIN60)],
        HexOrientation::Y => [(SIN60, COS60), (0.0, 1.0)],
    }
}

/// Scaled basis and half-cell shifts of a hexagonal lattice.
#[inline]
fn hex_frame(
    orientation: HexOrientation,
    pitch: f64,
    counts: Option<(usize, usize)>,
) -> ([(f64, f64); 2], (f64, f64)) {
    let [(ax, ay), (bx, by)] = hex_basis(orientation);
    let shifts = match counts {
        Some((nx, ny)) => (centring_shift(nx, 1.0), centring_shift(ny, 1.0)),
        None => (0.0, 0.0),
    };
    (
        [(ax * pitch, ay * pitch), (bx * pitch, by * pitch)],
        shifts,
    )
}

#[inline]
fn hex_centre(
    i: f64,
    j: f64,
    [(ax, ay), (bx, by)]: [(f64, f64); 2],
    (su, sv): (f64, f64),
) -> (f64, f64) {
    (
        (i + su) * ax + (j + sv) * bx,
        (i + su) * ay + (j + sv) * by,
    )
}

/// Nearest hexagon centre to `(x, y)`: signed offsets along both basis vectors and the centre.
///
/// The oblique basis is inverted to find the enclosing rhombus; the nearest
/// of its four corners is the hexagon containing the point.
#[inline]
fn hex_cell(
    x: f64,
    y: f64,
    orientation: HexOrientation,
    pitch: f64,
    counts: Option<(usize, usize)>,
) -> (i64, i64, f64, f64) {
    let (basis, (su, sv)) = hex_frame(orientation, pitch, counts);
    let [(ax, ay), (bx, by)] = basis;
    let det = ax * by - bx * ay;

    let u = (x * by - y * bx) / det - su;
    let v = (ax * y - ay * x) / det - sv;
    let (u0, v0) = (u.floor(), v.floor());

    [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
        .into_iter()
        .map(|(du, dv)| {
            let (i, j) = (u0 + du, v0 + dv);
            let (cx, cy) = hex_centre(i, j, basis, (su, sv));
            let d2 = (x - cx).powi(2) + (y - cy).powi(2);
            (d2, (i as i64, j as i64, cx, cy))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, cell)| cell)
        .unwrap_or_default()
}

/// Triangle containing `(x, y)`: column and row offsets, centroid and vertices.
///
/// Rows have height `pitch·sin60`; each row holds triangles every half pitch,
/// pointing up where column + row is even and down otherwise.
#[inline]
fn triangle_cell(x: f64, y: f64, pitch: f64) -> (i64, i64, f64, f64, [[f64; 2]; 3]) {
    let h = pitch * SIN60;
    let half = 0.5 * pitch;

    let j = (y / h + 0.5).floor();
    let fy = (y - (j - 0.5) * h) / h;
    let fx = x / half;
    let k0 = fx.floor();
    let t = fx - k0;

    let up0 = (k0 as i64).wrapping_add(j as i64).rem_euclid(2) == 0;
    let k = if up0 {
        if t + fy < 1.0 {
            k0
        } else {
            k0 + 1.0
        }
    } else if t < fy {
        k0
    } else {
        k0 + 1.0
    };

    let (cx, cy, vertices) = triangle_shape(k as i64, j as i64, pitch);
    (k as i64, j as i64, cx, cy, vertices)
}

/// Centroid and vertices of the triangle at column `k`, row `j`.
#[inline]
fn triangle_shape(k: i64, j: i64, pitch: f64) -> (f64, f64, [[f64; 2]; 3]) {
    let h = pitch * SIN60;
    let half = 0.5 * pitch;
    let base = (j as f64 - 0.5) * h;
    let cx = k as f64 * half;
    if k.wrapping_add(j).rem_euclid(2) == 0 {
        (
            cx,
            base + h / 3.0,
            [[cx - half, base], [cx + half, base], [cx, base + h]],
        )
    } else {
        (
            cx,
            base + 2.0 * h / 3.0,
            [[cx, base], [cx + half, base + h], [cx - half, base + h]],
        )
    }
}

/// Element of a circular cluster containing `(x, y)` and that element's centre.
#[inline]
fn cluster_cell(x: f64, y: f64, rings: &[ClusterRing]) -> (usize, f64, f64) {
    let r2 = x * x + y * y;

    let ring = rings
        .iter()
        .enumerate()
        .position(|(n, current)| match rings.get(n + 1) {
            Some(next) => {
                let outer = 0.5 * (current.radius + next.radius);
                r2 < outer * outer
            }
            None => true,
        })
        .unwrap_or(rings.len() - 1);
    let first: usize = rings[..ring].iter().map(|r| r.count).sum();

    let current = &rings[ring];
    let width = 2.0 * PI / current.count as f64;
    let tilt = current.tilt.to_radians();
    let angle = normalise_angle(y.atan2(x) - tilt + 0.5 * width);
    let sector = ((angle / width) as usize).min(current.count - 1);

    let (cx, cy) = sector_centre(current, sector);
    (first + sector, cx, cy)
}

#[inline]
fn sector_centre(ring: &ClusterRing, sector: usize) -> (f64, f64) {
    let width = 2.0 * PI / ring.count as f64;
    let (s, c) = (ring.tilt.to_radians() + sector as f64 * width).sin_cos();
    (ring.radius * c, ring.radius * s)
}
