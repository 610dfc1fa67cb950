//! Primitive surfaces bounding cells, nest regions and lattice elements.
//!
//! Each surface splits space into an inside (negative) and outside (positive)
//! half. Cells intersect oriented surfaces, nests order them, and the lattice
//! region finder publishes the surface bounding the element a point fell into.

use nalgebra::{Point3, Vector3};
use serde::Deserialize;

use crate::transform::Axis;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_inside_and_distance() {
        let sphere = Surface::Sphere {
            centre: [0.0, 0.0, 0.0],
            radius: 2.0,
        };
        assert!(sphere.inside(&Point3::new(1.0, 1.0, 1.0)));
        assert!(!sphere.inside(&Point3::new(2.0, 1.0, 0.0)));
        let d = sphere.distance(&Point3::origin(), &Vector3::x());
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cylinder_ignores_axial_coordinate() {
        let cyl = Surface::Cylinder {
            axis: Axis::Z,
            centre: [1.0, 0.0],
            radius: 0.5,
        };
        assert!(cyl.inside(&Point3::new(1.2, 0.1, 1e6)));
        let d = cyl.distance(&Point3::new(1.0, 0.0, 0.0), &Vector3::new(0.0, 0.6, 0.8));
        assert!((d - 0.5 / 0.6).abs() < 1e-12);
        assert_eq!(
            cyl.distance(&Point3::new(1.0, 0.0, 0.0), &Vector3::z()),
            f64::INFINITY
        );
    }

    #[test]
    fn hex_prism_flats() {
        let hex = Surface::HexPrism {
            orientation: HexOrientation::X,
            centre: [0.0, 0.0],
            half_pitch: 1.0,
        };
        // flats face the x axis, corners the y axis
        assert!(hex.inside(&Point3::new(0.99, 0.0, 0.0)));
        assert!(!hex.inside(&Point3::new(1.01, 0.0, 0.0)));
        assert!(hex.inside(&Point3::new(0.0, 1.1, 0.0)));
        let d = hex.distance(&Point3::origin(), &Vector3::x());
        assert!((d - 1.0).abs() < 1e-12);

        let hex = Surface::HexPrism {
            orientation: HexOrientation::Y,
            centre: [0.0, 0.0],
            half_pitch: 1.0,
        };
        assert!(!hex.inside(&Point3::new(0.0, 1.01, 0.0)));
        assert!(hex.inside(&Point3::new(1.1, 0.0, 0.0)));
    }

    #[test]
    fn triangle_prism() {
        let tri = Surface::TriangularPrism {
            vertices: [[0.0, 0.0], [2.0, 0.0], [1.0, 1.5]],
        };
        assert!(tri.inside(&Point3::new(1.0, 0.5, 3.0)));
        assert!(!tri.inside(&Point3::new(0.1, 1.0, 0.0)));
        let d = tri.distance(&Point3::new(1.0, 0.5, 0.0), &Vector3::new(0.0, -1.0, 0.0));
        assert!((d - 0.5).abs() < 1e-12);
    }

    #[test]
    fn slab_and_cuboid() {
        let slab = Surface::Slab {
            lower: 0.0,
            upper: 10.0,
        };
        assert!(slab.inside(&Point3::new(100.0, -3.0, 5.0)));
        let d = slab.distance(&Point3::new(0.0, 0.0, 5.0), &Vector3::new(0.0, 0.0, -1.0));
        assert!((d - 5.0).abs() < 1e-12);

        let cuboid = Surface::Cuboid {
            min: [-1.0, -1.0, -1.0],
            max: [1.0, 2.0, 3.0],
        };
        assert!(cuboid.inside(&Point3::new(0.0, 1.5, 2.5)));
        let d = cuboid.distance(&Point3::origin(), &Vector3::y());
        assert!((d - 2.0).abs() < 1e-12);
    }
}

/// Orientation of a hexagonal prism or lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum HexOrientation {
    /// Flats face the x axis; rows run along x.
    X,
    /// Flats face the y axis; rows run along y.
    Y,
}

impl HexOrientation {
    /// In-plane unit normals of three of the six flats (the others are opposites).
    #[inline]
    fn normals(self) -> [(f64, f64); 3] {
        const S: f64 = 0.866_025_403_784_438_6;
        match self {
            HexOrientation::X => [(1.0, 0.0), (0.5, S), (-0.5, S)],
            HexOrientation::Y => [(0.0, 1.0), (S, 0.5), (S, -0.5)],
        }
    }
}

/// Which side of a surface a cell occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sense {
    Inside,
    Outside,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Surface {
    /// Half space `n·p + d < 0`.
    Plane { normal: [f64; 3], offset: f64 },
    PlaneX { x0: f64 },
    PlaneY { y0: f64 },
    PlaneZ { z0: f64 },
    Sphere { centre: [f64; 3], radius: f64 },
    /// Infinite cylinder along `axis`.
    Cylinder {
        axis: Axis,
        centre: [f64; 2],
        radius: f64,
    },
    Cuboid { min: [f64; 3], max: [f64; 3] },
    /// Infinite square prism along z.
    SquarePrism { centre: [f64; 2], half_width: f64 },
    /// Infinite hexagonal prism along z, `half_pitch` is half the flat-to-flat width.
    HexPrism {
        orientation: HexOrientation,
        centre: [f64; 2],
        half_pitch: f64,
    },
    /// Infinite triangular prism along z, counter-clockwise vertices.
    TriangularPrism { vertices: [[f64; 2]; 3] },
    /// Axial layer `lower <= z < upper`.
    Slab { lower: f64, upper: f64 },
    Infinite,
}

impl Surface {
    /// Whether the point lies on the negative side of the surface.
    pub fn inside(&self, p: &Point3<f64>) -> bool {
        match self {
            Surface::Plane { normal, offset } => {
                normal[0] * p.x + normal[1] * p.y + normal[2] * p.z + offset < 0.0
            }
            Surface::PlaneX { x0 } => p.x < *x0,
            Surface::PlaneY { y0 } => p.y < *y0,
            Surface::PlaneZ { z0 } => p.z < *z0,
            Surface::Sphere { centre, radius } => {
                let d = p - Point3::from(*centre);
                d.norm_squared() < radius * radius
            }
            Surface::Cylinder {
                axis,
                centre,
                radius,
            } => {
                let (a, b) = in_plane(*axis, p);
                let (da, db) = (a - centre[0], b - centre[1]);
                da * da + db * db < radius * radius
            }
            Surface::Cuboid { min, max } => (0..3).all(|i| p[i] >= min[i] && p[i] < max[i]),
            Surface::SquarePrism { centre, half_width } => {
                (p.x - centre[0]).abs() < *half_width && (p.y - centre[1]).abs() < *half_width
            }
            Surface::HexPrism {
                orientation,
                centre,
                half_pitch,
            } => {
                let (x, y) = (p.x - centre[0], p.y - centre[1]);
                orientation
                    .normals()
                    .iter()
                    .all(|(nx, ny)| (nx * x + ny * y).abs() < *half_pitch)
            }
            Surface::TriangularPrism { vertices } => (0..3).all(|k| {
                let (a, b) = (vertices[k], vertices[(k + 1) % 3]);
                cross2(b[0] - a[0], b[1] - a[1], p.x - a[0], p.y - a[1]) >= 0.0
            }),
            Surface::Slab { lower, upper } => p.z >= *lower && p.z < *upper,
            Surface::Infinite => true,
        }
    }

    pub fn contains(&self, p: &Point3<f64>, sense: Sense) -> bool {
        match sense {
            Sense::Inside => self.inside(p),
            Sense::Outside => !self.inside(p),
        }
    }

    /// Distance along `u` to the next crossing of the surface.
    ///
    /// Planes and quadrics are crossed from either side. Closed prisms and
    /// boxes report the exit distance, which is what lattice boundary tracking
    /// needs since the point is always inside the element it was located in.
    pub fn distance(&self, p: &Point3<f64>, u: &Vector3<f64>) -> f64 {
        match self {
            Surface::Plane { normal, offset } => {
                let n = Vector3::from(*normal);
                plane_crossing(n.dot(&p.coords) + offset, n.dot(u))
            }
            Surface::PlaneX { x0 } => plane_crossing(p.x - x0, u.x),
            Surface::PlaneY { y0 } => plane_crossing(p.y - y0, u.y),
            Surface::PlaneZ { z0 } => plane_crossing(p.z - z0, u.z),
            Surface::Sphere { centre, radius } => {
                let d = p - Point3::from(*centre);
                quadric_crossing(u.norm_squared(), d.dot(u), d.norm_squared() - radius * radius)
            }
            Surface::Cylinder {
                axis,
                centre,
                radius,
            } => {
                let (a, b) = in_plane(*axis, p);
                let (ua, ub) = in_plane_vec(*axis, u);
                let (da, db) = (a - centre[0], b - centre[1]);
                quadric_crossing(
                    ua * ua + ub * ub,
                    da * ua + db * ub,
                    da * da + db * db - radius * radius,
                )
            }
            Surface::Cuboid { min, max } => (0..3)
                .map(|i| exit_interval(p[i], u[i], min[i], max[i]))
                .fold(f64::INFINITY, f64::min),
            Surface::SquarePrism { centre, half_width } => {
                exit_interval(p.x, u.x, centre[0] - half_width, centre[0] + half_width).min(
                    exit_interval(p.y, u.y, centre[1] - half_width, centre[1] + half_width),
                )
            }
            Surface::HexPrism {
                orientation,
                centre,
                half_pitch,
            } => {
                let (x, y) = (p.x - centre[0], p.y - centre[1]);
                orientation
                    .normals()
                    .iter()
                    .map(|(nx, ny)| {
                        exit_interval(nx * x + ny * y, nx * u.x + ny * u.y, -half_pitch, *half_pitch)
                    })
                    .fold(f64::INFINITY, f64::min)
            }
            Surface::TriangularPrism { vertices } => (0..3)
                .map(|k| {
                    let (a, b) = (vertices[k], vertices[(k + 1) % 3]);
                    // outward normal of a counter-clockwise edge
                    let (nx, ny) = (b[1] - a[1], a[0] - b[0]);
                    let h = nx * (p.x - a[0]) + ny * (p.y - a[1]);
                    let un = nx * u.x + ny * u.y;
                    if un > 0.0 {
                        (-h / un).max(0.0)
                    } else {
                        f64::INFINITY
                    }
                })
                .fold(f64::INFINITY, f64::min),
            Surface::Slab { lower, upper } => exit_interval(p.z, u.z, *lower, *upper),
            Surface::Infinite => f64::INFINITY,
        }
    }
}

#[inline]
fn in_plane(axis: Axis, p: &Point3<f64>) -> (f64, f64) {
    match axis {
        Axis::X => (p.y, p.z),
        Axis::Y => (p.z, p.x),
        Axis::Z => (p.x, p.y),
    }
}

#[inline]
fn in_plane_vec(axis: Axis, u: &Vector3<f64>) -> (f64, f64) {
    match axis {
        Axis::X => (u.y, u.z),
        Axis::Y => (u.z, u.x),
        Axis::Z => (u.x, u.y),
    }
}

#[inline]
fn cross2(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ax * by - ay * bx
}

/// Distance to the plane where the signed value `h` (changing at rate `rate`) hits zero.
#[inline]
fn plane_crossing(h: f64, rate: f64) -> f64 {
    if rate == 0.0 {
        return f64::INFINITY;
    }
    let t = -h / rate;
    if t > 0.0 {
        t
    } else {
        f64::INFINITY
    }
}

/// Smallest positive root of `a t² + 2 b t + c = 0`.
#[inline]
fn quadric_crossing(a: f64, b: f64, c: f64) -> f64 {
    if a == 0.0 {
        return f64::INFINITY;
    }
    let disc = b * b - a * c;
    if disc < 0.0 {
        return f64::INFINITY;
    }
    let root = disc.sqrt();
    let near = (-b - root) / a;
    if near > 0.0 {
        return near;
    }
    let far = (-b + root) / a;
    if far > 0.0 {
        far
    } else {
        f64::INFINITY
    }
}

/// Exit distance from the interval `[lo, hi)` moving at rate `u` from `x`.
#[inline]
fn exit_interval(x: f64, u: f64, lo: f64, hi: f64) -> f64 {
    if u > 0.0 {
        ((hi - x) / u).max(0.0)
    } else if u < 0.0 {
        ((lo - x) / u).max(0.0)
    } else {
        f64::INFINITY
    }
}
