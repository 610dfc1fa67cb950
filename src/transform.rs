//! Coordinate transforms between a universe and the geometry it is filled into.
//!
//! A [`Transform`] moves a position-direction pair from the parent frame into a
//! child universe's local frame. The operation order is a property of the
//! record and the inverse is exact, so surface parameters can be mapped back
//! into the parent frame with [`Transform::invert`].
//!
//! A [`Symmetry`] folds a point into the primary sector of a rotationally or
//! reflectively symmetric universe before the universe is searched.

use nalgebra::{Matrix2, Matrix3, Point3, Rotation3, Vector2, Vector3};
use serde::Deserialize;
use std::f64::consts::PI;

use crate::error::GeometryError;


/// Order in which a transform applies its translation and rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum TransformOrder {
    /// `p' = R (p - t)`
    TranslateThenRotate,
    /// `p' = R p - t`
    RotateThenTranslate,
}

impl TryFrom<u8> for TransformOrder {
    type Error = GeometryError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::TranslateThenRotate),
            2 => Ok(Self::RotateThenTranslate),
            other => Err(GeometryError::InvalidTransformOrder(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EulerConvention {
    XYZ,
    ZYZ,
}

/// How the rotation part of a transform is given.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    None,
    /// Explicit row-major matrix.
    Matrix([[f64; 3]; 3]),
    /// Matrix derived from Euler angles in degrees.
    Euler {
        angles: [f64; 3],
        convention: EulerConvention,
    },
}

impl Default for Rotation {
    fn default() -> Self {
        Self::None
    }
}

impl Rotation {
    fn matrix(&self) -> Option<Matrix3<f64>> {
        match self {
            Rotation::None => None,
            Rotation::Matrix(rows) => Some(Matrix3::from_fn(|i, j| rows[i][j])),
            Rotation::Euler { angles, convention } => {
                let [a, b, c] = angles.map(f64::to_radians);
                let rot = match convention {
                    EulerConvention::XYZ => {
                        Rotation3::from_axis_angle(&Vector3::x_axis(), a)
                            * Rotation3::from_axis_angle(&Vector3::y_axis(), b)
                            * Rotation3::from_axis_angle(&Vector3::z_axis(), c)
                    }
                    EulerConvention::ZYZ => {
                        Rotation3::from_axis_angle(&Vector3::z_axis(), a)
                            * Rotation3::from_axis_angle(&Vector3::y_axis(), b)
                            * Rotation3::from_axis_angle(&Vector3::z_axis(), c)
                    }
                };
                Some(rot.into_inner())
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TransformRecord {
    #[serde(default)]
    translation: [f64; 3],
    #[serde(default)]
    rotation: Rotation,
    #[serde(default = "default_order")]
    order: TransformOrder,
    #[serde(default)]
    element: Option<usize>,
}

fn default_order() -> TransformOrder {
    TransformOrder::TranslateThenRotate
}

/// A placement of a child universe inside its parent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "TransformRecord")]
pub struct Transform {
    pub translation: Vector3<f64>,
    rotation: Option<Matrix3<f64>>,
    inverse: Option<Matrix3<f64>>,
    pub order: TransformOrder,
    /// Lattice element this transform is restricted to.
    pub element: Option<usize>,
}

impl TryFrom<TransformRecord> for Transform {
    type Error = GeometryError;

    fn try_from(record: TransformRecord) -> Result<Self, Self::Error> {
        let mut transform = Transform::new(
            Vector3::from(record.translation),
            record.rotation,
            record.order,
        )?;
        transform.element = record.element;
        Ok(transform)
    }
}

impl Transform {
    pub fn new(
        translation: Vector3<f64>,
        rotation: Rotation,
        order: TransformOrder,
    ) -> Result<Self, GeometryError> {
        let rotation = rotation.matrix();
        let inverse = match rotation {
            Some(matrix) => Some(matrix.try_inverse().ok_or_else(|| {
                GeometryError::Parse(format!("rotation matrix {} is singular", matrix))
            })?),
            None => None,
        };

        Ok(Self {
            translation,
            rotation,
            inverse,
            order,
            element: None,
        })
    }

    pub fn translation(translation: Vector3<f64>) -> Self {
        Self {
            translation,
            rotation: None,
            inverse: None,
            order: TransformOrder::TranslateThenRotate,
            element: None,
        }
    }

    /// Restricts the transform to one lattice element.
    pub fn for_element(mut self, element: usize) -> Self {
        self.element = Some(element);
        self
    }

    /// Maps a position and direction from the parent frame into the local frame.
    #[inline]
    pub fn apply(&self, pos: &mut Point3<f64>, dir: &mut Vector3<f64>) {
        match self.order {
            TransformOrder::TranslateThenRotate => {
                *pos -= self.translation;
                if let Some(rot) = &self.rotation {
                    *pos = Point3::from(rot * pos.coords);
                }
            }
            TransformOrder::RotateThenTranslate => {
                if let Some(rot) = &self.rotation {
                    *pos = Point3::from(rot * pos.coords);
                }
                *pos -= self.translation;
            }
        }
        if let Some(rot) = &self.rotation {
            *dir = rot * *dir;
        }
    }

    /// Exact inverse of [`Transform::apply`].
    #[inline]
    pub fn invert(&self, pos: &mut Point3<f64>, dir: &mut Vector3<f64>) {
        match self.order {
            TransformOrder::TranslateThenRotate => {
                if let Some(inv) = &self.inverse {
                    *pos = Point3::from(inv * pos.coords);
                }
                *pos += self.translation;
            }
            TransformOrder::RotateThenTranslate => {
                *pos += self.translation;
                if let Some(inv) = &self.inverse {
                    *pos = Point3::from(inv * pos.coords);
                }
            }
        }
        if let Some(inv) = &self.inverse {
            *dir = inv * *dir;
        }
    }

    /// Maps a local point back to the parent frame.
    pub fn invert_point(&self, point: Point3<f64>) -> Point3<f64> {
        let mut pos = point;
        let mut dir = Vector3::z();
        self.invert(&mut pos, &mut dir);
        pos
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Indices of the two coordinates spanning the plane normal to the axis.
    #[inline]
    fn plane(self) -> (usize, usize) {
        match self {
            Axis::X => (1, 2),
            Axis::Y => (2, 0),
            Axis::Z => (0, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SymmetryKind {
    Periodic,
    Reflective,
}

/// Sector symmetry about an axis. Angles are in degrees.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Symmetry {
    pub axis: Axis,
    pub centre: [f64; 2],
    pub start: f64,
    pub width: f64,
    pub kind: SymmetryKind,
}

impl Symmetry {
    /// Folds a position and direction into the sector `[start, start + width)`.
    pub fn fold(&self, pos: &mut Point3<f64>, dir: &mut Vector3<f64>) {
        let (i, j) = self.axis.plane();
        let start = self.start.to_radians();
        let width = self.width.to_radians();

        let rel = Vector2::new(pos[i] - self.centre[0], pos[j] - self.centre[1]);
        let theta = rel.y.atan2(rel.x);
        let sector = ((theta - start) / width).floor();
        if sector == 0.0 {
            return;
        }

        let turn = -sector * width;
        let (s, c) = turn.sin_cos();
        let mut op = Matrix2::new(c, -s, s, c);

        if self.kind == SymmetryKind::Reflective && (sector as i64).rem_euclid(2) == 1 {
            // mirror across the sector bisector after the turn
            let phi = 2.0 * (start + 0.5 * width);
            let (s2, c2) = phi.sin_cos();
            op = Matrix2::new(c2, s2, s2, -c2) * op;
        }

        let folded = op * rel;
        pos[i] = folded.x + self.centre[0];
        pos[j] = folded.y + self.centre[1];

        let d = op * Vector2::new(dir[i], dir[j]);
        dir[i] = d.x;
        dir[j] = d.y;
    }
}

/// Normalises an angle into `[0, 2π)`.
#[inline]
pub fn normalise_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    // rem_euclid may round up to exactly 2π for tiny negative inputs
    if wrapped >= 2.0 * PI {
        0.0
    } else {
        wrapped
    }
}
