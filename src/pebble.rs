//! Pebble-bed universes: explicit spheres, each filled with a pebble universe,
//! embedded in a background universe.

use nalgebra::{Point3, Vector3};
use serde::Deserialize;

use crate::search::{Aabb, SearchGrid};
use crate::universe::UniverseId;

#[cfg(test)]
mod tests {
    use super::*;

    fn bed() -> PebbleBed {
        PebbleBed {
            pebbles: vec![
                Pebble::new([0.0, 0.0, 0.0], 1.0, UniverseId(1)),
                Pebble::new([3.0, 0.0, 0.0], 1.0, UniverseId(2)),
                Pebble::new([6.0, 0.0, 0.0], 1.0, UniverseId(1)),
            ],
            background: UniverseId(3),
        }
    }

    #[test]
    fn types_in_first_seen_order() {
        let index = PebbleIndex::build(&bed());
        assert_eq!(index.types, vec![UniverseId(1), UniverseId(2)]);
        assert_eq!(index.type_of, vec![0, 1, 0]);
    }

    #[test]
    fn find_pebble() {
        let bed = bed();
        let index = PebbleIndex::build(&bed);
        assert_eq!(bed.find(&index.grid, &Point3::new(6.5, 0.2, 0.0)), Some(2));
        assert_eq!(bed.find(&index.grid, &Point3::new(1.5, 0.0, 0.0)), None);
        assert_eq!(bed.find(&index.grid, &Point3::new(0.0, 0.0, 50.0)), None);
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Pebble {
    pub centre: [f64; 3],
    pub radius: f64,
    /// Pebble type: the universe filling the sphere, centred on `centre`.
    pub universe: UniverseId,
}

impl Pebble {
    pub fn new(centre: [f64; 3], radius: f64, universe: UniverseId) -> Self {
        Self {
            centre,
            radius,
            universe,
        }
    }

    #[inline]
    pub fn offset(&self) -> Vector3<f64> {
        Vector3::from(self.centre)
    }

    #[inline]
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (p.coords - self.offset()).norm_squared() < self.radius * self.radius
    }

    pub fn bounding_box(&self) -> Aabb {
        let r = Vector3::repeat(self.radius);
        let c = Point3::from(self.centre);
        Aabb::new(c - r, c + r)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PebbleBed {
    pub pebbles: Vec<Pebble>,
    pub background: UniverseId,
}

impl PebbleBed {
    /// Pebble containing the point, searched through `grid`.
    #[inline]
    pub fn find(&self, grid: &SearchGrid, p: &Point3<f64>) -> Option<usize> {
        grid.candidates(p)
            .iter()
            .map(|&i| i as usize)
            .find(|&i| self.pebbles[i].contains(p))
    }
}

/// Search structure and pebble-type table of one bed.
#[derive(Debug, Clone, PartialEq)]
pub struct PebbleIndex {
    pub grid: SearchGrid,
    /// Distinct pebble universes in order of first appearance.
    pub types: Vec<UniverseId>,
    /// Type index of each pebble.
    pub type_of: Vec<usize>,
}

impl PebbleIndex {
    pub fn build(bed: &PebbleBed) -> Self {
        let boxes: Vec<Aabb> = bed.pebbles.iter().map(Pebble::bounding_box).collect();

        let mut types: Vec<UniverseId> = Vec::new();
        let type_of = bed
            .pebbles
            .iter()
            .map(|pebble| match types.iter().position(|t| *t == pebble.universe) {
                Some(index) => index,
                None => {
                    types.push(pebble.universe);
                    types.len() - 1
                }
            })
            .collect();

        Self {
            grid: SearchGrid::build(&boxes),
            types,
            type_of,
        }
    }
}
