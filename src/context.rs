//! Per-worker scratch state for point location.
//!
//! An [`ExecutionContext`] owns one [`Level`] per depth of the fill graph plus
//! the mesh element cache. Workers never share a context, so the resolver can
//! mutate it freely while the [`crate::geometry::Geometry`] stays read-only.
//! Everything is allocated once in [`crate::geometry::Geometry::new_context`]
//! and reused for every query.

use nalgebra::{Point3, Vector3};

use crate::surface::Surface;
use crate::universe::UniverseId;


/// Traversal state at one depth of the fill graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    /// Position in the level universe's frame, after its transform and symmetry.
    pub pos: Point3<f64>,
    pub dir: Vector3<f64>,
    pub universe: UniverseId,
    /// Local index of the resolved cell, region, element or body.
    pub entity: Option<usize>,
    /// Set when the resolved entity holds a leaf rather than a fill.
    pub last: bool,
    /// This level's contribution to the zone index.
    pub zone: u64,
    /// Bounding surface of the resolved entity, where one was published.
    pub surface: Option<Surface>,
}

impl Level {
    fn new() -> Self {
        Self {
            pos: Point3::origin(),
            dir: Vector3::z(),
            universe: UniverseId(0),
            entity: None,
            last: false,
            zone: 0,
            surface: None,
        }
    }

    #[inline]
    pub(crate) fn reset(&mut self, universe: UniverseId, pos: Point3<f64>, dir: Vector3<f64>) {
        self.pos = pos;
        self.dir = dir;
        self.universe = universe;
        self.entity = None;
        self.last = false;
        self.zone = 0;
        self.surface = None;
    }
}

/// Last mesh element found in a universe and the collision it was found at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct MeshSlot {
    element: Option<usize>,
    stamp: u64,
}

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    id: usize,
    pub(crate) levels: Vec<Level>,
    /// Levels touched by the last query.
    pub(crate) used: usize,
    pub(crate) zone: u64,
    collision: u64,
    mesh_cache: Vec<MeshSlot>,
}

impl ExecutionContext {
    pub(crate) fn new(id: usize, depth: usize, universes: usize) -> Self {
        Self {
            id,
            levels: vec![Level::new(); depth],
            used: 0,
            zone: 0,
            collision: 0,
            mesh_cache: vec![MeshSlot::default(); universes],
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Zone index of the leaf found by the last successful query.
    #[inline]
    pub fn last_zone_index(&self) -> u64 {
        self.zone
    }

    /// Levels visited by the last query, root first.
    pub fn levels(&self) -> &[Level] {
        &self.levels[..self.used]
    }

    pub fn collision(&self) -> u64 {
        self.collision
    }

    /// Starts a new collision, invalidating every cached mesh element.
    #[inline]
    pub fn next_collision(&mut self) {
        self.collision += 1;
    }

    #[inline]
    pub(crate) fn cached_mesh_element(&self, universe: UniverseId) -> Option<usize> {
        let slot = self.mesh_cache[universe.0];
        if slot.stamp == self.collision {
            slot.element
        } else {
            None
        }
    }

    #[inline]
    pub(crate) fn store_mesh_element(&mut self, universe: UniverseId, element: usize) {
        self.mesh_cache[universe.0] = MeshSlot {
            element: Some(element),
            stamp: self.collision,
        };
    }
}
