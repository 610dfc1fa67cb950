//! Offline zone enumeration and depletion tables.
//!
//! [`enumerate_zones`] walks every branch of the fill graph once, with the
//! same `local * multiplier` arithmetic as [`crate::locate::locate`], and
//! registers each placement of a depletable material. The result is one sorted
//! zone table per material, searched with a binary search at run time.
//!
//! Pebble beds reached at or below the coarsening depth are enumerated once
//! per pebble type instead of once per pebble, matching what the locator
//! reports for them.

use nalgebra::{Point3, Vector3};

use crate::error::{GeometryError, Result};
use crate::geometry::Geometry;
use crate::transform::Transform;
use crate::universe::{Child, Leaf, MaterialId, Universe, UniverseId, UniverseKind};


/// Sorted zone indices of one material.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ZoneTable {
    zones: Vec<u64>,
    divided: bool,
}

/// Per-material sorted zone tables built by [`enumerate_zones`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepletionTables {
    tables: Vec<ZoneTable>,
}

impl DepletionTables {
    /// Sorts and compacts every table for binary search.
    fn close(&mut self) {
        for table in &mut self.tables {
            table.zones.sort_unstable();
            table.zones.dedup();
            table.zones.shrink_to_fit();
        }
    }

    /// Registered zone indices of a material, ascending.
    pub fn zones(&self, material: MaterialId) -> &[u64] {
        self.tables
            .get(material.0)
            .map(|t| t.zones.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, material: MaterialId, zone: u64) -> bool {
        self.zones(material).binary_search(&zone).is_ok()
    }

    /// Depletion sub-zone of a placement: its position in the material's table
    /// for divided materials, zero for undivided ones, `None` if unregistered.
    #[inline]
    pub fn lookup(&self, material: MaterialId, zone: u64) -> Option<usize> {
        let table = self.tables.get(material.0)?;
        let slot = table.zones.binary_search(&zone).ok()?;
        Some(if table.divided { slot } else { 0 })
    }

    /// Number of depletion sub-zones of a material.
    pub fn zone_count(&self, material: MaterialId) -> usize {
        match self.tables.get(material.0) {
            Some(table) if table.divided => table.zones.len(),
            Some(table) => table.zones.len().min(1),
            None => 0,
        }
    }

    /// Total number of registered placements over all materials.
    pub fn total_zones(&self) -> usize {
        self.tables.iter().map(|t| t.zones.len()).sum()
    }
}

/// One registered placement of a depletable material.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub material: MaterialId,
    pub zone: u64,
    /// Origin of the frame holding the leaf, in root coordinates. Symmetry
    /// folds on the path are not undone.
    pub origin: Point3<f64>,
    /// Level depth of the leaf.
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enumeration {
    pub tables: DepletionTables,
    /// Registered placements in traversal order.
    pub placements: Vec<Placement>,
    /// Leaf placements visited, depletable or not.
    pub leaves: u64,
}

/// Frame change on the path from the root to the current universe.
#[derive(Debug, Clone, Copy)]
enum Step<'a> {
    Transform(&'a Transform),
    Shift(Vector3<f64>),
}

struct Enumerator<'a> {
    geometry: &'a Geometry,
    path: Vec<Step<'a>>,
    tables: DepletionTables,
    placements: Vec<Placement>,
    leaves: u64,
}

/// Assigns a zone index to every leaf placement and builds the depletion tables.
pub fn enumerate_zones(geometry: &Geometry) -> Result<Enumeration> {
    let materials = &geometry.catalog().materials;
    let mut enumerator = Enumerator {
        geometry,
        path: Vec::with_capacity(2 * geometry.depth()),
        tables: DepletionTables {
            tables: materials
                .iter()
                .map(|m| ZoneTable {
                    zones: Vec::new(),
                    divided: m.divided,
                })
                .collect(),
        },
        placements: Vec::new(),
        leaves: 0,
    };

    enumerator.visit(geometry.root(), 0, 0)?;

    let Enumerator {
        mut tables,
        placements,
        leaves,
        ..
    } = enumerator;
    tables.close();

    log::info!(
        "enumerated {} leaf placements, {} depletion zones",
        leaves,
        tables.total_zones()
    );
    for (index, material) in materials.iter().enumerate().filter(|(_, m)| m.depletable) {
        log::info!(
            "material '{}': {} zones",
            material.name,
            tables.zone_count(MaterialId(index))
        );
    }

    Ok(Enumeration {
        tables,
        placements,
        leaves,
    })
}

impl<'a> Enumerator<'a> {
    fn visit(&mut self, id: UniverseId, depth: usize, zone: u64) -> Result<()> {
        let geometry = self.geometry;
        let universe = geometry.universe(id);
        if depth >= geometry.depth() || depth >= geometry.max_depth() {
            return Err(GeometryError::Cyclic {
                universe: universe.name.clone(),
                depth,
            });
        }

        let mark = self.path.len();
        if let Some(transform) = &universe.transform {
            self.path.push(Step::Transform(transform));
        }

        match &universe.kind {
            UniverseKind::PebbleBed(bed) if depth >= geometry.coarsening_depth() => {
                let index = geometry.pebble_index(id).ok_or_else(|| {
                    GeometryError::inconsistency(&universe.name, "search structure was not built")
                })?;
                log::debug!(
                    "pebble bed '{}' at depth {}: {} pebbles enumerated as {} types",
                    universe.name,
                    depth,
                    bed.pebbles.len(),
                    index.types.len()
                );
                for (type_index, pebble_universe) in index.types.iter().enumerate() {
                    // the first pebble of each type stands in for all of them
                    let shift = index
                        .type_of
                        .iter()
                        .position(|&t| t == type_index)
                        .map(|first| bed.pebbles[first].offset());
                    let child = Child::Fill {
                        universe: *pebble_universe,
                        transform: None,
                    };
                    self.entity(id, universe, type_index, child, shift, depth, zone)?;
                }
                let child = Child::Fill {
                    universe: bed.background,
                    transform: None,
                };
                self.entity(id, universe, bed.pebbles.len(), child, None, depth, zone)?;
            }
            kind => {
                for local in 0..kind.entity_count() {
                    let Some(child) = kind.child(local) else {
                        continue;
                    };
                    let shift = match kind {
                        UniverseKind::Lattice(lattice) => lattice.element_centre(local),
                        UniverseKind::PebbleBed(bed) => bed.pebbles.get(local).map(|p| p.offset()),
                        _ => None,
                    };
                    self.entity(id, universe, local, child, shift, depth, zone)?;
                }
            }
        }

        self.path.truncate(mark);
        Ok(())
    }

    /// Registers or descends into one entity of a universe.
    #[allow(clippy::too_many_arguments)]
    fn entity(
        &mut self,
        id: UniverseId,
        universe: &Universe,
        local: usize,
        child: Child<'a>,
        shift: Option<Vector3<f64>>,
        depth: usize,
        zone: u64,
    ) -> Result<()> {
        let count = universe.kind.entity_count();
        let zone = if local < count {
            zone.checked_add(local as u64 * self.geometry.multiplier(id))
        } else {
            None
        }
        .filter(|&z| z <= self.geometry.max_zone())
        .ok_or_else(|| {
            GeometryError::inconsistency(
                &universe.name,
                format!(
                    "entity {} of {} overflows the zone index bound {}",
                    local,
                    count,
                    self.geometry.max_zone()
                ),
            )
        })?;

        match child {
            Child::Leaf(leaf) => {
                self.leaves += 1;
                if let Leaf::Material(material) = leaf {
                    self.register(material, zone, shift, depth);
                }
            }
            Child::Fill {
                universe: next,
                transform,
            } => {
                let mark = self.path.len();
                if let Some(shift) = shift {
                    self.path.push(Step::Shift(shift));
                }
                if let Some(transform) = transform {
                    self.path.push(Step::Transform(transform));
                }
                self.visit(next, depth + 1, zone)?;
                self.path.truncate(mark);
            }
            Child::Empty => {}
        }
        Ok(())
    }

    fn register(&mut self, material: MaterialId, zone: u64, shift: Option<Vector3<f64>>, depth: usize) {
        if !self.geometry.catalog().materials[material.0].depletable {
            return;
        }
        self.tables.tables[material.0].zones.push(zone);

        let mut origin = Point3::origin();
        if let Some(shift) = shift {
            origin += shift;
        }
        for step in self.path.iter().rev() {
            match step {
                Step::Transform(transform) => origin = transform.invert_point(origin),
                Step::Shift(shift) => origin += shift,
            }
        }
        self.placements.push(Placement {
            material,
            zone,
            origin,
            depth,
        });
    }
}
