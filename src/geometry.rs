//! The finalized, read-only geometry shared by every worker.
//!
//! [`Geometry::new`] takes ownership of a [`Catalog`] and checks everything the
//! resolver later relies on without re-checking:
//!
//! - every universe and material reference points into the catalog
//! - lattices, meshes and solid sets satisfy their construction invariants
//! - the fill graph is acyclic, giving a fixed maximum depth
//! - the zone layout fits in a `u64`
//!
//! It also builds the search structures of pebble beds, meshes and solid sets
//! once, so that [`crate::locate`] never allocates.
//!
//! # Zone layout
//!
//! Each universe `U` gets a multiplier `mult(U)`, the largest span of anything
//! filled into it (at least one), and a span `entities(U) * mult(U)`. A leaf
//! placement's zone index is the sum over its path of `local * mult(U)`, a
//! mixed-radix number, so distinct placements never share an index.

use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::Point3;

use crate::context::ExecutionContext;
use crate::error::{GeometryError, Result};
use crate::pebble::PebbleIndex;
use crate::search::SearchGrid;
use crate::settings::{Settings, UNDEFINED_WARN_LIMIT};
use crate::universe::{Catalog, Child, Content, Universe, UniverseId, UniverseKind};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{Lattice, LatticeKind};
    use crate::surface::Surface;
    use crate::universe::{Material, Nest, NestRegion};

    fn pin() -> Universe {
        Universe::new(
            "pin",
            UniverseKind::Nest(Nest {
                regions: vec![
                    NestRegion {
                        surface: Some(Surface::Sphere {
                            centre: [0.0; 3],
                            radius: 0.4,
                        }),
                        content: Content::material(0),
                    },
                    NestRegion {
                        surface: None,
                        content: Content::material(1),
                    },
                ],
            }),
        )
    }

    fn square(nx: usize, fill: UniverseId) -> Universe {
        Universe::new(
            "assembly",
            UniverseKind::Lattice(Lattice::new(
                LatticeKind::Square {
                    nx,
                    ny: nx,
                    pitch: 1.0,
                },
                [0.0; 3],
                vec![Some(fill); nx * nx],
                vec![],
            )),
        )
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_material(Material::burnable("fuel"));
        catalog.add_material(Material::new("water"));
        let pin = catalog.add_universe(pin());
        let assembly = catalog.add_universe(square(3, pin));
        catalog.set_root(assembly);
        catalog
    }

    #[test]
    fn zone_layout() {
        let geometry = Geometry::new(catalog(), &Settings::default()).unwrap();
        // pin: two regions of leaves
        assert_eq!(geometry.multiplier(UniverseId(0)), 1);
        assert_eq!(geometry.span(UniverseId(0)), 2);
        // assembly: nine pins
        assert_eq!(geometry.multiplier(UniverseId(1)), 2);
        assert_eq!(geometry.span(UniverseId(1)), 18);
        assert_eq!(geometry.max_zone(), 17);
        assert_eq!(geometry.depth(), 2);
    }

    #[test]
    fn cycle_is_detected() {
        let mut catalog = catalog();
        // fill the pin's outer region with the assembly that holds it
        if let UniverseKind::Nest(nest) = &mut catalog.universes[0].kind {
            nest.regions[1].content = Content::fill(UniverseId(1));
        }
        assert!(matches!(
            Geometry::new(catalog, &Settings::default()),
            Err(GeometryError::Cyclic { .. })
        ));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mut catalog = catalog();
        catalog.universes[1] = square(3, UniverseId(7));
        assert!(matches!(
            Geometry::new(catalog, &Settings::default()),
            Err(GeometryError::Inconsistency { .. })
        ));

        let mut catalog = self::catalog();
        if let UniverseKind::Nest(nest) = &mut catalog.universes[0].kind {
            nest.regions[0].content = Content::material(5);
        }
        assert!(Geometry::new(catalog, &Settings::default()).is_err());
    }

    #[test]
    fn depth_guard_applies_to_long_chains() {
        let settings = Settings {
            max_depth: 1,
            ..Settings::default()
        };
        assert!(matches!(
            Geometry::new(catalog(), &settings),
            Err(GeometryError::Cyclic { .. })
        ));
    }

    #[test]
    fn zone_overflow_is_inconsistent() {
        let mut catalog = catalog();
        let mut inner = UniverseId(1);
        // each 100x100 level multiplies the span by ten thousand
        for _ in 0..6 {
            inner = catalog.add_universe(square(100, inner));
        }
        catalog.set_root(inner);
        assert!(matches!(
            Geometry::new(catalog, &Settings::default()),
            Err(GeometryError::Inconsistency { .. })
        ));
    }

    #[test]
    fn tolerant_counter_escalates_past_cap() {
        let settings = Settings {
            tolerant: true,
            undefined_cap: 2,
            ..Settings::default()
        };
        let geometry = Geometry::new(catalog(), &settings).unwrap();
        let p = Point3::origin();
        assert!(geometry.record_undefined("pin", &p).is_ok());
        assert!(geometry.record_undefined("pin", &p).is_ok());
        assert!(matches!(
            geometry.record_undefined("pin", &p),
            Err(GeometryError::TooManyUndefined { count: 3, cap: 2 })
        ));
        assert_eq!(geometry.undefined_count(), 3);
    }
}

/// Search structure attached to a universe, if its type needs one.
#[derive(Debug, Clone, PartialEq)]
enum Acceleration {
    None,
    Pebbles(PebbleIndex),
    Grid(SearchGrid),
}

/// Per-universe zone layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    multiplier: u64,
    span: u64,
}

#[derive(Debug)]
pub struct Geometry {
    catalog: Catalog,
    layout: Vec<Layout>,
    acceleration: Vec<Acceleration>,
    depth: usize,
    max_depth: usize,
    tolerant: bool,
    undefined_cap: u64,
    undefined: AtomicU64,
    coarsening_depth: usize,
}

impl Geometry {
    /// Validates and finalizes a catalog.
    pub fn new(mut catalog: Catalog, settings: &Settings) -> Result<Self> {
        check_references(&catalog)?;

        for universe in catalog.universes.iter_mut() {
            match &mut universe.kind {
                UniverseKind::Lattice(lattice) => lattice.validate(&universe.name)?,
                UniverseKind::Mesh(mesh) => mesh.validate(&universe.name)?,
                UniverseKind::Solids(set) => set.validate(&universe.name)?,
                _ => {}
            }
        }

        let mut walk = Walk {
            catalog: &catalog,
            state: vec![Visit::New; catalog.universes.len()],
            layout: vec![Layout { multiplier: 1, span: 1 }; catalog.universes.len()],
            height: vec![0; catalog.universes.len()],
            max_depth: settings.max_depth,
        };
        walk.visit(catalog.root, 1)?;
        let depth = walk.height[catalog.root.0];
        let layout = walk.layout;

        let acceleration = catalog
            .universes
            .iter()
            .map(|universe| match &universe.kind {
                UniverseKind::PebbleBed(bed) => Acceleration::Pebbles(PebbleIndex::build(bed)),
                UniverseKind::Mesh(mesh) => Acceleration::Grid(SearchGrid::build(&mesh.bounding_boxes())),
                UniverseKind::Solids(set) => Acceleration::Grid(SearchGrid::build(&set.bounding_boxes())),
                _ => Acceleration::None,
            })
            .collect();

        for (universe, l) in catalog.universes.iter().zip(&layout) {
            log::debug!(
                "universe '{}' ({}): {} entities, multiplier {}, span {}",
                universe.name,
                universe.kind.name(),
                universe.kind.entity_count(),
                l.multiplier,
                l.span
            );
        }

        let geometry = Self {
            layout,
            acceleration,
            depth,
            max_depth: settings.max_depth,
            tolerant: settings.tolerant,
            undefined_cap: settings.undefined_cap,
            undefined: AtomicU64::new(0),
            coarsening_depth: settings.pebble_coarsening_depth,
            catalog,
        };

        log::info!(
            "geometry finalized: {} universes, depth {}, zone indices 0..={}",
            geometry.catalog.universes.len(),
            geometry.depth,
            geometry.max_zone()
        );

        Ok(geometry)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn root(&self) -> UniverseId {
        self.catalog.root
    }

    #[inline]
    pub fn universe(&self, id: UniverseId) -> &Universe {
        self.catalog.universe(id)
    }

    /// Number of levels on the longest fill chain from the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Recursion guard the fill graph was checked against.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[inline]
    pub fn multiplier(&self, id: UniverseId) -> u64 {
        self.layout[id.0].multiplier
    }

    pub fn span(&self, id: UniverseId) -> u64 {
        self.layout[id.0].span
    }

    /// Largest zone index any placement can have.
    pub fn max_zone(&self) -> u64 {
        self.span(self.catalog.root) - 1
    }

    pub fn is_tolerant(&self) -> bool {
        self.tolerant
    }

    /// Level depth from which pebble beds contribute their pebble type instead of the pebble.
    #[inline]
    pub fn coarsening_depth(&self) -> usize {
        self.coarsening_depth
    }

    #[inline]
    pub(crate) fn pebble_index(&self, id: UniverseId) -> Option<&PebbleIndex> {
        match &self.acceleration[id.0] {
            Acceleration::Pebbles(index) => Some(index),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn search_grid(&self, id: UniverseId) -> Option<&SearchGrid> {
        match &self.acceleration[id.0] {
            Acceleration::Grid(grid) => Some(grid),
            _ => None,
        }
    }

    /// Fresh scratch state for one worker.
    pub fn new_context(&self, id: usize) -> ExecutionContext {
        ExecutionContext::new(id, self.depth, self.catalog.universes.len())
    }

    /// Counts one tolerant-mode substitution, failing once the cap is passed.
    pub fn record_undefined(&self, universe: &str, position: &Point3<f64>) -> Result<()> {
        let count = self.undefined.fetch_add(1, Ordering::Relaxed) + 1;
        if count > self.undefined_cap {
            return Err(GeometryError::TooManyUndefined {
                count,
                cap: self.undefined_cap,
            });
        }
        if count <= UNDEFINED_WARN_LIMIT {
            log::warn!(
                "point {} is not inside any region of universe '{}', using the undefined material ({}/{})",
                position,
                universe,
                count,
                self.undefined_cap
            );
        }
        if count == UNDEFINED_WARN_LIMIT {
            log::warn!("further undefined-material substitutions will not be logged");
        }
        Ok(())
    }

    pub fn undefined_count(&self) -> u64 {
        self.undefined.load(Ordering::Relaxed)
    }
}

fn check_references(catalog: &Catalog) -> Result<()> {
    let n_universes = catalog.universes.len();
    let n_materials = catalog.materials.len();
    let root_name = "<root>";

    if catalog.root.0 >= n_universes {
        return Err(GeometryError::inconsistency(
            root_name,
            format!("root {} is not in a catalog of {} universes", catalog.root, n_universes),
        ));
    }

    let check_content = |universe: &str, content: &Content| match content {
        Content::Material { material } if material.0 >= n_materials => {
            Err(GeometryError::inconsistency(
                universe,
                format!("material {} is not in a catalog of {} materials", material.0, n_materials),
            ))
        }
        Content::Fill { universe: id, .. } if id.0 >= n_universes => {
            Err(GeometryError::inconsistency(
                universe,
                format!("fill {} is not in a catalog of {} universes", id, n_universes),
            ))
        }
        _ => Ok(()),
    };
    let check_id = |universe: &str, id: UniverseId| {
        if id.0 < n_universes {
            Ok(())
        } else {
            Err(GeometryError::inconsistency(
                universe,
                format!("fill {} is not in a catalog of {} universes", id, n_universes),
            ))
        }
    };

    for universe in &catalog.universes {
        let name = universe.name.as_str();
        match &universe.kind {
            UniverseKind::CellComplex(complex) => {
                for cell in &complex.cells {
                    check_content(name, &cell.content)?;
                    if let Some(h) = cell.region.iter().find(|h| h.surface >= complex.surfaces.len()) {
                        return Err(GeometryError::inconsistency(
                            name,
                            format!("cell '{}' refers to surface {}", cell.name, h.surface),
                        ));
                    }
                }
            }
            UniverseKind::Nest(nest) => {
                for region in &nest.regions {
                    check_content(name, &region.content)?;
                }
            }
            UniverseKind::Lattice(lattice) => {
                for id in lattice.elements.iter().flatten() {
                    check_id(name, *id)?;
                }
            }
            UniverseKind::PebbleBed(bed) => {
                for pebble in &bed.pebbles {
                    check_id(name, pebble.universe)?;
                }
                check_id(name, bed.background)?;
            }
            UniverseKind::Mesh(mesh) => {
                for element in &mesh.elements {
                    check_content(name, &element.content)?;
                }
                check_id(name, mesh.background)?;
            }
            UniverseKind::Solids(set) => {
                for solid in &set.solids {
                    check_content(name, &solid.content)?;
                }
                check_id(name, set.background)?;
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Depth-first walk of the fill graph computing heights and the zone layout.
struct Walk<'a> {
    catalog: &'a Catalog,
    state: Vec<Visit>,
    layout: Vec<Layout>,
    height: Vec<usize>,
    max_depth: usize,
}

impl Walk<'_> {
    fn visit(&mut self, id: UniverseId, level: usize) -> Result<()> {
        let universe = self.catalog.universe(id);
        if level > self.max_depth || self.state[id.0] == Visit::Active {
            return Err(GeometryError::Cyclic {
                universe: universe.name.clone(),
                depth: level,
            });
        }
        if self.state[id.0] == Visit::Done {
            // a shared universe is only as deep as its subtree, so the guard still holds
            if level + self.height[id.0] - 1 > self.max_depth {
                return Err(GeometryError::Cyclic {
                    universe: universe.name.clone(),
                    depth: level + self.height[id.0] - 1,
                });
            }
            return Ok(());
        }
        self.state[id.0] = Visit::Active;

        let count = universe.kind.entity_count();
        let mut multiplier = 1u64;
        let mut height = 1;
        for index in 0..count {
            if let Some(Child::Fill { universe: child, .. }) = universe.kind.child(index) {
                self.visit(child, level + 1)?;
                multiplier = multiplier.max(self.layout[child.0].span);
                height = height.max(self.height[child.0] + 1);
            }
        }

        let span = (count as u64).checked_mul(multiplier).ok_or_else(|| {
            GeometryError::inconsistency(
                &universe.name,
                format!("{} entities of multiplier {} overflow the zone index", count, multiplier),
            )
        })?;

        self.layout[id.0] = Layout {
            multiplier,
            span: span.max(1),
        };
        self.height[id.0] = height;
        self.state[id.0] = Visit::Done;
        Ok(())
    }
}
