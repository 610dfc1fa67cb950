//! Online point location.
//!
//! [`locate`] walks the fill graph from the root, one [`Level`] per universe:
//!
//! 1. the universe's transform and symmetry move the point into its frame
//! 2. the level's scratch is reset
//! 3. the universe type finds the cell, region, element or body holding the point
//! 4. the local index times the universe multiplier is added to the zone index
//! 5. a fill descends into the next universe, a leaf ends the walk
//!
//! The zone index of the leaf is read back with
//! [`ExecutionContext::last_zone_index`]. Nothing here allocates.
//!
//! [`Level`]: crate::context::Level

use nalgebra::{Point3, Vector3};

use crate::context::ExecutionContext;
use crate::error::{GeometryError, Result};
use crate::geometry::Geometry;
use crate::surface::Surface;
use crate::universe::{Child, Leaf, Universe, UniverseId, UniverseKind};


/// What a query does with points no region holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Fail, or substitute the undefined material in tolerant mode.
    Transport,
    /// Always substitute the undefined material and publish every level's bounding surface.
    Plot,
}

/// Locates a point, returning the leaf that holds it.
///
/// The zone index of the leaf is available from
/// [`ExecutionContext::last_zone_index`] until the next query on the same
/// context. Unresolved points fail with [`GeometryError::Unresolved`] unless
/// the geometry is tolerant, in which case [`Leaf::Undefined`] is returned
/// until the substitution cap is passed.
pub fn locate(
    geometry: &Geometry,
    ctx: &mut ExecutionContext,
    pos: Point3<f64>,
    dir: Vector3<f64>,
) -> Result<Leaf> {
    resolve(geometry, ctx, pos, dir, Mode::Transport)
}

/// Locates a point for plotting: any geometry error yields [`Leaf::Undefined`].
pub fn locate_plot(
    geometry: &Geometry,
    ctx: &mut ExecutionContext,
    pos: Point3<f64>,
    dir: Vector3<f64>,
) -> Leaf {
    resolve(geometry, ctx, pos, dir, Mode::Plot).unwrap_or(Leaf::Undefined)
}

fn resolve(
    geometry: &Geometry,
    ctx: &mut ExecutionContext,
    mut pos: Point3<f64>,
    mut dir: Vector3<f64>,
    mode: Mode,
) -> Result<Leaf> {
    ctx.used = 0;
    ctx.zone = 0;

    let mut id = geometry.root();
    let mut zone = 0u64;

    for depth in 0..ctx.levels.len() {
        let universe = geometry.universe(id);
        if let Some(transform) = &universe.transform {
            transform.apply(&mut pos, &mut dir);
        }
        if let Some(symmetry) = &universe.symmetry {
            symmetry.fold(&mut pos, &mut dir);
        }

        ctx.levels[depth].reset(id, pos, dir);
        ctx.used = depth + 1;

        let found = match &universe.kind {
            UniverseKind::CellComplex(complex) => complex
                .find(&pos)
                .map(|cell| (cell, complex.cells[cell].content.as_child())),
            UniverseKind::Nest(nest) => match nest.find(&pos) {
                Some(region) => {
                    if mode == Mode::Plot {
                        ctx.levels[depth].surface = nest.regions[region].surface.clone();
                    }
                    Some((region, nest.regions[region].content.as_child()))
                }
                None if mode == Mode::Plot => None,
                None => {
                    return Err(GeometryError::inconsistency(
                        &universe.name,
                        format!("nest regions leave a gap at {}", pos),
                    ))
                }
            },
            UniverseKind::Lattice(lattice) => lattice
                .find_region(&mut pos, Some(&mut ctx.levels[depth].surface))
                .map(|index| {
                    let child = match lattice.element(index) {
                        Some(universe) => Child::Fill {
                            universe,
                            transform: lattice.element_transform(index),
                        },
                        None => Child::Empty,
                    };
                    (index, child)
                }),
            UniverseKind::PebbleBed(bed) => {
                let index = geometry
                    .pebble_index(id)
                    .ok_or_else(|| missing_search(universe))?;
                match bed.find(&index.grid, &pos) {
                    Some(i) => {
                        let pebble = &bed.pebbles[i];
                        if mode == Mode::Plot {
                            ctx.levels[depth].surface = Some(Surface::Sphere {
                                centre: pebble.centre,
                                radius: pebble.radius,
                            });
                        }
                        pos -= pebble.offset();
                        let local = if depth >= geometry.coarsening_depth() {
                            index.type_of[i]
                        } else {
                            i
                        };
                        Some((local, Child::Fill {
                            universe: pebble.universe,
                            transform: None,
                        }))
                    }
                    None => Some(background(bed.pebbles.len(), bed.background)),
                }
            }
            UniverseKind::Mesh(mesh) => {
                let element = match ctx.cached_mesh_element(id) {
                    Some(element) if mesh.contains_strictly(element, &pos) => Some(element),
                    _ => {
                        let grid = geometry
                            .search_grid(id)
                            .ok_or_else(|| missing_search(universe))?;
                        let found = mesh.find(grid, &pos);
                        if let Some(element) = found {
                            ctx.store_mesh_element(id, element);
                        }
                        found
                    }
                };
                match element {
                    Some(e) => Some((e, mesh.elements[e].content.as_child())),
                    None => Some(background(mesh.elements.len(), mesh.background)),
                }
            }
            UniverseKind::Solids(set) => {
                let grid = geometry
                    .search_grid(id)
                    .ok_or_else(|| missing_search(universe))?;
                match set.find(grid, &pos) {
                    Some(s) => Some((s, set.solids[s].content.as_child())),
                    None => Some(background(set.solids.len(), set.background)),
                }
            }
        };

        let Some((local, child)) = found else {
            return unresolved(geometry, ctx, universe, &pos, zone, mode);
        };

        let count = universe.kind.entity_count();
        if local >= count {
            return Err(GeometryError::inconsistency(
                &universe.name,
                format!("local index {} exceeds {} entities", local, count),
            ));
        }
        let contribution = local as u64 * geometry.multiplier(id);
        zone += contribution;

        let level = &mut ctx.levels[depth];
        level.entity = Some(local);
        level.zone = contribution;

        match child {
            Child::Leaf(leaf) => {
                level.last = true;
                ctx.zone = zone;
                return Ok(leaf);
            }
            Child::Fill {
                universe: next,
                transform,
            } => {
                if let Some(transform) = transform {
                    transform.apply(&mut pos, &mut dir);
                }
                id = next;
            }
            Child::Empty => return unresolved(geometry, ctx, universe, &pos, zone, mode),
        }
    }

    Err(GeometryError::inconsistency(
        &geometry.universe(id).name,
        format!("fill chain is deeper than the {} levels found at setup", ctx.levels.len()),
    ))
}

#[inline]
fn background(count: usize, universe: UniverseId) -> (usize, Child<'static>) {
    (
        count,
        Child::Fill {
            universe,
            transform: None,
        },
    )
}

fn missing_search(universe: &Universe) -> GeometryError {
    GeometryError::inconsistency(&universe.name, "search structure was not built")
}

/// Ends a query on a point no entity of `universe` holds.
fn unresolved(
    geometry: &Geometry,
    ctx: &mut ExecutionContext,
    universe: &Universe,
    pos: &Point3<f64>,
    zone: u64,
    mode: Mode,
) -> Result<Leaf> {
    match mode {
        Mode::Plot => {}
        Mode::Transport if geometry.is_tolerant() => geometry.record_undefined(&universe.name, pos)?,
        Mode::Transport => {
            return Err(GeometryError::Unresolved {
                universe: universe.name.clone(),
                position: *pos,
            })
        }
    }
    if let Some(level) = ctx.levels[..ctx.used].last_mut() {
        level.last = true;
    }
    ctx.zone = zone;
    Ok(Leaf::Undefined)
}
