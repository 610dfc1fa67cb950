//! The universe catalog: the static tree of geometric scopes the resolver walks.
//!
//! A [`Catalog`] owns every [`Universe`] and [`Material`]; universes refer to
//! each other through [`UniverseId`] indices into the catalog. Nothing in this
//! module is mutated once the catalog has been handed to
//! [`crate::geometry::Geometry`].
//!
//! # Universe types
//!
//! - [`UniverseKind::CellComplex`]: cells bounded by oriented surfaces
//! - [`UniverseKind::Nest`]: ordered, concentric regions
//! - [`UniverseKind::Lattice`]: a repeating tiling of elements
//! - [`UniverseKind::PebbleBed`]: explicit spherical bodies in a background
//! - [`UniverseKind::Mesh`]: an unstructured tetrahedral mesh in a background
//! - [`UniverseKind::Solids`]: closed triangulated surfaces in a background

use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::error::{GeometryError, Result};
use crate::lattice::{Lattice, LatticeKind};
use crate::mesh::TetMesh;
use crate::pebble::PebbleBed;
use crate::solid::SolidSet;
use crate::surface::{Sense, Surface};
use crate::transform::{Symmetry, Transform};


/// Index of a universe in its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct UniverseId(pub usize);

/// Opaque handle of a material, passed through to the caller uninterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct MaterialId(pub usize);

impl fmt::Display for UniverseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Material {
    pub name: String,
    /// Whether the material takes part in depletion.
    #[serde(default)]
    pub depletable: bool,
    /// Whether each placement of the material is its own depletion zone.
    #[serde(default)]
    pub divided: bool,
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            depletable: false,
            divided: false,
        }
    }

    /// A depletable material divided into one zone per placement.
    pub fn burnable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            depletable: true,
            divided: true,
        }
    }
}

/// What fills a cell, nest region, mesh element or solid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Material {
        material: MaterialId,
    },
    Fill {
        universe: UniverseId,
        #[serde(default)]
        transform: Option<Transform>,
    },
    Void,
    /// Outside the modelled geometry.
    Outside,
}

impl Content {
    pub fn material(id: usize) -> Self {
        Content::Material {
            material: MaterialId(id),
        }
    }

    pub fn fill(universe: UniverseId) -> Self {
        Content::Fill {
            universe,
            transform: None,
        }
    }

    pub fn as_child(&self) -> Child<'_> {
        match self {
            Content::Material { material } => Child::Leaf(Leaf::Material(*material)),
            Content::Fill {
                universe,
                transform,
            } => Child::Fill {
                universe: *universe,
                transform: transform.as_ref(),
            },
            Content::Void => Child::Leaf(Leaf::Void),
            Content::Outside => Child::Leaf(Leaf::Outside),
        }
    }
}

/// Terminal result of point location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Leaf {
    Material(MaterialId),
    Void,
    Outside,
    /// Placeholder substituted for unresolved points in tolerant and plot modes.
    Undefined,
}

impl Leaf {
    pub fn material(&self) -> Option<MaterialId> {
        match self {
            Leaf::Material(id) => Some(*id),
            _ => None,
        }
    }
}

/// Content of one sub-entity, as seen by the resolver and the enumerator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Child<'a> {
    Leaf(Leaf),
    Fill {
        universe: UniverseId,
        transform: Option<&'a Transform>,
    },
    /// Lattice element with no universe.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Halfspace {
    pub surface: usize,
    pub sense: Sense,
}

/// A cell: the intersection of oriented surfaces.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cell {
    pub name: String,
    pub region: Vec<Halfspace>,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CellComplex {
    pub surfaces: Vec<Surface>,
    pub cells: Vec<Cell>,
}

impl CellComplex {
    /// First cell containing the point.
    pub fn find(&self, p: &nalgebra::Point3<f64>) -> Option<usize> {
        self.cells.iter().position(|cell| {
            cell.region
                .iter()
                .all(|h| self.surfaces[h.surface].contains(p, h.sense))
        })
    }
}

/// One region of a nest: inside its surface and outside every earlier one.
/// The last region may omit its surface to cover everything else.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NestRegion {
    #[serde(default)]
    pub surface: Option<Surface>,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Nest {
    pub regions: Vec<NestRegion>,
}

impl Nest {
    pub fn find(&self, p: &nalgebra::Point3<f64>) -> Option<usize> {
        self.regions.iter().position(|region| match &region.surface {
            Some(surface) => surface.inside(p),
            None => true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UniverseKind {
    CellComplex(CellComplex),
    Nest(Nest),
    Lattice(Lattice),
    PebbleBed(PebbleBed),
    Mesh(TetMesh),
    Solids(SolidSet),
}

impl UniverseKind {
    pub const NAMES: [&'static str; 6] = [
        "cell_complex",
        "nest",
        "lattice",
        "pebble_bed",
        "mesh",
        "solids",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UniverseKind::CellComplex(_) => "cell_complex",
            UniverseKind::Nest(_) => "nest",
            UniverseKind::Lattice(_) => "lattice",
            UniverseKind::PebbleBed(_) => "pebble_bed",
            UniverseKind::Mesh(_) => "mesh",
            UniverseKind::Solids(_) => "solids",
        }
    }

    /// Number of distinct local indices this universe can contribute to a zone index.
    ///
    /// Pebble beds, meshes and solid sets reserve one extra index, one past
    /// their last body, for their background universe.
    pub fn entity_count(&self) -> usize {
        match self {
            UniverseKind::CellComplex(complex) => complex.cells.len(),
            UniverseKind::Nest(nest) => nest.regions.len(),
            UniverseKind::Lattice(lattice) => lattice.elements.len(),
            UniverseKind::PebbleBed(bed) => bed.pebbles.len() + 1,
            UniverseKind::Mesh(mesh) => mesh.elements.len() + 1,
            UniverseKind::Solids(set) => set.solids.len() + 1,
        }
    }

    /// Content of the sub-entity with local index `index`.
    pub fn child(&self, index: usize) -> Option<Child<'_>> {
        match self {
            UniverseKind::CellComplex(complex) => {
                complex.cells.get(index).map(|c| c.content.as_child())
            }
            UniverseKind::Nest(nest) => nest.regions.get(index).map(|r| r.content.as_child()),
            UniverseKind::Lattice(lattice) => {
                if index >= lattice.elements.len() {
                    return None;
                }
                Some(match lattice.element(index) {
                    Some(universe) => Child::Fill {
                        universe,
                        transform: lattice.element_transform(index),
                    },
                    None => Child::Empty,
                })
            }
            UniverseKind::PebbleBed(bed) => match bed.pebbles.get(index) {
                Some(pebble) => Some(Child::Fill {
                    universe: pebble.universe,
                    transform: None,
                }),
                None if index == bed.pebbles.len() => Some(Child::Fill {
                    universe: bed.background,
                    transform: None,
                }),
                None => None,
            },
            UniverseKind::Mesh(mesh) => match mesh.elements.get(index) {
                Some(element) => Some(element.content.as_child()),
                None if index == mesh.elements.len() => Some(Child::Fill {
                    universe: mesh.background,
                    transform: None,
                }),
                None => None,
            },
            UniverseKind::Solids(set) => match set.solids.get(index) {
                Some(solid) => Some(solid.content.as_child()),
                None if index == set.solids.len() => Some(Child::Fill {
                    universe: set.background,
                    transform: None,
                }),
                None => None,
            },
        }
    }
}

/// A named geometric scope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Universe {
    pub name: String,
    pub kind: UniverseKind,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub symmetry: Option<Symmetry>,
}

impl Universe {
    pub fn new(name: &str, kind: UniverseKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            transform: None,
            symmetry: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_symmetry(mut self, symmetry: Symmetry) -> Self {
        self.symmetry = Some(symmetry);
        self
    }
}

/// Every universe and material of a geometry, rooted at `root`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Catalog {
    pub root: UniverseId,
    pub universes: Vec<Universe>,
    pub materials: Vec<Material>,
    /// Box `[min, max]` enclosing the modelled geometry in the root frame.
    #[serde(default)]
    pub bounds: Option<[[f64; 3]; 2]>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            root: UniverseId(0),
            universes: Vec::new(),
            materials: Vec::new(),
            bounds: None,
        }
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    pub fn add_universe(&mut self, universe: Universe) -> UniverseId {
        self.universes.push(universe);
        UniverseId(self.universes.len() - 1)
    }

    pub fn set_root(&mut self, root: UniverseId) {
        self.root = root;
    }

    pub fn universe(&self, id: UniverseId) -> &Universe {
        &self.universes[id.0]
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parses a catalog, reporting unknown universe and lattice types by name.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| GeometryError::Parse(e.to_string()))?;

        if let Some(universes) = value.get("universes").and_then(|u| u.as_array()) {
            for universe in universes {
                let Some(kind) = universe.get("kind") else {
                    continue;
                };
                let tag = kind.get("type").and_then(|t| t.as_str()).unwrap_or("");
                if !UniverseKind::NAMES.contains(&tag) {
                    return Err(GeometryError::InvalidUniverseType(tag.to_string()));
                }
                if tag == "lattice" {
                    let lattice_tag = kind
                        .get("kind")
                        .and_then(|k| k.get("type"))
                        .and_then(|t| t.as_str())
                        .unwrap_or("");
                    if !LatticeKind::NAMES.contains(&lattice_tag) {
                        return Err(GeometryError::InvalidLatticeType(lattice_tag.to_string()));
                    }
                }
            }
        }

        serde_json::from_value(value).map_err(|e| GeometryError::Parse(e.to_string()))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
