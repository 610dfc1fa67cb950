//! Error conditions raised while resolving points or enumerating zones.
//!
//! Every condition here is fatal to the run except [`GeometryError::Unresolved`],
//! which tolerant mode absorbs locally (see [`crate::locate`]). Library code
//! never aborts; errors propagate to the driver, which halts with the message.

use nalgebra::Point3;
use thiserror::Error;


#[derive(Debug, Error)]
pub enum GeometryError {
    /// An index exceeded its precomputed bound or a declared tiling left a gap.
    #[error("geometry inconsistency in universe '{universe}': {detail}")]
    Inconsistency { universe: String, detail: String },

    /// No region of the universe contains the point.
    #[error("point {position} is not inside any region of universe '{universe}'")]
    Unresolved {
        universe: String,
        position: Point3<f64>,
    },

    /// Tolerant mode substituted the undefined material too many times.
    #[error("undefined material substituted {count} times, exceeding the cap of {cap}")]
    TooManyUndefined { count: u64, cap: u64 },

    /// The fill graph loops back on itself.
    #[error("recursion depth {depth} exceeded below universe '{universe}', the fill graph is cyclic")]
    Cyclic { universe: String, depth: usize },

    #[error("invalid lattice type: {0}")]
    InvalidLatticeType(String),

    #[error("invalid universe type: {0}")]
    InvalidUniverseType(String),

    #[error("invalid transform order tag: {0}")]
    InvalidTransformOrder(u8),

    /// A lattice violates a construction invariant (element count, parity, ordering).
    #[error("invalid lattice in universe '{universe}': {detail}")]
    InvalidLattice { universe: String, detail: String },

    #[error("failed to read geometry: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse geometry: {0}")]
    Parse(String),
}

impl GeometryError {
    pub fn inconsistency(universe: &str, detail: impl Into<String>) -> Self {
        Self::Inconsistency {
            universe: universe.to_string(),
            detail: detail.into(),
        }
    }

    pub fn invalid_lattice(universe: &str, detail: impl Into<String>) -> Self {
        Self::InvalidLattice {
            universe: universe.to_string(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GeometryError>;
