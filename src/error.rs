//! Errors reported by the topology data structures.
use std::error::Error;
use std::fmt;

/// Precondition violations detected by [`Topology`](crate::topology::Topology).
///
/// All of these are reported before the topology is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// The requested topological dimension exceeds the initialized dimension.
    InvalidDimension { dim: usize, max_dim: usize },
    /// The topology has not been initialized with [`init`](crate::topology::Topology::init).
    Uninitialized,
    /// The ghost offset is larger than the number of local entities.
    GhostOffsetOutOfBounds { dim: usize, offset: usize, size: usize },
    /// A local entity index is out of bounds for the given dimension.
    EntityOutOfBounds { dim: usize, index: usize, size: usize },
    /// Global indices have not been allocated for the given dimension.
    GlobalIndicesNotInitialized { dim: usize },
    /// A local-to-global map does not have one entry per local entity.
    GlobalIndicesSizeMismatch { dim: usize, len: usize, size: usize },
    /// The number of ghost cell owners does not match the number of ghost cells.
    CellOwnerMismatch { num_owners: usize, num_ghost_cells: usize },
    /// A connectivity table has the wrong number of rows for its source dimension.
    ConnectivitySizeMismatch { d0: usize, d1: usize, len: usize, size: usize },
    /// A connectivity table or entity count required for a computation is missing.
    MissingConnectivity { d0: usize, d1: usize },
    /// Entities can only be derived for simplex cells.
    NonSimplexCells { cell: usize, num_vertices: usize },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use TopologyError::*;
        match self {
            InvalidDimension { dim, max_dim } => {
                write!(f, "Invalid topological dimension {dim} (maximum is {max_dim})")
            }
            Uninitialized => write!(f, "Topology has not been initialized"),
            GhostOffsetOutOfBounds { dim, offset, size } => write!(
                f,
                "Ghost offset {offset} exceeds number of entities {size} of dimension {dim}"
            ),
            EntityOutOfBounds { dim, index, size } => write!(
                f,
                "Entity index {index} out of bounds for dimension {dim} with {size} entities"
            ),
            GlobalIndicesNotInitialized { dim } => {
                write!(f, "Global indices for dimension {dim} have not been initialized")
            }
            GlobalIndicesSizeMismatch { dim, len, size } => write!(
                f,
                "Got {len} global indices, but dimension {dim} has {size} entities"
            ),
            CellOwnerMismatch {
                num_owners,
                num_ghost_cells,
            } => write!(
                f,
                "Got {num_owners} ghost cell owners, but there are {num_ghost_cells} ghost cells"
            ),
            ConnectivitySizeMismatch { d0, d1, len, size } => write!(
                f,
                "Connectivity ({d0}, {d1}) has {len} rows, but dimension {d0} has {size} entities"
            ),
            MissingConnectivity { d0, d1 } => {
                write!(f, "Connectivity ({d0}, {d1}) is required but has not been computed")
            }
            NonSimplexCells { cell, num_vertices } => write!(
                f,
                "Cell {cell} has {num_vertices} vertices and is not a simplex"
            ),
        }
    }
}

impl Error for TopologyError {}
