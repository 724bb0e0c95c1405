//! Function spaces: a mesh topology together with a cell-to-dof map.
use crate::connectivity::Connectivity;
use crate::topology::Topology;
use eyre::eyre;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Map from cells to the (process-local) degrees of freedom supported on them.
///
/// Dofs are numbered `0 .. num_dofs()` and include dofs of ghost entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofMap {
    cell_dofs: Connectivity,
    num_dofs: usize,
}

impl DofMap {
    /// Creates a dof map from a cell-dof table. All dofs must be smaller than `num_dofs`.
    pub fn new(cell_dofs: Connectivity, num_dofs: usize) -> eyre::Result<Self> {
        if let Some(&dof) = cell_dofs.indices().iter().find(|&&dof| dof >= num_dofs) {
            return Err(eyre!("Dof {} out of bounds for dof map with {} dofs", dof, num_dofs));
        }
        Ok(Self { cell_dofs, num_dofs })
    }

    /// Creates a dof map with one dof per vertex, numbered like the vertices.
    pub fn from_vertices(topology: &Topology) -> eyre::Result<Self> {
        let tdim = topology.dim();
        let cell_vertices = topology
            .connectivity(tdim, 0)?
            .ok_or_else(|| eyre!("Vertex dof map requires cell-vertex connectivity"))?;
        Self::new(cell_vertices.clone(), topology.size(0)?)
    }

    /// Expands every dof into `block_size` consecutive dofs.
    ///
    /// Dof `i` of this map becomes the dofs `block_size * i + k` for `k` in `0 .. block_size`,
    /// which is the usual numbering for vector-valued fields.
    pub fn blocked(&self, block_size: usize) -> DofMap {
        assert!(block_size > 0, "Block size must be positive.");
        let mut cell_dofs = Connectivity::new();
        for dofs in self.cell_dofs.iter() {
            let mut appender = cell_dofs.begin_entity();
            for &dof in dofs {
                for k in 0..block_size {
                    appender.push_single(block_size * dof + k);
                }
            }
        }
        DofMap {
            cell_dofs,
            num_dofs: block_size * self.num_dofs,
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_cells(&self) -> usize {
        self.cell_dofs.len()
    }

    /// The dofs of the given cell, in local (element tensor) order.
    pub fn cell_dofs(&self, cell: usize) -> &[usize] {
        &self.cell_dofs[cell]
    }

    pub fn max_cell_dimension(&self) -> usize {
        self.cell_dofs.max_row_len()
    }
}

#[derive(Debug)]
struct FunctionSpaceData {
    topology: Arc<Topology>,
    dofmap: DofMap,
    num_owned_cells: usize,
}

/// A shared handle to a function space.
///
/// Function spaces compare by identity: two handles are equal if and only if they were cloned
/// from the same space. Two spaces built separately from identical data are different spaces.
#[derive(Clone)]
pub struct FunctionSpace {
    data: Arc<FunctionSpaceData>,
}

impl FunctionSpace {
    /// Creates a function space. The dof map must have one row per local cell.
    pub fn new(topology: Arc<Topology>, dofmap: DofMap) -> eyre::Result<Self> {
        let tdim = topology.dim();
        let num_cells = topology.size(tdim)?;
        if dofmap.num_cells() != num_cells {
            return Err(eyre!(
                "Dof map has {} cells, but topology has {} cells",
                dofmap.num_cells(),
                num_cells
            ));
        }
        let num_owned_cells = topology.ghost_offset(tdim)?;
        Ok(Self {
            data: Arc::new(FunctionSpaceData {
                topology,
                dofmap,
                num_owned_cells,
            }),
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.data.topology
    }

    pub fn dofmap(&self) -> &DofMap {
        &self.data.dofmap
    }

    /// Total number of local dofs (owned and ghost).
    pub fn num_dofs(&self) -> usize {
        self.data.dofmap.num_dofs()
    }

    /// Number of cells owned by this process. Owned cells are `0 .. num_owned_cells()`.
    pub fn num_owned_cells(&self) -> usize {
        self.data.num_owned_cells
    }
}

impl PartialEq for FunctionSpace {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for FunctionSpace {}

impl fmt::Debug for FunctionSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSpace")
            .field("num_dofs", &self.num_dofs())
            .field("num_owned_cells", &self.num_owned_cells())
            .finish()
    }
}
