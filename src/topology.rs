//! Distributed mesh topology: entity counts, ghosts, global numbering and connectivity.
//!
//! A mesh entity is identified locally by a pair `(d, i)`, where `d` is its topological
//! dimension and `i` its local index among entities of dimension `d`. Entities of each
//! dimension are laid out contiguously with owned entities first and ghost entities last:
//! entities `0 .. ghost_offset(d)` are owned by this process, the remaining entities
//! `ghost_offset(d) .. size(d)` are ghost copies of entities owned elsewhere.
use crate::connectivity::Connectivity;
use crate::error::TopologyError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;

pub mod compute;

/// Value of a global index that has been allocated, but not yet assigned.
pub const UNASSIGNED_GLOBAL_INDEX: i64 = -1;

/// Map from a local entity index to the set of process ranks that also hold the entity.
pub type SharedEntities = BTreeMap<usize, BTreeSet<u32>>;

/// The topology of a (possibly partitioned) mesh.
///
/// Only the number of entities and the connectivity between entities are stored, not the
/// entities themselves. Global indices and shared entities are optional refinements that are
/// populated by a separate distributed numbering pass.
///
/// Cloning a topology performs a deep copy of all data, including all connectivity tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Number of local (owned + ghost) entities for each dimension
    num_entities: Vec<usize>,
    /// Index of the first ghost entity for each dimension
    ghost_offset: Vec<usize>,
    global_num_entities: Vec<u64>,
    /// Local-to-global maps, `None` if not computed
    global_indices: Vec<Option<Vec<i64>>>,
    /// Shared entities for each dimension for which they have been computed
    shared_entities: BTreeMap<usize, SharedEntities>,
    /// Owning process of each ghost cell, in the order of the ghost range
    cell_owner: Vec<u32>,
    /// Connectivity for each ordered pair of dimensions, `None` if not computed
    connectivity: Vec<Vec<Option<Connectivity>>>,
}

impl Topology {
    /// Creates an empty, uninitialized topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the topology of a serial mesh from its cell-vertex connectivity.
    ///
    /// Vertices and cells are all owned, and their global counts equal the local counts.
    /// Intermediate entities can be derived afterwards with
    /// [`compute_entities`](compute::compute_entities).
    pub fn from_cells(tdim: usize, num_vertices: usize, cells: Connectivity) -> Result<Self, TopologyError> {
        if let Some(&vertex) = cells.indices().iter().find(|&&v| v >= num_vertices) {
            return Err(TopologyError::EntityOutOfBounds {
                dim: 0,
                index: vertex,
                size: num_vertices,
            });
        }
        let mut topology = Self::new();
        topology.init(tdim);
        topology.init_size(0, num_vertices, num_vertices as u64)?;
        topology.init_size(tdim, cells.len(), cells.len() as u64)?;
        topology.set_connectivity(tdim, 0, cells)?;
        Ok(topology)
    }

    /// Returns `true` if [`init`](Self::init) has been called.
    pub fn is_initialized(&self) -> bool {
        !self.num_entities.is_empty()
    }

    /// The topological dimension, or zero for an uninitialized topology.
    pub fn dim(&self) -> usize {
        self.num_entities.len().saturating_sub(1)
    }

    fn check_dim(&self, d: usize) -> Result<(), TopologyError> {
        if !self.is_initialized() {
            Err(TopologyError::Uninitialized)
        } else if d > self.dim() {
            Err(TopologyError::InvalidDimension {
                dim: d,
                max_dim: self.dim(),
            })
        } else {
            Ok(())
        }
    }

    /// Initializes the topology for the given maximum topological dimension.
    ///
    /// Any previously stored data is discarded and all entity counts are set to zero.
    pub fn init(&mut self, dim: usize) {
        self.clear();
        let n = dim + 1;
        self.num_entities = vec![0; n];
        self.ghost_offset = vec![0; n];
        self.global_num_entities = vec![0; n];
        self.global_indices = vec![None; n];
        self.connectivity = vec![vec![None; n]; n];
    }

    /// Sets the number of local entities (owned and ghost) and the global number of entities
    /// for dimension `dim`.
    ///
    /// The ghost offset is reset to `local_size`, i.e. all entities are considered owned until
    /// [`init_ghost`](Self::init_ghost) is called, and for cells the ghost cell owners are
    /// discarded. If the number of entities changes, the global index map, the shared entities
    /// and all connectivity tables to or from `dim` are discarded as well.
    pub fn init_size(&mut self, dim: usize, local_size: usize, global_size: u64) -> Result<(), TopologyError> {
        self.check_dim(dim)?;
        if self.num_entities[dim] != local_size {
            for row in &mut self.connectivity {
                row[dim] = None;
            }
            self.connectivity[dim].fill(None);
            self.shared_entities.remove(&dim);
        }
        if dim == self.dim() {
            self.cell_owner.clear();
        }
        self.num_entities[dim] = local_size;
        self.global_num_entities[dim] = global_size;
        self.ghost_offset[dim] = local_size;
        if let Some(indices) = &self.global_indices[dim] {
            if indices.len() != local_size {
                self.global_indices[dim] = None;
            }
        }
        Ok(())
    }

    /// Sets the index of the first ghost entity of dimension `dim`.
    pub fn init_ghost(&mut self, dim: usize, index: usize) -> Result<(), TopologyError> {
        self.check_dim(dim)?;
        let size = self.num_entities[dim];
        if index > size {
            return Err(TopologyError::GhostOffsetOutOfBounds {
                dim,
                offset: index,
                size,
            });
        }
        self.ghost_offset[dim] = index;
        Ok(())
    }

    /// Allocates storage for global indices of all local entities of dimension `dim`.
    ///
    /// Every entry starts out as [`UNASSIGNED_GLOBAL_INDEX`].
    pub fn init_global_indices(&mut self, dim: usize) -> Result<(), TopologyError> {
        self.check_dim(dim)?;
        self.global_indices[dim] = Some(vec![UNASSIGNED_GLOBAL_INDEX; self.num_entities[dim]]);
        Ok(())
    }

    /// Sets the global index of a single entity. Requires global indices to be allocated.
    pub fn set_global_index(&mut self, dim: usize, local_index: usize, global_index: i64) -> Result<(), TopologyError> {
        self.check_dim(dim)?;
        let indices = self.global_indices[dim]
            .as_mut()
            .ok_or(TopologyError::GlobalIndicesNotInitialized { dim })?;
        let size = indices.len();
        let entry = indices
            .get_mut(local_index)
            .ok_or(TopologyError::EntityOutOfBounds {
                dim,
                index: local_index,
                size,
            })?;
        *entry = global_index;
        Ok(())
    }

    /// Replaces the whole local-to-global map of dimension `dim`.
    pub fn set_global_indices(&mut self, dim: usize, indices: Vec<i64>) -> Result<(), TopologyError> {
        self.check_dim(dim)?;
        if indices.len() != self.num_entities[dim] {
            return Err(TopologyError::GlobalIndicesSizeMismatch {
                dim,
                len: indices.len(),
                size: self.num_entities[dim],
            });
        }
        self.global_indices[dim] = Some(indices);
        Ok(())
    }

    /// Number of local entities (owned and ghost) of dimension `d`.
    pub fn size(&self, d: usize) -> Result<usize, TopologyError> {
        self.check_dim(d)?;
        Ok(self.num_entities[d])
    }

    /// Global number of entities of dimension `d`.
    pub fn size_global(&self, d: usize) -> Result<u64, TopologyError> {
        self.check_dim(d)?;
        Ok(self.global_num_entities[d])
    }

    /// Number of owned entities of dimension `d`, equivalently the index of the first ghost.
    pub fn ghost_offset(&self, d: usize) -> Result<usize, TopologyError> {
        self.check_dim(d)?;
        Ok(self.ghost_offset[d])
    }

    pub fn num_ghosts(&self, d: usize) -> Result<usize, TopologyError> {
        self.check_dim(d)?;
        Ok(self.num_entities[d] - self.ghost_offset[d])
    }

    /// Local indices of the owned entities of dimension `d`.
    pub fn owned_range(&self, d: usize) -> Result<Range<usize>, TopologyError> {
        Ok(0..self.ghost_offset(d)?)
    }

    /// Local indices of the ghost entities of dimension `d`.
    pub fn ghost_range(&self, d: usize) -> Result<Range<usize>, TopologyError> {
        Ok(self.ghost_offset(d)?..self.size(d)?)
    }

    /// The local-to-global map for entities of dimension `d`, if it has been initialized.
    pub fn global_indices(&self, d: usize) -> Result<Option<&[i64]>, TopologyError> {
        self.check_dim(d)?;
        Ok(self.global_indices[d].as_deref())
    }

    pub fn have_global_indices(&self, d: usize) -> Result<bool, TopologyError> {
        Ok(self.global_indices(d)?.is_some())
    }

    pub fn have_shared_entities(&self, d: usize) -> Result<bool, TopologyError> {
        self.check_dim(d)?;
        Ok(self.shared_entities.contains_key(&d))
    }

    /// Shared entities of dimension `d`, if they have been computed.
    pub fn shared_entities(&self, d: usize) -> Result<Option<&SharedEntities>, TopologyError> {
        self.check_dim(d)?;
        Ok(self.shared_entities.get(&d))
    }

    /// Mutable access to the shared entities of dimension `d`.
    ///
    /// The shared entities of `d` count as computed from this point on, even if the returned
    /// map is left empty.
    pub fn shared_entities_mut(&mut self, d: usize) -> Result<&mut SharedEntities, TopologyError> {
        self.check_dim(d)?;
        Ok(self.shared_entities.entry(d).or_default())
    }

    /// Replaces the shared entities of dimension `d`.
    pub fn set_shared_entities(&mut self, d: usize, shared: SharedEntities) -> Result<(), TopologyError> {
        self.check_dim(d)?;
        let size = self.num_entities[d];
        if let Some((&index, _)) = shared.iter().find(|(&index, _)| index >= size) {
            return Err(TopologyError::EntityOutOfBounds { dim: d, index, size });
        }
        self.shared_entities.insert(d, shared);
        Ok(())
    }

    /// Owning process of each ghost cell, indexed relative to the start of the ghost range.
    pub fn cell_owner(&self) -> &[u32] {
        &self.cell_owner
    }

    /// Sets the owners of the ghost cells. There must be exactly one owner per ghost cell.
    pub fn set_cell_owner(&mut self, owners: Vec<u32>) -> Result<(), TopologyError> {
        let num_ghost_cells = self.num_ghosts(self.dim())?;
        if owners.len() != num_ghost_cells {
            return Err(TopologyError::CellOwnerMismatch {
                num_owners: owners.len(),
                num_ghost_cells,
            });
        }
        self.cell_owner = owners;
        Ok(())
    }

    /// The owning process of the given local cell if it is a ghost cell, or `None` if the
    /// cell is owned by this process.
    pub fn cell_owner_of(&self, cell: usize) -> Result<Option<u32>, TopologyError> {
        let tdim = self.dim();
        let size = self.size(tdim)?;
        if cell >= size {
            return Err(TopologyError::EntityOutOfBounds {
                dim: tdim,
                index: cell,
                size,
            });
        }
        let offset = self.ghost_offset[tdim];
        Ok(cell
            .checked_sub(offset)
            .and_then(|ghost_index| self.cell_owner.get(ghost_index))
            .copied())
    }

    /// The connectivity from entities of dimension `d0` to entities of dimension `d1`,
    /// or `None` if it has not been computed.
    pub fn connectivity(&self, d0: usize, d1: usize) -> Result<Option<&Connectivity>, TopologyError> {
        self.check_dim(d0)?;
        self.check_dim(d1)?;
        Ok(self.connectivity[d0][d1].as_ref())
    }

    /// Stores the connectivity `d0 → d1`, which must have one row per local entity of `d0`
    /// and only refer to local entities of `d1`.
    pub fn set_connectivity(&mut self, d0: usize, d1: usize, connectivity: Connectivity) -> Result<(), TopologyError> {
        self.check_dim(d0)?;
        self.check_dim(d1)?;
        self.check_connectivity(d0, d1, &connectivity)?;
        self.connectivity[d0][d1] = Some(connectivity);
        Ok(())
    }

    fn check_connectivity(&self, d0: usize, d1: usize, connectivity: &Connectivity) -> Result<(), TopologyError> {
        let size = self.num_entities[d0];
        if connectivity.len() != size {
            return Err(TopologyError::ConnectivitySizeMismatch {
                d0,
                d1,
                len: connectivity.len(),
                size,
            });
        }
        let target_size = self.num_entities[d1];
        if let Some(&index) = connectivity.indices().iter().find(|&&i| i >= target_size) {
            return Err(TopologyError::EntityOutOfBounds {
                dim: d1,
                index,
                size: target_size,
            });
        }
        Ok(())
    }

    /// Discards all data, leaving the topology uninitialized.
    pub fn clear(&mut self) {
        self.num_entities.clear();
        self.ghost_offset.clear();
        self.global_num_entities.clear();
        self.global_indices.clear();
        self.shared_entities.clear();
        self.cell_owner.clear();
        self.connectivity.clear();
    }

    /// Discards the connectivity for the pair `(d0, d1)`.
    pub fn clear_connectivity(&mut self, d0: usize, d1: usize) -> Result<(), TopologyError> {
        self.check_dim(d0)?;
        self.check_dim(d1)?;
        self.connectivity[d0][d1] = None;
        Ok(())
    }

    /// A hash of the cell-vertex connectivity.
    ///
    /// This is intended for cheaply detecting whether two topologies describe the same mesh.
    /// Distinct meshes may produce the same hash, so equal hashes do not imply equal
    /// topologies. Topologies without cell-vertex connectivity all hash to the same value.
    pub fn hash(&self) -> u64 {
        self.connectivity
            .get(self.dim())
            .and_then(|row| row.first())
            .and_then(Option::as_ref)
            .map(Connectivity::content_hash)
            .unwrap_or_else(|| Connectivity::new().content_hash())
    }

    /// Checks the structural invariants of the topology.
    ///
    /// Verifies ghost offsets, the lengths and ranges of global index maps, the length of the
    /// ghost cell owner list, and the row counts and target indices of all connectivity tables.
    pub fn check_invariants(&self) -> Result<(), TopologyError> {
        if !self.is_initialized() {
            return Ok(());
        }
        for d in 0..=self.dim() {
            let size = self.num_entities[d];
            if self.ghost_offset[d] > size {
                return Err(TopologyError::GhostOffsetOutOfBounds {
                    dim: d,
                    offset: self.ghost_offset[d],
                    size,
                });
            }
            if let Some(indices) = &self.global_indices[d] {
                if indices.len() != size {
                    return Err(TopologyError::GlobalIndicesSizeMismatch {
                        dim: d,
                        len: indices.len(),
                        size,
                    });
                }
                let global_size = self.global_num_entities[d];
                if let Some((index, _)) = indices
                    .iter()
                    .enumerate()
                    .find(|(_, &g)| g != UNASSIGNED_GLOBAL_INDEX && (g < 0 || g as u64 >= global_size))
                {
                    return Err(TopologyError::EntityOutOfBounds { dim: d, index, size });
                }
            }
            for (d1, connectivity) in self.connectivity[d].iter().enumerate() {
                if let Some(connectivity) = connectivity {
                    self.check_connectivity(d, d1, connectivity)?;
                }
            }
        }

        let num_ghost_cells = self.num_ghosts(self.dim())?;
        if !self.cell_owner.is_empty() && self.cell_owner.len() != num_ghost_cells {
            return Err(TopologyError::CellOwnerMismatch {
                num_owners: self.cell_owner.len(),
                num_ghost_cells,
            });
        }
        Ok(())
    }

    /// Informal string representation of the topology.
    ///
    /// With `verbose` set, the entity counts and every computed connectivity table are listed.
    pub fn str(&self, verbose: bool) -> String {
        if !verbose {
            return format!("<Topology of dimension {}>", self.dim());
        }

        let mut s = String::new();
        s.push_str(&format!("Topology of dimension {}\n", self.dim()));
        s.push_str("Number of entities (local / owned / global):\n");
        for d in 0..self.num_entities.len() {
            s.push_str(&format!(
                "  {}: {} / {} / {}\n",
                d, self.num_entities[d], self.ghost_offset[d], self.global_num_entities[d]
            ));
        }
        s.push_str("Connectivity matrix:\n");
        for row in &self.connectivity {
            let marks: Vec<&str> = row
                .iter()
                .map(|c| if c.is_some() { "x" } else { "-" })
                .collect();
            s.push_str(&format!("  {}\n", marks.join(" ")));
        }
        for (d0, row) in self.connectivity.iter().enumerate() {
            for (d1, connectivity) in row.iter().enumerate() {
                if let Some(connectivity) = connectivity {
                    s.push_str(&format!("Connectivity {d0} -> {d1}:\n"));
                    s.push_str(&connectivity.str(true));
                }
            }
        }
        s
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.str(false))
    }
}

/// Checks that the global indices of dimension `d` are consistent across a set of partitions.
///
/// The partition at position `p` in the slice is taken to be the topology held by process `p`.
/// Global indices must be unique within each partition, and every global index may be owned by
/// at most one process. An entity is considered owned by a process if it lies in the owned
/// range and is not shared with a process of lower rank.
///
/// Returns `Ok(false)` if a duplicate is found. All partitions must have global indices for
/// dimension `d`.
pub fn check_global_index_uniqueness(partitions: &[Topology], d: usize) -> Result<bool, TopologyError> {
    let mut owned_global_indices = BTreeSet::new();
    for (rank, topology) in partitions.iter().enumerate() {
        let indices = topology
            .global_indices(d)?
            .ok_or(TopologyError::GlobalIndicesNotInitialized { dim: d })?;

        let mut local_indices = BTreeSet::new();
        if !indices.iter().all(|&g| local_indices.insert(g)) {
            return Ok(false);
        }

        let shared = topology.shared_entities(d)?;
        for local_index in topology.owned_range(d)? {
            let shared_with_lower_rank = shared
                .and_then(|shared| shared.get(&local_index))
                .map(|ranks| ranks.iter().any(|&r| (r as usize) < rank))
                .unwrap_or(false);
            if !shared_with_lower_rank && !owned_global_indices.insert(indices[local_index]) {
                return Ok(false);
            }
        }
    }
    Ok(true)
}
