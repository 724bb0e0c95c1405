//! Computation of mesh entities and connectivity from the cell-vertex connectivity.
//!
//! The only connectivity that must be supplied by the user is the cell-vertex connectivity
//! `(tdim, 0)`. Intermediate entities (edges, faces) of simplicial meshes and any other
//! connectivity table can be derived from it on demand. Computed tables are cached in the
//! topology.
use crate::connectivity::Connectivity;
use crate::error::TopologyError;
use crate::topology::Topology;
use itertools::Itertools;
use log::debug;
use rustc_hash::FxHashMap;

/// Computes the entities of dimension `dim` of a simplicial mesh.
///
/// Each entity is identified with its (sorted) set of vertices. Entities are numbered in the
/// order in which they are first encountered when visiting the cells in order, so the
/// numbering is deterministic for a given cell-vertex connectivity. The connectivities
/// `(dim, 0)` and `(tdim, dim)` are stored in the topology and the number of entities of
/// dimension `dim` is initialized. Derived entities are all treated as owned; a distributed
/// numbering pass may later set ghost offsets and global indices.
///
/// Vertices and cells are never derived. Returns the number of entities of dimension `dim`.
pub fn compute_entities(topology: &mut Topology, dim: usize) -> Result<usize, TopologyError> {
    let tdim = topology.dim();
    topology.size(dim)?;

    if dim == 0 || dim == tdim || topology.connectivity(dim, 0)?.is_some() {
        return topology.size(dim);
    }

    let cell_vertices = topology
        .connectivity(tdim, 0)?
        .ok_or(TopologyError::MissingConnectivity { d0: tdim, d1: 0 })?;

    let mut entity_numbers: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
    let mut entity_vertices = Connectivity::new();
    let mut cell_entities = Connectivity::new();

    for (cell, vertices) in cell_vertices.iter().enumerate() {
        if vertices.len() != tdim + 1 {
            return Err(TopologyError::NonSimplexCells {
                cell,
                num_vertices: vertices.len(),
            });
        }

        let mut appender = cell_entities.begin_entity();
        for mut key in vertices.iter().copied().combinations(dim + 1) {
            key.sort_unstable();
            let next_number = entity_numbers.len();
            let number = *entity_numbers.entry(key).or_insert_with_key(|key| {
                entity_vertices.push(key);
                next_number
            });
            appender.push_single(number);
        }
    }

    let num_entities = entity_vertices.len();
    debug!("Computed {} entities of dimension {}", num_entities, dim);

    topology.init_size(dim, num_entities, num_entities as u64)?;
    topology.set_connectivity(dim, 0, entity_vertices)?;
    topology.set_connectivity(tdim, dim, cell_entities)?;
    Ok(num_entities)
}

/// Computes the connectivity `d0 → d1` and stores it in the topology.
///
/// Nothing is done if the connectivity is already present. Required entities and
/// intermediate connectivity tables are computed as needed:
///
/// - `d0 == d1`: every entity is connected to itself only.
/// - `d0 < d1`: the transpose of `d1 → d0`.
/// - `d0 > d1`: the `d1`-entities whose vertices are all vertices of the `d0`-entity,
///   found through the vertices of the `d0`-entity.
pub fn compute_connectivity(topology: &mut Topology, d0: usize, d1: usize) -> Result<(), TopologyError> {
    if topology.connectivity(d0, d1)?.is_some() {
        return Ok(());
    }

    compute_entities(topology, d0)?;
    compute_entities(topology, d1)?;
    // Computing entities may have produced the requested connectivity as a by-product
    if topology.connectivity(d0, d1)?.is_some() {
        return Ok(());
    }

    let connectivity = if d0 == d1 {
        let n = topology.size(d0)?;
        Connectivity::from_uniform(1, (0..n).collect())
    } else if d0 < d1 {
        compute_connectivity(topology, d1, d0)?;
        let transposed = topology
            .connectivity(d1, d0)?
            .ok_or(TopologyError::MissingConnectivity { d0: d1, d1: d0 })?;
        transposed.transpose(topology.size(d0)?)
    } else {
        compute_from_intersection(topology, d0, d1)?
    };

    debug!("Computed connectivity {} -> {}", d0, d1);
    topology.set_connectivity(d0, d1, connectivity)
}

fn compute_from_intersection(topology: &mut Topology, d0: usize, d1: usize) -> Result<Connectivity, TopologyError> {
    debug_assert!(d0 > d1);
    let missing = |a, b| TopologyError::MissingConnectivity { d0: a, d1: b };

    if d1 == 0 {
        // Entity-vertex connectivity is either given (cells) or produced by compute_entities
        return Err(missing(d0, 0));
    }

    compute_connectivity(topology, 0, d1)?;
    let e0_vertices = topology.connectivity(d0, 0)?.ok_or(missing(d0, 0))?;
    let e1_vertices = topology.connectivity(d1, 0)?.ok_or(missing(d1, 0))?;
    let vertex_e1 = topology.connectivity(0, d1)?.ok_or(missing(0, d1))?;

    let mut connectivity = Connectivity::new();
    let mut candidates = Vec::new();
    for vertices in e0_vertices.iter() {
        candidates.clear();
        candidates.extend(vertices.iter().flat_map(|&v| vertex_e1[v].iter().copied()));
        candidates.sort_unstable();
        candidates.dedup();

        let mut appender = connectivity.begin_entity();
        for &e1 in &candidates {
            if e1_vertices[e1].iter().all(|v| vertices.contains(v)) {
                appender.push_single(e1);
            }
        }
    }
    Ok(connectivity)
}
