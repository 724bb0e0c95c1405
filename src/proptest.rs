//! Proptest strategies for topologies and boundary markers.
use crate::connectivity::Connectivity;
use crate::topology::Topology;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use ::proptest::sample::subsequence;

/// Topologies of serial simplex meshes of dimension `tdim` with random cells.
///
/// Every cell consists of `tdim + 1` distinct vertices drawn from at most `max_vertices`
/// vertices. Vertices need not be used by any cell, and cells may be repeated.
pub fn simplex_topology(tdim: usize, max_vertices: usize, max_cells: usize) -> impl Strategy<Value = Topology> {
    let min_vertices = tdim + 1;
    assert!(max_vertices >= min_vertices, "Not enough vertices to form a single cell.");
    (min_vertices..=max_vertices)
        .prop_flat_map(move |num_vertices| {
            let cell = subsequence((0..num_vertices).collect::<Vec<_>>(), tdim + 1);
            (Just(num_vertices), vec(cell, 0..=max_cells))
        })
        .prop_map(move |(num_vertices, cells)| {
            Topology::from_cells(tdim, num_vertices, Connectivity::from(cells))
                .expect("Internal error: Cell vertices are in bounds by construction")
        })
}

/// Topologies with random ghost ranges for vertices and cells.
///
/// The ghost cells are assigned random owners in `1 .. num_processes`, so that the topology
/// looks like the partition held by process 0. Requires `num_processes >= 2`.
pub fn partitioned_simplex_topology(
    tdim: usize,
    max_vertices: usize,
    max_cells: usize,
    num_processes: u32,
) -> impl Strategy<Value = Topology> {
    assert!(num_processes >= 2, "A partition needs at least two processes.");
    simplex_topology(tdim, max_vertices, max_cells)
        .prop_flat_map(move |topology| {
            let num_vertices = topology.size(0).unwrap_or(0);
            let num_cells = topology.size(tdim).unwrap_or(0);
            (Just(topology), 0..=num_vertices, 0..=num_cells)
        })
        .prop_flat_map(move |(topology, vertex_offset, cell_offset)| {
            let num_ghost_cells = topology.size(tdim).unwrap_or(0) - cell_offset;
            let owners = vec(1..num_processes, num_ghost_cells);
            (Just(topology), Just(vertex_offset), Just(cell_offset), owners)
        })
        .prop_map(move |(mut topology, vertex_offset, cell_offset, owners)| {
            topology
                .init_ghost(0, vertex_offset)
                .and_then(|_| topology.init_ghost(tdim, cell_offset))
                .and_then(|_| topology.set_cell_owner(owners))
                .expect("Internal error: Ghost offsets are in bounds by construction");
            topology
        })
}

/// Boundary markers for `num_dofs` dofs, together with prescribed values in `[-10, 10]`.
///
/// Values at unmarked dofs are zero.
pub fn dirichlet_markers_and_values(num_dofs: usize) -> impl Strategy<Value = (Vec<bool>, Vec<f64>)> {
    vec((any::<bool>(), -10.0..10.0), num_dofs).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(marked, value)| (marked, if marked { value } else { 0.0 }))
            .unzip()
    })
}
