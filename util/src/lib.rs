use fennec::connectivity::Connectivity;
use fennec::form::TabulatedBilinearForm;
use fennec::space::{DofMap, FunctionSpace};
use fennec::topology::Topology;
use nalgebra::DMatrix;
use std::sync::Arc;

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Topology of the unit interval split into `num_cells` cells `[i, i + 1]`.
pub fn interval_topology(num_cells: usize) -> Topology {
    let cells: Vec<Vec<usize>> = (0..num_cells).map(|i| vec![i, i + 1]).collect();
    let num_vertices = if num_cells == 0 { 0 } else { num_cells + 1 };
    Topology::from_cells(1, num_vertices, Connectivity::from(cells)).unwrap()
}

/// Two triangles sharing the edge between vertices 1 and 2.
///
/// ```text
///  2 ------ 3
///  | \      |
///  |   \    |
///  |     \  |
///  0 ------ 1
/// ```
pub fn two_triangles_topology() -> Topology {
    let cells = Connectivity::from_uniform(3, vec![0, 1, 2, 1, 3, 2]);
    Topology::from_cells(2, 4, cells).unwrap()
}

/// Four triangles on a 3x2 vertex grid.
///
/// ```text
///  3 ---- 4 ---- 5
///  | \    | \    |
///  |   \  |   \  |
///  0 ---- 1 ---- 2
/// ```
pub fn four_triangles_topology() -> Topology {
    let cells = Connectivity::from_uniform(3, vec![0, 1, 3, 1, 4, 3, 1, 2, 4, 2, 5, 4]);
    Topology::from_cells(2, 6, cells).unwrap()
}

/// Space with one dof per vertex on the given topology.
pub fn vertex_space(topology: Topology) -> FunctionSpace {
    let dofmap = DofMap::from_vertices(&topology).unwrap();
    FunctionSpace::new(Arc::new(topology), dofmap).unwrap()
}

/// Space with `block_size` dofs per vertex on the given topology.
pub fn blocked_vertex_space(topology: Topology, block_size: usize) -> FunctionSpace {
    let dofmap = DofMap::from_vertices(&topology).unwrap().blocked(block_size);
    FunctionSpace::new(Arc::new(topology), dofmap).unwrap()
}

/// Element stiffness matrix of a linear element on an interval of unit length.
pub fn interval_stiffness_matrix() -> DMatrix<f64> {
    #[rustfmt::skip]
    let matrix = DMatrix::from_row_slice(2, 2, &[
         1.0, -1.0,
        -1.0,  1.0,
    ]);
    matrix
}

/// The Laplace stiffness form of linear elements on a uniform interval mesh.
pub fn interval_stiffness_form(space: &FunctionSpace) -> TabulatedBilinearForm<f64> {
    TabulatedBilinearForm::uniform(space.clone(), space.clone(), interval_stiffness_matrix()).unwrap()
}
