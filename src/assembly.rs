//! Global assembly of forms and application of Dirichlet conditions to assembled vectors.
//!
//! Assembly only visits the cells owned by the current process. Contributions to dofs shared
//! with other processes are therefore partial sums, which have to be accumulated by a
//! separate communication step.
use crate::form::BilinearForm;
use eyre::eyre;
use nalgebra::{ClosedAdd, DVectorView, DVectorViewMut, Scalar};

pub mod lifting;
pub mod matrix;
pub mod vector;

pub use lifting::{apply_lifting, lift_bc, lift_bc_csr, lift_bc_with_x0, LiftingOperator};
pub use matrix::CsrAssembler;
pub use vector::{assemble_vector, VectorAssembler};

/// Copies the entries `global[indices[i]]` into `local[i]`.
///
/// # Panics
///
/// Panics if `local` and `indices` have different lengths or an index is out of bounds.
pub fn gather_global_to_local<'a, 'b, T: Scalar>(
    global: impl Into<DVectorView<'a, T>>,
    local: impl Into<DVectorViewMut<'b, T>>,
    indices: &[usize],
) {
    let global = global.into();
    let mut local = local.into();
    assert_eq!(local.len(), indices.len(), "Local vector and indices must have the same length");
    for (i_local, &i_global) in indices.iter().enumerate() {
        local[i_local] = global[i_global].clone();
    }
}

/// Adds the entries `local[i]` to `global[indices[i]]`.
///
/// Repeated indices accumulate.
///
/// # Panics
///
/// Panics if `local` and `indices` have different lengths or an index is out of bounds.
pub fn scatter_local_to_global<'a, 'b, T: Scalar + ClosedAdd>(
    local: impl Into<DVectorView<'a, T>>,
    global: impl Into<DVectorViewMut<'b, T>>,
    indices: &[usize],
) {
    let local = local.into();
    let mut global = global.into();
    assert_eq!(local.len(), indices.len(), "Local vector and indices must have the same length");
    for (i_local, &i_global) in indices.iter().enumerate() {
        global[i_global] += local[i_local].clone();
    }
}

/// Checks that the trial space of `form` has a dof row for every cell of its test space.
pub(crate) fn check_cell_counts<T: Scalar>(form: &dyn BilinearForm<T>) -> eyre::Result<()> {
    let num_test_cells = form.test_space().dofmap().num_cells();
    let num_trial_cells = form.trial_space().dofmap().num_cells();
    if num_test_cells != num_trial_cells {
        return Err(eyre!(
            "Test space has {} cells, but trial space has {} cells",
            num_test_cells,
            num_trial_cells
        ));
    }
    Ok(())
}
