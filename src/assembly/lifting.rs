//! Application of Dirichlet data to an assembled right-hand side.
//!
//! Given a bilinear form `a` with matrix `A`, prescribed values `g` and a current iterate `x0`,
//! lifting computes
//!
//! ```text
//! b <- b - scale * A (g - x0)
//! ```
//!
//! where `g - x0` is masked to the constrained trial dofs. The matrix is never formed or
//! modified: the cell-wise variants only evaluate the element matrices of owned cells that touch
//! a constrained trial dof. When the test and trial spaces are the same space, the constrained
//! rows of `b` are left untouched, so that they can be overwritten afterwards with
//! [`set_bc`](crate::bc::set_bc).
use crate::assembly::check_cell_counts;
use crate::bc::{collect_markers_and_values, DirichletCondition};
use crate::form::BilinearForm;
use eyre::eyre;
use log::{debug, warn};
use nalgebra::{ComplexField, DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};
use nalgebra_sparse::CsrMatrix;
use std::cell::RefCell;

/// Applies Dirichlet data to assembled vectors through the element matrices of bilinear forms.
#[derive(Debug, Clone)]
pub struct LiftingOperator<T: Scalar> {
    workspace: RefCell<LiftingWorkspace<T>>,
}

#[derive(Debug, Clone)]
struct LiftingWorkspace<T: Scalar> {
    element_matrix: DMatrix<T>,
    element_bc: DVector<T>,
    element_correction: DVector<T>,
}

impl<T: ComplexField> Default for LiftingOperator<T> {
    fn default() -> Self {
        Self {
            workspace: RefCell::new(LiftingWorkspace {
                element_matrix: DMatrix::zeros(0, 0),
                element_bc: DVector::zeros(0),
                element_correction: DVector::zeros(0),
            }),
        }
    }
}

/// Checks the sizes of a single lifting block against the spaces of `a`.
fn validate_block<T: ComplexField>(
    b_len: usize,
    a: &dyn BilinearForm<T>,
    num_values: usize,
    num_markers: usize,
    x0_len: Option<usize>,
) -> eyre::Result<()> {
    check_cell_counts(a)?;
    let num_test_dofs = a.test_space().num_dofs();
    let num_trial_dofs = a.trial_space().num_dofs();
    if b_len != num_test_dofs {
        return Err(eyre!(
            "Vector has length {}, but the test space has {} dofs",
            b_len,
            num_test_dofs
        ));
    }
    if num_values != num_trial_dofs || num_markers != num_trial_dofs {
        return Err(eyre!(
            "Boundary values ({}) and markers ({}) must have one entry per trial dof ({})",
            num_values,
            num_markers,
            num_trial_dofs
        ));
    }
    if let Some(x0_len) = x0_len {
        if x0_len != num_trial_dofs {
            return Err(eyre!(
                "x0 has length {}, but the trial space has {} dofs",
                x0_len,
                num_trial_dofs
            ));
        }
    }
    Ok(())
}

impl<T: ComplexField> LiftingOperator<T> {
    /// Computes `b <- b - scale * A g` for the bilinear form `a`.
    ///
    /// `bc_markers1[dof]` selects the constrained trial dofs and `bc_values1[dof]` holds their
    /// prescribed values. Values at unmarked dofs are ignored.
    pub fn lift_bc<'a, 'b>(
        &self,
        b: impl Into<DVectorViewMut<'a, T>>,
        a: &dyn BilinearForm<T>,
        bc_values1: impl Into<DVectorView<'b, T>>,
        bc_markers1: &[bool],
        scale: T::RealField,
    ) -> eyre::Result<()> {
        let mut b = b.into();
        let bc_values1 = bc_values1.into();
        validate_block(b.len(), a, bc_values1.len(), bc_markers1.len(), None)?;
        self.lift_block(&mut b, a, bc_values1, bc_markers1, None, T::from_real(scale))
    }

    /// Computes `b <- b - scale * A (g - x0)` for the bilinear form `a`.
    ///
    /// Same as [`lift_bc`](Self::lift_bc), with `x0` the current iterate on the trial space.
    pub fn lift_bc_with_x0<'a, 'b, 'c>(
        &self,
        b: impl Into<DVectorViewMut<'a, T>>,
        a: &dyn BilinearForm<T>,
        bc_values1: impl Into<DVectorView<'b, T>>,
        bc_markers1: &[bool],
        x0: impl Into<DVectorView<'c, T>>,
        scale: T::RealField,
    ) -> eyre::Result<()> {
        let mut b = b.into();
        let bc_values1 = bc_values1.into();
        let x0 = x0.into();
        validate_block(b.len(), a, bc_values1.len(), bc_markers1.len(), Some(x0.len()))?;
        self.lift_block(&mut b, a, bc_values1, bc_markers1, Some(x0), T::from_real(scale))
    }

    /// Lifts a block row of a blocked system.
    ///
    /// For every block `j`, computes `b <- b - scale * A_j (g_j - x0_j)`, where `A_j` is the
    /// matrix of `a[j]`, `g_j` are the values prescribed by the conditions `bcs1[j]` on the trial
    /// space of `a[j]` and `x0_j = x0[j]`. If `x0` is empty, the iterates are taken to be zero.
    /// Blocks without boundary conditions are skipped.
    ///
    /// All forms must share the test space that `b` was assembled over, while the trial spaces
    /// may differ between blocks. Every size and space is checked before `b` is modified.
    pub fn apply_lifting<'a>(
        &self,
        b: impl Into<DVectorViewMut<'a, T>>,
        a: &[&dyn BilinearForm<T>],
        bcs1: &[Vec<&dyn DirichletCondition<T>>],
        x0: &[DVectorView<T>],
        scale: T::RealField,
    ) -> eyre::Result<()> {
        let mut b = b.into();
        if a.len() != bcs1.len() {
            return Err(eyre!(
                "Number of forms ({}) and boundary condition sets ({}) must agree",
                a.len(),
                bcs1.len()
            ));
        }
        if !x0.is_empty() && x0.len() != a.len() {
            return Err(eyre!(
                "Number of forms ({}) and x0 blocks ({}) must agree",
                a.len(),
                x0.len()
            ));
        }

        let Some(first) = a.first() else {
            return Ok(());
        };
        let test_space = first.test_space();

        let mut blocks = Vec::with_capacity(a.len());
        for (j, (&a_j, bcs_j)) in a.iter().zip(bcs1).enumerate() {
            if a_j.test_space() != test_space {
                return Err(eyre!("Form {} does not share the test space of the other forms", j));
            }
            let x0_j = x0.get(j).cloned();
            let (markers, values) = collect_markers_and_values(a_j.trial_space(), bcs_j)?;
            validate_block(b.len(), a_j, values.len(), markers.len(), x0_j.as_ref().map(|x| x.len()))?;
            blocks.push((a_j, markers, values, x0_j, bcs_j.is_empty()));
        }

        let scale = T::from_real(scale);
        for (a_j, markers, values, x0_j, no_bcs) in blocks {
            if no_bcs {
                continue;
            }
            self.lift_block(&mut b, a_j, DVectorView::from(&values), &markers, x0_j, scale.clone())?;
        }
        Ok(())
    }

    fn lift_block(
        &self,
        b: &mut DVectorViewMut<T>,
        a: &dyn BilinearForm<T>,
        bc_values: DVectorView<T>,
        bc_markers: &[bool],
        x0: Option<DVectorView<T>>,
        scale: T,
    ) -> eyre::Result<()> {
        let test_space = a.test_space();
        let trial_space = a.trial_space();
        let test_dofmap = test_space.dofmap();
        let trial_dofmap = trial_space.dofmap();
        let exclude_constrained_rows = test_space == trial_space;

        let num_ignored_values = bc_markers
            .iter()
            .zip(bc_values.iter())
            .filter(|&(&marked, value)| !marked && *value != T::zero())
            .count();
        if num_ignored_values > 0 {
            warn!(
                "Ignoring {} nonzero boundary values given for unconstrained dofs",
                num_ignored_values
            );
        }

        let ws = &mut *self.workspace.borrow_mut();
        let element_matrix = &mut ws.element_matrix;
        let element_bc = &mut ws.element_bc;
        let element_correction = &mut ws.element_correction;

        let mut num_lifted_cells = 0;
        for cell in 0..test_space.num_owned_cells() {
            let trial_dofs = trial_dofmap.cell_dofs(cell);
            if !trial_dofs.iter().any(|&dof| bc_markers[dof]) {
                continue;
            }
            let test_dofs = test_dofmap.cell_dofs(cell);

            element_matrix.resize_mut(test_dofs.len(), trial_dofs.len(), T::zero());
            element_matrix.fill(T::zero());
            a.assemble_cell_matrix_into(cell, DMatrixViewMut::from(&mut *element_matrix))?;

            element_bc.resize_vertically_mut(trial_dofs.len(), T::zero());
            for (local, &dof) in trial_dofs.iter().enumerate() {
                element_bc[local] = if bc_markers[dof] {
                    let x = x0.as_ref().map(|x0| x0[dof].clone()).unwrap_or_else(T::zero);
                    bc_values[dof].clone() - x
                } else {
                    T::zero()
                };
            }

            element_correction.resize_vertically_mut(test_dofs.len(), T::zero());
            element_correction.gemv(T::one(), &*element_matrix, &*element_bc, T::zero());

            for (local, &dof) in test_dofs.iter().enumerate() {
                if exclude_constrained_rows && bc_markers[dof] {
                    continue;
                }
                b[dof] -= scale.clone() * element_correction[local].clone();
            }
            num_lifted_cells += 1;
        }

        debug!("Lifted boundary conditions on {} cells", num_lifted_cells);
        Ok(())
    }
}

/// Computes `b <- b - scale * A g` with a temporary [`LiftingOperator`].
///
/// See [`LiftingOperator::lift_bc`].
pub fn lift_bc<'a, 'b, T: ComplexField>(
    b: impl Into<DVectorViewMut<'a, T>>,
    a: &dyn BilinearForm<T>,
    bc_values1: impl Into<DVectorView<'b, T>>,
    bc_markers1: &[bool],
    scale: T::RealField,
) -> eyre::Result<()> {
    LiftingOperator::default().lift_bc(b, a, bc_values1, bc_markers1, scale)
}

/// Computes `b <- b - scale * A (g - x0)` with a temporary [`LiftingOperator`].
///
/// See [`LiftingOperator::lift_bc_with_x0`].
pub fn lift_bc_with_x0<'a, 'b, 'c, T: ComplexField>(
    b: impl Into<DVectorViewMut<'a, T>>,
    a: &dyn BilinearForm<T>,
    bc_values1: impl Into<DVectorView<'b, T>>,
    bc_markers1: &[bool],
    x0: impl Into<DVectorView<'c, T>>,
    scale: T::RealField,
) -> eyre::Result<()> {
    LiftingOperator::default().lift_bc_with_x0(b, a, bc_values1, bc_markers1, x0, scale)
}

/// Lifts a block row of a blocked system with a temporary [`LiftingOperator`].
///
/// See [`LiftingOperator::apply_lifting`].
pub fn apply_lifting<'a, T: ComplexField>(
    b: impl Into<DVectorViewMut<'a, T>>,
    a: &[&dyn BilinearForm<T>],
    bcs1: &[Vec<&dyn DirichletCondition<T>>],
    x0: &[DVectorView<T>],
    scale: T::RealField,
) -> eyre::Result<()> {
    LiftingOperator::default().apply_lifting(b, a, bcs1, x0, scale)
}

/// Computes `b <- b - scale * A (g - x0)` with an assembled matrix `A`.
///
/// Produces the same result as [`lift_bc_with_x0`] for the matrix of a form assembled over the
/// same cells. Constrained rows are left untouched if `A` is square.
pub fn lift_bc_csr<'a, 'b, T: ComplexField>(
    b: impl Into<DVectorViewMut<'a, T>>,
    a: &CsrMatrix<T>,
    bc_values1: impl Into<DVectorView<'b, T>>,
    bc_markers1: &[bool],
    x0: Option<DVectorView<T>>,
    scale: T::RealField,
) -> eyre::Result<()> {
    let mut b = b.into();
    let bc_values1 = bc_values1.into();
    if b.len() != a.nrows() {
        return Err(eyre!("Vector has length {}, but the matrix has {} rows", b.len(), a.nrows()));
    }
    if bc_values1.len() != a.ncols() || bc_markers1.len() != a.ncols() {
        return Err(eyre!(
            "Boundary values ({}) and markers ({}) must have one entry per matrix column ({})",
            bc_values1.len(),
            bc_markers1.len(),
            a.ncols()
        ));
    }
    if let Some(x0) = &x0 {
        if x0.len() != a.ncols() {
            return Err(eyre!("x0 has length {}, but the matrix has {} columns", x0.len(), a.ncols()));
        }
    }

    let exclude_constrained_rows = a.nrows() == a.ncols();
    let scale = T::from_real(scale);
    for i in 0..a.nrows() {
        if exclude_constrained_rows && bc_markers1[i] {
            continue;
        }
        let row = a.row(i);
        let mut correction = T::zero();
        for (&j, a_ij) in row.col_indices().iter().zip(row.values()) {
            if bc_markers1[j] {
                let x = x0.as_ref().map(|x0| x0[j].clone()).unwrap_or_else(T::zero);
                correction += a_ij.clone() * (bc_values1[j].clone() - x);
            }
        }
        b[i] -= scale.clone() * correction;
    }
    Ok(())
}
