use crate::assembly::check_cell_counts;
use crate::form::BilinearForm;
use eyre::eyre;
use log::debug;
use nalgebra::{ComplexField, DMatrix, DMatrixViewMut, Scalar};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::cell::RefCell;
use std::collections::BTreeSet;

/// An assembler for CSR matrices of bilinear forms.
///
/// Only owned cells of the test space contribute. Rows are indexed by test dofs and columns by
/// trial dofs.
#[derive(Debug, Clone)]
pub struct CsrAssembler<T: Scalar> {
    // Buffers reused when assembling several matrices with the same assembler
    workspace: RefCell<CsrAssemblerWorkspace<T>>,
}

impl<T: Scalar> Default for CsrAssembler<T> {
    fn default() -> Self {
        Self {
            workspace: RefCell::new(CsrAssemblerWorkspace::default()),
        }
    }
}

#[derive(Debug, Clone)]
struct CsrAssemblerWorkspace<T: Scalar> {
    element_matrix: DMatrix<T>,
}

impl<T: Scalar> Default for CsrAssemblerWorkspace<T> {
    fn default() -> Self {
        Self {
            element_matrix: DMatrix::from_row_slice(0, 0, &[]),
        }
    }
}

impl<T: Scalar> CsrAssembler<T> {
    /// Computes the sparsity pattern of the matrix of `form`.
    pub fn assemble_pattern(&self, form: &dyn BilinearForm<T>) -> eyre::Result<SparsityPattern> {
        check_cell_counts(form)?;
        let test_space = form.test_space();
        let trial_space = form.trial_space();
        let test_dofmap = test_space.dofmap();
        let trial_dofmap = trial_space.dofmap();

        // A BTreeSet stores each entry once, even though most entries are touched by several cells
        let mut matrix_entries = BTreeSet::new();
        for cell in 0..test_space.num_owned_cells() {
            for &i in test_dofmap.cell_dofs(cell) {
                for &j in trial_dofmap.cell_dofs(cell) {
                    matrix_entries.insert((i, j));
                }
            }
        }

        let num_rows = test_dofmap.num_dofs();
        let num_cols = trial_dofmap.num_dofs();
        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::with_capacity(matrix_entries.len());

        offsets.push(0);
        for (i, j) in matrix_entries {
            // Loop to account for consecutive empty rows
            while i + 1 > offsets.len() {
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }

        while offsets.len() < (num_rows + 1) {
            offsets.push(column_indices.len());
        }

        let pattern = SparsityPattern::try_from_offsets_and_indices(num_rows, num_cols, offsets, column_indices)
            .expect("Internal error: Assembled sparsity pattern is invalid");
        Ok(pattern)
    }
}

impl<T: ComplexField> CsrAssembler<T> {
    pub fn assemble(&self, form: &dyn BilinearForm<T>) -> eyre::Result<CsrMatrix<T>> {
        let pattern = self.assemble_pattern(form)?;
        let initial_matrix_values = vec![T::zero(); pattern.nnz()];
        let mut matrix = CsrMatrix::try_from_pattern_and_values(pattern, initial_matrix_values)
            .map_err(|err| eyre!("Failed to construct CSR matrix: {}", err))?;
        self.assemble_into_csr(&mut matrix, form)?;
        Ok(matrix)
    }

    /// Adds the element matrices of the owned cells of `form` to `csr`.
    ///
    /// The sparsity pattern of `csr` must contain every entry touched by `form`, for example
    /// because it was built with [`assemble_pattern`](Self::assemble_pattern).
    pub fn assemble_into_csr(&self, csr: &mut CsrMatrix<T>, form: &dyn BilinearForm<T>) -> eyre::Result<()> {
        check_cell_counts(form)?;
        let test_space = form.test_space();
        let trial_space = form.trial_space();
        let test_dofmap = test_space.dofmap();
        let trial_dofmap = trial_space.dofmap();

        let shape = (test_dofmap.num_dofs(), trial_dofmap.num_dofs());
        if (csr.nrows(), csr.ncols()) != shape {
            return Err(eyre!(
                "Matrix has shape {:?}, but the form requires {:?}",
                (csr.nrows(), csr.ncols()),
                shape
            ));
        }

        let ws = &mut *self.workspace.borrow_mut();
        let element_matrix = &mut ws.element_matrix;

        for cell in 0..test_space.num_owned_cells() {
            let test_dofs = test_dofmap.cell_dofs(cell);
            let trial_dofs = trial_dofmap.cell_dofs(cell);
            element_matrix.resize_mut(test_dofs.len(), trial_dofs.len(), T::zero());
            element_matrix.fill(T::zero());

            form.assemble_cell_matrix_into(cell, DMatrixViewMut::from(&mut *element_matrix))?;

            for (local_row, &global_row) in test_dofs.iter().enumerate() {
                let mut csr_row = csr.row_mut(global_row);
                let (cols, values) = csr_row.cols_and_values_mut();
                for (local_col, &global_col) in trial_dofs.iter().enumerate() {
                    let idx = cols.binary_search(&global_col).map_err(|_| {
                        eyre!(
                            "Entry ({}, {}) is not in the sparsity pattern of the matrix",
                            global_row,
                            global_col
                        )
                    })?;
                    values[idx] += element_matrix[(local_row, local_col)].clone();
                }
            }
        }

        debug!("Assembled {}x{} CSR matrix with {} nonzeros", shape.0, shape.1, csr.nnz());
        Ok(())
    }
}
