//! Linear and bilinear forms as seen by the assemblers.
//!
//! A form is only required to produce its local element tensor for a given cell and to report
//! the function spaces it is defined over. How the local tensors are computed (quadrature,
//! basis functions, coefficients) is entirely up to the implementor.
use crate::space::FunctionSpace;
use eyre::eyre;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut, Scalar};

/// A linear form `L(v)` over a single test space.
pub trait LinearForm<T: Scalar> {
    fn test_space(&self) -> &FunctionSpace;

    /// Writes the local element vector of the given cell into `output`.
    ///
    /// `output` has one entry per dof of the cell in the test space dof map and is zeroed
    /// by the caller.
    fn assemble_cell_vector_into(&self, cell: usize, output: DVectorViewMut<T>) -> eyre::Result<()>;
}

/// A bilinear form `a(u, v)` with trial function `u` and test function `v`.
pub trait BilinearForm<T: Scalar> {
    fn test_space(&self) -> &FunctionSpace;

    fn trial_space(&self) -> &FunctionSpace;

    /// Writes the local element matrix of the given cell into `output`.
    ///
    /// Rows correspond to the test dofs and columns to the trial dofs of the cell. `output` is
    /// zeroed by the caller.
    fn assemble_cell_matrix_into(&self, cell: usize, output: DMatrixViewMut<T>) -> eyre::Result<()>;
}

/// A linear form with precomputed element vectors.
#[derive(Debug, Clone)]
pub struct TabulatedLinearForm<T: Scalar> {
    space: FunctionSpace,
    cell_vectors: Vec<DVector<T>>,
}

impl<T: Scalar> TabulatedLinearForm<T> {
    /// Creates the form from one element vector per local cell.
    pub fn new(space: FunctionSpace, cell_vectors: Vec<DVector<T>>) -> eyre::Result<Self> {
        let dofmap = space.dofmap();
        if cell_vectors.len() != dofmap.num_cells() {
            return Err(eyre!(
                "Expected {} element vectors, got {}",
                dofmap.num_cells(),
                cell_vectors.len()
            ));
        }
        for (cell, vector) in cell_vectors.iter().enumerate() {
            let n = dofmap.cell_dofs(cell).len();
            if vector.len() != n {
                return Err(eyre!(
                    "Element vector of cell {} has length {}, but the cell has {} dofs",
                    cell,
                    vector.len(),
                    n
                ));
            }
        }
        Ok(Self { space, cell_vectors })
    }

    pub fn from_fn(space: FunctionSpace, f: impl Fn(usize) -> DVector<T>) -> eyre::Result<Self> {
        let cell_vectors = (0..space.dofmap().num_cells()).map(f).collect();
        Self::new(space, cell_vectors)
    }
}

impl<T: Scalar> LinearForm<T> for TabulatedLinearForm<T> {
    fn test_space(&self) -> &FunctionSpace {
        &self.space
    }

    fn assemble_cell_vector_into(&self, cell: usize, mut output: DVectorViewMut<T>) -> eyre::Result<()> {
        let vector = self
            .cell_vectors
            .get(cell)
            .ok_or_else(|| eyre!("Cell {} out of bounds", cell))?;
        output.copy_from(vector);
        Ok(())
    }
}

/// A bilinear form with precomputed element matrices.
#[derive(Debug, Clone)]
pub struct TabulatedBilinearForm<T: Scalar> {
    test_space: FunctionSpace,
    trial_space: FunctionSpace,
    cell_matrices: Vec<DMatrix<T>>,
}

impl<T: Scalar> TabulatedBilinearForm<T> {
    /// Creates the form from one element matrix per local cell.
    pub fn new(
        test_space: FunctionSpace,
        trial_space: FunctionSpace,
        cell_matrices: Vec<DMatrix<T>>,
    ) -> eyre::Result<Self> {
        let test_dofmap = test_space.dofmap();
        let trial_dofmap = trial_space.dofmap();
        if test_dofmap.num_cells() != trial_dofmap.num_cells() {
            return Err(eyre!("Test and trial spaces must be defined on the same cells"));
        }
        if cell_matrices.len() != test_dofmap.num_cells() {
            return Err(eyre!(
                "Expected {} element matrices, got {}",
                test_dofmap.num_cells(),
                cell_matrices.len()
            ));
        }
        for (cell, matrix) in cell_matrices.iter().enumerate() {
            let shape = (test_dofmap.cell_dofs(cell).len(), trial_dofmap.cell_dofs(cell).len());
            if matrix.shape() != shape {
                return Err(eyre!(
                    "Element matrix of cell {} has shape {:?}, expected {:?}",
                    cell,
                    matrix.shape(),
                    shape
                ));
            }
        }
        Ok(Self {
            test_space,
            trial_space,
            cell_matrices,
        })
    }

    /// Creates a form with the same element matrix on every cell.
    pub fn uniform(test_space: FunctionSpace, trial_space: FunctionSpace, matrix: DMatrix<T>) -> eyre::Result<Self> {
        let num_cells = test_space.dofmap().num_cells();
        Self::new(test_space, trial_space, vec![matrix; num_cells])
    }
}

impl<T: Scalar> BilinearForm<T> for TabulatedBilinearForm<T> {
    fn test_space(&self) -> &FunctionSpace {
        &self.test_space
    }

    fn trial_space(&self) -> &FunctionSpace {
        &self.trial_space
    }

    fn assemble_cell_matrix_into(&self, cell: usize, mut output: DMatrixViewMut<T>) -> eyre::Result<()> {
        let matrix = self
            .cell_matrices
            .get(cell)
            .ok_or_else(|| eyre!("Cell {} out of bounds", cell))?;
        output.copy_from(matrix);
        Ok(())
    }
}
