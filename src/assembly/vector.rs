use crate::assembly::scatter_local_to_global;
use crate::form::LinearForm;
use eyre::eyre;
use log::debug;
use nalgebra::{ComplexField, DVector, DVectorView, DVectorViewMut, Scalar};
use std::cell::RefCell;

/// An assembler for vectors of linear forms.
///
/// The assembler holds buffers that are reused across calls, so repeatedly assembling with the
/// same assembler does not allocate once the buffers have reached their final size.
#[derive(Debug, Clone)]
pub struct VectorAssembler<T: Scalar> {
    workspace: RefCell<VectorAssemblerWorkspace<T>>,
}

#[derive(Debug, Clone)]
struct VectorAssemblerWorkspace<T: Scalar> {
    element_vector: DVector<T>,
}

impl<T: ComplexField> Default for VectorAssembler<T> {
    fn default() -> Self {
        Self {
            workspace: RefCell::new(VectorAssemblerWorkspace {
                element_vector: DVector::zeros(0),
            }),
        }
    }
}

impl<T: ComplexField> VectorAssembler<T> {
    /// Assembles the linear form `form` into `b`.
    ///
    /// Element vectors of the owned cells of the test space are added to `b`, visiting cells in
    /// increasing local index order. Ghost cells are skipped. Existing entries of `b` are added
    /// to, not overwritten, so `b` must be zeroed beforehand if only the contributions of
    /// `form` are wanted.
    ///
    /// # Errors
    ///
    /// Returns an error without modifying `b` if the length of `b` differs from the number of
    /// dofs in the test space. Errors produced by the form are propagated, in which case `b`
    /// contains the contributions of the cells visited so far.
    pub fn assemble<'a>(&self, b: impl Into<DVectorViewMut<'a, T>>, form: &dyn LinearForm<T>) -> eyre::Result<()> {
        let mut b = b.into();
        let space = form.test_space();
        let dofmap = space.dofmap();
        if b.len() != dofmap.num_dofs() {
            return Err(eyre!(
                "Vector has length {}, but the test space has {} dofs",
                b.len(),
                dofmap.num_dofs()
            ));
        }

        let ws = &mut *self.workspace.borrow_mut();
        let element_vector = &mut ws.element_vector;

        let num_cells = space.num_owned_cells();
        for cell in 0..num_cells {
            let cell_dofs = dofmap.cell_dofs(cell);
            element_vector.resize_vertically_mut(cell_dofs.len(), T::zero());
            element_vector.fill(T::zero());

            form.assemble_cell_vector_into(cell, DVectorViewMut::from(&mut *element_vector))?;
            scatter_local_to_global(DVectorView::from(&*element_vector), DVectorViewMut::from(&mut b), cell_dofs);
        }

        debug!("Assembled vector of length {} over {} owned cells", b.len(), num_cells);
        Ok(())
    }
}

/// Assembles the linear form `form` into `b` with a temporary [`VectorAssembler`].
pub fn assemble_vector<'a, T: ComplexField>(
    b: impl Into<DVectorViewMut<'a, T>>,
    form: &dyn LinearForm<T>,
) -> eyre::Result<()> {
    VectorAssembler::default().assemble(b, form)
}
