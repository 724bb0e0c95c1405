//! Dirichlet boundary conditions on degrees of freedom.
use crate::space::FunctionSpace;
use eyre::eyre;
use log::warn;
use nalgebra::{ComplexField, DVector, DVectorView, DVectorViewMut, Scalar};
use std::collections::BTreeMap;

/// A set of prescribed values on degrees of freedom of a function space.
pub trait DirichletCondition<T: Scalar> {
    /// The space whose dof numbering the condition refers to.
    fn function_space(&self) -> &FunctionSpace;

    /// Sets `markers[dof] = true` for every constrained dof. Other entries are left untouched.
    fn mark_dofs(&self, markers: &mut [bool]);

    /// Writes the prescribed value of every constrained dof into `values`. Other entries are
    /// left untouched.
    fn populate_values(&self, values: &mut [T]);
}

/// Dirichlet boundary condition given as explicit `(dof, value)` pairs.
#[derive(Debug, Clone)]
pub struct DirichletBC<T: Scalar> {
    space: FunctionSpace,
    dofs: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> DirichletBC<T> {
    /// Creates a boundary condition prescribing `values[i]` on dof `dofs[i]`.
    ///
    /// The dofs must be in bounds for the space and must not contain duplicates.
    pub fn new(space: FunctionSpace, dofs: Vec<usize>, values: Vec<T>) -> eyre::Result<Self> {
        if dofs.len() != values.len() {
            return Err(eyre!(
                "Number of dofs ({}) and values ({}) must agree",
                dofs.len(),
                values.len()
            ));
        }
        let num_dofs = space.num_dofs();
        let mut seen = vec![false; num_dofs];
        for &dof in &dofs {
            if dof >= num_dofs {
                return Err(eyre!("Dof {} out of bounds for space with {} dofs", dof, num_dofs));
            }
            if seen[dof] {
                return Err(eyre!("Dof {} is constrained more than once", dof));
            }
            seen[dof] = true;
        }
        Ok(Self { space, dofs, values })
    }

    /// Creates a boundary condition from a marker vector and a values vector, both aligned to
    /// the dofs of the space. Values at unmarked dofs are ignored.
    pub fn from_markers(space: FunctionSpace, markers: &[bool], values: &[T]) -> eyre::Result<Self> {
        let num_dofs = space.num_dofs();
        if markers.len() != num_dofs || values.len() != num_dofs {
            return Err(eyre!(
                "Markers ({}) and values ({}) must have one entry per dof ({})",
                markers.len(),
                values.len(),
                num_dofs
            ));
        }
        let (dofs, values) = markers
            .iter()
            .zip(values)
            .enumerate()
            .filter(|(_, (&marked, _))| marked)
            .map(|(dof, (_, value))| (dof, value.clone()))
            .unzip();
        Self::new(space, dofs, values)
    }

    /// The constrained dofs, in the order they were given.
    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    /// The prescribed values, aligned with [`dofs`](Self::dofs).
    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl<T: Scalar> DirichletCondition<T> for DirichletBC<T> {
    fn function_space(&self) -> &FunctionSpace {
        &self.space
    }

    fn mark_dofs(&self, markers: &mut [bool]) {
        for &dof in &self.dofs {
            markers[dof] = true;
        }
    }

    fn populate_values(&self, values: &mut [T]) {
        for (&dof, value) in self.dofs.iter().zip(&self.values) {
            values[dof] = value.clone();
        }
    }
}

/// Collects the markers and values of a set of boundary conditions on the given space.
///
/// Returns a marker vector that is `true` at every constrained dof and a values vector holding
/// the prescribed values, zero at unconstrained dofs. Conditions defined on a different space
/// are rejected. If several conditions constrain the same dof, the last one wins.
pub fn collect_markers_and_values<T: ComplexField>(
    space: &FunctionSpace,
    bcs: &[&dyn DirichletCondition<T>],
) -> eyre::Result<(Vec<bool>, DVector<T>)> {
    let num_dofs = space.num_dofs();
    let mut markers = vec![false; num_dofs];
    let mut values = DVector::zeros(num_dofs);
    for bc in bcs {
        if bc.function_space() != space {
            return Err(eyre!("Boundary condition is not defined on the expected function space"));
        }
        bc.mark_dofs(&mut markers);
        bc.populate_values(values.as_mut_slice());
    }
    Ok((markers, values))
}

/// Writes `b[dof] = scale * (g[dof] - x0[dof])` at every constrained dof.
///
/// This is typically the last stage after assembly and lifting, so that the constrained rows
/// of the right-hand side hold the prescribed values. If `x0` is `None` it is treated as zero.
pub fn set_bc<'a, T: ComplexField>(
    b: impl Into<DVectorViewMut<'a, T>>,
    bcs: &[&dyn DirichletCondition<T>],
    x0: Option<DVectorView<T>>,
    scale: T::RealField,
) -> eyre::Result<()> {
    let mut b = b.into();
    let n = b.len();
    if let Some(x0) = &x0 {
        if x0.len() != n {
            return Err(eyre!("x0 has length {}, expected {}", x0.len(), n));
        }
    }

    // Validate all conditions before touching b
    let mut prescribed = BTreeMap::new();
    for bc in bcs {
        let num_dofs = bc.function_space().num_dofs();
        if num_dofs != n {
            return Err(eyre!(
                "Boundary condition space has {} dofs, but the vector has length {}",
                num_dofs,
                n
            ));
        }
        let mut markers = vec![false; n];
        let mut values = vec![T::zero(); n];
        bc.mark_dofs(&mut markers);
        bc.populate_values(&mut values);
        for (dof, (marked, g)) in markers.into_iter().zip(values).enumerate() {
            if marked {
                if prescribed.insert(dof, g).is_some() {
                    warn!("Dof {} is constrained by several boundary conditions", dof);
                }
            }
        }
    }

    let scale = T::from_real(scale);
    for (dof, g) in prescribed {
        let x = x0.as_ref().map(|x0| x0[dof].clone()).unwrap_or_else(T::zero);
        b[dof] = scale.clone() * (g - x);
    }
    Ok(())
}
