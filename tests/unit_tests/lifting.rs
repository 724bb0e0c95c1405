use fennec::assembly::{apply_lifting, lift_bc, lift_bc_csr, lift_bc_with_x0, CsrAssembler, LiftingOperator};
use fennec::bc::{DirichletBC, DirichletCondition};
use fennec::form::{BilinearForm, TabulatedBilinearForm};
use fennec::nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView};
use fennec::space::FunctionSpace;
use matrixcompare::assert_matrix_eq;
use proptest::collection::vec;
use proptest::prelude::*;
use util::{interval_stiffness_form, interval_topology, vertex_space};

/// Dense reference for `b - scale * A (g - x0)` with masked `g - x0`, optionally excluding the
/// constrained rows.
fn reference_lifting(
    b: &DVector<f64>,
    a: &DMatrix<f64>,
    markers: &[bool],
    g: &DVector<f64>,
    x0: &DVector<f64>,
    scale: f64,
    exclude_constrained_rows: bool,
) -> DVector<f64> {
    let masked = DVector::from_fn(g.len(), |i, _| if markers[i] { g[i] - x0[i] } else { 0.0 });
    let correction = a * masked;
    DVector::from_fn(b.len(), |i, _| {
        if exclude_constrained_rows && markers[i] {
            b[i]
        } else {
            b[i] - scale * correction[i]
        }
    })
}

fn dense_matrix(form: &dyn BilinearForm<f64>) -> DMatrix<f64> {
    DMatrix::from(&CsrAssembler::<f64>::default().assemble(form).unwrap())
}

#[test]
fn lift_bc_two_element_interval() {
    let space = vertex_space(interval_topology(2));
    let a = interval_stiffness_form(&space);
    let markers = [true, false, false];
    let g = DVector::from_column_slice(&[2.0, 0.0, 0.0]);

    let mut b = DVector::<f64>::zeros(3);
    lift_bc(&mut b, &a, &g, &markers, 1.0).unwrap();

    // b = -A[:, 0] * 2 at unconstrained rows, constrained row untouched
    let a_dense = dense_matrix(&a);
    let expected = DVector::from_column_slice(&[0.0, -a_dense[(1, 0)] * 2.0, -a_dense[(2, 0)] * 2.0]);
    assert_matrix_eq!(b, expected, comp = float);
    assert_matrix_eq!(b, DVector::from_column_slice(&[0.0, 2.0, 0.0]), comp = float);
}

#[test]
fn lift_bc_leaves_constrained_row_untouched() {
    let space = vertex_space(interval_topology(2));
    let a = interval_stiffness_form(&space);
    let markers = [false, false, true];
    let g = DVector::from_column_slice(&[0.0, 0.0, 3.0]);

    let mut b = DVector::from_column_slice(&[1.0, 1.0, 1.0]);
    lift_bc(&mut b, &a, &g, &markers, 1.0).unwrap();
    assert_matrix_eq!(b, DVector::from_column_slice(&[1.0, 4.0, 1.0]), comp = float);
}

#[test]
fn lift_bc_with_x0_lifts_difference() {
    let space = vertex_space(interval_topology(2));
    let a = interval_stiffness_form(&space);
    let markers = [true, false, false];
    let g = DVector::from_column_slice(&[2.0, 0.0, 0.0]);
    let x0 = DVector::from_column_slice(&[0.5, 7.0, 9.0]);

    let mut b = DVector::<f64>::zeros(3);
    lift_bc_with_x0(&mut b, &a, &g, &markers, &x0, 1.0).unwrap();
    assert_matrix_eq!(b, DVector::from_column_slice(&[0.0, 1.5, 0.0]), comp = float);

    // Negative scale flips the correction
    let mut b = DVector::<f64>::zeros(3);
    lift_bc_with_x0(&mut b, &a, &g, &markers, &x0, -2.0).unwrap();
    assert_matrix_eq!(b, DVector::from_column_slice(&[0.0, -3.0, 0.0]), comp = float);
}

#[test]
fn lift_bc_with_x0_equal_to_g_is_a_no_op() {
    let space = vertex_space(interval_topology(3));
    let a = interval_stiffness_form(&space);
    let markers = [true, false, false, true];
    let g = DVector::from_column_slice(&[2.0, 0.0, 0.0, -1.0]);

    let mut b = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]);
    lift_bc_with_x0(&mut b, &a, &g, &markers, &g, 1.0).unwrap();
    assert_eq!(b, DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]));
}

#[test]
fn lift_bc_skips_ghost_cells() {
    let mut topology = interval_topology(2);
    topology.init_ghost(1, 1).unwrap();
    topology.set_cell_owner(vec![1]).unwrap();
    let space = vertex_space(topology);
    let a = interval_stiffness_form(&space);
    let markers = [false, false, true];
    let g = DVector::from_column_slice(&[0.0, 0.0, 3.0]);

    // Dof 2 is only supported on the ghost cell
    let mut b = DVector::<f64>::zeros(3);
    lift_bc(&mut b, &a, &g, &markers, 1.0).unwrap();
    assert_eq!(b, DVector::<f64>::zeros(3));
}

#[test]
fn lift_bc_rejects_mismatched_sizes_without_mutation() {
    let space = vertex_space(interval_topology(2));
    let a = interval_stiffness_form(&space);
    let g = DVector::from_column_slice(&[2.0, 0.0, 0.0]);

    let mut b = DVector::from_column_slice(&[1.0, 1.0]);
    assert!(lift_bc(&mut b, &a, &g, &[true, false, false], 1.0).is_err());
    assert_eq!(b, DVector::from_column_slice(&[1.0, 1.0]));

    let mut b = DVector::from_column_slice(&[1.0, 1.0, 1.0]);
    assert!(lift_bc(&mut b, &a, &g, &[true, false], 1.0).is_err());
    let x0 = DVector::<f64>::zeros(2);
    assert!(lift_bc_with_x0(&mut b, &a, &g, &[true, false, false], &x0, 1.0).is_err());
    assert_eq!(b, DVector::from_column_slice(&[1.0, 1.0, 1.0]));
}

#[test]
fn apply_lifting_matches_lift_bc_for_single_block() {
    let space = vertex_space(interval_topology(3));
    let a = interval_stiffness_form(&space);
    let bc = DirichletBC::new(space.clone(), vec![0, 3], vec![2.0, -1.0]).unwrap();

    let mut b1 = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]);
    let forms: Vec<&dyn BilinearForm<f64>> = vec![&a];
    let bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = vec![vec![&bc]];
    apply_lifting(&mut b1, &forms, &bcs, &[], 1.0).unwrap();

    let mut b2 = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]);
    let g = DVector::from_column_slice(&[2.0, 0.0, 0.0, -1.0]);
    lift_bc(&mut b2, &a, &g, &[true, false, false, true], 1.0).unwrap();

    assert_matrix_eq!(b1, b2, comp = float);
    assert_matrix_eq!(b1, DVector::from_column_slice(&[1.0, 4.0, 2.0, 4.0]), comp = float);
}

#[test]
fn apply_lifting_with_off_diagonal_block() {
    let topology = interval_topology(2);
    let u_space = vertex_space(topology.clone());
    let p_space = vertex_space(topology);

    let a_uu = interval_stiffness_form(&u_space);
    #[rustfmt::skip]
    let coupling = DMatrix::from_row_slice(2, 2, &[
        1.0, 2.0,
        3.0, 4.0,
    ]);
    let a_up = TabulatedBilinearForm::uniform(u_space.clone(), p_space.clone(), coupling).unwrap();

    let bc_u = DirichletBC::new(u_space.clone(), vec![0], vec![1.0]).unwrap();
    let bc_p = DirichletBC::new(p_space.clone(), vec![1], vec![1.0]).unwrap();
    let forms: Vec<&dyn BilinearForm<f64>> = vec![&a_uu, &a_up];
    let bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = vec![vec![&bc_u], vec![&bc_p]];

    let mut b = DVector::<f64>::zeros(3);
    apply_lifting(&mut b, &forms, &bcs, &[], 1.0).unwrap();

    let g_u = DVector::from_column_slice(&[1.0, 0.0, 0.0]);
    let g_p = DVector::from_column_slice(&[0.0, 1.0, 0.0]);
    let zero = DVector::<f64>::zeros(3);
    let expected = reference_lifting(
        &DVector::zeros(3),
        &dense_matrix(&a_uu),
        &[true, false, false],
        &g_u,
        &zero,
        1.0,
        true,
    );
    // The off-diagonal block also corrects row 0, which is constrained in the u block only
    let expected = reference_lifting(
        &expected,
        &dense_matrix(&a_up),
        &[false, true, false],
        &g_p,
        &zero,
        1.0,
        false,
    );
    assert_matrix_eq!(b, expected, comp = abs, tol = 1e-12);
    assert_matrix_eq!(b, DVector::from_column_slice(&[-2.0, -4.0, -3.0]), comp = abs, tol = 1e-12);
}

#[test]
fn apply_lifting_with_x0_per_block() {
    let space = vertex_space(interval_topology(2));
    let a = interval_stiffness_form(&space);
    let bc = DirichletBC::new(space.clone(), vec![0], vec![2.0]).unwrap();
    let forms: Vec<&dyn BilinearForm<f64>> = vec![&a];
    let bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = vec![vec![&bc]];
    let x0 = DVector::from_column_slice(&[0.5, 7.0, 9.0]);

    let mut b = DVector::<f64>::zeros(3);
    apply_lifting(&mut b, &forms, &bcs, &[DVectorView::from(&x0)], 1.0).unwrap();
    assert_matrix_eq!(b, DVector::from_column_slice(&[0.0, 1.5, 0.0]), comp = float);
}

#[test]
fn apply_lifting_skips_blocks_without_conditions() {
    let space = vertex_space(interval_topology(2));
    let a = interval_stiffness_form(&space);
    let forms: Vec<&dyn BilinearForm<f64>> = vec![&a];
    let bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = vec![vec![]];

    let mut b = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    apply_lifting(&mut b, &forms, &bcs, &[], 1.0).unwrap();
    assert_eq!(b, DVector::from_column_slice(&[1.0, 2.0, 3.0]));

    // No blocks at all
    let no_forms: Vec<&dyn BilinearForm<f64>> = Vec::new();
    let no_bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = Vec::new();
    apply_lifting(&mut b, &no_forms, &no_bcs, &[], 1.0).unwrap();
    assert_eq!(b, DVector::from_column_slice(&[1.0, 2.0, 3.0]));
}

#[test]
fn apply_lifting_rejects_invalid_input_without_mutation() {
    let space = vertex_space(interval_topology(2));
    let other_space = vertex_space(interval_topology(2));
    let a = interval_stiffness_form(&space);
    let a_other = interval_stiffness_form(&other_space);
    let bc = DirichletBC::new(space.clone(), vec![0], vec![2.0]).unwrap();
    let bc_other = DirichletBC::new(other_space.clone(), vec![0], vec![2.0]).unwrap();
    let original = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    let mut b = original.clone();

    // Number of forms and condition sets differ
    let forms: Vec<&dyn BilinearForm<f64>> = vec![&a, &a];
    let bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = vec![vec![&bc]];
    assert!(apply_lifting(&mut b, &forms, &bcs, &[], 1.0).is_err());

    // Number of x0 blocks differs
    let forms: Vec<&dyn BilinearForm<f64>> = vec![&a];
    let x0 = DVector::<f64>::zeros(3);
    let x0_blocks = [DVectorView::from(&x0), DVectorView::from(&x0)];
    assert!(apply_lifting(&mut b, &forms, &bcs, &x0_blocks, 1.0).is_err());

    // x0 of the wrong length
    let short_x0 = DVector::<f64>::zeros(2);
    assert!(apply_lifting(&mut b, &forms, &bcs, &[DVectorView::from(&short_x0)], 1.0).is_err());

    // Forms with different test spaces, the valid block comes first
    let forms: Vec<&dyn BilinearForm<f64>> = vec![&a, &a_other];
    let bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = vec![vec![&bc], vec![&bc_other]];
    assert!(apply_lifting(&mut b, &forms, &bcs, &[], 1.0).is_err());

    // Condition defined on a space other than the trial space
    let forms: Vec<&dyn BilinearForm<f64>> = vec![&a];
    let bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = vec![vec![&bc_other]];
    assert!(apply_lifting(&mut b, &forms, &bcs, &[], 1.0).is_err());

    // Vector of the wrong length
    let bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = vec![vec![&bc]];
    let mut short_b = DVector::from_column_slice(&[1.0, 2.0]);
    assert!(apply_lifting(&mut short_b, &forms, &bcs, &[], 1.0).is_err());
    assert_eq!(short_b, DVector::from_column_slice(&[1.0, 2.0]));

    assert_eq!(b, original);
}

#[test]
fn lifting_operator_can_be_reused() {
    let operator = LiftingOperator::<f64>::default();
    let small_space = vertex_space(interval_topology(1));
    let large_space = vertex_space(interval_topology(4));
    let small = interval_stiffness_form(&small_space);
    let large = interval_stiffness_form(&large_space);

    let mut b_small = DVector::<f64>::zeros(2);
    let g_small = DVector::from_column_slice(&[1.0, 0.0]);
    operator.lift_bc(&mut b_small, &small, &g_small, &[true, false], 1.0).unwrap();

    let mut b_large = DVector::<f64>::zeros(5);
    let g_large = DVector::from_column_slice(&[0.0, 0.0, 0.0, 0.0, 1.0]);
    operator.lift_bc(&mut b_large, &large, &g_large, &[false, false, false, false, true], 1.0).unwrap();

    assert_matrix_eq!(b_small, DVector::from_column_slice(&[0.0, 1.0]), comp = float);
    assert_matrix_eq!(b_large, DVector::from_column_slice(&[0.0, 0.0, 0.0, 1.0, 0.0]), comp = float);
}

#[test]
fn lift_bc_csr_agrees_with_cell_wise_lifting() {
    let space = vertex_space(interval_topology(3));
    let a = interval_stiffness_form(&space);
    let matrix = CsrAssembler::<f64>::default().assemble(&a).unwrap();
    let markers = [true, false, true, false];
    let g = DVector::from_column_slice(&[2.0, 0.0, -1.0, 0.0]);
    let x0 = DVector::from_column_slice(&[1.0, 1.0, 1.0, 1.0]);

    let mut b1 = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]);
    lift_bc_with_x0(&mut b1, &a, &g, &markers, &x0, 0.5).unwrap();
    let mut b2 = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]);
    lift_bc_csr(&mut b2, &matrix, &g, &markers, Some(DVectorView::from(&x0)), 0.5).unwrap();

    assert_matrix_eq!(b1, b2, comp = abs, tol = 1e-12);
}

#[test]
fn lift_bc_csr_rejects_mismatched_sizes() {
    let space = vertex_space(interval_topology(2));
    let matrix = CsrAssembler::<f64>::default()
        .assemble(&interval_stiffness_form(&space))
        .unwrap();
    let g = DVector::<f64>::zeros(3);

    let mut b = DVector::<f64>::zeros(2);
    assert!(lift_bc_csr(&mut b, &matrix, &g, &[false; 3], None, 1.0).is_err());
    let mut b = DVector::<f64>::zeros(3);
    assert!(lift_bc_csr(&mut b, &matrix, &g, &[false; 2], None, 1.0).is_err());
    let x0 = DVector::<f64>::zeros(4);
    assert!(lift_bc_csr(&mut b, &matrix, &g, &[false; 3], Some(DVectorView::from(&x0)), 1.0).is_err());
}

/// A bilinear form whose trial space is defined on fewer cells than its test space.
struct MismatchedCellsForm {
    test_space: FunctionSpace,
    trial_space: FunctionSpace,
}

impl BilinearForm<f64> for MismatchedCellsForm {
    fn test_space(&self) -> &FunctionSpace {
        &self.test_space
    }

    fn trial_space(&self) -> &FunctionSpace {
        &self.trial_space
    }

    fn assemble_cell_matrix_into(&self, _cell: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        output.fill(1.0);
        Ok(())
    }
}

#[test]
fn lifting_rejects_trial_space_with_fewer_cells_without_mutation() {
    let form = MismatchedCellsForm {
        test_space: vertex_space(interval_topology(3)),
        trial_space: vertex_space(interval_topology(1)),
    };
    let g = DVector::from_column_slice(&[1.0, 1.0]);
    let markers = [true, true];

    let mut b = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]);
    assert!(lift_bc(&mut b, &form, &g, &markers, 1.0).is_err());
    assert_eq!(b, DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]));

    let bc = DirichletBC::new(form.trial_space.clone(), vec![0, 1], vec![1.0, 1.0]).unwrap();
    let forms: Vec<&dyn BilinearForm<f64>> = vec![&form];
    let bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = vec![vec![&bc]];
    assert!(apply_lifting(&mut b, &forms, &bcs, &[], 1.0).is_err());
    assert_eq!(b, DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]));

    assert!(CsrAssembler::<f64>::default().assemble(&form).is_err());
}

fn element_matrices(num_cells: usize) -> impl Strategy<Value = Vec<DMatrix<f64>>> {
    vec(vec(-5.0..5.0, 4), num_cells)
        .prop_map(|matrices| matrices.iter().map(|m| DMatrix::from_row_slice(2, 2, m)).collect())
}

proptest! {
    #[test]
    fn block_lifting_never_corrects_with_unconstrained_dofs(
        (matrices, (markers, g), x0_unconstrained) in (1..6usize).prop_flat_map(|num_cells| {
            (element_matrices(num_cells),
             fennec::proptest::dirichlet_markers_and_values(num_cells + 1),
             vec(-10.0..10.0, num_cells + 1))
        })
    ) {
        let num_cells = matrices.len();
        let topology = interval_topology(num_cells);
        let space = vertex_space(topology.clone());
        let trial_space = vertex_space(topology);
        let a = TabulatedBilinearForm::new(space, trial_space.clone(), matrices).unwrap();

        // x0 equals g at constrained dofs, so the whole correction must vanish
        let x0 = DVector::from_fn(num_cells + 1, |i, _| if markers[i] { g[i] } else { x0_unconstrained[i] });
        let bc = DirichletBC::from_markers(trial_space, &markers, &g).unwrap();
        let forms: Vec<&dyn BilinearForm<f64>> = vec![&a];
        let bcs: Vec<Vec<&dyn DirichletCondition<f64>>> = vec![vec![&bc]];

        let original = DVector::from_fn(num_cells + 1, |i, _| i as f64);
        let mut b = original.clone();
        apply_lifting(&mut b, &forms, &bcs, &[DVectorView::from(&x0)], 1.0).unwrap();
        prop_assert_eq!(b, original);
    }

    #[test]
    fn lift_bc_matches_dense_reference(
        (matrices, (markers, g), noise, x0) in (1..6usize).prop_flat_map(|num_cells| {
            (element_matrices(num_cells),
             fennec::proptest::dirichlet_markers_and_values(num_cells + 1),
             vec(-10.0..10.0, num_cells + 1),
             vec(-10.0..10.0, num_cells + 1))
        }),
        scale in -2.0..2.0
    ) {
        let num_cells = matrices.len();
        let space = vertex_space(interval_topology(num_cells));
        let a = TabulatedBilinearForm::new(space.clone(), space, matrices).unwrap();
        let a_dense = dense_matrix(&a);

        let g = DVector::from_vec(g);
        let x0 = DVector::from_vec(x0);
        // Values at unconstrained dofs must not leak into the correction
        let g_with_noise = DVector::from_fn(num_cells + 1, |i, _| if markers[i] { g[i] } else { noise[i] });

        let b0 = DVector::from_fn(num_cells + 1, |i, _| 1.0 + i as f64);
        let mut b = b0.clone();
        lift_bc_with_x0(&mut b, &a, &g_with_noise, &markers, &x0, scale).unwrap();

        let expected = reference_lifting(&b0, &a_dense, &markers, &g, &x0, scale, true);
        assert_matrix_eq!(b, expected, comp = abs, tol = 1e-9);
    }
}
