//! End-to-end solves through the Clarabel backend.
//!
//! These tests build problems through the public modeling surface, run the
//! full canonicalize-solve-read pipeline and check both the numeric results
//! and the canonical data layout.

use std::cell::Cell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use conic_clarabel::ClarabelSolver;
use conic_core::{
    dynpar, dynpar_vector, equal, greater_equal, less_equal, norm2, par, par_matrix, par_vector,
    CanonicalForm, ConeSolver, ConicError, ExprMatrix, Socp, SolverStatus,
};

fn scalar(expr: conic_core::Scalar) -> ExprMatrix {
    ExprMatrix::scalar(expr)
}

#[test]
fn test_minimal_lp() {
    // minimize a subject to a - 5 >= 0; the optimum sits on the bound.
    let mut socp = Socp::new();
    let a = socp.variable("a", 1, 1).unwrap();
    socp.add_constraint(greater_equal(&a, &scalar(par(5.0))).unwrap());
    socp.add_minimization_term(a.get(0, 0).clone()).unwrap();

    let mut solver = ClarabelSolver::new();
    solver.initialize(&mut socp).unwrap();
    assert!(solver.solve(&mut socp, false).unwrap());
    assert_eq!(solver.last_status(), SolverStatus::Optimal);
    assert_eq!(solver.result_string(), "Optimal solution found.");

    let solution = socp.read("a").unwrap();
    assert!((solution.get(0, 0) - 5.0).abs() < 1e-6);
    assert!(socp.is_feasible());

    // Canonical layout: no equalities, one positive row with the flipped
    // coefficient, untouched right-hand side.
    let canonical = solver.canonical().unwrap();
    assert_eq!(canonical.n_equalities, 0);
    assert_eq!(canonical.equality_matrix.nnz(), 0);
    assert_eq!(canonical.n_cone_rows, 1);

    let mut values = Vec::new();
    conic_core::evaluate_parameters(&canonical.cone_matrix.values, -1.0, &mut values).unwrap();
    assert_eq!(values, vec![-1.0]);
    conic_core::evaluate_parameters(&canonical.cone_rhs, 1.0, &mut values).unwrap();
    assert_eq!(values, vec![-5.0]);
    conic_core::evaluate_parameters(&canonical.objective, 1.0, &mut values).unwrap();
    assert_eq!(values, vec![1.0]);
}

#[test]
fn test_equality_only_problem() {
    // x + y == 1, x - y == 0, minimize 0 -> x = y = 1/2.
    let mut socp = Socp::new();
    let x = socp.variable("x", 1, 1).unwrap();
    let y = socp.variable("y", 1, 1).unwrap();

    socp.add_constraint(equal(&x.add(&y).unwrap(), &scalar(par(1.0))).unwrap());
    socp.add_constraint(equal(&x.sub(&y).unwrap(), &scalar(par(0.0))).unwrap());

    let mut solver = ClarabelSolver::new();
    solver.initialize(&mut socp).unwrap();
    assert!(solver.solve(&mut socp, false).unwrap());
    assert_eq!(solver.last_status(), SolverStatus::Optimal);

    assert!((socp.read("x").unwrap().get(0, 0) - 0.5).abs() < 1e-6);
    assert!((socp.read("y").unwrap().get(0, 0) - 0.5).abs() < 1e-6);

    let canonical = solver.canonical().unwrap();
    let mut values = Vec::new();
    conic_core::evaluate_parameters(&canonical.equality_matrix.values, -1.0, &mut values)
        .unwrap();
    assert_eq!(values, vec![-1.0, -1.0, -1.0, 1.0]);
    conic_core::evaluate_parameters(&canonical.equality_rhs, 1.0, &mut values).unwrap();
    assert_eq!(values, vec![-1.0, 0.0]);
}

/// The random cone problem from the cvxpy basic examples: m cones of
/// dimension n_i + 1 over n variables with p equality rows.
#[test]
fn test_random_socp() {
    const M: usize = 3; // cone constraints
    const N: usize = 10; // variables
    const P: usize = 5; // equality rows
    const N_I: usize = 5; // norm arguments per cone

    let mut rng = StdRng::seed_from_u64(20);
    let mut matrix = |rows: usize, cols: usize| -> Vec<Vec<f64>> {
        (0..rows)
            .map(|_| (0..cols).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect()
    };

    let x0: Vec<f64> = (0..N).map(|i| ((i as f64) * 0.7).sin()).collect();

    let mut socp = Socp::new();
    let x = socp.variable("x", N, 1).unwrap();

    for _ in 0..M {
        let a = matrix(N_I, N);
        let b: Vec<f64> = (0..N_I).map(|i| a[i][i]).collect();
        // A small linear part keeps the cone's recession directions empty.
        let c: Vec<Vec<f64>> = matrix(1, N)
            .into_iter()
            .map(|row| row.into_iter().map(|v| 0.1 * v).collect())
            .collect();

        // d is chosen so that x0 is strictly feasible for this cone.
        let norm_at_x0 = a
            .iter()
            .zip(&b)
            .map(|(row, offset)| {
                let value: f64 =
                    row.iter().zip(&x0).map(|(coeff, xi)| coeff * xi).sum::<f64>() + offset;
                value * value
            })
            .sum::<f64>()
            .sqrt();
        let c_dot_x0: f64 = c[0].iter().zip(&x0).map(|(ci, xi)| ci * xi).sum();
        let d = norm_at_x0 - c_dot_x0 + 1.0;

        let lhs = norm2(
            &par_matrix(&a)
                .unwrap()
                .matmul(&x)
                .unwrap()
                .add(&par_vector(&b))
                .unwrap(),
        )
        .unwrap();
        let rhs = par_matrix(&c)
            .unwrap()
            .matmul(&x)
            .unwrap()
            .add(&scalar(par(d)))
            .unwrap();
        socp.add_constraint(less_equal(&scalar(lhs), &rhs).unwrap());
    }

    let f_rows = matrix(P, N);
    let g: Vec<f64> = f_rows
        .iter()
        .map(|row| row.iter().zip(&x0).map(|(coeff, xi)| coeff * xi).sum())
        .collect();
    socp.add_constraint(
        equal(
            &par_matrix(&f_rows).unwrap().matmul(&x).unwrap(),
            &par_vector(&g),
        )
        .unwrap(),
    );

    let cost_cells: Vec<Rc<Cell<f64>>> = (0..N)
        .map(|i| Rc::new(Cell::new(((i as f64) * 0.3).cos())))
        .collect();
    let cost = dynpar_vector(&cost_cells)
        .transpose()
        .matmul(&x)
        .unwrap();
    socp.add_minimization_term(cost.get(0, 0).clone()).unwrap();

    let mut solver = ClarabelSolver::new();
    solver.initialize(&mut socp).unwrap();

    {
        let canonical = solver.canonical().unwrap();
        assert_eq!(canonical.n_variables, N);
        assert_eq!(canonical.n_equalities, P);
        assert_eq!(canonical.cone_dims, vec![1 + N_I; M]);
        assert_eq!(canonical.n_cone_rows, M * (1 + N_I));
    }

    assert!(solver.solve(&mut socp, false).unwrap());
    assert_eq!(solver.last_status(), SolverStatus::Optimal);
    assert_eq!(socp.solution().len(), N);
    assert!(socp.is_feasible());

    // Mutate the cost cells and re-solve on the same structure.
    let first = socp.read("x").unwrap();
    for (i, cell) in cost_cells.iter().enumerate() {
        cell.set(-((i as f64) * 0.5).sin());
    }
    assert!(solver.solve(&mut socp, false).unwrap());
    let second = socp.read("x").unwrap();

    let moved = (0..N).any(|i| (first.get(i, 0) - second.get(i, 0)).abs() > 1e-6);
    assert!(moved, "a new cost should move the optimum");
}

#[test]
fn test_dynamic_parameter_resolve_keeps_structure() {
    // a >= f with f externally bound; the bound value moves between solves
    // while the canonical structure stays frozen.
    let bound = Rc::new(Cell::new(5.0));

    let mut socp = Socp::new();
    let a = socp.variable("a", 1, 1).unwrap();
    socp.add_constraint(greater_equal(&a, &scalar(dynpar(&bound))).unwrap());
    socp.add_minimization_term(a.get(0, 0).clone()).unwrap();

    let mut solver = ClarabelSolver::new();
    solver.initialize(&mut socp).unwrap();

    assert!(solver.solve(&mut socp, false).unwrap());
    let first = *socp.read("a").unwrap().get(0, 0);
    assert!((first - 5.0).abs() < 1e-6);

    let structure_before = {
        let canonical = solver.canonical().unwrap();
        (
            canonical.cone_matrix.nnz(),
            canonical.cone_matrix.row_indices.clone(),
            canonical.cone_matrix.col_ptr.clone(),
        )
    };

    bound.set(9.0);
    assert!(solver.solve(&mut socp, false).unwrap());
    let second = *socp.read("a").unwrap().get(0, 0);
    assert!((second - 9.0).abs() < 1e-6);

    let canonical = solver.canonical().unwrap();
    assert_eq!(structure_before.0, canonical.cone_matrix.nnz());
    assert_eq!(structure_before.1, canonical.cone_matrix.row_indices);
    assert_eq!(structure_before.2, canonical.cone_matrix.col_ptr);
}

#[test]
fn test_non_convex_constructions_are_rejected() {
    let mut socp = Socp::new();
    let x = socp.variable("x", 1, 1).unwrap();
    let xs = x.get(0, 0);
    let square = scalar(xs.mul(xs).unwrap());

    // A quadratic inequality without the square root is not a cone.
    assert!(matches!(
        less_equal(&square, &scalar(par(1.0))),
        Err(ConicError::Config(_))
    ));

    // A quadratic cost survives accumulation but fails canonicalization.
    socp.add_minimization_term(xs.mul(xs).unwrap()).unwrap();
    assert!(matches!(
        CanonicalForm::build(&mut socp),
        Err(ConicError::Config(_))
    ));
}

#[test]
fn test_shape_mismatch_is_rejected() {
    let mut socp = Socp::new();
    let a = socp.variable("a", 3, 1).unwrap();
    let b = socp.variable("b", 2, 1).unwrap();
    assert!(matches!(equal(&a, &b), Err(ConicError::Config(_))));
}

#[test]
fn test_infeasible_problem_reports_certificate() {
    // x >= 1 and x <= 0 cannot hold together; the solver hands back a
    // primal infeasibility certificate, which is a verdict, not an error.
    let mut socp = Socp::new();
    let x = socp.variable("x", 1, 1).unwrap();
    socp.add_constraint(greater_equal(&x, &scalar(par(1.0))).unwrap());
    socp.add_constraint(less_equal(&x, &scalar(par(0.0))).unwrap());
    socp.add_minimization_term(x.get(0, 0).clone()).unwrap();

    let mut solver = ClarabelSolver::new();
    solver.initialize(&mut socp).unwrap();
    assert!(solver.solve(&mut socp, false).unwrap());
    assert!(matches!(
        solver.last_status(),
        SolverStatus::PrimalInfeasible | SolverStatus::PrimalInfeasibleInaccurate
    ));
}

#[test]
fn test_norm_ball_projection() {
    // Project the point (3, 4) onto the unit disk: minimize t subject to
    // ||x - p|| <= t, ||x|| <= 1. The optimum touches the disk boundary in
    // the direction of p, at distance 4.
    let mut socp = Socp::new();
    let x = socp.variable("x", 2, 1).unwrap();
    let t = socp.variable("t", 1, 1).unwrap();

    let offset = x.sub(&par_vector(&[3.0, 4.0])).unwrap();
    socp.add_constraint(less_equal(&scalar(norm2(&offset).unwrap()), &t).unwrap());
    socp.add_constraint(less_equal(&scalar(norm2(&x).unwrap()), &scalar(par(1.0))).unwrap());
    socp.add_minimization_term(t.get(0, 0).clone()).unwrap();

    let mut solver = ClarabelSolver::new();
    solver.initialize(&mut socp).unwrap();
    assert!(solver.solve(&mut socp, false).unwrap());
    assert_eq!(solver.last_status(), SolverStatus::Optimal);

    let solution = socp.read("x").unwrap();
    assert!((solution.get(0, 0) - 0.6).abs() < 1e-4);
    assert!((solution.get(1, 0) - 0.8).abs() < 1e-4);
    assert!((socp.read("t").unwrap().get(0, 0) - 4.0).abs() < 1e-4);
}
