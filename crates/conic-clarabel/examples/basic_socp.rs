//! A small random second-order cone problem.
//!
//! Builds the classic random SOCP (m cones over n variables with p equality
//! rows), solves it, then changes the cost vector through its external
//! bindings and re-solves on the unchanged canonical structure.

use std::cell::Cell;
use std::io;
use std::rc::Rc;
use std::time::Instant;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use conic_clarabel::ClarabelSolver;
use conic_core::{
    dynpar_vector, equal, less_equal, norm2, par, par_matrix, par_vector, ConeSolver, ExprMatrix,
    Socp,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    // Problem sizes: m cones of dimension n_i + 1, p equality rows.
    const M: usize = 3;
    const N: usize = 10;
    const P: usize = 5;
    const N_I: usize = 5;

    let mut rng = StdRng::seed_from_u64(42);
    let mut matrix = |rows: usize, cols: usize| -> Vec<Vec<f64>> {
        (0..rows)
            .map(|_| (0..cols).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect()
    };

    // A random point that every constraint is arranged to admit.
    let x0: Vec<f64> = matrix(1, N).remove(0);

    let build_start = Instant::now();
    let mut socp = Socp::new();
    let x = socp.variable("x", N, 1)?;

    for _ in 0..M {
        let a = matrix(N_I, N);
        let b: Vec<f64> = matrix(N_I, 1).into_iter().map(|row| row[0]).collect();
        // A small linear part keeps the cone's recession directions empty.
        let c: Vec<Vec<f64>> = matrix(1, N)
            .into_iter()
            .map(|row| row.into_iter().map(|v| 0.1 * v).collect())
            .collect();

        let norm_at_x0 = a
            .iter()
            .zip(&b)
            .map(|(row, offset)| {
                let v: f64 = row.iter().zip(&x0).map(|(ai, xi)| ai * xi).sum::<f64>() + offset;
                v * v
            })
            .sum::<f64>()
            .sqrt();
        let c_dot_x0: f64 = c[0].iter().zip(&x0).map(|(ci, xi)| ci * xi).sum();
        let d = norm_at_x0 - c_dot_x0 + 1.0;

        let lhs = norm2(&par_matrix(&a)?.matmul(&x)?.add(&par_vector(&b))?)?;
        let rhs = par_matrix(&c)?
            .matmul(&x)?
            .add(&ExprMatrix::scalar(par(d)))?;
        socp.add_constraint(less_equal(&ExprMatrix::scalar(lhs), &rhs)?);
    }

    let f_rows = matrix(P, N);
    let g: Vec<f64> = f_rows
        .iter()
        .map(|row| row.iter().zip(&x0).map(|(fi, xi)| fi * xi).sum())
        .collect();
    socp.add_constraint(equal(&par_matrix(&f_rows)?.matmul(&x)?, &par_vector(&g))?);

    // The cost is externally bound so it can change between solves.
    let cost_cells: Vec<Rc<Cell<f64>>> = (0..N)
        .map(|_| Rc::new(Cell::new(rng.gen_range(-1.0..1.0))))
        .collect();
    let cost = dynpar_vector(&cost_cells).transpose().matmul(&x)?;
    socp.add_minimization_term(cost.get(0, 0).clone())?;

    // Print the problem for inspection.
    println!("{}", socp);

    let mut solver = ClarabelSolver::new();
    solver.initialize(&mut socp)?;
    println!("Setup duration: {:?}", build_start.elapsed());

    let solve_start = Instant::now();
    let success = solver.solve(&mut socp, true)?;
    anyhow::ensure!(success, "solver returned a critical error");
    println!("Solver message: {}", solver.result_string());
    println!("Solve duration: {:?}", solve_start.elapsed());
    anyhow::ensure!(socp.is_feasible(), "solution failed the feasibility check");

    println!("First solution:\n{}", socp.read("x")?);

    // Change the cost and solve again without rebuilding anything.
    for cell in &cost_cells {
        cell.set(rng.gen_range(-1.0..1.0));
    }
    solver.solve(&mut socp, false)?;
    println!(
        "Solution after changing the cost function:\n{}",
        socp.read("x")?
    );

    Ok(())
}
