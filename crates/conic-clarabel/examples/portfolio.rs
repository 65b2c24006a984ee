//! Factor-model portfolio optimization.
//!
//! Allocates a long-only portfolio over n assets with m risk factors,
//! trading expected return against factor and idiosyncratic risk:
//!
//! ```text
//! minimize    -mu'x + gamma (t + s)
//! subject to  x >= 0,  sum(x) == 1
//!             ||D x||  <= u,   ||F x|| <= v      (risk norms)
//!             u^2 <= t,  v^2 <= s                (epigraph via cones)
//! ```
//!
//! The squared-epigraph constraints use the standard rotated-cone trick
//! `||(1 - t, 2u)|| <= 1 + t  <=>  u^2 <= t`. All data is externally
//! bound, so the returns can be re-drawn and the problem re-solved on the
//! same canonical structure.

use std::cell::Cell;
use std::io;
use std::rc::Rc;
use std::time::Instant;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use conic_clarabel::ClarabelSolver;
use conic_core::{
    dynpar_matrix, dynpar_vector, equal, greater_equal, less_equal, norm2, par, vstack,
    ConeSolver, ExprMatrix, Socp,
};

const ASSETS: usize = 50;
const FACTORS: usize = 5;
const GAMMA: f64 = 0.5; // risk aversion
const RESOLVES: usize = 5;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let mut rng = StdRng::seed_from_u64(7);

    // Expected returns, factor loadings and idiosyncratic risk, all as
    // caller-owned cells so they can be re-drawn between solves.
    let mu: Vec<Rc<Cell<f64>>> = (0..ASSETS)
        .map(|_| Rc::new(Cell::new(rng.gen_range(0.0..1.0))))
        .collect();
    let loadings: Vec<Vec<Rc<Cell<f64>>>> = (0..FACTORS)
        .map(|_| {
            (0..ASSETS)
                .map(|_| Rc::new(Cell::new(rng.gen_range(0.0..1.0))))
                .collect()
        })
        .collect();
    let risk: Vec<Rc<Cell<f64>>> = (0..ASSETS)
        .map(|_| Rc::new(Cell::new(rng.gen_range(0.0..1.0f64).sqrt())))
        .collect();

    let build_start = Instant::now();
    let mut socp = Socp::new();

    let x = socp.variable("x", ASSETS, 1)?;
    let t = socp.variable("t", 1, 1)?;
    let s = socp.variable("s", 1, 1)?;
    let u = socp.variable("u", 1, 1)?;
    let v = socp.variable("v", 1, 1)?;

    let one = ExprMatrix::scalar(par(1.0));
    let zero = ExprMatrix::scalar(par(0.0));

    // Long-only, fully invested.
    socp.add_constraint(greater_equal(&x, &zero)?);
    socp.add_constraint(equal(&ExprMatrix::scalar(x.sum()?), &one)?);

    // Idiosyncratic risk: ||D x|| <= u with D diagonal.
    let d_x = dynpar_vector(&risk).cwise_mul(&x)?;
    socp.add_constraint(less_equal(&ExprMatrix::scalar(norm2(&d_x)?), &u)?);

    // Factor risk: ||F x|| <= v.
    let f_x = dynpar_matrix(&loadings)?.matmul(&x)?;
    socp.add_constraint(less_equal(&ExprMatrix::scalar(norm2(&f_x)?), &v)?);

    // u^2 <= t and v^2 <= s through ||(1 - t, 2u)|| <= 1 + t.
    for (epi, sq) in [(&t, &u), (&s, &v)] {
        let stacked = vstack(&[one.sub(epi)?, sq.scale(&par(2.0))?])?;
        socp.add_constraint(less_equal(
            &ExprMatrix::scalar(norm2(&stacked)?),
            &one.add(epi)?,
        )?);
    }

    // Objective: risk-adjusted return.
    let expected_return = dynpar_vector(&mu).transpose().matmul(&x)?;
    socp.add_minimization_term(expected_return.get(0, 0).mul(&par(-1.0))?)?;
    socp.add_minimization_term(
        t.get(0, 0)
            .add(s.get(0, 0))?
            .mul(&par(GAMMA))?,
    )?;

    let mut solver = ClarabelSolver::new();
    solver.initialize(&mut socp)?;
    println!("Setup duration: {:?}", build_start.elapsed());

    for round in 0..RESOLVES {
        let solve_start = Instant::now();
        let success = solver.solve(&mut socp, false)?;
        anyhow::ensure!(success, "solver returned a critical error");

        let allocation = socp.read("x")?;
        let invested: f64 = allocation.iter().sum();
        let largest = allocation.iter().cloned().fold(f64::MIN, f64::max);
        println!(
            "round {}: {} in {:?}, sum(x) = {:.6}, max(x) = {:.4}",
            round,
            solver.result_string(),
            solve_start.elapsed(),
            invested,
            largest
        );

        // Draw a fresh market and solve the same structure again.
        for cell in mu.iter().chain(risk.iter()) {
            cell.set(rng.gen_range(0.0..1.0));
        }
        for row in &loadings {
            for cell in row {
                cell.set(rng.gen_range(0.0..1.0));
            }
        }
    }

    Ok(())
}
