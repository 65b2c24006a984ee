//! # conic-core: SOCP Modeling and Canonicalization
//!
//! Provides the symbolic layer for building second-order cone programs out
//! of natural algebraic expressions, and the canonicalization pipeline that
//! lowers them into the sparse standard form consumed by primal-dual
//! interior-point cone solvers.
//!
//! ## Pipeline
//!
//! ```text
//! expressions -> constraints -> Socp -> CanonicalForm -> ConeSolver backend
//! ```
//!
//! | Stage | Type | Role |
//! |-------|------|------|
//! | Parameter graph | [`Parameter`] | deferred numeric values, external bindings |
//! | Expression algebra | [`Scalar`], [`ExprMatrix`] | affine/quadratic/norm forms |
//! | Constraints | [`Constraint`] | equality, positive orthant, second-order cone |
//! | Container | [`Socp`] | variable registry, constraint lists, cost |
//! | Canonicalizer | [`CanonicalForm`] | CCS matrices, symbolic value buffers |
//! | Backend | [`ConeSolver`] | external interior-point solver adaptor |
//!
//! ## Example
//!
//! ```
//! use conic_core::*;
//!
//! # fn main() -> ConicResult<()> {
//! let mut socp = Socp::new();
//! let x = socp.variable("x", 2, 1)?;
//!
//! // || x ||_2 <= 10, x0 + x1 == 4, minimize x0
//! let norm = ExprMatrix::scalar(norm2(&x)?);
//! socp.add_constraint(less_equal(&norm, &ExprMatrix::scalar(par(10.0)))?);
//! socp.add_constraint(equal(&ExprMatrix::scalar(x.sum()?), &ExprMatrix::scalar(par(4.0)))?);
//! socp.add_minimization_term(x.get(0, 0).clone())?;
//!
//! let canonical = CanonicalForm::build(&mut socp)?;
//! assert_eq!(canonical.n_variables, 2);
//! assert_eq!(canonical.cone_dims, vec![3]);
//! # Ok(())
//! # }
//! ```
//!
//! The solver side lives in backend crates (for example `conic-clarabel`);
//! this crate only defines the [`ConeSolver`] contract and the canonical
//! data shape.

pub mod canon;
pub mod constraint;
pub mod error;
pub mod expr;
pub mod matrix;
pub mod param;
pub mod problem;
pub mod solver;
pub mod variable;

pub use canon::{evaluate_parameters, CanonicalForm, SparseCcs};
pub use constraint::{
    equal, greater_equal, less_equal, Constraint, EqualityConstraint, PositiveConstraint,
    SecondOrderConeConstraint,
};
pub use error::{ConicError, ConicResult};
pub use expr::{dynpar, norm2, par, sqrt, Affine, Scalar, Term};
pub use matrix::{
    dynpar_matrix, dynpar_vector, hstack, par_matrix, par_vector, vstack, DenseMatrix, ExprMatrix,
};
pub use param::Parameter;
pub use problem::Socp;
pub use solver::{ConeSolver, SolverStatus};
pub use variable::Variable;
