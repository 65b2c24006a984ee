//! Constraint taxonomy and relational builders.
//!
//! Three constraint kinds exist: equality `aff == 0`, positive `aff >= 0`
//! and second-order cone `||(aff_1 .. aff_k)||_2 <= aff_0`. Every variant
//! carries affine expressions only; the builders below are the sole place
//! where relational user expressions are translated into this canonical
//! trio, so anything non-convex is rejected right here.

use std::fmt;

use crate::error::{ConicError, ConicResult};
use crate::expr::{Affine, Product, Scalar};
use crate::matrix::ExprMatrix;

/// `affine == 0`.
#[derive(Debug, Clone)]
pub struct EqualityConstraint {
    pub(crate) affine: Affine,
}

/// `affine >= 0`.
#[derive(Debug, Clone)]
pub struct PositiveConstraint {
    pub(crate) affine: Affine,
}

/// `||norm||_2 <= affine`.
#[derive(Debug, Clone)]
pub struct SecondOrderConeConstraint {
    pub(crate) norm: Vec<Affine>,
    pub(crate) affine: Affine,
}

/// A constraint of one of the three canonical kinds.
#[derive(Debug, Clone)]
pub enum Constraint {
    Equality(EqualityConstraint),
    Positive(PositiveConstraint),
    SecondOrderCone(SecondOrderConeConstraint),
}

impl EqualityConstraint {
    /// Absolute residual at a solution; zero when satisfied.
    pub fn violation(&self, solution: &[f64]) -> ConicResult<f64> {
        Ok(self.affine.evaluate(solution)?.abs())
    }
}

impl PositiveConstraint {
    /// How far below zero the affine sits; non-positive when satisfied.
    pub fn violation(&self, solution: &[f64]) -> ConicResult<f64> {
        Ok(-self.affine.evaluate(solution)?)
    }
}

impl SecondOrderConeConstraint {
    /// `||norm|| - affine`; non-positive when satisfied.
    pub fn violation(&self, solution: &[f64]) -> ConicResult<f64> {
        let mut sum = 0.0;
        for argument in &self.norm {
            let value = argument.evaluate(solution)?;
            sum += value * value;
        }
        Ok(sum.sqrt() - self.affine.evaluate(solution)?)
    }
}

impl fmt::Display for EqualityConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} == 0", self.affine)
    }
}

impl fmt::Display for PositiveConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} >= 0", self.affine)
    }
}

impl fmt::Display for SecondOrderConeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, argument) in self.norm.iter().enumerate() {
            write!(f, "({})^2", argument)?;
            if i != self.norm.len() - 1 {
                write!(f, " + ")?;
            }
        }
        write!(f, ")^(1/2) <= {}", self.affine)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Equality(c) => write!(f, "{}", c),
            Constraint::Positive(c) => write!(f, "{}", c),
            Constraint::SecondOrderCone(c) => write!(f, "{}", c),
        }
    }
}

/// Shape-check two operands and return the broadcast target shape: a scalar
/// broadcasts over the other operand; two matrices must agree exactly.
fn broadcast_shape(lhs: &ExprMatrix, rhs: &ExprMatrix) -> ConicResult<(usize, usize)> {
    if !lhs.is_scalar() && !rhs.is_scalar() && lhs.shape() != rhs.shape() {
        return Err(ConicError::Config(format!(
            "shape mismatch in constraint: {}x{} vs {}x{}",
            lhs.rows(),
            lhs.cols(),
            rhs.rows(),
            rhs.cols()
        )));
    }
    Ok((
        lhs.rows().max(rhs.rows()),
        lhs.cols().max(rhs.cols()),
    ))
}

fn broadcast_cell(matrix: &ExprMatrix, row: usize, col: usize) -> &Scalar {
    if matrix.is_scalar() {
        matrix.get(0, 0)
    } else {
        matrix.get(row, col)
    }
}

/// `lhs == rhs`, one equality constraint per broadcast cell. Both sides
/// must be of order one or lower.
pub fn equal(lhs: &ExprMatrix, rhs: &ExprMatrix) -> ConicResult<Vec<Constraint>> {
    let (rows, cols) = broadcast_shape(lhs, rhs)?;

    let mut constraints = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let left = broadcast_cell(lhs, row, col);
            let right = broadcast_cell(rhs, row, col);
            if left.order() > 1 || right.order() > 1 || left.is_norm() || right.is_norm() {
                return Err(ConicError::Config(
                    "equality constraints must be affine on both sides".into(),
                ));
            }
            constraints.push(Constraint::Equality(EqualityConstraint {
                affine: left.affine.sub(&right.affine),
            }));
        }
    }
    Ok(constraints)
}

/// `lhs <= rhs`, one constraint per broadcast cell: a positive-orthant
/// constraint when the left side is affine, a second-order cone constraint
/// when the left side is a norm form. Anything else is rejected.
pub fn less_equal(lhs: &ExprMatrix, rhs: &ExprMatrix) -> ConicResult<Vec<Constraint>> {
    let (rows, cols) = broadcast_shape(lhs, rhs)?;

    let mut constraints = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let left = broadcast_cell(lhs, row, col);
            let right = broadcast_cell(rhs, row, col);
            if right.order() > 1 || right.is_norm() {
                return Err(ConicError::Config(
                    "the right-hand side of an inequality must be affine".into(),
                ));
            }

            if left.order() <= 1 && !left.is_norm() {
                constraints.push(Constraint::Positive(PositiveConstraint {
                    affine: right.affine.sub(&left.affine),
                }));
            } else if left.is_norm() {
                let mut norm = Vec::with_capacity(left.higher_order.len());
                for product in &left.higher_order {
                    match product {
                        Product::Square(affine) => norm.push(affine.clone()),
                        Product::Pair(_, _) => {
                            return Err(ConicError::Config(
                                "norm forms may only contain squares".into(),
                            ))
                        }
                    }
                }
                constraints.push(Constraint::SecondOrderCone(SecondOrderConeConstraint {
                    norm,
                    affine: right.affine.sub(&left.affine),
                }));
            } else {
                return Err(ConicError::Config(
                    "unsupported term in constraint: quadratic without square root".into(),
                ));
            }
        }
    }
    Ok(constraints)
}

/// `lhs >= rhs`, defined as `rhs <= lhs`.
pub fn greater_equal(lhs: &ExprMatrix, rhs: &ExprMatrix) -> ConicResult<Vec<Constraint>> {
    less_equal(rhs, lhs)
}
