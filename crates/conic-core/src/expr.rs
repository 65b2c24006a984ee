//! Scalar expression algebra.
//!
//! The expression type is deliberately small: an affine part (a linear
//! combination of variables plus a constant), a list of higher-order slots
//! (each a square of one affine or a product of two), and a flag marking the
//! Euclidean-norm form `sqrt(sum of squares)`. This is exactly the shape a
//! second-order cone program can absorb; anything that falls outside it is
//! rejected when it is built, not when the problem is canonicalized.
//!
//! Operations return [`ConicResult`] because the algebra is partial:
//! multiplying two first-order affine expressions at the [`Affine`] layer,
//! adding two norm forms, or subtracting a quadratic are all
//! [`ConicError::Config`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{ConicError, ConicResult};
use crate::matrix::DenseMatrix;
use crate::param::Parameter;
use crate::variable::Variable;

/// One linear term: `parameter * variable`.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub(crate) parameter: Parameter,
    pub(crate) variable: Variable,
}

impl Term {
    pub(crate) fn evaluate(&self, solution: &[f64]) -> ConicResult<f64> {
        Ok(self.parameter.value()? * solution[self.variable.index()])
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.parameter.is_one() {
            match self.parameter.value() {
                Ok(value) => write!(f, "{} * ", value)?,
                Err(_) => write!(f, "(undefined) * ")?,
            }
        }
        write!(f, "{}", self.variable)
    }
}

/// A linear combination of variables plus a constant.
///
/// After [`Affine::clean`], no two terms share a variable and no term
/// carries a parameter that evaluates to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Affine {
    pub(crate) terms: Vec<Term>,
    pub(crate) constant: Parameter,
}

impl Affine {
    pub(crate) fn from_constant(constant: Parameter) -> Affine {
        Affine {
            terms: Vec::new(),
            constant,
        }
    }

    pub(crate) fn from_variable(variable: Variable) -> Affine {
        Affine {
            terms: vec![Term {
                parameter: Parameter::constant(1.0),
                variable,
            }],
            constant: Parameter::constant(0.0),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty() && self.constant.is_zero()
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_first_order(&self) -> bool {
        !self.terms.is_empty()
    }

    /// Add `other` into `self`, merging terms that share a variable by
    /// summing their parameters.
    pub(crate) fn add_assign(&mut self, other: &Affine) {
        for term in &other.terms {
            match self
                .terms
                .iter_mut()
                .find(|t| t.variable == term.variable)
            {
                Some(existing) => {
                    existing.parameter =
                        existing.parameter.clone() + term.parameter.clone();
                }
                None => self.terms.push(term.clone()),
            }
        }
        if !other.constant.is_zero() {
            self.constant = if self.constant.is_zero() {
                other.constant.clone()
            } else {
                self.constant.clone() + other.constant.clone()
            };
        }
    }

    pub fn add(&self, other: &Affine) -> Affine {
        let mut result = self.clone();
        result.add_assign(other);
        result
    }

    pub fn sub(&self, other: &Affine) -> Affine {
        let mut result = self.clone();
        result.add_assign(&other.neg());
        result
    }

    pub fn neg(&self) -> Affine {
        self.scale(&Parameter::constant(-1.0))
    }

    /// Multiply every coefficient and the constant by `param`.
    pub(crate) fn scale(&self, param: &Parameter) -> Affine {
        if param.is_zero() {
            return Affine::default();
        }
        if param.is_one() {
            return self.clone();
        }
        let mut result = Affine::default();
        for term in &self.terms {
            if !term.parameter.is_zero() {
                result.terms.push(Term {
                    parameter: param.clone() * term.parameter.clone(),
                    variable: term.variable.clone(),
                });
            }
        }
        if !self.constant.is_zero() {
            result.constant = param.clone() * self.constant.clone();
        }
        result
    }

    /// Multiply two affine expressions. At this layer one factor must be
    /// constant; promoting a product of two first-order expressions to a
    /// quadratic happens at the [`Scalar`] level only.
    pub fn mul(&self, other: &Affine) -> ConicResult<Affine> {
        if self.is_first_order() && other.is_first_order() {
            return Err(ConicError::Config(
                "cannot multiply two first-order affine expressions".into(),
            ));
        }
        if self.is_constant() && other.is_constant() {
            return Ok(Affine::from_constant(
                self.constant.clone() * other.constant.clone(),
            ));
        }
        let (param, affine) = if other.is_constant() {
            (&other.constant, self)
        } else {
            (&self.constant, other)
        };
        Ok(affine.scale(param))
    }

    pub fn evaluate(&self, solution: &[f64]) -> ConicResult<f64> {
        let mut sum = self.constant.value()?;
        for term in &self.terms {
            sum += term.evaluate(solution)?;
        }
        Ok(sum)
    }

    /// Merge terms sharing a variable, then drop terms whose parameter
    /// evaluates to exactly zero. Returns the number of removed terms.
    pub(crate) fn clean(&mut self) -> ConicResult<usize> {
        let mut removed = 0;

        let mut merged: Vec<Term> = Vec::with_capacity(self.terms.len());
        for term in self.terms.drain(..) {
            match merged.iter_mut().find(|t| t.variable == term.variable) {
                Some(existing) => {
                    existing.parameter = existing.parameter.clone() + term.parameter;
                    removed += 1;
                }
                None => merged.push(term),
            }
        }

        for term in merged {
            if term.parameter.value()? == 0.0 {
                removed += 1;
            } else {
                self.terms.push(term);
            }
        }

        Ok(removed)
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            write!(f, "{}", term)?;
            if i != self.terms.len() - 1 {
                write!(f, " + ")?;
            }
        }
        if !self.terms.is_empty() && !self.constant.is_zero() {
            write!(f, " + ")?;
        }
        if self.terms.is_empty() || !self.constant.is_zero() {
            write!(f, "{}", self.constant)?;
        }
        Ok(())
    }
}

/// One higher-order slot: the square of an affine expression, or a product
/// of two distinct ones.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Product {
    Square(Affine),
    Pair(Affine, Affine),
}

/// A scalar-valued expression: affine part, higher-order slots, and the
/// norm flag.
///
/// The order is 0 for constants, 1 for first-order affine expressions, and
/// 2 as soon as any higher-order slot is present. An expression with the
/// norm flag set is a *norm form*: its affine part is constant and all
/// slots are squares; this is the only admissible left-hand side of a
/// second-order cone constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scalar {
    pub(crate) affine: Affine,
    pub(crate) higher_order: Vec<Product>,
    pub(crate) sqrt: bool,
}

impl Scalar {
    pub fn order(&self) -> usize {
        if !self.higher_order.is_empty() {
            2
        } else if self.affine.is_first_order() {
            1
        } else {
            0
        }
    }

    pub fn is_norm(&self) -> bool {
        self.sqrt
    }

    pub fn add(&self, other: &Scalar) -> ConicResult<Scalar> {
        if self.is_norm() || other.is_norm() {
            return Err(ConicError::Config(
                "cannot add norm expressions".into(),
            ));
        }
        let mut result = self.clone();
        result.affine.add_assign(&other.affine);
        result.higher_order.extend(other.higher_order.iter().cloned());
        Ok(result)
    }

    pub fn sub(&self, other: &Scalar) -> ConicResult<Scalar> {
        if other.order() > 1 {
            return Err(ConicError::Config(
                "subtraction of higher-order expressions is not supported".into(),
            ));
        }
        let mut result = self.clone();
        result.affine.add_assign(&other.affine.neg());
        Ok(result)
    }

    pub fn mul(&self, other: &Scalar) -> ConicResult<Scalar> {
        if self.is_norm() || other.is_norm() || self.order() == 2 || other.order() == 2 {
            return Err(ConicError::Config(
                "can only multiply expressions of order one or lower".into(),
            ));
        }

        let mut result = Scalar::default();
        if self.affine.is_first_order() && other.affine.is_first_order() {
            // A product of two first-order expressions lands in a single
            // higher-order slot; x * x is recorded as a square.
            if self.affine == other.affine {
                result.higher_order.push(Product::Square(self.affine.clone()));
            } else {
                result
                    .higher_order
                    .push(Product::Pair(self.affine.clone(), other.affine.clone()));
            }
        } else {
            result.affine = self.affine.mul(&other.affine)?;
        }
        Ok(result)
    }

    /// Evaluate against a solution vector.
    pub fn evaluate(&self, solution: &[f64]) -> ConicResult<f64> {
        let mut sum = 0.0;
        for product in &self.higher_order {
            sum += match product {
                Product::Square(affine) => {
                    let value = affine.evaluate(solution)?;
                    value * value
                }
                Product::Pair(a, b) => a.evaluate(solution)? * b.evaluate(solution)?,
            };
        }
        if self.sqrt {
            sum = sum.sqrt();
        }
        sum += self.affine.evaluate(solution)?;
        Ok(sum)
    }
}

impl From<Parameter> for Scalar {
    fn from(parameter: Parameter) -> Self {
        Scalar {
            affine: Affine::from_constant(parameter),
            ..Scalar::default()
        }
    }
}

impl From<Variable> for Scalar {
    fn from(variable: Variable) -> Self {
        Scalar {
            affine: Affine::from_variable(variable),
            ..Scalar::default()
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Parameter::constant(value).into()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.affine)?;

        if self.order() == 2 {
            write!(f, " + (")?;
            for (i, product) in self.higher_order.iter().enumerate() {
                match product {
                    Product::Square(affine) => write!(f, "({})^2", affine)?,
                    Product::Pair(a, b) => write!(f, "({})*({})", a, b)?,
                }
                if i < self.higher_order.len() - 1 {
                    write!(f, " + ")?;
                }
            }
            write!(f, ")")?;
            if self.is_norm() {
                write!(f, "^(1/2)")?;
            }
        }
        Ok(())
    }
}

/// Wrap a constant into the expression algebra.
pub fn par(value: f64) -> Scalar {
    Parameter::constant(value).into()
}

/// Wrap an external binding into the expression algebra. The cell stays
/// owned by the caller and may be mutated between solves.
pub fn dynpar(cell: &Rc<Cell<f64>>) -> Scalar {
    Parameter::dynamic(cell).into()
}

/// Square root of an expression. Legal only when the affine part is
/// constant and every higher-order slot is a square; this is the sole
/// route by which a second-order cone constraint can later be recognised.
pub fn sqrt(scalar: &Scalar) -> ConicResult<Scalar> {
    let all_squares = scalar
        .higher_order
        .iter()
        .all(|p| matches!(p, Product::Square(_)));

    if all_squares && scalar.affine.is_constant() {
        let mut result = scalar.clone();
        result.sqrt = true;
        Ok(result)
    } else {
        Err(ConicError::Config(
            "square root requires all higher-order terms to be squares and no linear terms"
                .into(),
        ))
    }
}

/// Euclidean norm of a vector or matrix of expressions: every cell must be
/// of order one or lower; the result is the norm form whose squares are the
/// cells' affine parts.
pub fn norm2(matrix: &DenseMatrix<Scalar>) -> ConicResult<Scalar> {
    let mut result = Scalar {
        sqrt: true,
        ..Scalar::default()
    };
    for cell in matrix.iter() {
        if cell.order() > 1 || cell.is_norm() {
            return Err(ConicError::Config(
                "norm arguments must be of order one or lower".into(),
            ));
        }
        result.higher_order.push(Product::Square(cell.affine.clone()));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::par_vector;

    fn variable(name: &str, index: usize) -> Variable {
        let name: Rc<str> = Rc::from(name);
        Variable::new(&name, 0, 0, index)
    }

    fn scalar_of(v: Variable) -> Scalar {
        v.into()
    }

    #[test]
    fn test_affine_addition_merges_like_terms() {
        let x = variable("x", 0);
        let a = Affine::from_variable(x.clone());
        let b = Affine::from_variable(x);

        let sum = a.add(&b);
        assert_eq!(sum.terms.len(), 1);
        assert_eq!(sum.terms[0].parameter.value().unwrap(), 2.0);
    }

    #[test]
    fn test_affine_addition_term_count_bound() {
        let x = variable("x", 0);
        let y = variable("y", 1);
        let a = Affine::from_variable(x.clone()).add(&Affine::from_variable(y));
        let b = Affine::from_variable(x);

        let sum = a.add(&b);
        assert!(sum.terms.len() <= a.terms.len() + b.terms.len());
        assert_eq!(sum.terms.len(), 2);
    }

    #[test]
    fn test_affine_evaluation_is_linear() {
        let x = variable("x", 0);
        let y = variable("y", 1);
        let a = Affine::from_variable(x).scale(&Parameter::constant(2.0));
        let mut b = Affine::from_variable(y);
        b.constant = Parameter::constant(3.0);

        let solution = [1.5, -2.0];
        let sum = a.add(&b);
        let expected = a.evaluate(&solution).unwrap() + b.evaluate(&solution).unwrap();
        assert!((sum.evaluate(&solution).unwrap() - expected).abs() < 1e-12);
        assert!((sum.evaluate(&solution).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_affine_subtraction_negates_rhs() {
        let x = variable("x", 0);
        let a = Affine::from_variable(x.clone()).scale(&Parameter::constant(3.0));
        let b = Affine::from_variable(x);

        let diff = a.sub(&b);
        let solution = [2.0];
        assert!((diff.evaluate(&solution).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_affine_times_affine_rejects_two_first_order() {
        let a = Affine::from_variable(variable("x", 0));
        let b = Affine::from_variable(variable("y", 1));
        assert!(matches!(a.mul(&b), Err(ConicError::Config(_))));
    }

    #[test]
    fn test_scalar_product_of_first_order_is_order_two() {
        let x = scalar_of(variable("x", 0));
        let y = scalar_of(variable("y", 1));

        let product = x.mul(&y).unwrap();
        assert_eq!(product.order(), 2);
        assert!(matches!(product.higher_order[0], Product::Pair(_, _)));
    }

    #[test]
    fn test_scalar_square_is_recorded_as_square() {
        let x = scalar_of(variable("x", 0));
        let square = x.mul(&x).unwrap();
        assert_eq!(square.order(), 2);
        assert!(matches!(square.higher_order[0], Product::Square(_)));

        let solution = [3.0];
        assert!((square.evaluate(&solution).unwrap() - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_scalar_multiplication_rejects_higher_order() {
        let x = scalar_of(variable("x", 0));
        let square = x.mul(&x).unwrap();
        assert!(matches!(square.mul(&x), Err(ConicError::Config(_))));
    }

    #[test]
    fn test_scalar_subtraction_rejects_higher_order_rhs() {
        let x = scalar_of(variable("x", 0));
        let square = x.mul(&x).unwrap();
        assert!(matches!(x.sub(&square), Err(ConicError::Config(_))));
        // The other direction is fine.
        assert!(square.sub(&x).is_ok());
    }

    #[test]
    fn test_sqrt_of_sum_of_squares_is_norm_form() {
        let x = scalar_of(variable("x", 0));
        let y = scalar_of(variable("y", 1));
        let cx = par(3.0).mul(&x).unwrap();
        let cy = par(4.0).mul(&y).unwrap();

        let quadratic = cx.mul(&cx).unwrap().add(&cy.mul(&cy).unwrap()).unwrap();
        let norm = sqrt(&quadratic).unwrap();
        assert!(norm.is_norm());
        assert_eq!(norm.order(), 2);

        let solution = [1.0, 1.0];
        assert!((norm.evaluate(&solution).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_sqrt_of_first_order_is_rejected() {
        let x = scalar_of(variable("x", 0));
        assert!(matches!(sqrt(&x), Err(ConicError::Config(_))));
    }

    #[test]
    fn test_sqrt_of_cross_product_is_rejected() {
        let x = scalar_of(variable("x", 0));
        let y = scalar_of(variable("y", 1));
        let cross = x.mul(&y).unwrap();
        assert!(matches!(sqrt(&cross), Err(ConicError::Config(_))));
    }

    #[test]
    fn test_norm_forms_cannot_be_added() {
        let x = scalar_of(variable("x", 0));
        let square = x.mul(&x).unwrap();
        let norm = sqrt(&square).unwrap();
        assert!(matches!(norm.add(&norm), Err(ConicError::Config(_))));
        assert!(matches!(norm.add(&x), Err(ConicError::Config(_))));
    }

    #[test]
    fn test_norm2_over_vector() {
        let v = par_vector(&[3.0, 4.0]);
        let norm = norm2(&v).unwrap();
        assert!(norm.is_norm());
        assert!((norm.evaluate(&[]).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_clean_merges_and_drops_zero_terms() {
        let x = variable("x", 0);
        let mut affine = Affine::from_variable(x.clone());
        affine.add_assign(&Affine::from_variable(x.clone()).neg());
        // Force an unmerged duplicate as the canonicalizer might see it.
        affine.terms.push(Term {
            parameter: Parameter::constant(0.0),
            variable: variable("y", 1),
        });

        let removed = affine.clean().unwrap();
        assert_eq!(removed, 2);
        assert!(affine.terms.is_empty());

        // Cleaning again is a fixed point.
        assert_eq!(affine.clean().unwrap(), 0);
    }

    #[test]
    fn test_order_of_constant_and_first_order() {
        assert_eq!(par(3.0).order(), 0);
        assert_eq!(par(0.0).order(), 0);
        assert_eq!(scalar_of(variable("x", 0)).order(), 1);
    }

    #[test]
    fn test_display_rendering() {
        let x = scalar_of(variable("x", 0));
        let two_x = par(2.0).mul(&x).unwrap();
        assert_eq!(two_x.to_string(), "2 * x[0,0]@0");

        let with_constant = two_x.add(&par(5.0)).unwrap();
        assert_eq!(with_constant.to_string(), "2 * x[0,0]@0 + (5)");
    }
}
