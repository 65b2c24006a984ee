//! Deferred-evaluation numeric values.
//!
//! A [`Parameter`] is a node in a small arithmetic DAG. Leaves are either
//! immediate constants or external bindings to a caller-owned cell; interior
//! nodes apply one of `+ - * / sqrt` to other parameters. No arithmetic
//! happens at construction time; [`Parameter::value`] resolves the graph on
//! demand, which is what lets a caller mutate an externally bound cell
//! between solves and have every expression referencing it pick up the new
//! value.
//!
//! Operation nodes are reference-counted so that a single external binding
//! may appear in many expressions while retaining one live location. Cycles
//! are impossible: a node can only be built from already-existing nodes.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{ConicError, ConicResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opcode {
    Add,
    Sub,
    Mul,
    Div,
    Sqrt,
}

#[derive(Debug)]
struct Operation {
    op: Opcode,
    lhs: Parameter,
    rhs: Option<Parameter>,
}

impl Operation {
    fn evaluate(&self) -> ConicResult<f64> {
        let lhs = self.lhs.value()?;
        let result = match self.op {
            Opcode::Add => lhs + self.rhs_value()?,
            Opcode::Sub => lhs - self.rhs_value()?,
            Opcode::Mul => lhs * self.rhs_value()?,
            Opcode::Div => {
                let rhs = self.rhs_value()?;
                if rhs == 0.0 {
                    return Err(ConicError::Numeric(
                        "division by zero in parameter graph".into(),
                    ));
                }
                lhs / rhs
            }
            Opcode::Sqrt => {
                if lhs < 0.0 {
                    return Err(ConicError::Numeric(format!(
                        "square root of negative value ({}) in parameter graph",
                        lhs
                    )));
                }
                lhs.sqrt()
            }
        };
        if result.is_finite() {
            Ok(result)
        } else {
            Err(ConicError::Numeric(format!(
                "non-finite result ({}) in parameter graph",
                result
            )))
        }
    }

    fn rhs_value(&self) -> ConicResult<f64> {
        // Binary nodes always carry a second operand.
        self.rhs
            .as_ref()
            .map(|p| p.value())
            .unwrap_or(Ok(f64::NAN))
    }
}

#[derive(Debug, Clone)]
enum Source {
    Constant(f64),
    Dynamic(Rc<Cell<f64>>),
    Operation(Rc<Operation>),
}

/// A deferred numeric value: constant, external binding, or arithmetic node.
#[derive(Debug, Clone)]
pub struct Parameter {
    source: Source,
}

impl Parameter {
    /// An immediate constant.
    pub fn constant(value: f64) -> Parameter {
        Parameter {
            source: Source::Constant(value),
        }
    }

    /// An external binding. The cell stays owned by the caller and may be
    /// mutated between solves; every read goes through the live cell.
    pub fn dynamic(cell: &Rc<Cell<f64>>) -> Parameter {
        Parameter {
            source: Source::Dynamic(Rc::clone(cell)),
        }
    }

    fn unary(op: Opcode, lhs: Parameter) -> Parameter {
        Parameter {
            source: Source::Operation(Rc::new(Operation { op, lhs, rhs: None })),
        }
    }

    fn binary(op: Opcode, lhs: Parameter, rhs: Parameter) -> Parameter {
        Parameter {
            source: Source::Operation(Rc::new(Operation {
                op,
                lhs,
                rhs: Some(rhs),
            })),
        }
    }

    /// Resolve the graph to a number. Division by zero, square roots of
    /// negative operands and non-finite intermediate results surface here
    /// as [`ConicError::Numeric`].
    pub fn value(&self) -> ConicResult<f64> {
        match &self.source {
            Source::Constant(value) => Ok(*value),
            Source::Dynamic(cell) => Ok(cell.get()),
            Source::Operation(node) => node.evaluate(),
        }
    }

    /// Square root node. The operand must evaluate non-negative; that is
    /// checked at [`Parameter::value`] time, not here.
    pub fn sqrt(self) -> Parameter {
        Parameter::unary(Opcode::Sqrt, self)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.source, Source::Constant(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.source, Source::Dynamic(_))
    }

    pub fn is_operation(&self) -> bool {
        matches!(self.source, Source::Operation(_))
    }

    /// Conservative zero test: true only for the immediate constant 0.
    /// Used solely to short-circuit algebraic simplifications, never as
    /// semantic equality.
    pub fn is_zero(&self) -> bool {
        matches!(self.source, Source::Constant(value) if value == 0.0)
    }

    /// Conservative one test: true only for the immediate constant 1.
    pub fn is_one(&self) -> bool {
        matches!(self.source, Source::Constant(value) if value == 1.0)
    }
}

impl Default for Parameter {
    fn default() -> Self {
        Parameter::constant(0.0)
    }
}

impl From<f64> for Parameter {
    fn from(value: f64) -> Self {
        Parameter::constant(value)
    }
}

/// Structural equality: constants compare by value, bindings and operation
/// nodes by identity. Two separately built graphs never compare equal even
/// if they would evaluate identically.
impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        match (&self.source, &other.source) {
            (Source::Constant(a), Source::Constant(b)) => a == b,
            (Source::Dynamic(a), Source::Dynamic(b)) => Rc::ptr_eq(a, b),
            (Source::Operation(a), Source::Operation(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::ops::Add for Parameter {
    type Output = Parameter;

    fn add(self, other: Parameter) -> Parameter {
        Parameter::binary(Opcode::Add, self, other)
    }
}

impl std::ops::Sub for Parameter {
    type Output = Parameter;

    fn sub(self, other: Parameter) -> Parameter {
        Parameter::binary(Opcode::Sub, self, other)
    }
}

impl std::ops::Mul for Parameter {
    type Output = Parameter;

    fn mul(self, other: Parameter) -> Parameter {
        Parameter::binary(Opcode::Mul, self, other)
    }
}

impl std::ops::Div for Parameter {
    type Output = Parameter;

    fn div(self, other: Parameter) -> Parameter {
        Parameter::binary(Opcode::Div, self, other)
    }
}

impl std::ops::Neg for Parameter {
    type Output = Parameter;

    fn neg(self) -> Parameter {
        Parameter::binary(Opcode::Mul, Parameter::constant(-1.0), self)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Ok(value) => write!(f, "({})", value),
            Err(_) => write!(f, "(undefined)"),
        }
    }
}
