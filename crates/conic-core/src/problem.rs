//! The second-order cone program container.
//!
//! [`Socp`] owns the variable registry, the three constraint lists, the
//! cost function and the realized solution vector. It is the single entry
//! point for building a problem; canonicalization and solving operate on a
//! `&mut Socp` so that the solution can be written back and read through
//! the registry afterwards.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::constraint::{
    Constraint, EqualityConstraint, PositiveConstraint, SecondOrderConeConstraint,
};
use crate::error::{ConicError, ConicResult};
use crate::expr::Scalar;
use crate::matrix::{DenseMatrix, ExprMatrix};
use crate::variable::Variable;

/// A second-order cone program under construction, and its solution after
/// a solve.
#[derive(Default)]
pub struct Socp {
    variables: HashMap<String, DenseMatrix<Variable>>,
    n_variables: usize,
    pub(crate) equality_constraints: Vec<EqualityConstraint>,
    pub(crate) positive_constraints: Vec<PositiveConstraint>,
    pub(crate) cone_constraints: Vec<SecondOrderConeConstraint>,
    pub(crate) cost: Scalar,
    solution: Vec<f64>,
}

impl Socp {
    pub fn new() -> Socp {
        Socp::default()
    }

    /// Create a named matrix of decision variables and return it as a
    /// matrix of expressions ready for algebra. Indices into the solution
    /// vector are assigned densely in creation order, row-major within the
    /// matrix. Registering the same name twice is an error.
    pub fn variable(&mut self, name: &str, rows: usize, cols: usize) -> ConicResult<ExprMatrix> {
        if self.variables.contains_key(name) {
            return Err(ConicError::Config(format!(
                "a variable named '{}' already exists",
                name
            )));
        }
        let shared_name: Rc<str> = Rc::from(name);
        let next_index = self.n_variables;
        let matrix = DenseMatrix::from_fn(rows, cols, |row, col| {
            Variable::new(&shared_name, row, col, next_index + row * cols + col)
        });
        self.n_variables += rows * cols;
        self.solution.resize(self.n_variables, 0.0);
        self.variables.insert(name.to_string(), matrix.clone());
        Ok(matrix.map(|v| Scalar::from(v.clone())))
    }

    /// Scalar convenience form of [`Socp::variable`].
    pub fn scalar_variable(&mut self, name: &str) -> ConicResult<Scalar> {
        Ok(self.variable(name, 1, 1)?.get(0, 0).clone())
    }

    /// Look up a previously created variable matrix.
    pub fn get_variable(&self, name: &str) -> ConicResult<ExprMatrix> {
        self.variables
            .get(name)
            .map(|matrix| matrix.map(|v| Scalar::from(v.clone())))
            .ok_or_else(|| ConicError::Config(format!("no variable named '{}'", name)))
    }

    /// Route each constraint into its variant list. Constraint order is
    /// preserved per kind; it determines the row order of the canonical
    /// matrices.
    pub fn add_constraint(&mut self, constraints: Vec<Constraint>) {
        for constraint in constraints {
            match constraint {
                Constraint::Equality(c) => self.equality_constraints.push(c),
                Constraint::Positive(c) => self.positive_constraints.push(c),
                Constraint::SecondOrderCone(c) => self.cone_constraints.push(c),
            }
        }
    }

    /// Accumulate a term into the cost function. Norm forms are rejected
    /// here; a quadratic cost survives accumulation but is rejected at
    /// canonicalization time.
    pub fn add_minimization_term(&mut self, term: Scalar) -> ConicResult<()> {
        self.cost = self.cost.add(&term)?;
        Ok(())
    }

    pub fn num_variables(&self) -> usize {
        self.n_variables
    }

    pub fn num_equality_constraints(&self) -> usize {
        self.equality_constraints.len()
    }

    pub fn num_positive_constraints(&self) -> usize {
        self.positive_constraints.len()
    }

    pub fn num_cone_constraints(&self) -> usize {
        self.cone_constraints.len()
    }

    /// The primal solution vector; zeros before the first solve.
    pub fn solution(&self) -> &[f64] {
        &self.solution
    }

    /// Write the primal solution back. Intended for solver adaptors.
    pub fn set_solution(&mut self, values: &[f64]) {
        self.solution.clear();
        self.solution.extend_from_slice(values);
        self.solution.resize(self.n_variables, 0.0);
    }

    /// Read the solved values of a named variable matrix.
    pub fn read(&self, name: &str) -> ConicResult<DenseMatrix<f64>> {
        let matrix = self
            .variables
            .get(name)
            .ok_or_else(|| ConicError::Config(format!("no variable named '{}'", name)))?;
        Ok(matrix.map(|v| self.solution[v.index()]))
    }

    /// Evaluate any expression at the current solution. Covers reading a
    /// single variable as well as derived quantities like the cost.
    pub fn read_value(&self, expression: &Scalar) -> ConicResult<f64> {
        expression.evaluate(&self.solution)
    }

    /// Check the stored solution against every constraint, logging each
    /// violated one. Tolerance is deliberately loose; interior-point
    /// solutions sit slightly off the constraint surface.
    pub fn is_feasible(&self) -> bool {
        const TOLERANCE: f64 = 0.01;

        let mut feasible = true;
        let mut check = |violation: ConicResult<f64>, text: String| match violation {
            Ok(value) if value > TOLERANCE => {
                warn!(violation = value, constraint = %text, "constraint violated");
                feasible = false;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, constraint = %text, "constraint evaluation failed");
                feasible = false;
            }
        };

        for constraint in &self.equality_constraints {
            check(constraint.violation(&self.solution), constraint.to_string());
        }
        for constraint in &self.positive_constraints {
            check(constraint.violation(&self.solution), constraint.to_string());
        }
        for constraint in &self.cone_constraints {
            check(constraint.violation(&self.solution), constraint.to_string());
        }
        feasible
    }

    /// Structural normalization: merge duplicate terms and drop
    /// zero-parameter terms inside every affine, then drop constraints
    /// whose affine parts are all constant. Idempotent; invoked by the
    /// canonicalizer before sizing the output.
    ///
    /// Term removal evaluates parameters, so an externally bound cell that
    /// holds exactly 0.0 here is dropped structurally; initialize such
    /// cells to a nonzero value to keep their slot across re-solves.
    pub(crate) fn clean(&mut self) -> ConicResult<()> {
        let mut removed_terms = self.cost.affine.clean()?;

        for constraint in &mut self.equality_constraints {
            removed_terms += constraint.affine.clean()?;
        }
        for constraint in &mut self.positive_constraints {
            removed_terms += constraint.affine.clean()?;
        }
        for constraint in &mut self.cone_constraints {
            removed_terms += constraint.affine.clean()?;
            for argument in &mut constraint.norm {
                removed_terms += argument.clean()?;
            }
        }

        let before = self.equality_constraints.len()
            + self.positive_constraints.len()
            + self.cone_constraints.len();

        // A fully constant constraint cannot be violated by any variable
        // setting; keeping it would waste rows.
        self.equality_constraints
            .retain(|c| !c.affine.is_constant());
        self.positive_constraints
            .retain(|c| !c.affine.is_constant());
        self.cone_constraints.retain(|c| {
            !(c.affine.is_constant() && c.norm.iter().all(|argument| argument.is_constant()))
        });

        let removed_constraints = before
            - self.equality_constraints.len()
            - self.positive_constraints.len()
            - self.cone_constraints.len();

        debug!(removed_terms, removed_constraints, "cleaned problem");
        Ok(())
    }
}

impl fmt::Display for Socp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Second-order cone program with {} variables.",
            self.n_variables
        )?;
        writeln!(
            f,
            "Number of equality constraints:          {}",
            self.equality_constraints.len()
        )?;
        writeln!(
            f,
            "Number of positive constraints:          {}",
            self.positive_constraints.len()
        )?;
        writeln!(
            f,
            "Number of second-order cone constraints: {}",
            self.cone_constraints.len()
        )?;
        writeln!(f)?;

        writeln!(f, "Minimize:")?;
        writeln!(f, "{}", self.cost)?;

        if !self.equality_constraints.is_empty() {
            writeln!(f, "\nSubject to equality constraints:")?;
            for constraint in &self.equality_constraints {
                writeln!(f, "{}", constraint)?;
            }
        }
        if !self.positive_constraints.is_empty() {
            writeln!(f, "\nSubject to linear inequalities:")?;
            for constraint in &self.positive_constraints {
                writeln!(f, "{}", constraint)?;
            }
        }
        if !self.cone_constraints.is_empty() {
            writeln!(f, "\nSubject to cone constraints:")?;
            for constraint in &self.cone_constraints {
                writeln!(f, "{}", constraint)?;
            }
        }
        Ok(())
    }
}
