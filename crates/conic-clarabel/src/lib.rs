//! # conic-clarabel: Clarabel backend for the conic modeling layer
//!
//! Implements [`ConeSolver`] on top of
//! [Clarabel](https://github.com/oxfordcontrol/Clarabel.rs), a pure-Rust
//! interior-point solver for conic programs.
//!
//! Clarabel solves
//!
//! ```text
//! minimize    (1/2) x'Px + q'x
//! subject to  Ax + s = b,  s in K
//! ```
//!
//! The canonical form maps onto this directly: the equality block and the
//! conic block stack into one constraint matrix `[A; G]` with right-hand
//! side `[b; h]` and cone list `[Zero(E), Nonnegative(P), SecondOrder(d_1)
//! ...]`, and the quadratic term P is zero because cost functions are
//! linear. Because the canonical matrices carry the user's coefficients,
//! their values are materialized with a factor of -1; `s = b - Ax` then
//! reproduces the user's affine expressions inside the cone.
//!
//! # Two-phase updates
//!
//! `initialize` canonicalizes once and fixes the stacked CSC structure.
//! Every `solve` re-evaluates the symbolic
//! parameter buffers into the numeric arrays and builds a fresh solver
//! workspace around the unchanged structure, so externally bound parameters
//! may change between solves without any re-canonicalization. The workspace
//! is dropped on every exit path.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus as ClarabelStatus,
    SupportedConeT,
};
use tracing::{debug, info};

use conic_core::{
    evaluate_parameters, CanonicalForm, ConeSolver, ConicError, ConicResult, Socp, SolverStatus,
};

/// The fixed sparsity pattern of the stacked `[A; G]` matrix. Built once at
/// initialization and shared by every subsequent solve.
#[derive(Debug, Clone)]
struct StackedStructure {
    n_rows: usize,
    col_ptr: Vec<usize>,
    row_indices: Vec<usize>,
}

impl StackedStructure {
    /// Stack the equality block on top of the conic block, column by
    /// column. Within a column the equality rows (all `< E`) precede the
    /// shifted conic rows, so the CSC row ordering stays ascending.
    fn build(canonical: &CanonicalForm) -> StackedStructure {
        let equality = &canonical.equality_matrix;
        let cone = &canonical.cone_matrix;
        let nnz = equality.nnz() + cone.nnz();

        let mut col_ptr = Vec::with_capacity(canonical.n_variables + 1);
        let mut row_indices = Vec::with_capacity(nnz);
        col_ptr.push(0);
        for col in 0..canonical.n_variables {
            for k in equality.col_ptr[col]..equality.col_ptr[col + 1] {
                row_indices.push(equality.row_indices[k]);
            }
            for k in cone.col_ptr[col]..cone.col_ptr[col + 1] {
                row_indices.push(cone.row_indices[k] + canonical.n_equalities);
            }
            col_ptr.push(row_indices.len());
        }

        StackedStructure {
            n_rows: canonical.n_equalities + canonical.n_cone_rows,
            col_ptr,
            row_indices,
        }
    }
}

/// Clarabel-backed implementation of [`ConeSolver`].
#[derive(Default)]
pub struct ClarabelSolver {
    canonical: Option<CanonicalForm>,
    structure: Option<StackedStructure>,
    status: SolverStatus,
    // Numeric scratch, reused across solves.
    objective_values: Vec<f64>,
    equality_values: Vec<f64>,
    cone_values: Vec<f64>,
    rhs_values: Vec<f64>,
}

impl ClarabelSolver {
    pub fn new() -> ClarabelSolver {
        ClarabelSolver::default()
    }

    /// The canonical problem data, available after `initialize`.
    pub fn canonical(&self) -> Option<&CanonicalForm> {
        self.canonical.as_ref()
    }

    fn cones(canonical: &CanonicalForm) -> Vec<SupportedConeT<f64>> {
        let mut cones = Vec::with_capacity(2 + canonical.cone_dims.len());
        if canonical.n_equalities > 0 {
            cones.push(SupportedConeT::ZeroConeT(canonical.n_equalities));
        }
        if canonical.n_positive > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(canonical.n_positive));
        }
        for &dim in &canonical.cone_dims {
            cones.push(SupportedConeT::SecondOrderConeT(dim));
        }
        cones
    }
}

fn classify(status: ClarabelStatus) -> SolverStatus {
    match status {
        ClarabelStatus::Unsolved => SolverStatus::Unsolved,
        ClarabelStatus::Solved => SolverStatus::Optimal,
        ClarabelStatus::AlmostSolved => SolverStatus::OptimalInaccurate,
        ClarabelStatus::PrimalInfeasible => SolverStatus::PrimalInfeasible,
        ClarabelStatus::AlmostPrimalInfeasible => SolverStatus::PrimalInfeasibleInaccurate,
        ClarabelStatus::DualInfeasible => SolverStatus::DualInfeasible,
        ClarabelStatus::AlmostDualInfeasible => SolverStatus::DualInfeasibleInaccurate,
        ClarabelStatus::MaxIterations | ClarabelStatus::MaxTime => SolverStatus::IterationLimit,
        ClarabelStatus::NumericalError | ClarabelStatus::InsufficientProgress => {
            SolverStatus::NumericalProblems
        }
        _ => SolverStatus::Fatal,
    }
}

impl ConeSolver for ClarabelSolver {
    fn initialize(&mut self, problem: &mut Socp) -> ConicResult<()> {
        let canonical = CanonicalForm::build(problem)?;
        debug!(
            n_variables = canonical.n_variables,
            n_equalities = canonical.n_equalities,
            n_cone_rows = canonical.n_cone_rows,
            "initialized Clarabel backend"
        );
        self.structure = Some(StackedStructure::build(&canonical));
        self.canonical = Some(canonical);
        self.status = SolverStatus::Unsolved;
        Ok(())
    }

    fn solve(&mut self, problem: &mut Socp, verbose: bool) -> ConicResult<bool> {
        let ClarabelSolver {
            canonical,
            structure,
            status,
            objective_values,
            equality_values,
            cone_values,
            rhs_values,
        } = self;
        let canonical = canonical.as_ref().ok_or_else(|| {
            ConicError::Config("solve called before initialize".into())
        })?;
        let structure = structure.as_ref().ok_or_else(|| {
            ConicError::Config("solve called before initialize".into())
        })?;

        // Re-evaluate the symbolic buffers. The matrices materialize with
        // flipped sign, matching the `b - Ax` / `h - Gx` convention.
        evaluate_parameters(&canonical.objective, 1.0, objective_values)?;
        evaluate_parameters(&canonical.equality_matrix.values, -1.0, equality_values)?;
        evaluate_parameters(&canonical.cone_matrix.values, -1.0, cone_values)?;

        rhs_values.clear();
        rhs_values.reserve(canonical.n_equalities + canonical.n_cone_rows);
        for parameter in canonical
            .equality_rhs
            .iter()
            .chain(canonical.cone_rhs.iter())
        {
            rhs_values.push(parameter.value()?);
        }

        // Interleave the per-column value runs of A and G to match the
        // stacked row indices.
        let mut matrix_values = Vec::with_capacity(structure.row_indices.len());
        let equality = &canonical.equality_matrix;
        let cone = &canonical.cone_matrix;
        for col in 0..canonical.n_variables {
            matrix_values.extend_from_slice(
                &equality_values[equality.col_ptr[col]..equality.col_ptr[col + 1]],
            );
            matrix_values
                .extend_from_slice(&cone_values[cone.col_ptr[col]..cone.col_ptr[col + 1]]);
        }

        let n_variables = canonical.n_variables;
        let constraint_matrix = CscMatrix::new(
            structure.n_rows,
            n_variables,
            structure.col_ptr.clone(),
            structure.row_indices.clone(),
            matrix_values,
        );
        // Cost functions are linear; the quadratic term stays empty.
        let quadratic = CscMatrix::new(
            n_variables,
            n_variables,
            vec![0; n_variables + 1],
            Vec::new(),
            Vec::new(),
        );
        let cones = Self::cones(canonical);

        let settings = DefaultSettingsBuilder::default()
            .verbose(verbose)
            .build()
            .map_err(|e| ConicError::Solver(format!("invalid solver settings: {:?}", e)))?;

        let mut solver = DefaultSolver::new(
            &quadratic,
            objective_values,
            &constraint_matrix,
            rhs_values,
            &cones,
            settings,
        )
        .map_err(|e| ConicError::Solver(format!("solver setup failed: {:?}", e)))?;

        solver.solve();

        *status = classify(solver.solution.status);
        problem.set_solution(&solver.solution.x);

        info!(
            status = ?status,
            iterations = solver.solution.iterations,
            "solve finished"
        );

        Ok(!status.is_fatal())
    }

    fn last_status(&self) -> SolverStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conic_core::{greater_equal, par, ExprMatrix};

    #[test]
    fn test_classification_covers_the_taxonomy() {
        assert_eq!(classify(ClarabelStatus::Solved), SolverStatus::Optimal);
        assert_eq!(
            classify(ClarabelStatus::AlmostSolved),
            SolverStatus::OptimalInaccurate
        );
        assert_eq!(
            classify(ClarabelStatus::PrimalInfeasible),
            SolverStatus::PrimalInfeasible
        );
        assert_eq!(
            classify(ClarabelStatus::AlmostDualInfeasible),
            SolverStatus::DualInfeasibleInaccurate
        );
        assert_eq!(
            classify(ClarabelStatus::MaxIterations),
            SolverStatus::IterationLimit
        );
        assert_eq!(
            classify(ClarabelStatus::NumericalError),
            SolverStatus::NumericalProblems
        );
    }

    #[test]
    fn test_solve_before_initialize_is_an_error() {
        let mut socp = Socp::new();
        let mut solver = ClarabelSolver::new();
        assert!(matches!(
            solver.solve(&mut socp, false),
            Err(ConicError::Config(_))
        ));
    }

    #[test]
    fn test_stacked_structure_interleaves_columns() {
        let mut socp = Socp::new();
        let x = socp.variable("x", 2, 1).unwrap();
        let sum = ExprMatrix::scalar(x.sum().unwrap());
        socp.add_constraint(conic_core::equal(&sum, &ExprMatrix::scalar(par(1.0))).unwrap());
        socp.add_constraint(greater_equal(&x, &ExprMatrix::scalar(par(0.0))).unwrap());

        let canonical = CanonicalForm::build(&mut socp).unwrap();
        let structure = StackedStructure::build(&canonical);

        // One equality row on top, two positive rows shifted below it.
        assert_eq!(structure.n_rows, 3);
        assert_eq!(structure.col_ptr, vec![0, 2, 4]);
        assert_eq!(structure.row_indices, vec![0, 1, 0, 2]);
    }

    #[test]
    fn test_initial_status_is_unsolved() {
        let solver = ClarabelSolver::new();
        assert_eq!(solver.last_status(), SolverStatus::Unsolved);
        assert_eq!(solver.result_string(), "Problem not solved yet.");
    }
}
