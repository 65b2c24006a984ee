//! Solver adaptor interface.
//!
//! A backend presents the canonical data to an external cone solver,
//! invokes the solve, classifies the exit status and writes the primal
//! values back into the problem. The interface is two-phase by design:
//! `initialize` fixes the sparse structure once, `solve` may be called many
//! times with updated parameter values.

use crate::error::ConicResult;
use crate::problem::Socp;

/// Classified solver verdict. Non-fatal verdicts (optimal and infeasibility
/// certificates, exact or within reduced tolerances) are reported here and
/// never raised as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverStatus {
    #[default]
    Unsolved,
    Optimal,
    OptimalInaccurate,
    PrimalInfeasible,
    PrimalInfeasibleInaccurate,
    DualInfeasible,
    DualInfeasibleInaccurate,
    IterationLimit,
    NumericalProblems,
    OutsideCone,
    Interrupted,
    Fatal,
}

impl SolverStatus {
    /// Human-readable verdict, one text per status.
    pub fn message(&self) -> &'static str {
        match self {
            SolverStatus::Unsolved => "Problem not solved yet.",
            SolverStatus::Optimal => "Optimal solution found.",
            SolverStatus::OptimalInaccurate => {
                "Optimal solution found subject to reduced tolerances."
            }
            SolverStatus::PrimalInfeasible => "Certificate of primal infeasibility found.",
            SolverStatus::PrimalInfeasibleInaccurate => {
                "Certificate of primal infeasibility found subject to reduced tolerances."
            }
            SolverStatus::DualInfeasible => "Certificate of dual infeasibility found.",
            SolverStatus::DualInfeasibleInaccurate => {
                "Certificate of dual infeasibility found subject to reduced tolerances."
            }
            SolverStatus::IterationLimit => "Maximum number of iterations reached.",
            SolverStatus::NumericalProblems => {
                "Numerical problems (unreliable search direction)."
            }
            SolverStatus::OutsideCone => {
                "Numerical problems (slacks or multipliers outside cone)."
            }
            SolverStatus::Interrupted => "Interrupted by signal.",
            SolverStatus::Fatal => "Unknown problem in solver.",
        }
    }

    /// Fatal and interrupt verdicts make `solve` return `false`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SolverStatus::Interrupted | SolverStatus::Fatal)
    }
}

/// A cone solver backend.
///
/// `initialize` is called once after the problem is fully built; it
/// canonicalizes and hands the sparse structure to the backend. Each
/// `solve` re-evaluates the parameter buffers, runs the solver, copies the
/// primal solution into the problem and returns `false` only for fatal or
/// interrupt statuses. Callers may mutate externally bound parameters and
/// re-solve without re-initializing; the structure is reused.
pub trait ConeSolver {
    fn initialize(&mut self, problem: &mut Socp) -> ConicResult<()>;

    fn solve(&mut self, problem: &mut Socp, verbose: bool) -> ConicResult<bool>;

    fn last_status(&self) -> SolverStatus;

    fn result_string(&self) -> &'static str {
        self.last_status().message()
    }
}
