//! Canonicalization into the sparse standard form.
//!
//! A cleaned problem is lowered into the data shape a primal-dual
//! interior-point cone solver consumes: an objective vector `c`, an
//! equality block `(A, b)` and a conic block `(G, h)` whose rows are the
//! positive-orthant constraints followed by each cone's affine row and norm
//! rows. The matrices are built through a dictionary-of-keys intermediate
//! and emitted in column-compressed storage.
//!
//! Construction is symbolic: the buffers hold [`Parameter`] handles, not
//! numbers. Re-evaluating them before each solve is cheap and leaves the
//! structure (row indices, column pointers) untouched, which is what lets a
//! caller mutate externally bound parameters and re-solve without
//! rebuilding anything.
//!
//! The scratch for the DOK -> coordinate-list -> CCS pipeline lives in a
//! bump arena that is discarded when construction returns.

use bumpalo::Bump;
use tracing::debug;

use crate::error::{ConicError, ConicResult};
use crate::expr::Affine;
use crate::param::Parameter;
use crate::problem::Socp;

/// A sparse matrix in column-compressed storage with symbolic values.
///
/// `col_ptr` has length `n_columns + 1`; `col_ptr[j + 1] - col_ptr[j]` is
/// the number of non-zeroes in column `j` and `row_indices` holds their row
/// indices in ascending order within each column.
#[derive(Debug, Clone)]
pub struct SparseCcs {
    pub values: Vec<Parameter>,
    pub row_indices: Vec<usize>,
    pub col_ptr: Vec<usize>,
}

impl SparseCcs {
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

/// The canonical problem data handed to a cone solver.
///
/// Sign convention: the symbolic values of `equality_matrix` and
/// `cone_matrix` carry the user's coefficients; materialize them with
/// factor -1 (the solver convention is `b - Ax = 0`, `h - Gx` in the cone).
/// `objective`, `equality_rhs` and `cone_rhs` materialize with factor +1.
#[derive(Debug)]
pub struct CanonicalForm {
    pub n_variables: usize,
    pub n_equalities: usize,
    pub n_positive: usize,
    /// Total conic rows: positives plus the dimension of every cone.
    pub n_cone_rows: usize,
    /// Dimension (1 + norm arguments) of each cone, in add order.
    pub cone_dims: Vec<usize>,
    /// `c`, length `n_variables`.
    pub objective: Vec<Parameter>,
    /// `b`, length `n_equalities`.
    pub equality_rhs: Vec<Parameter>,
    /// `h`, length `n_cone_rows`.
    pub cone_rhs: Vec<Parameter>,
    /// `A`, `n_equalities x n_variables`.
    pub equality_matrix: SparseCcs,
    /// `G`, `n_cone_rows x n_variables`.
    pub cone_matrix: SparseCcs,
}

impl CanonicalForm {
    /// Clean, validate and lower a problem. The problem keeps its symbolic
    /// form; the returned structure shares its parameter graph.
    pub fn build(socp: &mut Socp) -> ConicResult<CanonicalForm> {
        socp.clean()?;

        // The clean pass uniques terms per variable; re-assert it here as a
        // contract with the sparse construction below, which would silently
        // overwrite duplicate cells.
        for constraint in &socp.equality_constraints {
            check_unique_variables(&constraint.affine)?;
        }
        for constraint in &socp.positive_constraints {
            check_unique_variables(&constraint.affine)?;
        }
        for constraint in &socp.cone_constraints {
            check_unique_variables(&constraint.affine)?;
            for argument in &constraint.norm {
                check_unique_variables(argument)?;
            }
        }
        check_unique_variables(&socp.cost.affine)?;

        if socp.cost.order() > 1 {
            return Err(ConicError::Config(
                "cost functions must be linear".into(),
            ));
        }

        let n_variables = socp.num_variables();
        let n_equalities = socp.equality_constraints.len();
        let n_positive = socp.positive_constraints.len();

        let mut cone_dims = Vec::with_capacity(socp.cone_constraints.len());
        let mut n_cone_rows = n_positive;
        for cone in &socp.cone_constraints {
            let dim = 1 + cone.norm.len();
            cone_dims.push(dim);
            n_cone_rows += dim;
        }

        // Scratch for both sparse builds; freed in one piece on return.
        let bump = Bump::new();

        // Equality block: row i holds equality i's coefficients, b[i] its
        // constant.
        let mut equality_rhs = Vec::with_capacity(n_equalities);
        let equality_matrix = {
            let mut builder = DokBuilder::new(&bump);
            for (row, constraint) in socp.equality_constraints.iter().enumerate() {
                builder.insert_affine(&constraint.affine, row);
                equality_rhs.push(constraint.affine.constant.clone());
            }
            builder.into_ccs(n_variables)
        };

        // Conic block: all positives first, then per cone the affine row
        // followed by its norm rows in argument order.
        let mut cone_rhs = Vec::with_capacity(n_cone_rows);
        let cone_matrix = {
            let mut builder = DokBuilder::new(&bump);
            let mut row = 0;
            for constraint in &socp.positive_constraints {
                builder.insert_affine(&constraint.affine, row);
                cone_rhs.push(constraint.affine.constant.clone());
                row += 1;
            }
            for constraint in &socp.cone_constraints {
                builder.insert_affine(&constraint.affine, row);
                cone_rhs.push(constraint.affine.constant.clone());
                row += 1;
                for argument in &constraint.norm {
                    builder.insert_affine(argument, row);
                    cone_rhs.push(argument.constant.clone());
                    row += 1;
                }
            }
            debug_assert_eq!(row, n_cone_rows);
            builder.into_ccs(n_variables)
        };

        let mut objective = vec![Parameter::constant(0.0); n_variables];
        for term in &socp.cost.affine.terms {
            objective[term.variable.index()] = term.parameter.clone();
        }

        debug!(
            n_variables,
            n_equalities,
            n_positive,
            n_cones = cone_dims.len(),
            n_cone_rows,
            nnz_equality = equality_matrix.nnz(),
            nnz_cone = cone_matrix.nnz(),
            "canonicalized problem"
        );

        Ok(CanonicalForm {
            n_variables,
            n_equalities,
            n_positive,
            n_cone_rows,
            cone_dims,
            objective,
            equality_rhs,
            cone_rhs,
            equality_matrix,
            cone_matrix,
        })
    }
}

/// Evaluate a symbolic buffer into `out`, scaled by `factor`. The adaptor
/// calls this with factor -1 for matrix data and +1 for `c`, `h`, `b`.
pub fn evaluate_parameters(
    parameters: &[Parameter],
    factor: f64,
    out: &mut Vec<f64>,
) -> ConicResult<()> {
    out.clear();
    out.reserve(parameters.len());
    for parameter in parameters {
        out.push(parameter.value()? * factor);
    }
    Ok(())
}

fn check_unique_variables(affine: &Affine) -> ConicResult<()> {
    for (i, term) in affine.terms.iter().enumerate() {
        if affine.terms[i + 1..]
            .iter()
            .any(|other| other.variable == term.variable)
        {
            return Err(ConicError::Config(format!(
                "duplicate variable in expression: {}",
                affine
            )));
        }
    }
    Ok(())
}

/// Dictionary-of-keys accumulator over a bump arena. Only plain index data
/// lives in the arena; the parameter handles stay in a side pool so no
/// drop-sensitive value is bump-allocated.
struct DokBuilder<'bump> {
    entries: hashbrown::HashMap<(usize, usize), usize, hashbrown::DefaultHashBuilder, &'bump Bump>,
    pool: Vec<Parameter>,
    bump: &'bump Bump,
}

impl<'bump> DokBuilder<'bump> {
    fn new(bump: &'bump Bump) -> Self {
        DokBuilder {
            entries: hashbrown::HashMap::new_in(bump),
            pool: Vec::new(),
            bump,
        }
    }

    /// Insert the linear coefficients of an affine at the given row.
    /// Duplicate (row, col) cells overwrite; they cannot occur after the
    /// clean pass.
    fn insert_affine(&mut self, affine: &Affine, row: usize) {
        for term in &affine.terms {
            let slot = self.pool.len();
            let index = *self
                .entries
                .entry((row, term.variable.index()))
                .or_insert(slot);
            if index == slot {
                self.pool.push(term.parameter.clone());
            } else {
                self.pool[index] = term.parameter.clone();
            }
        }
    }

    /// Sort into coordinate order (column-major, row ascending) and emit
    /// column-compressed storage.
    fn into_ccs(self, n_columns: usize) -> SparseCcs {
        let mut coo = bumpalo::collections::Vec::with_capacity_in(self.entries.len(), self.bump);
        for (&(row, col), &index) in &self.entries {
            coo.push((col, row, index));
        }
        coo.sort_unstable();

        let mut values = Vec::with_capacity(coo.len());
        let mut row_indices = Vec::with_capacity(coo.len());
        let mut per_column = vec![0usize; n_columns];
        for &(col, row, index) in coo.iter() {
            values.push(self.pool[index].clone());
            row_indices.push(row);
            per_column[col] += 1;
        }

        let mut col_ptr = Vec::with_capacity(n_columns + 1);
        col_ptr.push(0);
        for count in per_column {
            col_ptr.push(col_ptr.last().copied().unwrap_or(0) + count);
        }

        SparseCcs {
            values,
            row_indices,
            col_ptr,
        }
    }
}
