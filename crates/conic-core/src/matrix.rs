//! Hand-written dense matrix façade.
//!
//! [`DenseMatrix`] is a rectangular row-major grid, generic over the cell
//! type only so the shape plumbing can be shared between matrices of
//! expressions ([`ExprMatrix`]) and numeric results (`DenseMatrix<f64>`).
//! It supports exactly the block, stacking and arithmetic operations the
//! modeling layer needs; it is not a general linear-algebra library.
//!
//! Element-wise and matrix arithmetic over expressions go through the
//! [`Scalar`] algebra, so order violations (for example multiplying two
//! quadratics inside a matmul) propagate as [`ConicError::Config`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{ConicError, ConicResult};
use crate::expr::Scalar;
use crate::param::Parameter;

/// A dense rectangular matrix with row-major storage.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// A matrix of scalar expressions.
pub type ExprMatrix = DenseMatrix<Scalar>;

impl<T> DenseMatrix<T> {
    /// Build a matrix by evaluating `f(row, col)` for every cell.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                data.push(f(row, col));
            }
        }
        DenseMatrix { rows, cols, data }
    }

    /// Build from nested rows; all rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<T>>) -> ConicResult<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != n_cols) {
            return Err(ConicError::Config(
                "all matrix rows must have the same length".into(),
            ));
        }
        Ok(DenseMatrix {
            rows: n_rows,
            cols: n_cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    /// A 1x1 matrix holding one cell.
    pub fn scalar(value: T) -> Self {
        DenseMatrix {
            rows: 1,
            cols: 1,
            data: vec![value],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_scalar(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }

    /// Number of cells of a row or column vector.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> &T {
        &self.data[row * self.cols + col]
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut T {
        &mut self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.cols + col] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    /// Apply `f` to every cell, producing a matrix of the results.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> DenseMatrix<U> {
        DenseMatrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|cell| f(cell)).collect(),
        }
    }
}

impl<T: Clone> DenseMatrix<T> {
    /// A `rows x cols` matrix with every cell set to `value`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        DenseMatrix {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Rectangular sub-block starting at `(start_row, start_col)`.
    pub fn block(
        &self,
        start_row: usize,
        start_col: usize,
        n_rows: usize,
        n_cols: usize,
    ) -> ConicResult<Self> {
        if start_row + n_rows > self.rows || start_col + n_cols > self.cols {
            return Err(ConicError::Config(format!(
                "block ({},{})+({}x{}) out of bounds for {}x{} matrix",
                start_row, start_col, n_rows, n_cols, self.rows, self.cols
            )));
        }
        Ok(DenseMatrix::from_fn(n_rows, n_cols, |r, c| {
            self.get(start_row + r, start_col + c).clone()
        }))
    }

    pub fn row(&self, index: usize) -> ConicResult<Self> {
        self.block(index, 0, 1, self.cols)
    }

    pub fn col(&self, index: usize) -> ConicResult<Self> {
        self.block(0, index, self.rows, 1)
    }

    pub fn top_rows(&self, n: usize) -> ConicResult<Self> {
        self.block(0, 0, n, self.cols)
    }

    pub fn bottom_rows(&self, n: usize) -> ConicResult<Self> {
        let start_row = self.trailing_start(n, self.rows)?;
        self.block(start_row, 0, n, self.cols)
    }

    pub fn left_cols(&self, n: usize) -> ConicResult<Self> {
        self.block(0, 0, self.rows, n)
    }

    pub fn right_cols(&self, n: usize) -> ConicResult<Self> {
        let start_col = self.trailing_start(n, self.cols)?;
        self.block(0, start_col, self.rows, n)
    }

    pub fn top_left_corner(&self, n_rows: usize, n_cols: usize) -> ConicResult<Self> {
        self.block(0, 0, n_rows, n_cols)
    }

    pub fn top_right_corner(&self, n_rows: usize, n_cols: usize) -> ConicResult<Self> {
        let start_col = self.trailing_start(n_cols, self.cols)?;
        self.block(0, start_col, n_rows, n_cols)
    }

    pub fn bottom_left_corner(&self, n_rows: usize, n_cols: usize) -> ConicResult<Self> {
        let start_row = self.trailing_start(n_rows, self.rows)?;
        self.block(start_row, 0, n_rows, n_cols)
    }

    pub fn bottom_right_corner(&self, n_rows: usize, n_cols: usize) -> ConicResult<Self> {
        let start_row = self.trailing_start(n_rows, self.rows)?;
        let start_col = self.trailing_start(n_cols, self.cols)?;
        self.block(start_row, start_col, n_rows, n_cols)
    }

    /// Start offset of the last `n` positions of an extent, rejecting
    /// requests larger than the extent instead of underflowing.
    fn trailing_start(&self, n: usize, extent: usize) -> ConicResult<usize> {
        if n > extent {
            return Err(ConicError::Config(format!(
                "cannot take {} trailing of {} in a {}x{} matrix",
                n, extent, self.rows, self.cols
            )));
        }
        Ok(extent - n)
    }

    pub fn transpose(&self) -> Self {
        DenseMatrix::from_fn(self.cols, self.rows, |r, c| self.get(c, r).clone())
    }

    fn vector_cell(&self, i: usize) -> &T {
        if self.cols == 1 {
            self.get(i, 0)
        } else {
            self.get(0, i)
        }
    }

    fn require_vector(&self, what: &str) -> ConicResult<usize> {
        if self.rows == 1 || self.cols == 1 {
            Ok(self.data.len())
        } else {
            Err(ConicError::Config(format!(
                "{} requires a row or column vector, got {}x{}",
                what, self.rows, self.cols
            )))
        }
    }

    /// First `n` cells of a vector.
    pub fn head(&self, n: usize) -> ConicResult<Self> {
        self.segment(0, n)
    }

    /// Last `n` cells of a vector.
    pub fn tail(&self, n: usize) -> ConicResult<Self> {
        let len = self.require_vector("tail")?;
        if n > len {
            return Err(ConicError::Config(format!(
                "tail of {} out of bounds for vector of length {}",
                n, len
            )));
        }
        self.segment(len - n, n)
    }

    /// `n` cells of a vector starting at `start`.
    pub fn segment(&self, start: usize, n: usize) -> ConicResult<Self> {
        let len = self.require_vector("segment")?;
        if start + n > len {
            return Err(ConicError::Config(format!(
                "segment {}+{} out of bounds for vector of length {}",
                start, n, len
            )));
        }
        let cells: Vec<T> = (start..start + n)
            .map(|i| self.vector_cell(i).clone())
            .collect();
        Ok(if self.cols == 1 {
            DenseMatrix {
                rows: n,
                cols: 1,
                data: cells,
            }
        } else {
            DenseMatrix {
                rows: 1,
                cols: n,
                data: cells,
            }
        })
    }
}

/// Stack matrices vertically; all blocks must agree in column count.
pub fn vstack<T: Clone>(blocks: &[DenseMatrix<T>]) -> ConicResult<DenseMatrix<T>> {
    let first = blocks
        .first()
        .ok_or_else(|| ConicError::Config("cannot stack an empty list".into()))?;
    let cols = first.cols;
    if blocks.iter().any(|b| b.cols != cols) {
        return Err(ConicError::Config(
            "vstack requires equal column counts".into(),
        ));
    }
    let rows = blocks.iter().map(|b| b.rows).sum();
    let mut data = Vec::with_capacity(rows * cols);
    for block in blocks {
        data.extend(block.data.iter().cloned());
    }
    Ok(DenseMatrix { rows, cols, data })
}

/// Stack matrices horizontally; all blocks must agree in row count.
pub fn hstack<T: Clone>(blocks: &[DenseMatrix<T>]) -> ConicResult<DenseMatrix<T>> {
    let first = blocks
        .first()
        .ok_or_else(|| ConicError::Config("cannot stack an empty list".into()))?;
    let rows = first.rows;
    if blocks.iter().any(|b| b.rows != rows) {
        return Err(ConicError::Config(
            "hstack requires equal row counts".into(),
        ));
    }
    let cols = blocks.iter().map(|b| b.cols).sum();
    let mut result = DenseMatrix {
        rows,
        cols,
        data: Vec::with_capacity(rows * cols),
    };
    for row in 0..rows {
        for block in blocks {
            for col in 0..block.cols {
                result.data.push(block.get(row, col).clone());
            }
        }
    }
    Ok(result)
}

impl ExprMatrix {
    /// Element-wise sum; shapes must match.
    pub fn add(&self, other: &ExprMatrix) -> ConicResult<ExprMatrix> {
        self.zip_with(other, "addition", Scalar::add)
    }

    /// Element-wise difference; shapes must match.
    pub fn sub(&self, other: &ExprMatrix) -> ConicResult<ExprMatrix> {
        self.zip_with(other, "subtraction", Scalar::sub)
    }

    /// Element-wise product; shapes must match.
    pub fn cwise_mul(&self, other: &ExprMatrix) -> ConicResult<ExprMatrix> {
        self.zip_with(other, "element-wise multiplication", Scalar::mul)
    }

    fn zip_with(
        &self,
        other: &ExprMatrix,
        what: &str,
        op: impl Fn(&Scalar, &Scalar) -> ConicResult<Scalar>,
    ) -> ConicResult<ExprMatrix> {
        if self.shape() != other.shape() {
            return Err(ConicError::Config(format!(
                "shape mismatch in {}: {}x{} vs {}x{}",
                what, self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut data = Vec::with_capacity(self.data.len());
        for (a, b) in self.data.iter().zip(other.data.iter()) {
            data.push(op(a, b)?);
        }
        Ok(DenseMatrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// Multiply every cell by a scalar expression.
    pub fn scale(&self, factor: &Scalar) -> ConicResult<ExprMatrix> {
        let mut data = Vec::with_capacity(self.data.len());
        for cell in &self.data {
            data.push(cell.mul(factor)?);
        }
        Ok(DenseMatrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    pub fn neg(&self) -> ConicResult<ExprMatrix> {
        self.scale(&Parameter::constant(-1.0).into())
    }

    /// Matrix product; inner dimensions must agree.
    pub fn matmul(&self, other: &ExprMatrix) -> ConicResult<ExprMatrix> {
        if self.cols != other.rows {
            return Err(ConicError::Config(format!(
                "shape mismatch in matrix product: {}x{} * {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut result = ExprMatrix::filled(self.rows, other.cols, Scalar::default());
        for row in 0..self.rows {
            for col in 0..other.cols {
                let mut sum = Scalar::default();
                for inner in 0..self.cols {
                    let product = self.get(row, inner).mul(other.get(inner, col))?;
                    sum = sum.add(&product)?;
                }
                result.set(row, col, sum);
            }
        }
        Ok(result)
    }

    /// Sum of all cells.
    pub fn sum(&self) -> ConicResult<Scalar> {
        let mut total = Scalar::default();
        for cell in &self.data {
            total = total.add(cell)?;
        }
        Ok(total)
    }

    /// Evaluate every cell against a solution vector.
    pub fn evaluate(&self, solution: &[f64]) -> ConicResult<DenseMatrix<f64>> {
        let mut data = Vec::with_capacity(self.data.len());
        for cell in &self.data {
            data.push(cell.evaluate(solution)?);
        }
        Ok(DenseMatrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }
}

// Rendered one row per line with cells separated by commas.
impl<T: fmt::Display> fmt::Display for DenseMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            for col in 0..self.cols {
                if col > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", self.get(row, col))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A matrix of constant parameters.
pub fn par_matrix(values: &[Vec<f64>]) -> ConicResult<ExprMatrix> {
    let rows: Vec<Vec<Scalar>> = values
        .iter()
        .map(|row| row.iter().map(|&v| Scalar::from(v)).collect())
        .collect();
    DenseMatrix::from_rows(rows)
}

/// A column vector of constant parameters.
pub fn par_vector(values: &[f64]) -> ExprMatrix {
    DenseMatrix::from_fn(values.len(), 1, |row, _| Scalar::from(values[row]))
}

/// A matrix of external bindings; each cell tracks its caller-owned cell.
pub fn dynpar_matrix(cells: &[Vec<Rc<Cell<f64>>>]) -> ConicResult<ExprMatrix> {
    let rows: Vec<Vec<Scalar>> = cells
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| Scalar::from(Parameter::dynamic(cell)))
                .collect()
        })
        .collect();
    DenseMatrix::from_rows(rows)
}

/// A column vector of external bindings.
pub fn dynpar_vector(cells: &[Rc<Cell<f64>>]) -> ExprMatrix {
    DenseMatrix::from_fn(cells.len(), 1, |row, _| {
        Scalar::from(Parameter::dynamic(&cells[row]))
    })
}
