// src/matrix.rs

//! Dense matrix engine.
//!
//! Matrices are `Array2<f64>` where a column is one sample (or one basis
//! vector) and a row is one feature dimension. Every operation that has a
//! dimensional precondition checks it and returns
//! [`RecognitionError::DimensionMismatch`] instead of panicking.
//!
//! Decompositions go through [`LinAlgBackendProvider`], so the results are
//! the same whichever backend the crate was compiled with.

use ndarray::{s, Array1, Array2, Axis, ShapeBuilder, Zip};
use std::io::{self, BufRead, Read, Write};

use crate::error::{RecognitionError, Result};
use crate::linalg_backends::{BackendEigh, BackendLu, EighOutput, LinAlgBackendProvider};

pub type Matrix = Array2<f64>;

/// |det| below this fraction of Hadamard's bound is treated as singular.
const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Negative eigenvalues smaller than this fraction of the largest magnitude are rounding noise.
const EIGEN_NEGATIVE_TOLERANCE: f64 = 1e-10;

pub fn zeros(rows: usize, cols: usize) -> Matrix {
    Array2::zeros((rows, cols))
}

pub fn identity(rows: usize) -> Matrix {
    Array2::eye(rows)
}

fn check_square(op: &'static str, m: &Matrix) -> Result<usize> {
    if m.nrows() != m.ncols() {
        return Err(RecognitionError::dims(
            op,
            format!("expected a square matrix, got {}x{}", m.nrows(), m.ncols()),
        ));
    }
    Ok(m.nrows())
}

fn check_same_shape(op: &'static str, a: &Matrix, b: &Matrix) -> Result<()> {
    if a.dim() != b.dim() {
        return Err(RecognitionError::dims(
            op,
            format!("{:?} vs {:?}", a.dim(), b.dim()),
        ));
    }
    Ok(())
}

/// Element-wise transformations applied in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementwiseOp {
    Negate,
    Sqrt,
    Acos,
    Exp,
    Pow(f64),
    Multiply(f64),
    Divide(f64),
    Add(f64),
}

pub fn apply_elementwise(m: &mut Matrix, op: ElementwiseOp) {
    match op {
        ElementwiseOp::Negate => m.mapv_inplace(|x| -x),
        ElementwiseOp::Sqrt => m.mapv_inplace(f64::sqrt),
        ElementwiseOp::Acos => m.mapv_inplace(f64::acos),
        ElementwiseOp::Exp => m.mapv_inplace(f64::exp),
        ElementwiseOp::Pow(p) => m.mapv_inplace(|x| x.powf(p)),
        ElementwiseOp::Multiply(c) => m.mapv_inplace(|x| x * c),
        ElementwiseOp::Divide(c) => m.mapv_inplace(|x| x / c),
        ElementwiseOp::Add(c) => m.mapv_inplace(|x| x + c),
    }
}

pub fn add(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    check_same_shape("add", a, b)?;
    Ok(a + b)
}

pub fn subtract(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    check_same_shape("subtract", a, b)?;
    Ok(a - b)
}

pub fn elementwise_divide(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    check_same_shape("elementwise_divide", a, b)?;
    Ok(a / b)
}

/// Column vector holding the sum of each row.
pub fn sum_rows(m: &Matrix) -> Matrix {
    m.sum_axis(Axis(1)).insert_axis(Axis(1))
}

/// Row vector holding the sum of each column.
pub fn sum_columns(m: &Matrix) -> Matrix {
    m.sum_axis(Axis(0)).insert_axis(Axis(0))
}

/// Column vector holding the mean of each row, i.e. the mean sample.
pub fn mean_column(m: &Matrix) -> Result<Matrix> {
    let mean = m.mean_axis(Axis(1)).ok_or_else(|| {
        RecognitionError::InsufficientSamples("cannot average a matrix with no columns".to_string())
    })?;
    Ok(mean.insert_axis(Axis(1)))
}

/// Row vector holding the mean of each column.
pub fn mean_row(m: &Matrix) -> Result<Matrix> {
    let mean = m.mean_axis(Axis(0)).ok_or_else(|| {
        RecognitionError::InsufficientSamples("cannot average a matrix with no rows".to_string())
    })?;
    Ok(mean.insert_axis(Axis(0)))
}

/// Subtracts a column vector from every column of `m`.
pub fn subtract_columns(m: &mut Matrix, column: &Matrix) -> Result<()> {
    if column.ncols() != 1 || column.nrows() != m.nrows() {
        return Err(RecognitionError::dims(
            "subtract_columns",
            format!(
                "matrix has {} rows but column vector is {}x{}",
                m.nrows(),
                column.nrows(),
                column.ncols()
            ),
        ));
    }
    *m -= column;
    Ok(())
}

/// `op(a) · op(b)` where `op` optionally transposes.
pub fn product(a: &Matrix, b: &Matrix, transpose_a: bool, transpose_b: bool) -> Result<Matrix> {
    let a_view = if transpose_a { a.t() } else { a.view() };
    let b_view = if transpose_b { b.t() } else { b.view() };
    if a_view.ncols() != b_view.nrows() {
        return Err(RecognitionError::dims(
            "product",
            format!(
                "{}x{} times {}x{}",
                a_view.nrows(),
                a_view.ncols(),
                b_view.nrows(),
                b_view.ncols()
            ),
        ));
    }
    Ok(a_view.dot(&b_view))
}

pub fn transpose(m: &Matrix) -> Matrix {
    m.t().to_owned()
}

/// Reinterprets the column-major element sequence of `m` with a new shape.
pub fn reshape(m: &Matrix, rows: usize, cols: usize) -> Result<Matrix> {
    if rows * cols != m.len() {
        return Err(RecognitionError::dims(
            "reshape",
            format!("{} elements cannot fill {}x{}", m.len(), rows, cols),
        ));
    }
    let column_major: Vec<f64> = m.t().iter().copied().collect();
    Array2::from_shape_vec((rows, cols).f(), column_major)
        .map_err(|e| RecognitionError::dims("reshape", e.to_string()))
}

/// Builds a matrix whose column `j` is column `indices[j]` of `m`.
pub fn reorder_columns(m: &Matrix, indices: &[usize]) -> Result<Matrix> {
    if let Some(&bad) = indices.iter().find(|&&i| i >= m.ncols()) {
        return Err(RecognitionError::dims(
            "reorder_columns",
            format!("column index {} out of range for {} columns", bad, m.ncols()),
        ));
    }
    Ok(m.select(Axis(1), indices))
}

pub fn determinant(m: &Matrix) -> Result<f64> {
    let n = check_square("determinant", m)?;
    if n == 0 {
        return Ok(1.0);
    }
    LinAlgBackendProvider::<f64>::new().determinant(m)
}

fn minor(m: &Matrix, row: usize, col: usize) -> Matrix {
    let n = m.nrows();
    let rows: Vec<usize> = (0..n).filter(|&i| i != row).collect();
    let cols: Vec<usize> = (0..n).filter(|&j| j != col).collect();
    m.select(Axis(0), &rows).select(Axis(1), &cols)
}

/// Matrix of cofactors `C[i,j] = (-1)^(i+j) · det(minor(i, j))`.
pub fn cofactor(m: &Matrix) -> Result<Matrix> {
    let n = check_square("cofactor", m)?;
    let mut c = Array2::zeros((n, n));
    if n == 1 {
        c[[0, 0]] = 1.0;
        return Ok(c);
    }
    for i in 0..n {
        for j in 0..n {
            let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
            c[[i, j]] = sign * determinant(&minor(m, i, j))?;
        }
    }
    Ok(c)
}

pub fn inverse(m: &Matrix) -> Result<Matrix> {
    let n = check_square("inverse", m)?;
    if n == 0 {
        return Err(RecognitionError::dims("inverse", "empty matrix"));
    }
    ensure_finite(m, "inverse input")?;

    let det = determinant(m)?;
    let hadamard_bound: f64 = column_norms(m).iter().product();
    if !det.is_finite() || hadamard_bound == 0.0 || det.abs() <= SINGULARITY_TOLERANCE * hadamard_bound {
        return Err(RecognitionError::Singularity(format!(
            "inverse: det={:e}, hadamard bound={:e}",
            det, hadamard_bound
        )));
    }

    let inv = LinAlgBackendProvider::<f64>::new()
        .inverse(m)
        .map_err(|e| RecognitionError::Singularity(format!("inverse: {}", e)))?;
    ensure_finite(&inv, "inverse")?;
    Ok(inv)
}

/// Symmetric eigendecomposition, eigenvalues ascending.
///
/// Only the upper triangle of `m` is read.
pub fn eigen(m: &Matrix) -> Result<EighOutput<f64>> {
    check_square("eigen", m)?;
    ensure_finite(m, "eigen input")?;
    LinAlgBackendProvider::<f64>::new().eigh_upper(m)
}

/// Same as [`eigen`] with eigenpairs sorted by descending eigenvalue.
///
/// The sort is stable, so equal eigenvalues keep the solver's order.
pub fn eigen_descending(m: &Matrix) -> Result<EighOutput<f64>> {
    let EighOutput {
        eigenvalues,
        eigenvectors,
    } = eigen(m)?;
    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(EighOutput {
        eigenvalues: eigenvalues.select(Axis(0), &order),
        eigenvectors: reorder_columns(&eigenvectors, &order)?,
    })
}

/// Principal square root of a symmetric positive semi-definite matrix.
pub fn sqrtm(m: &Matrix) -> Result<Matrix> {
    let EighOutput {
        eigenvalues,
        eigenvectors,
    } = eigen(m)?;
    let scale = eigenvalues.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let floor = -EIGEN_NEGATIVE_TOLERANCE * scale.max(1.0);
    if let Some(&bad) = eigenvalues.iter().find(|&&v| v < floor) {
        return Err(RecognitionError::Singularity(format!(
            "sqrtm: matrix has negative eigenvalue {:e}",
            bad
        )));
    }
    let roots = eigenvalues.mapv(|v| v.max(0.0).sqrt());
    let scaled = &eigenvectors * &roots.insert_axis(Axis(0));
    Ok(scaled.dot(&eigenvectors.t()))
}

/// `m^{-1/2}` of a symmetric positive definite matrix, together with `ln det(m)`.
///
/// Fails with `Singularity` when the smallest eigenvalue is at or below
/// `relative_tolerance` times the largest one.
pub fn inverse_sqrtm(m: &Matrix, relative_tolerance: f64) -> Result<(Matrix, f64)> {
    let EighOutput {
        eigenvalues,
        eigenvectors,
    } = eigen(m)?;
    let largest = eigenvalues.iter().fold(0.0_f64, |acc, &v| acc.max(v));
    let smallest = eigenvalues.iter().fold(f64::INFINITY, |acc, &v| acc.min(v));
    if largest <= 0.0 || smallest <= relative_tolerance * largest {
        return Err(RecognitionError::Singularity(format!(
            "eigenvalue range [{:e}, {:e}] below tolerance {:e}",
            smallest, largest, relative_tolerance
        )));
    }
    let log_det = eigenvalues.iter().map(|v| v.ln()).sum();
    let inv_roots = eigenvalues.mapv(|v| 1.0 / v.sqrt());
    let scaled = &eigenvectors * &inv_roots.insert_axis(Axis(0));
    Ok((scaled.dot(&eigenvectors.t()), log_det))
}

/// Covariance of the variables in the rows of `m`, observations in the columns.
pub fn covariance(m: &Matrix) -> Result<Matrix> {
    let n = m.ncols();
    if n < 2 {
        return Err(RecognitionError::InsufficientSamples(format!(
            "covariance needs at least 2 observations, got {}",
            n
        )));
    }
    let mut centered = m.clone();
    let mean = mean_column(m)?;
    subtract_columns(&mut centered, &mean)?;
    Ok(centered.dot(&centered.t()) / (n - 1) as f64)
}

/// Euclidean norm of every column.
pub fn column_norms(m: &Matrix) -> Array1<f64> {
    m.map_axis(Axis(0), |col| col.dot(&col).sqrt())
}

/// Divides each column `j` of `m` by `norms[j]`.
pub fn normalize_columns(m: &mut Matrix, norms: &Array1<f64>) -> Result<()> {
    if norms.len() != m.ncols() {
        return Err(RecognitionError::dims(
            "normalize_columns",
            format!("{} norms for {} columns", norms.len(), m.ncols()),
        ));
    }
    Zip::from(m.columns_mut()).and(norms).for_each(|mut col, &norm| {
        col.mapv_inplace(|x| x / norm);
    });
    Ok(())
}

/// Rejects matrices containing NaN or infinity.
pub fn ensure_finite(m: &Matrix, context: &str) -> Result<()> {
    if m.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(RecognitionError::NonFinite(context.to_string()))
    }
}

/// Writes `i32 rows, i32 cols` followed by the elements in column-major order, host-endian.
pub fn write_binary<W: Write>(writer: &mut W, m: &Matrix) -> io::Result<()> {
    let rows = i32::try_from(m.nrows())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "row count exceeds i32"))?;
    let cols = i32::try_from(m.ncols())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "column count exceeds i32"))?;
    writer.write_all(&rows.to_ne_bytes())?;
    writer.write_all(&cols.to_ne_bytes())?;
    let column_major: Vec<f64> = m.t().iter().copied().collect();
    writer.write_all(bytemuck::cast_slice(&column_major))
}

pub(crate) fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_ne_bytes(buf))
}

/// Reads exactly `len` bytes without trusting `len` for the allocation.
pub(crate) fn read_bytes<R: Read>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, found {}", len, buf.len()),
        ));
    }
    Ok(buf)
}

/// Reads a matrix written by [`write_binary`].
pub fn read_binary<R: Read>(reader: &mut R) -> io::Result<Matrix> {
    let rows = read_i32(reader)?;
    let cols = read_i32(reader)?;
    if rows < 0 || cols < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative matrix dimensions {}x{}", rows, cols),
        ));
    }
    let (rows, cols) = (rows as usize, cols as usize);
    let n_bytes = rows
        .checked_mul(cols)
        .and_then(|len| len.checked_mul(std::mem::size_of::<f64>()))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "matrix dimensions overflow"))?;
    let bytes = read_bytes(reader, n_bytes)?;
    let data: Vec<f64> = bytes
        .chunks_exact(std::mem::size_of::<f64>())
        .map(bytemuck::pod_read_unaligned::<f64>)
        .collect();
    Array2::from_shape_vec((rows, cols).f(), data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Debug dump: a `rows cols` header then one text line per row.
pub fn write_ascii<W: Write>(writer: &mut W, m: &Matrix, precision: usize) -> io::Result<()> {
    writeln!(writer, "{} {}", m.nrows(), m.ncols())?;
    for row in m.rows() {
        let line: Vec<String> = row.iter().map(|v| format!("{:.*}", precision, v)).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

/// Parses the format produced by [`write_ascii`].
pub fn read_ascii<R: BufRead>(reader: &mut R) -> io::Result<Matrix> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let invalid = |msg: String| io::Error::new(io::ErrorKind::InvalidData, msg);
    let mut tokens = text.split_whitespace();
    let mut next_dim = || -> io::Result<usize> {
        tokens
            .next()
            .ok_or_else(|| invalid("missing matrix header".to_string()))?
            .parse::<usize>()
            .map_err(|e| invalid(format!("bad matrix header: {}", e)))
    };
    let rows = next_dim()?;
    let cols = next_dim()?;
    let values = tokens
        .map(|t| t.parse::<f64>().map_err(|e| invalid(format!("bad value '{}': {}", t, e))))
        .collect::<io::Result<Vec<f64>>>()?;
    if values.len() != rows * cols {
        return Err(invalid(format!(
            "expected {} values for {}x{}, found {}",
            rows * cols,
            rows,
            cols,
            values.len()
        )));
    }
    Array2::from_shape_vec((rows, cols), values).map_err(|e| invalid(e.to_string()))
}

/// Copies the leading `n` columns.
pub(crate) fn leading_columns(m: &Matrix, n: usize) -> Matrix {
    m.slice(s![.., ..n]).to_owned()
}
