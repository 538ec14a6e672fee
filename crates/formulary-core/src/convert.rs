// =============================================================================
// ndarray ↔ nalgebra Conversion Utilities
// =============================================================================
//
// Arrays are stored and exchanged as ndarray (that is what the bindings hand
// to numpy); decompositions run in nalgebra. This module holds the two-way
// conversion plus the handful of SVD-based operations the contrast code
// needs: pseudo-inverse, numerical rank and a full-rank column basis.
//
// Tolerances follow the numpy conventions so results agree with what users
// get from `numpy.linalg`:
//   - pinv:  singular values below 1e-15 · σ_max are treated as zero
//   - rank:  singular values below σ_max · max(n, p) · ε are treated as zero
//
// =============================================================================

use ndarray::{Array2, ArrayD, IxDyn};
use nalgebra::{DMatrix, DVector, SVD};

use crate::error::{FormularyError, Result};

const PINV_RCOND: f64 = 1e-15;

// =============================================================================
// ndarray ↔ nalgebra
// =============================================================================

/// Convert an ndarray Array2 to a nalgebra DMatrix.
#[inline]
pub fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Convert a nalgebra DMatrix to an ndarray Array2.
#[inline]
pub fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    let (nrows, ncols) = m.shape();
    Array2::from_shape_fn((nrows, ncols), |(i, j)| m[(i, j)])
}

/// Drop every axis of length one, as `numpy.squeeze` does.
pub fn squeeze(a: &ArrayD<f64>) -> Result<ArrayD<f64>> {
    let shape: Vec<usize> = a.shape().iter().copied().filter(|&d| d != 1).collect();
    ArrayD::from_shape_vec(IxDyn(&shape), a.iter().copied().collect())
        .map_err(|e| FormularyError::ShapeMismatch(format!("cannot squeeze array: {}", e)))
}

// =============================================================================
// SVD-based operations
// =============================================================================

fn svd(a: &Array2<f64>) -> Result<SVD<f64, nalgebra::Dyn, nalgebra::Dyn>> {
    to_dmatrix(a)
        .try_svd(true, true, f64::EPSILON, 0)
        .ok_or_else(|| {
            FormularyError::LinearAlgebra(format!(
                "SVD of a {}x{} matrix did not converge",
                a.nrows(),
                a.ncols()
            ))
        })
}

fn max_singular_value(s: &DVector<f64>) -> f64 {
    s.iter().cloned().fold(0.0, f64::max)
}

/// Moore-Penrose pseudo-inverse (p × n for an n × p input).
pub fn pinv(a: &Array2<f64>) -> Result<Array2<f64>> {
    let (n, p) = a.dim();
    if n == 0 || p == 0 {
        return Ok(Array2::zeros((p, n)));
    }
    let svd = svd(a)?;
    let cutoff = PINV_RCOND * max_singular_value(&svd.singular_values);

    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(FormularyError::LinearAlgebra(
                "SVD did not produce singular vectors".to_string(),
            ))
        }
    };
    let s_inv = svd
        .singular_values
        .map(|s| if s > cutoff { 1.0 / s } else { 0.0 });
    let pinv = v_t.transpose() * DMatrix::from_diagonal(&s_inv) * u.transpose();
    Ok(to_array2(&pinv))
}

/// Numerical rank. `tol = None` uses σ_max · max(n, p) · ε.
pub fn matrix_rank(a: &Array2<f64>, tol: Option<f64>) -> Result<usize> {
    let (n, p) = a.dim();
    if n == 0 || p == 0 {
        return Ok(0);
    }
    let s = svd(a)?.singular_values;
    let tol = tol.unwrap_or_else(|| max_singular_value(&s) * n.max(p) as f64 * f64::EPSILON);
    Ok(s.iter().filter(|&&v| v > tol).count())
}

/// The `r` leading left singular vectors of `a`, as an n × r matrix.
///
/// They span the same space as the `r` dominant directions of `a`'s column
/// space; with `r = rank(a)` this is a full-rank basis of that space.
pub fn full_rank(a: &Array2<f64>, r: usize) -> Result<Array2<f64>> {
    let n = a.nrows();
    if r == 0 || a.ncols() == 0 {
        return Ok(Array2::zeros((n, 0)));
    }
    let svd = svd(a)?;
    let u = svd.u.ok_or_else(|| {
        FormularyError::LinearAlgebra("SVD did not produce left singular vectors".to_string())
    })?;
    let s = svd.singular_values;
    if r > s.len() {
        return Err(FormularyError::ShapeMismatch(format!(
            "cannot take {} singular vectors from a matrix with {} singular values",
            r,
            s.len()
        )));
    }

    let mut order: Vec<usize> = (0..s.len()).collect();
    order.sort_by(|&i, &j| s[j].total_cmp(&s[i]));
    Ok(Array2::from_shape_fn((n, r), |(i, k)| u[(i, order[k])]))
}

// =============================================================================
// Tests
// =============================================================================
