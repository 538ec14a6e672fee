// =============================================================================
// Estimable Contrasts
// =============================================================================
//
// Given a design matrix D (n × p) and a candidate L, produce a contrast C
// whose image D·Cᵗ lies in the column space of D and has full column rank.
//
// L is read in one of two ways:
//
//   L is n × m   L holds columns in observation space; C = (D⁺ · L)ᵗ
//   L is m × p   L is a classic contrast matrix;      C = (D⁺ · D · Lᵗ)ᵗ
//
// When both shapes match, the first reading wins.
//
// RANK REPAIR
// -----------
// If Lp = D · Cᵗ is rank deficient (r < its column count), Lp is replaced by
// the r dominant left singular vectors of Lp and C is recomputed from that
// basis. The result is always *some* full-rank contrast inside the column
// space spanned by L, not necessarily the one the caller had in mind. The
// `Contrast` value records whether this happened.
//
// =============================================================================

use ndarray::{Array2, ArrayD};

use crate::convert::{full_rank, matrix_rank, pinv, squeeze};
use crate::error::{FormularyError, Result};

/// Settings for contrast derivation.
#[derive(Debug, Clone, Default)]
pub struct ContrastConfig {
    /// Singular values at or below this count as zero when measuring rank.
    /// `None` uses σ_max · max(n, k) · ε.
    pub rank_tolerance: Option<f64>,
}

/// A derived contrast.
#[derive(Debug, Clone, PartialEq)]
pub struct Contrast {
    /// Contrast matrix, one row per estimable combination (r × p).
    pub matrix: Array2<f64>,
    /// Numerical rank of D · Cᵗ before any repair.
    pub rank: usize,
    /// True when the naive contrast was rank deficient and got replaced by a
    /// full-rank basis of its span.
    pub reprojected: bool,
}

impl Contrast {
    /// The matrix with length-one axes dropped.
    pub fn squeezed(&self) -> Result<ArrayD<f64>> {
        squeeze(&self.matrix.clone().into_dyn())
    }
}

/// Derive an estimable, full-rank contrast from `l` against design `d`.
///
/// `pseudo` is a precomputed pseudo-inverse of `d` (p × n); it is computed
/// here when absent.
pub fn derive_contrast(
    l: &Array2<f64>,
    d: &Array2<f64>,
    pseudo: Option<&Array2<f64>>,
    config: &ContrastConfig,
) -> Result<Contrast> {
    let (n, p) = d.dim();
    if l.nrows() != n && l.ncols() != p {
        return Err(FormularyError::ShapeMismatch(format!(
            "shape of L ({}x{}) matches neither dimension of D ({}x{})",
            l.nrows(),
            l.ncols(),
            n,
            p
        )));
    }

    let computed;
    let pseudo = match pseudo {
        Some(pi) => {
            if pi.dim() != (p, n) {
                return Err(FormularyError::ShapeMismatch(format!(
                    "pseudo-inverse is {}x{}, expected {}x{}",
                    pi.nrows(),
                    pi.ncols(),
                    p,
                    n
                )));
            }
            pi
        }
        None => {
            computed = pinv(d)?;
            &computed
        }
    };

    let c = if l.nrows() == n {
        pseudo.dot(l).reversed_axes()
    } else {
        pseudo.dot(&d.dot(&l.t())).reversed_axes()
    };

    let lp = d.dot(&c.t());
    let rank = matrix_rank(&lp, config.rank_tolerance)?;
    if rank == lp.ncols() {
        return Ok(Contrast {
            matrix: c,
            rank,
            reprojected: false,
        });
    }

    log::debug!(
        "contrast is rank deficient ({} of {} columns), reprojecting onto a full-rank basis",
        rank,
        lp.ncols()
    );
    let basis = full_rank(&lp, rank)?;
    Ok(Contrast {
        matrix: pseudo.dot(&basis).reversed_axes(),
        rank,
        reprojected: true,
    })
}

/// Contrast matrix for `l` against `d`, squeezed.
///
/// See [`derive_contrast`] for the variant that reports rank repair.
pub fn contrast_from_cols_or_rows(
    l: &Array2<f64>,
    d: &Array2<f64>,
    pseudo: Option<&Array2<f64>>,
) -> Result<ArrayD<f64>> {
    derive_contrast(l, d, pseudo, &ContrastConfig::default())?.squeezed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // Intercept plus a two-level indicator: rank 2 in three columns.
    fn design() -> Array2<f64> {
        array![
            [1.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
        ]
    }

    fn image_rank(c: &Array2<f64>, d: &Array2<f64>) -> usize {
        matrix_rank(&d.dot(&c.t()), None).unwrap()
    }

    #[test]
    fn test_row_contrast_is_estimable() {
        let d = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0]];
        let l = array![[0.0, 1.0]];
        let c = derive_contrast(&l, &d, None, &ContrastConfig::default()).unwrap();
        assert!(!c.reprojected);
        assert_eq!(c.rank, 1);
        // Full-rank D: the contrast comes back unchanged.
        assert_abs_diff_eq!(c.matrix, l, epsilon = 1e-10);
    }

    #[test]
    fn test_column_space_candidate() {
        let d = design();
        let l = array![[1.0], [1.0], [0.0], [0.0]];
        let c = contrast_from_cols_or_rows(&l, &d, None).unwrap();
        assert_eq!(c.shape(), &[3]);
        let c2 = c.into_dimensionality::<ndarray::Ix1>().unwrap().insert_axis(ndarray::Axis(0));
        // D · Cᵗ reproduces the candidate column.
        assert_abs_diff_eq!(d.dot(&c2.t()), l, epsilon = 1e-10);
    }

    #[test]
    fn test_rank_deficient_candidate_is_repaired() {
        let d = design();
        // Second row is a multiple of the first.
        let l = array![[0.0, 1.0, -1.0], [0.0, 2.0, -2.0]];
        let c = derive_contrast(&l, &d, None, &ContrastConfig::default()).unwrap();
        assert!(c.reprojected);
        assert_eq!(c.rank, 1);
        assert_eq!(c.matrix.nrows(), 1);
        assert_eq!(image_rank(&c.matrix, &d), c.matrix.nrows());
    }

    #[test]
    fn test_full_rank_property_for_several_candidates() {
        let d = design();
        let candidates = vec![
            array![[1.0, 0.0, 0.0]],
            array![[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            array![[1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [0.0, 1.0, -1.0]],
            array![[1.0, 2.0], [0.0, 1.0], [3.0, 1.0], [1.0, 1.0]],
        ];
        for l in candidates {
            let c = derive_contrast(&l, &d, None, &ContrastConfig::default()).unwrap();
            assert_eq!(image_rank(&c.matrix, &d), c.matrix.nrows());
        }
    }

    #[test]
    fn test_precomputed_pseudo_inverse_is_used() {
        let d = design();
        let pseudo = pinv(&d).unwrap();
        let l = array![[0.0, 1.0, -1.0]];
        let a = contrast_from_cols_or_rows(&l, &d, Some(&pseudo)).unwrap();
        let b = contrast_from_cols_or_rows(&l, &d, None).unwrap();
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);

        let wrong = Array2::<f64>::zeros((2, 2));
        assert!(derive_contrast(&l, &d, Some(&wrong), &ContrastConfig::default()).is_err());
    }

    #[test]
    fn test_shape_mismatch() {
        let d = design();
        let l = Array2::<f64>::ones((2, 2));
        let err = contrast_from_cols_or_rows(&l, &d, None).unwrap_err();
        assert!(matches!(err, FormularyError::ShapeMismatch(_)));
    }
}
