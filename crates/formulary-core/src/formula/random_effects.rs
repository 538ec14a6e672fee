//! Random-effects covariance.
//!
//! For q random-effect terms with covariance Σ (q × q), the implied
//! covariance of the observations is `D · Σ · Dᵗ`, where D is the n × q
//! design of the terms. Σ defaults to a diagonal of free variances
//! `_s2_0, ..., _s2_{q-1}`, in which case the result is symbolic:
//!
//! ```text
//! subject = [2, 2, 2, 3, 3]
//!
//! [[_s2_0, _s2_0, _s2_0,     0,     0],
//!  [_s2_0, _s2_0, _s2_0,     0,     0],
//!  [_s2_0, _s2_0, _s2_0,     0,     0],
//!  [    0,     0,     0, _s2_1, _s2_1],
//!  [    0,     0,     0, _s2_1, _s2_1]]
//! ```

use ndarray::Array2;

use crate::error::{FormularyError, Result};
use crate::symbolic::{Expr, Symbol};
use crate::table::{Params, Table};

use super::algebra::{impl_formula_ops, Formula, FormulaLike};

/// Default coefficient prefix of random effects.
pub const RANDOM_EFFECTS_PREFIX: &str = "e";

/// A covariance matrix, numeric or symbolic.
#[derive(Debug, Clone, PartialEq)]
pub enum Covariance {
    Numeric(Array2<f64>),
    Symbolic(Array2<Expr>),
}

impl Covariance {
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Covariance::Numeric(m) => m.dim(),
            Covariance::Symbolic(m) => m.dim(),
        }
    }

    /// Diagonal of free variance symbols.
    pub fn free_diagonal(q: usize) -> Self {
        Covariance::Symbolic(Array2::from_shape_fn((q, q), |(i, j)| {
            if i == j {
                Expr::symbol(Symbol::Variance(i))
            } else {
                Expr::zero()
            }
        }))
    }
}

impl From<Array2<f64>> for Covariance {
    fn from(m: Array2<f64>) -> Self {
        Covariance::Numeric(m)
    }
}

impl From<Array2<Expr>> for Covariance {
    fn from(m: Array2<Expr>) -> Self {
        Covariance::Symbolic(m)
    }
}

/// Random-effect terms together with their covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomEffects {
    formula: Formula,
    sigma: Covariance,
}

impl RandomEffects {
    /// `sigma = None` gives a free diagonal; otherwise it must be q × q.
    pub fn new(terms: impl IntoIterator<Item = Expr>, sigma: Option<Covariance>) -> Result<Self> {
        let formula = Formula::with_prefix(terms, RANDOM_EFFECTS_PREFIX);
        let q = formula.len();
        let sigma = sigma.unwrap_or_else(|| Covariance::free_diagonal(q));
        if sigma.dim() != (q, q) {
            let (r, c) = sigma.dim();
            return Err(FormularyError::ShapeMismatch(format!(
                "incorrect shape for covariance of random effects: got ({}, {}), should have shape ({}, {})",
                r, c, q, q
            )));
        }
        Ok(RandomEffects { formula, sigma })
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn sigma(&self) -> &Covariance {
        &self.sigma
    }

    /// `D · Σ · Dᵗ` for the design D of these terms over `observations`.
    pub fn cov(&self, observations: &Table, params: Option<&Params>) -> Result<Covariance> {
        let d = self.formula.compile()?.design_matrix(observations, params)?;
        if d.ncols() != self.sigma.dim().0 {
            return Err(FormularyError::ShapeMismatch(format!(
                "design has {} columns but the covariance is {}x{}",
                d.ncols(),
                self.sigma.dim().0,
                self.sigma.dim().1
            )));
        }

        match &self.sigma {
            Covariance::Numeric(sigma) => Ok(Covariance::Numeric(d.dot(sigma).dot(&d.t()))),
            Covariance::Symbolic(sigma) => {
                let n = d.nrows();
                let q = d.ncols();
                Ok(Covariance::Symbolic(Array2::from_shape_fn((n, n), |(i, j)| {
                    let mut acc = Vec::new();
                    for k in 0..q {
                        for l in 0..q {
                            let w = d[[i, k]] * d[[j, l]];
                            if w != 0.0 && !sigma[[k, l]].is_zero() {
                                acc.push(Expr::mul([Expr::float(w), sigma[[k, l]].clone()]));
                            }
                        }
                    }
                    Expr::add(acc)
                })))
            }
        }
    }
}

impl FormulaLike for RandomEffects {
    fn as_formula(&self) -> &Formula {
        &self.formula
    }
}

impl_formula_ops!(RandomEffects);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Factor;
    use crate::symbolic::Level;
    use ndarray::array;

    fn subjects() -> (Table, Factor) {
        let table = Table::new().with_column("s", vec![2i64, 2, 2, 3, 3]).unwrap();
        let factor = Factor::new("s", vec![Level::Int(2), Level::Int(3)]).unwrap();
        (table, factor)
    }

    #[test]
    fn test_numeric_covariance() {
        let (table, factor) = subjects();
        let re = RandomEffects::new(
            factor.formula().terms().to_vec(),
            Some(array![[4.0, 1.0], [1.0, 6.0]].into()),
        )
        .unwrap();
        let cov = re.cov(&table, None).unwrap();
        let expected = array![
            [4.0, 4.0, 4.0, 1.0, 1.0],
            [4.0, 4.0, 4.0, 1.0, 1.0],
            [4.0, 4.0, 4.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 6.0, 6.0],
            [1.0, 1.0, 1.0, 6.0, 6.0],
        ];
        assert_eq!(cov, Covariance::Numeric(expected));
    }

    #[test]
    fn test_symbolic_covariance() {
        let (table, factor) = subjects();
        let re = RandomEffects::new(factor.formula().terms().to_vec(), None).unwrap();
        assert_eq!(re.formula().prefix(), "e");

        let cov = match re.cov(&table, None).unwrap() {
            Covariance::Symbolic(m) => m,
            other => panic!("expected a symbolic covariance, got {:?}", other),
        };
        let s0 = Expr::symbol(Symbol::Variance(0));
        let s1 = Expr::symbol(Symbol::Variance(1));
        assert_eq!(cov[[0, 2]], s0);
        assert_eq!(cov[[3, 4]], s1);
        assert!(cov[[0, 4]].is_zero());
        assert_eq!(cov[[1, 1]].to_string(), "_s2_0");
    }

    #[test]
    fn test_wrong_covariance_shape() {
        let (_, factor) = subjects();
        let err = RandomEffects::new(
            factor.formula().terms().to_vec(),
            Some(Array2::<f64>::eye(3).into()),
        )
        .unwrap_err();
        assert!(matches!(err, FormularyError::ShapeMismatch(_)));
    }
}
