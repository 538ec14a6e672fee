//! Regressor atoms: terms, factor levels, coefficients, free parameters.
//!
//! All of them are plain [`Expr`] symbols; the [`Symbol`] tag says which
//! kind of atom it is. `is_term` is true exactly for `Term` and `FactorTerm`.

use crate::symbolic::{Expr, Level, Symbol};

/// A named regressor, read from the input column of the same name.
pub fn term(name: &str) -> Expr {
    Expr::symbol(Symbol::Term(name.to_string()))
}

/// Indicator of `level` in the categorical column `factor`; prints as
/// `factor_level`.
pub fn factor_term(factor: &str, level: impl Into<Level>) -> Expr {
    Expr::symbol(Symbol::FactorTerm {
        factor: factor.to_string(),
        level: level.into(),
    })
}

/// Several terms at once, from names separated by commas and/or whitespace.
///
/// ```
/// use formulary_core::formula::terms;
/// let v = terms("x, y z");
/// assert_eq!(v.len(), 3);
/// assert_eq!(v[2].to_string(), "z");
/// ```
pub fn terms(names: &str) -> Vec<Expr> {
    names
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(term)
        .collect()
}

/// A free, non-regressor parameter of the mean (e.g. a nonlinear rate).
pub fn parameter(name: &str) -> Expr {
    Expr::symbol(Symbol::Parameter(name.to_string()))
}

/// Coefficient `_{prefix}{index}`, bound to `term` for its whole life.
pub fn coefficient(prefix: &str, index: usize, term: &Expr) -> Symbol {
    Symbol::Coefficient {
        prefix: prefix.to_string(),
        index,
        term: term.clone(),
    }
}

pub fn is_term(expr: &Expr) -> bool {
    expr.is_term()
}

pub fn is_factor_term(expr: &Expr) -> bool {
    expr.is_factor_term()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_self_addition_is_idempotent() {
        let x = term("x");
        assert_eq!(&x + &x, x);
        assert!(is_term(&x));
        assert!(!is_factor_term(&x));
    }

    #[test]
    fn test_factor_term_identity_and_name() {
        let f = factor_term("sex", "male");
        assert_eq!(f.to_string(), "sex_male");
        assert_eq!(&f * &f, f);
        assert!(is_term(&f) && is_factor_term(&f));
        assert_ne!(factor_term("sex", "male"), term("sex_male"));
        assert_eq!(factor_term("dose", 3).to_string(), "dose_3");
    }

    #[test]
    fn test_terms_splits_on_commas_and_spaces() {
        let v = terms("a, b c,d");
        let names: Vec<String> = v.iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_parameters_are_not_terms() {
        let theta = parameter("theta");
        assert!(!is_term(&theta));
        let b = coefficient("b", 0, &term("x"));
        assert_eq!(b.name(), "_b0");
    }
}
