//! Categorical variables.
//!
//! A [`Factor`] is a [`Formula`] with one indicator term per level. Levels
//! are either all integers or all strings; they are deduplicated and sorted
//! at construction.

use crate::error::{FormularyError, Result};
use crate::symbolic::{Expr, Level};
use crate::table::Column;

use super::algebra::{impl_formula_ops, Formula, FormulaLike, DEFAULT_PREFIX};
use super::atoms::factor_term;

#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    name: String,
    levels: Vec<Level>,
    formula: Formula,
}

impl Factor {
    pub fn new(name: &str, levels: impl IntoIterator<Item = Level>) -> Result<Self> {
        Self::with_prefix(name, levels, DEFAULT_PREFIX)
    }

    pub fn with_prefix(
        name: &str,
        levels: impl IntoIterator<Item = Level>,
        prefix: &str,
    ) -> Result<Self> {
        let mut levels: Vec<Level> = levels.into_iter().collect();
        if levels.iter().any(Level::is_text) && !levels.iter().all(Level::is_text) {
            return Err(FormularyError::InvalidValue(format!(
                "levels of factor '{}' must be all strings or all integers",
                name
            )));
        }
        levels.sort();
        levels.dedup();

        let formula = Formula::with_prefix(
            levels.iter().map(|l| factor_term(name, l.clone())),
            prefix,
        );
        Ok(Factor {
            name: name.to_string(),
            levels,
            formula,
        })
    }

    /// Factor over numeric levels; every value must be integral.
    pub fn from_numeric(name: &str, values: &[f64]) -> Result<Self> {
        let levels = values
            .iter()
            .map(|&v| {
                if v.is_finite() && v == v.round() {
                    Ok(Level::Int(v as i64))
                } else {
                    Err(FormularyError::InvalidValue(format!(
                        "levels must be strings or ints, got {}",
                        v
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, levels)
    }

    /// Factor over the distinct values of a column.
    pub fn from_column(column: &Column, name: &str) -> Result<Self> {
        let name = if name.is_empty() { "factor" } else { name };
        Self::new(name, column.unique_levels(name)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// The indicator term of one level.
    pub fn get_term(&self, level: &Level) -> Result<&Expr> {
        if !self.levels.contains(level) {
            return Err(FormularyError::InvalidValue(format!(
                "level {} not found in factor '{}'",
                level, self.name
            )));
        }
        self.formula.get(&format!("{}_{}", self.name, level))
    }

    /// Deviations from the last level: `[l_0 - l_ref, l_1 - l_ref, ...]`.
    pub fn main_effect(&self) -> Result<Formula> {
        self.main_effect_with_reference(-1)
    }

    /// Deviations from the level at position `reference` (negative counts
    /// from the end).
    pub fn main_effect_with_reference(&self, reference: isize) -> Result<Formula> {
        let mut terms = self.formula.terms().to_vec();
        let n = terms.len() as isize;
        let idx = if reference < 0 { n + reference } else { reference };
        if idx < 0 || idx >= n {
            return Err(FormularyError::InvalidValue(format!(
                "reference level {} out of range for factor '{}' with {} levels",
                reference, self.name, n
            )));
        }
        let ref_term = terms.remove(idx as usize);
        Ok(Formula::new(
            terms.into_iter().map(|t| t - &ref_term).collect::<Vec<_>>(),
        ))
    }

    /// The same indicators with coefficients named `_{variable}{i}`.
    pub fn stratify(&self, variable: &str) -> Result<Formula> {
        if variable.is_empty() || !variable.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FormularyError::InvalidValue(format!(
                "'{}' is not usable as a coefficient name: only letters and digits are allowed",
                variable
            )));
        }
        Ok(Formula::with_prefix(self.formula.terms().to_vec(), variable))
    }
}

impl FormulaLike for Factor {
    fn as_formula(&self) -> &Formula {
        &self.formula
    }

    fn is_factor(&self) -> bool {
        true
    }
}

impl_formula_ops!(Factor);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::term;

    fn ab() -> Factor {
        Factor::new("f", vec![Level::from("b"), Level::from("a"), Level::from("b")]).unwrap()
    }

    #[test]
    fn test_levels_sorted_and_deduplicated() {
        let f = ab();
        assert_eq!(f.levels(), &[Level::from("a"), Level::from("b")]);
        let names: Vec<String> = f.formula().terms().iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["f_a", "f_b"]);
    }

    #[test]
    fn test_mixed_levels_rejected() {
        assert!(Factor::new("f", vec![Level::from("a"), Level::Int(1)]).is_err());
        assert!(Factor::from_numeric("f", &[1.0, 2.5]).is_err());
        let f = Factor::from_numeric("dose", &[3.0, 1.0, 3.0]).unwrap();
        assert_eq!(f.levels(), &[Level::Int(1), Level::Int(3)]);
    }

    #[test]
    fn test_get_term() {
        let f = ab();
        assert_eq!(f.get_term(&Level::from("b")).unwrap().to_string(), "f_b");
        assert!(f.get_term(&Level::from("c")).is_err());
    }

    #[test]
    fn test_main_effect() {
        let f = Factor::new("a", vec!["x".into(), "y".into(), "z".into()]).unwrap();
        let me = f.main_effect().unwrap();
        assert_eq!(me.len(), 2);
        let names: Vec<String> = me.terms().iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["a_x - a_z", "a_y - a_z"]);

        let first = f.main_effect_with_reference(0).unwrap();
        assert_eq!(first.terms()[0].to_string(), "a_y - a_x");
    }

    #[test]
    fn test_main_effect_reference_out_of_range() {
        let f = Factor::new("a", vec!["x".into(), "y".into(), "z".into()]).unwrap();
        assert!(f.main_effect_with_reference(-3).is_ok());
        for reference in [3, 5, -4] {
            let err = f.main_effect_with_reference(reference).unwrap_err();
            assert!(matches!(err, FormularyError::InvalidValue(_)));
        }
    }

    #[test]
    fn test_stratify() {
        let f = Factor::new("a", vec!["x".into(), "y".into()]).unwrap();
        let s = f.stratify("theta").unwrap();
        let coefs: Vec<String> = s.coefficients().iter().map(|(_, c)| c.name()).collect();
        assert_eq!(coefs, vec!["_theta0", "_theta1"]);
        assert!(f.stratify("the ta").is_err());
        assert!(f.stratify("x_1").is_err());
    }

    #[test]
    fn test_factor_times_itself_is_itself() {
        let f = ab();
        assert_eq!(&f * &f, *f.formula());

        let x = Formula::from(term("x"));
        let fx = &f * &x;
        let names: Vec<String> = fx.terms().iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["f_a*x", "f_b*x"]);
    }

    #[test]
    fn test_formula_compares_equal_to_factor_terms() {
        let f = ab();
        let plain = Formula::new(vec![factor_term("f", "a"), factor_term("f", "b")]);
        assert_eq!(plain, *f.as_formula());
        assert_ne!(Formula::new(vec![term("f_a"), term("f_b")]), *f.as_formula());
    }
}
