// =============================================================================
// Formula
// =============================================================================
//
// A Formula is an ordered list of symbolic terms. From it we derive:
//
//   mean         Σ coefficient(term) · term
//   params       every symbol of the mean that is not a regressor, sorted
//   design_expr  [∂mean/∂p for p in params]
//
// For a linear model the derivatives simply give back the terms. A nonlinear
// term such as exp(θ·t) keeps its nonlinearity as a design column, and θ
// becomes a parameter that has to be supplied at evaluation time.
//
// Coefficients are named `_{prefix}{i}`, where i is the position at which the
// term first occurs, so `[x, y, x, z]` gets `_b0, _b1, _b3`.
//
// The Formula itself is an immutable value. Compiling it for numeric
// evaluation is a separate, explicit step (`Formula::compile`, in `design`).
//
// =============================================================================

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::{FormularyError, Result};
use crate::symbolic::{Expr, Symbol};
use crate::table::Table;

use super::atoms::{coefficient, term};
use super::factor::Factor;

/// Default coefficient prefix of a Formula.
pub const DEFAULT_PREFIX: &str = "b";

/// Anything that can take part in formula algebra.
pub trait FormulaLike {
    fn as_formula(&self) -> &Formula;

    /// True for a categorical [`Factor`].
    fn is_factor(&self) -> bool {
        false
    }
}

/// Ordered collection of symbolic terms with a coefficient prefix.
#[derive(Debug, Clone)]
pub struct Formula {
    terms: Vec<Expr>,
    prefix: String,
}

impl Formula {
    pub fn new(terms: impl IntoIterator<Item = Expr>) -> Self {
        Self::with_prefix(terms, DEFAULT_PREFIX)
    }

    pub fn with_prefix(terms: impl IntoIterator<Item = Expr>, prefix: &str) -> Self {
        Formula {
            terms: terms.into_iter().collect(),
            prefix: prefix.to_string(),
        }
    }

    /// The formula with no terms; identity for `+` and `-`.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// The formula `[1]`.
    pub fn intercept() -> Self {
        Self::new(vec![Expr::one()])
    }

    pub fn terms(&self) -> &[Expr] {
        &self.terms
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// True when the only term is the constant 1.
    pub fn is_pure_intercept(&self) -> bool {
        self.terms.len() == 1 && self.terms[0].is_one()
    }

    // -------------------------------------------------------------------------
    // Derived expressions
    // -------------------------------------------------------------------------

    /// One coefficient per position; repeated terms share the coefficient
    /// minted at their first occurrence.
    fn coefficient_per_term(&self) -> Vec<Symbol> {
        let mut seen: HashMap<&Expr, Symbol> = HashMap::new();
        self.terms
            .iter()
            .enumerate()
            .map(|(i, t)| {
                seen.entry(t)
                    .or_insert_with(|| coefficient(&self.prefix, i, t))
                    .clone()
            })
            .collect()
    }

    /// Distinct terms with their coefficients, in first-seen order.
    pub fn coefficients(&self) -> Vec<(Expr, Symbol)> {
        let mut out: Vec<(Expr, Symbol)> = Vec::new();
        for (t, c) in self.terms.iter().zip(self.coefficient_per_term()) {
            if !out.iter().any(|(seen, _)| seen == t) {
                out.push((t.clone(), c));
            }
        }
        out
    }

    /// The coefficient bound to `term`, if the term is in the formula.
    pub fn coefficient(&self, term: &Expr) -> Option<Symbol> {
        self.coefficients()
            .into_iter()
            .find(|(t, _)| t == term)
            .map(|(_, c)| c)
    }

    /// Σ coefficient(term) · term.
    pub fn mean(&self) -> Expr {
        Expr::add(
            self.terms
                .iter()
                .zip(self.coefficient_per_term())
                .map(|(t, c)| Expr::mul([Expr::symbol(c), t.clone()]))
                .collect::<Vec<_>>(),
        )
    }

    /// Non-regressor symbols of the mean, in canonical order.
    pub fn params(&self) -> Vec<Symbol> {
        self.mean().params().into_iter().collect()
    }

    /// Partial derivatives of the mean, one per parameter.
    pub fn design_expr(&self) -> Vec<Expr> {
        let mean = self.mean();
        self.params().iter().map(|p| mean.diff(p)).collect()
    }

    /// Field names of the design matrix.
    pub fn design_names(&self) -> Vec<String> {
        self.design_expr().iter().map(|e| e.to_string()).collect()
    }

    /// Regressor atoms appearing anywhere in the mean.
    pub fn regressors(&self) -> BTreeSet<Symbol> {
        self.mean().terms()
    }

    /// The term whose printed form is `name`.
    pub fn get(&self, name: &str) -> Result<&Expr> {
        self.terms
            .iter()
            .find(|t| t.to_string() == name)
            .ok_or_else(|| FormularyError::InvalidValue(format!("term {} not found", name)))
    }

    /// Substitute `old` by `new` in every term.
    pub fn subs(&self, old: &Expr, new: &Expr) -> Formula {
        Formula::with_prefix(self.terms.iter().map(|t| t.subs(old, new)), &self.prefix)
    }

    // -------------------------------------------------------------------------
    // Algebra
    // -------------------------------------------------------------------------

    /// Concatenation of both term lists (duplicates kept).
    pub fn sum(&self, other: &impl FormulaLike) -> Formula {
        Formula::new(
            self.terms
                .iter()
                .chain(other.as_formula().terms.iter())
                .cloned()
                .collect::<Vec<_>>(),
        )
    }

    /// Terms of `self` that do not occur in `other`, order preserved.
    ///
    /// Every copy of a matching term is removed; terms of `other` missing
    /// from `self` are ignored.
    pub fn difference(&self, other: &impl FormulaLike) -> Formula {
        let unwanted: BTreeSet<&Expr> = other.as_formula().terms.iter().collect();
        Formula::new(
            self.terms
                .iter()
                .filter(|t| !unwanted.contains(t))
                .cloned()
                .collect::<Vec<_>>(),
        )
    }

    /// Pairwise products of the terms, deduplicated and sorted.
    pub fn product(&self, other: &impl FormulaLike) -> Formula {
        let mut products: BTreeSet<Expr> = BTreeSet::new();
        for s in &self.terms {
            for o in &other.as_formula().terms {
                // Term-aware product: a factor level times itself is itself.
                let p = if o.is_term() && !s.is_term() {
                    o * s
                } else {
                    s * o
                };
                products.insert(p);
            }
        }
        Formula::new(products)
    }

    // -------------------------------------------------------------------------
    // Construction from tabular input
    // -------------------------------------------------------------------------

    /// One sub-formula per column: a [`Factor`] for textual columns, a single
    /// term otherwise.
    ///
    /// `drop` names must all exist; a non-empty `keep` restricts the result
    /// to the listed columns.
    pub fn from_table(table: &Table, keep: &[&str], drop: &[&str]) -> Result<Formula> {
        let mut parts: Vec<(String, Formula)> = Vec::with_capacity(table.ncols());
        for (name, column) in table.iter() {
            let part = if column.is_textual() {
                Factor::from_column(column, name)?.as_formula().clone()
            } else {
                Formula::from(term(name))
            };
            parts.push((name.to_string(), part));
        }
        for d in drop {
            let idx = parts.iter().position(|(n, _)| n == d).ok_or_else(|| {
                FormularyError::MissingField(format!("cannot drop '{}': no such field", d))
            })?;
            parts.remove(idx);
        }

        Ok(parts
            .iter()
            .filter(|(n, _)| keep.is_empty() || keep.contains(&n.as_str()))
            .fold(Formula::empty(), |acc, (_, f)| acc.sum(f)))
    }
}

/// Product with the factor rule: a factor times itself is that factor.
pub(crate) fn multiply(lhs: &impl FormulaLike, rhs: &impl FormulaLike) -> Formula {
    if lhs.is_factor() && lhs.as_formula() == rhs.as_formula() {
        return lhs.as_formula().clone();
    }
    lhs.as_formula().product(rhs)
}

impl FormulaLike for Formula {
    fn as_formula(&self) -> &Formula {
        self
    }
}

impl From<Expr> for Formula {
    fn from(term: Expr) -> Self {
        Formula::new(vec![term])
    }
}

/// Positional comparison of the term lists; the prefix is not compared.
impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        self.terms == other.terms
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.terms.iter().map(|t| t.to_string()).collect();
        write!(f, "Formula([{}])", terms.join(", "))
    }
}

// =============================================================================
// Operators
// =============================================================================

macro_rules! impl_formula_ops {
    ($lhs:ty) => {
        impl<R: $crate::formula::FormulaLike> std::ops::Add<&R> for &$lhs {
            type Output = $crate::formula::Formula;
            fn add(self, rhs: &R) -> Self::Output {
                $crate::formula::FormulaLike::as_formula(self).sum(rhs)
            }
        }

        impl<R: $crate::formula::FormulaLike> std::ops::Sub<&R> for &$lhs {
            type Output = $crate::formula::Formula;
            fn sub(self, rhs: &R) -> Self::Output {
                $crate::formula::FormulaLike::as_formula(self).difference(rhs)
            }
        }

        impl<R: $crate::formula::FormulaLike> std::ops::Mul<&R> for &$lhs {
            type Output = $crate::formula::Formula;
            fn mul(self, rhs: &R) -> Self::Output {
                $crate::formula::algebra::multiply(self, rhs)
            }
        }
    };
}

pub(crate) use impl_formula_ops;

impl_formula_ops!(Formula);

impl std::ops::Add for Formula {
    type Output = Formula;
    fn add(self, rhs: Formula) -> Formula {
        self.sum(&rhs)
    }
}

impl std::ops::Sub for Formula {
    type Output = Formula;
    fn sub(self, rhs: Formula) -> Formula {
        self.difference(&rhs)
    }
}

impl std::ops::Mul for Formula {
    type Output = Formula;
    fn mul(self, rhs: Formula) -> Formula {
        self.product(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{factor_term, parameter, terms};

    fn xyz() -> (Expr, Expr, Expr) {
        let v = terms("x y z");
        (v[0].clone(), v[1].clone(), v[2].clone())
    }

    #[test]
    fn test_mean_has_one_coefficient_per_term() {
        let (x, y, _) = xyz();
        let f = Formula::new(vec![x.clone(), y.clone()]);
        let params = f.params();
        assert_eq!(params.len(), 2);
        assert_eq!(f.mean().diff(&params[0]), x);
        assert_eq!(f.mean().diff(&params[1]), y);
        assert_eq!(f.design_expr(), vec![x, y]);
    }

    #[test]
    fn test_coefficient_index_is_first_position() {
        let (x, y, z) = xyz();
        let f = Formula::new(vec![x.clone(), y, x.clone(), z.clone()]);
        let names: Vec<String> = f.coefficients().iter().map(|(_, c)| c.name()).collect();
        assert_eq!(names, vec!["_b0", "_b1", "_b3"]);
        assert_eq!(f.coefficient(&z).map(|c| c.name()), Some("_b3".to_string()));
        // Repeated term still contributes a single design column.
        assert_eq!(f.design_expr().len(), 3);
    }

    #[test]
    fn test_nonlinear_term_keeps_parameter() {
        let t = crate::formula::term("t");
        let theta = parameter("theta");
        let f = Formula::new(vec![(&theta * &t).exp()]);
        let names = f.design_names();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], "exp(t*theta)");
        assert_eq!(names[1], "_b0*t*exp(t*theta)");
    }

    #[test]
    fn test_sum_keeps_duplicates() {
        let (x, y, z) = xyz();
        let f1 = Formula::new(vec![x.clone(), y.clone(), z.clone()]);
        let f2 = &Formula::from(y.clone()) + &Formula::intercept();
        let f3 = &f1 + &f2;
        assert_eq!(f3.terms(), &[x, y.clone(), z, y, Expr::one()]);
    }

    #[test]
    fn test_difference() {
        let (x, y, z) = xyz();
        let f1 = Formula::new(vec![x.clone(), y.clone(), z.clone()]);
        let f2 = &Formula::from(y) + &Formula::intercept();
        assert_eq!(&f1 - &f2, Formula::new(vec![x, z]));
        assert_eq!(&f2 - &f1, Formula::intercept());

        let (x, y, _) = xyz();
        let repeated = Formula::new(vec![x.clone(), x.clone(), y.clone()]);
        assert_eq!(&repeated - &Formula::from(x), Formula::from(y));
    }

    #[test]
    fn test_empty_is_identity() {
        let (x, y, _) = xyz();
        let f = Formula::new(vec![x, y]);
        assert_eq!(&Formula::empty() + &f, f);
        assert_eq!(&f - &Formula::empty(), f);
    }

    #[test]
    fn test_product_is_pairwise_and_sorted() {
        let (x, y, z) = xyz();
        let f = &Formula::new(vec![x.clone(), y.clone()]) * &Formula::new(vec![z.clone(), Expr::one()]);
        let mut expected = vec![&x * &z, &y * &z, x, y];
        expected.sort();
        assert_eq!(f.terms(), expected.as_slice());
    }

    #[test]
    fn test_product_collapses_factor_levels() {
        let a = factor_term("f", "a");
        let f = &Formula::from(a.clone()) * &Formula::from(a.clone());
        assert_eq!(f.terms(), &[a]);
    }

    #[test]
    fn test_equality_is_positional() {
        let (x, y, _) = xyz();
        assert_ne!(Formula::new(vec![x.clone(), y.clone()]), Formula::new(vec![y.clone(), x.clone()]));
        assert_eq!(
            Formula::with_prefix(vec![x.clone()], "c"),
            Formula::new(vec![x])
        );
    }

    #[test]
    fn test_get_and_subs() {
        let (x, y, _) = xyz();
        let f = Formula::new(vec![x.clone(), &x * &y]);
        assert_eq!(f.get("x*y").unwrap(), &(&x * &y));
        assert!(f.get("w").is_err());

        let g = f.subs(&y, &Expr::int(2));
        assert_eq!(g.terms()[1], Expr::mul([Expr::int(2), x]));
        assert_eq!(g.to_string(), "Formula([x, 2*x])");
    }

    #[test]
    fn test_from_table() {
        let table = Table::new()
            .with_column("x", vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_column("g", vec!["a", "b", "a"])
            .unwrap()
            .with_column("w", vec![1i64, 1, 2])
            .unwrap();

        let f = Formula::from_table(&table, &[], &[]).unwrap();
        let names: Vec<String> = f.terms().iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["x", "g_a", "g_b", "w"]);

        let f = Formula::from_table(&table, &[], &["w"]).unwrap();
        assert_eq!(f.len(), 3);

        let f = Formula::from_table(&table, &["g"], &[]).unwrap();
        assert_eq!(f.len(), 2);

        assert!(Formula::from_table(&table, &[], &["nope"]).is_err());
    }
}
