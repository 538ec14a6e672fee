// =============================================================================
// Formulae
// =============================================================================
//
// Regression models as algebra on symbolic terms:
//
//   - atoms:          Term / FactorTerm / Coefficient atoms and predicates
//   - algebra:        Formula, its derived expressions and the + - * algebra
//   - factor:         categorical variables (one indicator per level)
//   - random_effects: terms with a covariance, giving D · Σ · Dᵗ
//
// Example: the model `x1 + x3 + x1:x3 + 1`
//
//     let (x1, x3) = (term("x1"), term("x3"));
//     let f = &Formula::new(vec![x1.clone(), x3.clone(), &x1 * &x3]) + &Formula::intercept();
//     f.design_names()  // ["x1", "x3", "x1*x3", "1"]
//
// =============================================================================

pub(crate) mod algebra;
mod atoms;
mod factor;
mod random_effects;

pub use algebra::{Formula, FormulaLike, DEFAULT_PREFIX};
pub use atoms::{
    coefficient, factor_term, is_factor_term, is_term, parameter, term, terms,
};
pub use factor::Factor;
pub use random_effects::{Covariance, RandomEffects, RANDOM_EFFECTS_PREFIX};
