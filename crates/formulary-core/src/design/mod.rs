// =============================================================================
// Design Matrices
// =============================================================================
//
// Turning a Formula into numbers happens in two explicit phases:
//
//   1. `Formula::compile()` differentiates the mean, renames every symbol to
//      a positional placeholder, compiles the design expression to bytecode
//      and derives the input schemas. The result, `CompiledFormula`, is an
//      immutable value meant to be built once and reused.
//
//   2. `CompiledFormula::design(observations, params, config)` evaluates it
//      over a Table of observations (plus optional scalar parameters).
//
// SCHEMAS
// -------
//   param    non-regressor symbols left in the design expression (e.g. θ)
//   term     every regressor; factor levels appear as `factor_level`
//   preterm  the raw input columns; all levels of a factor collapse to the
//            factor's own column name
//
// =============================================================================

mod arena;
mod compiled;

pub use arena::SlotArena;
pub use compiled::CompiledFormula;

use ndarray::{Array2, ArrayD, ArrayView1};

use crate::formula::Formula;
use crate::symbolic::Expr;

/// Evaluation settings.
#[derive(Debug, Clone, Default)]
pub struct DesignConfig {
    /// Return a squeezed float array instead of named columns.
    pub return_float: bool,
}

impl DesignConfig {
    pub fn float() -> Self {
        DesignConfig { return_float: true }
    }
}

/// Field names expected at each boundary of the evaluator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schemas {
    pub param: Vec<String>,
    pub term: Vec<String>,
    pub preterm: Vec<String>,
}

/// Design matrix with one named field per column.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedDesign {
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

impl NamedDesign {
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|j| self.values.column(j))
    }
}

/// Result of a design evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Design {
    Named(NamedDesign),
    Float(ArrayD<f64>),
}

impl Design {
    /// Plain values (n × k for named designs, squeezed for float ones).
    pub fn into_float(self) -> ArrayD<f64> {
        match self {
            Design::Named(named) => named.values.into_dyn(),
            Design::Float(values) => values,
        }
    }

    pub fn names(&self) -> Option<&[String]> {
        match self {
            Design::Named(named) => Some(&named.names),
            Design::Float(_) => None,
        }
    }
}

/// A contrast request: a formula whose design supplies the candidate matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum ContrastSpec {
    Formula(Formula),
    Expr(Expr),
}

impl ContrastSpec {
    pub fn to_formula(&self) -> Formula {
        match self {
            ContrastSpec::Formula(f) => f.clone(),
            ContrastSpec::Expr(e) => Formula::from(e.clone()),
        }
    }
}

impl From<Formula> for ContrastSpec {
    fn from(f: Formula) -> Self {
        ContrastSpec::Formula(f)
    }
}

impl From<Expr> for ContrastSpec {
    fn from(e: Expr) -> Self {
        ContrastSpec::Expr(e)
    }
}
