// =============================================================================
// Formulary Core Library
// =============================================================================
//
// Pure Rust formula algebra and design-matrix construction. The Python
// bindings live in the `formulary` crate; nothing here knows about Python.
//
// STRUCTURE:
// ----------
//   - symbolic:  expression engine (canonical trees, derivatives, bytecode)
//   - formula:   Term / FactorTerm / Coefficient, Formula, Factor,
//                RandomEffects
//   - design:    compiled evaluator and design-matrix pipeline
//   - contrast:  estimable, full-rank contrasts from a design matrix
//   - table:     columnar input (named float, integer and text columns)
//   - convert:   ndarray ↔ nalgebra helpers (pinv, rank, full-rank basis)
//   - error:     error type used throughout the library
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
//   1. Add it to the appropriate module (or create a new one)
//   2. Write tests in that module (see existing tests for examples)
//   3. Re-export public items here so users can access them easily
//   4. Update the Python bindings in the `formulary` crate
//
// =============================================================================

pub mod contrast;
pub mod convert;
pub mod design;
pub mod error;
pub mod formula;
pub mod symbolic;
pub mod table;

pub use contrast::{contrast_from_cols_or_rows, derive_contrast, Contrast, ContrastConfig};
pub use design::{CompiledFormula, ContrastSpec, Design, DesignConfig, NamedDesign, Schemas};
pub use error::{FormularyError, Result};
pub use formula::{
    factor_term, parameter, term, terms, Covariance, Factor, Formula, FormulaLike, RandomEffects,
};
pub use symbolic::{Expr, Level, Symbol};
pub use table::{Column, Params, Table};
