// =============================================================================
// Formulary Python Bindings
// =============================================================================
//
// This module creates the bridge between Rust and Python using PyO3.
// It wraps the pure Rust code from `formulary-core` and exposes it as
// a Python module that can be imported with `import formulary`.
//
// STRUCTURE:
// ----------
// - formula_py:       Formula, Factor and RandomEffects classes
// - design_matrix_py: dict ↔ Table conversion, from_table, contrasts
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
// 1. Implement the logic in `formulary-core` first
// 2. Create a Python wrapper here that calls the Rust code
// 3. Add it to the module in the `formulary` function at the bottom
//
// =============================================================================

use pyo3::prelude::*;

mod design_matrix_py;
mod formula_py;

use design_matrix_py::{contrast_from_cols_or_rows_py, formula_from_table_py};
use formula_py::{PyFactor, PyFormula, PyRandomEffects};

// =============================================================================
// Module Definition
// =============================================================================
//
// Everything added here with `m.add_class` or `m.add_function` becomes
// accessible from Python.
// =============================================================================

/// Formulary: regression formula algebra with a Rust backend
#[pymodule]
fn formulary(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyFormula>()?;
    m.add_class::<PyFactor>()?;
    m.add_class::<PyRandomEffects>()?;

    m.add_function(wrap_pyfunction!(formula_from_table_py, m)?)?;
    m.add_function(wrap_pyfunction!(contrast_from_cols_or_rows_py, m)?)?;

    Ok(())
}
