// =============================================================================
// Design Matrix Functions (Python Bindings)
// =============================================================================
//
// Conversions between Python inputs and the core `Table` / `Params` types,
// plus the free-standing design and contrast functions.
//
// Observations arrive as a dict mapping field name to column. A column may be
// a float or integer numpy array, a list of str, or a list of bytes.
// =============================================================================

use std::collections::BTreeMap;

use numpy::{IntoPyArray, PyArrayDyn, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use formulary_core::contrast::contrast_from_cols_or_rows;
use formulary_core::{Column, FormularyError, Params, Table};

use crate::formula_py::PyFormula;

/// Map a library error onto Python's ValueError.
pub(crate) fn to_py_err(e: FormularyError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn column_from_py(name: &str, value: &Bound<'_, PyAny>) -> PyResult<Column> {
    if let Ok(arr) = value.extract::<PyReadonlyArray1<f64>>() {
        return Ok(Column::from(arr.as_array().to_owned()));
    }
    if let Ok(arr) = value.extract::<PyReadonlyArray1<i64>>() {
        return Ok(Column::from(arr.as_array().to_owned()));
    }
    if let Ok(strings) = value.extract::<Vec<String>>() {
        return Ok(Column::from(strings));
    }
    if let Ok(bytes) = value.extract::<Vec<Vec<u8>>>() {
        return Ok(Column::from(bytes));
    }
    if let Ok(floats) = value.extract::<Vec<f64>>() {
        return Ok(Column::from(floats));
    }
    Err(PyTypeError::new_err(format!(
        "column '{}' must be a 1-d float or int array, or a list of str or bytes",
        name
    )))
}

/// Build a `Table` from a dict of columns, keeping the dict's order.
pub(crate) fn table_from_dict(obs: &Bound<'_, PyDict>) -> PyResult<Table> {
    let mut table = Table::new();
    for (key, value) in obs.iter() {
        let name: String = key.extract()?;
        let column = column_from_py(&name, &value)?;
        table.push_column(&name, column).map_err(to_py_err)?;
    }
    Ok(table)
}

/// Parameter values from an optional `{name: float}` dict.
pub(crate) fn params_from_dict(params: Option<&Bound<'_, PyDict>>) -> PyResult<Option<Params>> {
    params.map(|d| d.extract::<BTreeMap<String, f64>>()).transpose()
}

/// Build a formula with one term per field of `obs`.
///
/// Text and bytes columns become factors over their distinct values.
///
/// Parameters
/// ----------
/// obs : dict[str, array | list]
///     Observations, one entry per field
/// keep : list[str], optional
///     Only these fields (default: all)
/// drop : list[str], optional
///     Fields to leave out
#[pyfunction]
#[pyo3(signature = (obs, keep=None, drop=None))]
pub fn formula_from_table_py(
    obs: &Bound<'_, PyDict>,
    keep: Option<Vec<String>>,
    drop: Option<Vec<String>>,
) -> PyResult<PyFormula> {
    let table = table_from_dict(obs)?;
    let keep = keep.unwrap_or_default();
    let drop = drop.unwrap_or_default();
    let keep: Vec<&str> = keep.iter().map(String::as_str).collect();
    let drop: Vec<&str> = drop.iter().map(String::as_str).collect();
    let inner = formulary_core::Formula::from_table(&table, &keep, &drop).map_err(to_py_err)?;
    Ok(PyFormula::from(inner))
}

/// Contrast matrix for `l` against design `d`.
///
/// `l` is either n × k (columns in the span of the design) or m × p
/// (rows of coefficient combinations). Length-one axes are dropped.
///
/// Parameters
/// ----------
/// l : numpy.ndarray
///     Candidate contrast, 2-d
/// d : numpy.ndarray
///     Design matrix (n × p)
/// pseudo : numpy.ndarray, optional
///     Precomputed pseudo-inverse of `d` (p × n)
#[pyfunction]
#[pyo3(signature = (l, d, pseudo=None))]
pub fn contrast_from_cols_or_rows_py<'py>(
    py: Python<'py>,
    l: PyReadonlyArray2<f64>,
    d: PyReadonlyArray2<f64>,
    pseudo: Option<PyReadonlyArray2<f64>>,
) -> PyResult<Bound<'py, PyArrayDyn<f64>>> {
    let l = l.as_array().to_owned();
    let d = d.as_array().to_owned();
    let pseudo = pseudo.map(|p| p.as_array().to_owned());
    let c = contrast_from_cols_or_rows(&l, &d, pseudo.as_ref()).map_err(to_py_err)?;
    Ok(c.into_pyarray_bound(py))
}
