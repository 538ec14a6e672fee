// =============================================================================
// Formula Algebra (Python Bindings)
// =============================================================================
//
// Wraps Formula, Factor and RandomEffects. Terms cross the boundary as their
// printed form ("x1*x3", "f_a - f_c"); designs and contrasts come back as
// numpy arrays.
//
// Any of the three classes can appear on either side of `+`, `-` and `*`;
// the result is always a Formula.
// =============================================================================

use std::collections::BTreeMap;

use numpy::{IntoPyArray, PyReadonlyArray2};
use pyo3::exceptions::PyTypeError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use formulary_core::{
    term, ContrastSpec, Covariance, Design, DesignConfig, Expr, Factor, Formula, FormulaLike,
    Level, RandomEffects,
};

use crate::design_matrix_py::{params_from_dict, table_from_dict, to_py_err};

/// Whitespace or comma separated names; `1` stands for the intercept.
fn parse_terms(names: &str) -> Vec<Expr> {
    names
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| if s == "1" { Expr::one() } else { term(s) })
        .collect()
}

fn term_strings(formula: &Formula) -> Vec<String> {
    formula.terms().iter().map(|t| t.to_string()).collect()
}

fn covariance_to_py(py: Python<'_>, cov: Covariance) -> PyObject {
    match cov {
        Covariance::Numeric(m) => m.into_pyarray_bound(py).into_py(py),
        Covariance::Symbolic(m) => m
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|e| e.to_string()).collect::<Vec<_>>())
            .collect::<Vec<_>>()
            .into_py(py),
    }
}

// =============================================================================
// Operands
// =============================================================================

enum Operand {
    Formula(Formula),
    Factor(Factor),
    Random(RandomEffects),
}

fn operand(other: &Bound<'_, PyAny>) -> PyResult<Operand> {
    if let Ok(f) = other.extract::<PyRef<PyFormula>>() {
        return Ok(Operand::Formula(f.inner.clone()));
    }
    if let Ok(f) = other.extract::<PyRef<PyFactor>>() {
        return Ok(Operand::Factor(f.inner.clone()));
    }
    if let Ok(r) = other.extract::<PyRef<PyRandomEffects>>() {
        return Ok(Operand::Random(r.inner.clone()));
    }
    Err(PyTypeError::new_err(
        "formulae can only be combined with Formula, Factor or RandomEffects",
    ))
}

macro_rules! combine {
    ($lhs:expr, $other:expr, $op:tt) => {
        PyFormula::from(match operand($other)? {
            Operand::Formula(f) => $lhs $op &f,
            Operand::Factor(f) => $lhs $op &f,
            Operand::Random(r) => $lhs $op &r,
        })
    };
}

// =============================================================================
// Formula
// =============================================================================

/// Ordered collection of symbolic terms.
///
/// Parameters
/// ----------
/// terms : str, optional
///     Term names separated by commas or whitespace; "1" is the intercept
/// prefix : str
///     Coefficient prefix (coefficients are named `_{prefix}{i}`)
#[pyclass(name = "Formula")]
#[derive(Clone)]
pub struct PyFormula {
    pub(crate) inner: Formula,
}

impl From<Formula> for PyFormula {
    fn from(inner: Formula) -> Self {
        Self { inner }
    }
}

#[pymethods]
impl PyFormula {
    #[new]
    #[pyo3(signature = (terms=None, prefix="b"))]
    fn new(terms: Option<&str>, prefix: &str) -> Self {
        let terms = terms.map(parse_terms).unwrap_or_default();
        Self::from(Formula::with_prefix(terms, prefix))
    }

    /// The formula holding only the constant term.
    #[staticmethod]
    fn intercept() -> Self {
        Self::from(Formula::intercept())
    }

    #[getter]
    fn terms(&self) -> Vec<String> {
        term_strings(&self.inner)
    }

    #[getter]
    fn prefix(&self) -> &str {
        self.inner.prefix()
    }

    /// Mean function: the sum of coefficient × term.
    #[getter]
    fn mean(&self) -> String {
        self.inner.mean().to_string()
    }

    /// Free symbols of the mean that are not regressors, sorted.
    #[getter]
    fn params(&self) -> Vec<String> {
        self.inner.params().iter().map(|p| p.name()).collect()
    }

    /// (term, coefficient name) pairs in term order.
    #[getter]
    fn coefficients(&self) -> Vec<(String, String)> {
        self.inner
            .coefficients()
            .into_iter()
            .map(|(t, c)| (t.to_string(), c.name()))
            .collect()
    }

    /// Derivatives of the mean with respect to each parameter.
    #[getter]
    fn design_expr(&self) -> Vec<String> {
        self.inner.design_expr().iter().map(|e| e.to_string()).collect()
    }

    #[getter]
    fn design_names(&self) -> Vec<String> {
        self.inner.design_names()
    }

    /// Names of the regressor variables the design reads.
    #[getter]
    fn regressors(&self) -> Vec<String> {
        self.inner.regressors().iter().map(|s| s.name()).collect()
    }

    /// Evaluate the design over `obs`.
    ///
    /// Returns `(matrix, names)` by default, or a squeezed float array when
    /// `return_float` is true.
    #[pyo3(signature = (obs, params=None, return_float=false))]
    fn design(
        &self,
        py: Python<'_>,
        obs: &Bound<'_, PyDict>,
        params: Option<&Bound<'_, PyDict>>,
        return_float: bool,
    ) -> PyResult<PyObject> {
        let table = table_from_dict(obs)?;
        let params = params_from_dict(params)?;
        let config = DesignConfig { return_float };
        let design = self
            .inner
            .design(&table, params.as_ref(), &config)
            .map_err(to_py_err)?;
        Ok(match design {
            Design::Named(named) => (named.values.into_pyarray_bound(py), named.names).into_py(py),
            Design::Float(values) => values.into_pyarray_bound(py).into_py(py),
        })
    }

    /// Squeezed float design together with one contrast per entry of
    /// `contrasts` (a dict of Formula).
    #[pyo3(signature = (obs, contrasts, params=None))]
    fn design_with_contrasts<'py>(
        &self,
        py: Python<'py>,
        obs: &Bound<'py, PyDict>,
        contrasts: BTreeMap<String, PyFormula>,
        params: Option<&Bound<'py, PyDict>>,
    ) -> PyResult<(PyObject, Bound<'py, PyDict>)> {
        let table = table_from_dict(obs)?;
        let params = params_from_dict(params)?;
        let specs: BTreeMap<String, ContrastSpec> = contrasts
            .into_iter()
            .map(|(name, f)| (name, ContrastSpec::from(f.inner)))
            .collect();
        let (d, matrices) = self
            .inner
            .compile()
            .and_then(|c| c.design_with_contrasts(&table, params.as_ref(), &specs))
            .map_err(to_py_err)?;

        let out = PyDict::new_bound(py);
        for (name, m) in matrices {
            out.set_item(name, m.into_pyarray_bound(py))?;
        }
        Ok((d.into_pyarray_bound(py).into_py(py), out))
    }

    fn __add__(&self, other: &Bound<'_, PyAny>) -> PyResult<PyFormula> {
        Ok(combine!(&self.inner, other, +))
    }

    fn __sub__(&self, other: &Bound<'_, PyAny>) -> PyResult<PyFormula> {
        Ok(combine!(&self.inner, other, -))
    }

    fn __mul__(&self, other: &Bound<'_, PyAny>) -> PyResult<PyFormula> {
        Ok(combine!(&self.inner, other, *))
    }

    /// Positional comparison of terms against any Formula, Factor or
    /// RandomEffects; anything else compares unequal.
    fn __eq__(&self, other: &Bound<'_, PyAny>) -> bool {
        match operand(other) {
            Ok(Operand::Formula(f)) => self.inner == f,
            Ok(Operand::Factor(f)) => self.inner == *f.as_formula(),
            Ok(Operand::Random(r)) => self.inner == *r.as_formula(),
            Err(_) => false,
        }
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        self.inner.to_string()
    }
}

// =============================================================================
// Factor
// =============================================================================

/// Categorical variable with one indicator term per level.
///
/// Parameters
/// ----------
/// name : str
///     Field name in the observations
/// levels : list[int] | list[str]
///     Level values; sorted and deduplicated
#[pyclass(name = "Factor")]
#[derive(Clone)]
pub struct PyFactor {
    inner: Factor,
}

#[pymethods]
impl PyFactor {
    #[new]
    #[pyo3(signature = (name, levels, prefix="b"))]
    fn new(name: &str, levels: &Bound<'_, PyAny>, prefix: &str) -> PyResult<Self> {
        let levels: Vec<Level> = if let Ok(ints) = levels.extract::<Vec<i64>>() {
            ints.into_iter().map(Level::from).collect()
        } else {
            levels
                .extract::<Vec<String>>()?
                .into_iter()
                .map(Level::from)
                .collect()
        };
        let inner = Factor::with_prefix(name, levels, prefix).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[getter]
    fn name(&self) -> &str {
        self.inner.name()
    }

    #[getter]
    fn levels(&self, py: Python<'_>) -> Vec<PyObject> {
        self.inner
            .levels()
            .iter()
            .map(|l| match l {
                Level::Int(n) => (*n).into_py(py),
                Level::Text(s) => s.as_str().into_py(py),
            })
            .collect()
    }

    #[getter]
    fn formula(&self) -> PyFormula {
        PyFormula::from(self.inner.formula().clone())
    }

    #[getter]
    fn terms(&self) -> Vec<String> {
        term_strings(self.inner.formula())
    }

    /// Printed form of the indicator for `level`.
    fn get_term(&self, level: &Bound<'_, PyAny>) -> PyResult<String> {
        let level = match level.extract::<i64>() {
            Ok(n) => Level::from(n),
            Err(_) => Level::from(level.extract::<String>()?),
        };
        Ok(self.inner.get_term(&level).map_err(to_py_err)?.to_string())
    }

    /// Deviations of every level from the `reference` level (default: last).
    #[pyo3(signature = (reference=-1))]
    fn main_effect(&self, reference: isize) -> PyResult<PyFormula> {
        self.inner
            .main_effect_with_reference(reference)
            .map(PyFormula::from)
            .map_err(to_py_err)
    }

    /// The indicators with coefficients named after `variable`.
    fn stratify(&self, variable: &str) -> PyResult<PyFormula> {
        self.inner
            .stratify(variable)
            .map(PyFormula::from)
            .map_err(to_py_err)
    }

    fn __add__(&self, other: &Bound<'_, PyAny>) -> PyResult<PyFormula> {
        Ok(combine!(&self.inner, other, +))
    }

    fn __sub__(&self, other: &Bound<'_, PyAny>) -> PyResult<PyFormula> {
        Ok(combine!(&self.inner, other, -))
    }

    fn __mul__(&self, other: &Bound<'_, PyAny>) -> PyResult<PyFormula> {
        Ok(combine!(&self.inner, other, *))
    }

    fn __len__(&self) -> usize {
        self.inner.levels().len()
    }

    fn __repr__(&self) -> String {
        let levels: Vec<String> = self.inner.levels().iter().map(|l| l.to_string()).collect();
        format!("Factor('{}', [{}])", self.inner.name(), levels.join(", "))
    }
}

// =============================================================================
// Random Effects
// =============================================================================

/// Random-effect terms with a covariance matrix.
///
/// Parameters
/// ----------
/// terms : str
///     Term names separated by commas or whitespace
/// sigma : numpy.ndarray, optional
///     q × q covariance; a free diagonal of parameters when omitted
#[pyclass(name = "RandomEffects")]
#[derive(Clone)]
pub struct PyRandomEffects {
    inner: RandomEffects,
}

#[pymethods]
impl PyRandomEffects {
    #[new]
    #[pyo3(signature = (terms, sigma=None))]
    fn new(terms: &str, sigma: Option<PyReadonlyArray2<f64>>) -> PyResult<Self> {
        let sigma = sigma.map(|s| Covariance::from(s.as_array().to_owned()));
        let inner = RandomEffects::new(parse_terms(terms), sigma).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// From a Factor's indicator terms.
    #[staticmethod]
    #[pyo3(signature = (factor, sigma=None))]
    fn from_factor(factor: PyRef<PyFactor>, sigma: Option<PyReadonlyArray2<f64>>) -> PyResult<Self> {
        let sigma = sigma.map(|s| Covariance::from(s.as_array().to_owned()));
        let terms = factor.inner.formula().terms().to_vec();
        let inner = RandomEffects::new(terms, sigma).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[getter]
    fn terms(&self) -> Vec<String> {
        term_strings(self.inner.formula())
    }

    #[getter]
    fn formula(&self) -> PyFormula {
        PyFormula::from(self.inner.formula().clone())
    }

    /// The covariance: a float array, or nested lists of expressions.
    #[getter]
    fn sigma(&self, py: Python<'_>) -> PyObject {
        covariance_to_py(py, self.inner.sigma().clone())
    }

    /// `D · Σ · Dᵗ` over `obs`.
    #[pyo3(signature = (obs, params=None))]
    fn cov(
        &self,
        py: Python<'_>,
        obs: &Bound<'_, PyDict>,
        params: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<PyObject> {
        let table = table_from_dict(obs)?;
        let params = params_from_dict(params)?;
        let cov = self.inner.cov(&table, params.as_ref()).map_err(to_py_err)?;
        Ok(covariance_to_py(py, cov))
    }

    fn __add__(&self, other: &Bound<'_, PyAny>) -> PyResult<PyFormula> {
        Ok(combine!(&self.inner, other, +))
    }

    fn __sub__(&self, other: &Bound<'_, PyAny>) -> PyResult<PyFormula> {
        Ok(combine!(&self.inner, other, -))
    }

    fn __mul__(&self, other: &Bound<'_, PyAny>) -> PyResult<PyFormula> {
        Ok(combine!(&self.inner, other, *))
    }

    fn __repr__(&self) -> String {
        format!("RandomEffects({})", term_strings(self.inner.formula()).join(", "))
    }
}
