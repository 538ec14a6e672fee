// =============================================================================
// Columnar Input
// =============================================================================
//
// Observations arrive as named columns of equal length, the Rust counterpart
// of a structured (named-field) array. Columns are numeric (float or integer)
// or textual (UTF-8 strings or raw byte strings). Textual columns only ever
// feed factor indicators; a numeric design column cannot be read from them.
//
// Byte strings are decoded as Latin-1 before being compared with a level, so
// `b"caf\xe9"` matches the level "café" whichever way the data was stored.
//
// =============================================================================

use std::collections::BTreeMap;

use ndarray::Array1;

use crate::error::{FormularyError, Result};
use crate::symbolic::Level;

/// Values of named scalar parameters supplied at evaluation time.
pub type Params = BTreeMap<String, f64>;

/// One named column of observations.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Array1<f64>),
    Int(Array1<i64>),
    Text(Vec<String>),
    Bytes(Vec<Vec<u8>>),
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text or byte-string column?
    pub fn is_textual(&self) -> bool {
        matches!(self, Column::Text(_) | Column::Bytes(_))
    }

    /// Numeric values of the column.
    pub fn to_f64(&self, name: &str) -> Result<Array1<f64>> {
        match self {
            Column::Float(v) => Ok(v.clone()),
            Column::Int(v) => Ok(v.mapv(|x| x as f64)),
            Column::Text(_) | Column::Bytes(_) => Err(FormularyError::InvalidValue(format!(
                "column '{}' is textual and cannot be used as a numeric term",
                name
            ))),
        }
    }

    /// 0/1 indicator of `column == level`.
    ///
    /// Numeric columns only match integer levels, textual columns only match
    /// text levels; anything else is all zeros.
    pub fn indicator(&self, level: &Level) -> Array1<f64> {
        let hit = |b: bool| if b { 1.0 } else { 0.0 };
        match (self, level) {
            (Column::Float(v), Level::Int(l)) => v.mapv(|x| hit(x == *l as f64)),
            (Column::Int(v), Level::Int(l)) => v.mapv(|x| hit(x == *l)),
            (Column::Text(v), Level::Text(l)) => v.iter().map(|s| hit(s == l)).collect(),
            (Column::Bytes(v), Level::Text(l)) => v.iter().map(|b| hit(latin1(b) == *l)).collect(),
            _ => Array1::zeros(self.len()),
        }
    }

    /// Distinct values of the column as factor levels, sorted.
    ///
    /// Float columns must hold integral values.
    pub fn unique_levels(&self, name: &str) -> Result<Vec<Level>> {
        let mut levels: Vec<Level> = match self {
            Column::Float(v) => v
                .iter()
                .map(|&x| {
                    if x.is_finite() && x.fract() == 0.0 {
                        Ok(Level::Int(x as i64))
                    } else {
                        Err(FormularyError::InvalidValue(format!(
                            "column '{}' has non-integral value {} and cannot be a factor",
                            name, x
                        )))
                    }
                })
                .collect::<Result<_>>()?,
            Column::Int(v) => v.iter().map(|&x| Level::Int(x)).collect(),
            Column::Text(v) => v.iter().map(|s| Level::Text(s.clone())).collect(),
            Column::Bytes(v) => v.iter().map(|b| Level::Text(latin1(b))).collect(),
        };
        levels.sort();
        levels.dedup();
        Ok(levels)
    }
}

impl From<Array1<f64>> for Column {
    fn from(v: Array1<f64>) -> Self {
        Column::Float(v)
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::Float(Array1::from_vec(v))
    }
}

impl From<Array1<i64>> for Column {
    fn from(v: Array1<i64>) -> Self {
        Column::Int(v)
    }
}

impl From<Vec<i64>> for Column {
    fn from(v: Vec<i64>) -> Self {
        Column::Int(Array1::from_vec(v))
    }
}

impl From<Vec<String>> for Column {
    fn from(v: Vec<String>) -> Self {
        Column::Text(v)
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Column::Text(v.into_iter().map(String::from).collect())
    }
}

impl From<Vec<Vec<u8>>> for Column {
    fn from(v: Vec<Vec<u8>>) -> Self {
        Column::Bytes(v)
    }
}

/// Named, ordered columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Table::push_column`].
    pub fn with_column(mut self, name: &str, column: impl Into<Column>) -> Result<Self> {
        self.push_column(name, column)?;
        Ok(self)
    }

    /// Append (or replace) a column; its length must match the table's.
    pub fn push_column(&mut self, name: &str, column: impl Into<Column>) -> Result<()> {
        let column = column.into();
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(FormularyError::ShapeMismatch(format!(
                    "column '{}' has {} rows, table has {}",
                    name,
                    column.len(),
                    first.len()
                )));
            }
        }
        match self.names.iter().position(|n| n == name) {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name.to_string());
                self.columns.push(column);
            }
        }
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| FormularyError::MissingField(format!("no column named '{}'", name)))
    }

    /// Columns in order, paired with their names.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Fail unless every name in `required` is a column.
    pub fn require<'a>(&self, required: impl IntoIterator<Item = &'a String>) -> Result<()> {
        let missing: Vec<&str> = required
            .into_iter()
            .filter(|name| !self.contains(name))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FormularyError::MissingField(format!(
                "input lacks required field(s): {}",
                missing.join(", ")
            )))
        }
    }
}
