//! The compiled evaluator of a Formula's design.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array1, Array2, ArrayD};

use crate::contrast::{derive_contrast, Contrast, ContrastConfig};
use crate::convert::{pinv, squeeze};
use crate::error::{FormularyError, Result};
use crate::formula::Formula;
use crate::symbolic::{compile_all, CompiledExprs, Expr, Symbol, Value};
use crate::table::{Params, Table};

use super::{ContrastSpec, Design, DesignConfig, NamedDesign, Schemas, SlotArena};

/// Field name of the column returned for a pure-intercept formula.
pub const INTERCEPT_NAME: &str = "intercept";

/// A Formula compiled for numeric evaluation.
#[derive(Debug, Clone)]
pub struct CompiledFormula {
    design_expr: Vec<Expr>,
    names: Vec<String>,
    arena: SlotArena,
    program: CompiledExprs,
    schemas: Schemas,
    pure_intercept: bool,
}

impl CompiledFormula {
    pub fn new(formula: &Formula) -> Result<Self> {
        let design_expr = formula.design_expr();
        let terms: Vec<Symbol> = formula.regressors().into_iter().collect();
        let params: BTreeSet<Symbol> = design_expr.iter().flat_map(Expr::params).collect();
        let arena = SlotArena::new(params.into_iter().collect(), terms);

        let renaming = arena.renaming();
        let renamed: Vec<Expr> = design_expr.iter().map(|e| e.substitute(&renaming)).collect();
        let program = compile_all(&renamed, &arena.positions())?;

        let mut preterm: Vec<String> = Vec::new();
        for t in arena.terms() {
            if let Some(name) = t.input_name() {
                if !preterm.contains(&name) {
                    preterm.push(name);
                }
            }
        }
        let schemas = Schemas {
            param: arena.params().iter().map(Symbol::name).collect(),
            term: arena.terms().iter().map(Symbol::name).collect(),
            preterm,
        };

        log::debug!(
            "compiled formula: {} design columns ({} expression nodes), {} parameters, {} regressors",
            design_expr.len(),
            renamed.iter().map(Expr::node_count).sum::<usize>(),
            schemas.param.len(),
            schemas.term.len()
        );

        Ok(CompiledFormula {
            names: design_expr.iter().map(|e| e.to_string()).collect(),
            design_expr,
            arena,
            program,
            schemas,
            pure_intercept: formula.is_pure_intercept(),
        })
    }

    pub fn design_expr(&self) -> &[Expr] {
        &self.design_expr
    }

    /// Field names of the design matrix.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    fn validate(&self, observations: &Table, params: Option<&Params>) -> Result<()> {
        observations.require(&self.schemas.preterm)?;
        if let Some(params) = params {
            let missing: Vec<&str> = self
                .schemas
                .param
                .iter()
                .filter(|p| !params.contains_key(*p))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(FormularyError::MissingField(format!(
                    "parameters lack required field(s): {}",
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn regressor_column(&self, symbol: &Symbol, observations: &Table) -> Result<Array1<f64>> {
        match symbol {
            Symbol::Term(name) => observations.column(name)?.to_f64(name),
            Symbol::FactorTerm { factor, level } => Ok(observations.column(factor)?.indicator(level)),
            other => Err(FormularyError::Evaluation(format!(
                "{} is not a regressor",
                other
            ))),
        }
    }

    fn evaluate(&self, observations: &Table, params: Option<&Params>) -> Result<Array2<f64>> {
        if self.schemas.term.is_empty() {
            return Err(FormularyError::UndefinedShape(
                "none of the terms of the formula is a regressor; shape of the design is undefined"
                    .to_string(),
            ));
        }
        let n = observations.nrows();
        log::trace!("evaluating {} design columns over {} rows", self.names.len(), n);

        let mut inputs: Vec<Value> = Vec::with_capacity(self.arena.len());
        for p in self.arena.params() {
            let name = p.name();
            let value = params.and_then(|m| m.get(&name)).ok_or_else(|| {
                FormularyError::MissingField(format!("no value supplied for parameter {}", name))
            })?;
            inputs.push(Value::Scalar(*value));
        }
        for t in self.arena.terms() {
            inputs.push(Value::Column(self.regressor_column(t, observations)?));
        }

        let outputs = self.program.eval(&inputs)?;
        let mut d = Array2::zeros((n, outputs.len()));
        for (j, value) in outputs.into_iter().enumerate() {
            if let Value::Scalar(s) = value {
                log::trace!("broadcasting constant column {} ({}) to {} rows", self.names[j], s, n);
            }
            d.column_mut(j).assign(&value.into_column(n)?);
        }
        Ok(d)
    }

    /// The n × k design matrix, never squeezed.
    pub fn design_matrix(&self, observations: &Table, params: Option<&Params>) -> Result<Array2<f64>> {
        self.validate(observations, params)?;
        if self.pure_intercept {
            return Ok(Array2::ones((observations.nrows(), 1)));
        }
        self.evaluate(observations, params)
    }

    /// Evaluate the design over `observations`.
    pub fn design(
        &self,
        observations: &Table,
        params: Option<&Params>,
        config: &DesignConfig,
    ) -> Result<Design> {
        self.validate(observations, params)?;
        if self.pure_intercept {
            let n = observations.nrows();
            return Ok(if config.return_float {
                Design::Float(Array1::<f64>::ones(n).into_dyn())
            } else {
                Design::Named(NamedDesign {
                    names: vec![INTERCEPT_NAME.to_string()],
                    values: Array2::ones((n, 1)),
                })
            });
        }

        let values = self.evaluate(observations, params)?;
        if config.return_float {
            Ok(Design::Float(squeeze(&values.into_dyn())?))
        } else {
            Ok(Design::Named(NamedDesign {
                names: self.names.clone(),
                values,
            }))
        }
    }

    /// Design matrix plus one derived contrast per named request.
    ///
    /// Each request's own design, over the same observations and
    /// parameters, is the candidate matrix handed to [`derive_contrast`].
    pub fn contrasts(
        &self,
        observations: &Table,
        params: Option<&Params>,
        specs: &BTreeMap<String, ContrastSpec>,
        config: &ContrastConfig,
    ) -> Result<(Array2<f64>, BTreeMap<String, Contrast>)> {
        let d = self.design_matrix(observations, params)?;
        let pseudo = pinv(&d)?;
        let mut out = BTreeMap::new();
        for (name, spec) in specs {
            let l = spec.to_formula().compile()?.design_matrix(observations, params)?;
            out.insert(name.clone(), derive_contrast(&l, &d, Some(&pseudo), config)?);
        }
        Ok((d, out))
    }

    /// Squeezed float design together with squeezed contrast matrices.
    pub fn design_with_contrasts(
        &self,
        observations: &Table,
        params: Option<&Params>,
        specs: &BTreeMap<String, ContrastSpec>,
    ) -> Result<(ArrayD<f64>, BTreeMap<String, ArrayD<f64>>)> {
        let (d, contrasts) = self.contrasts(observations, params, specs, &ContrastConfig::default())?;
        let matrices = contrasts
            .into_iter()
            .map(|(name, c)| Ok((name, c.squeezed()?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok((squeeze(&d.into_dyn())?, matrices))
    }
}

impl Formula {
    /// Build the numeric evaluator of this formula.
    pub fn compile(&self) -> Result<CompiledFormula> {
        CompiledFormula::new(self)
    }

    /// Compile and evaluate in one go. Reuse [`Formula::compile`] when
    /// evaluating the same formula repeatedly.
    pub fn design(
        &self,
        observations: &Table,
        params: Option<&Params>,
        config: &DesignConfig,
    ) -> Result<Design> {
        self.compile()?.design(observations, params, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{parameter, term, Factor};
    use crate::symbolic::Level;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn table() -> Table {
        Table::new()
            .with_column("x", vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_column("g", vec!["a", "b", "a"])
            .unwrap()
    }

    #[test]
    fn test_pure_intercept_is_ones() {
        let f = Formula::intercept();
        let named = f.design(&table(), None, &DesignConfig::default()).unwrap();
        assert_eq!(named.names(), Some(&["intercept".to_string()][..]));
        let float = f.design(&table(), None, &DesignConfig::float()).unwrap();
        assert_eq!(float.into_float(), array![1.0, 1.0, 1.0].into_dyn());
    }

    #[test]
    fn test_no_regressor_is_undefined() {
        let f = Formula::new(vec![parameter("theta")]);
        let err = f.design(&table(), None, &DesignConfig::float()).unwrap_err();
        assert!(matches!(err, FormularyError::UndefinedShape(_)));
    }

    #[test]
    fn test_missing_input_field() {
        let f = Formula::new(vec![term("x"), term("z")]);
        let err = f.design(&table(), None, &DesignConfig::float()).unwrap_err();
        assert!(matches!(err, FormularyError::MissingField(_)));
    }

    #[test]
    fn test_schemas_collapse_factor_levels() {
        let g = Factor::new("g", vec![Level::from("a"), Level::from("b")]).unwrap();
        let f = &g + &Formula::from(term("x"));
        let compiled = f.compile().unwrap();
        let schemas = compiled.schemas();
        assert_eq!(schemas.term, vec!["g_a", "g_b", "x"]);
        assert_eq!(schemas.preterm, vec!["g", "x"]);
        assert!(schemas.param.is_empty());
    }

    #[test]
    fn test_intercept_column_is_broadcast() {
        let f = &Formula::from(term("x")) + &Formula::intercept();
        let d = f.design(&table(), None, &DesignConfig::default()).unwrap();
        match d {
            Design::Named(named) => {
                assert_eq!(named.names, vec!["x", "1"]);
                assert_eq!(named.column("1").unwrap(), array![1.0, 1.0, 1.0]);
                assert_eq!(named.column("x").unwrap(), array![1.0, 2.0, 3.0]);
            }
            other => panic!("expected named design, got {:?}", other),
        }
    }

    #[test]
    fn test_nonlinear_design_needs_parameters() {
        let theta = parameter("theta");
        let f = Formula::new(vec![(&theta * &term("x")).exp()]);
        let compiled = f.compile().unwrap();
        assert_eq!(compiled.schemas().param, vec!["_b0", "theta"]);

        let obs = table();
        let err = compiled.design(&obs, None, &DesignConfig::float()).unwrap_err();
        assert!(matches!(err, FormularyError::MissingField(_)));

        let mut params = Params::new();
        params.insert("theta".to_string(), 0.5);
        assert!(compiled.design(&obs, Some(&params), &DesignConfig::float()).is_err());

        params.insert("_b0".to_string(), 2.0);
        let d = compiled.design_matrix(&obs, Some(&params)).unwrap();
        for (i, x) in [1.0f64, 2.0, 3.0].iter().enumerate() {
            assert_abs_diff_eq!(d[[i, 0]], (0.5 * x).exp(), epsilon = 1e-12);
            assert_abs_diff_eq!(d[[i, 1]], 2.0 * x * (0.5 * x).exp(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_textual_column_as_term_is_rejected() {
        let f = Formula::from(term("g"));
        let err = f.design(&table(), None, &DesignConfig::float()).unwrap_err();
        assert!(matches!(err, FormularyError::InvalidValue(_)));
    }

    #[test]
    fn test_contrasts_against_factor_design() {
        let g = Factor::new("g", vec![Level::from("a"), Level::from("b")]).unwrap();
        let f = &g + &Formula::from(term("x"));
        let compiled = f.compile().unwrap();

        let mut specs = BTreeMap::new();
        specs.insert("diff".to_string(), ContrastSpec::from(g.main_effect().unwrap()));
        specs.insert("slope".to_string(), ContrastSpec::from(term("x")));

        let (d, matrices) = compiled.design_with_contrasts(&table(), None, &specs).unwrap();
        assert_eq!(d.shape(), &[3, 3]);
        assert_eq!(matrices["diff"].shape(), &[3]);
        // Columns are g_a, g_b, x: the slope contrast picks out x.
        let slope = matrices["slope"].clone().into_dimensionality::<ndarray::Ix1>().unwrap();
        assert_abs_diff_eq!(slope, array![0.0, 0.0, 1.0], epsilon = 1e-10);
    }
}
