// End-to-end checks of the formula → design → contrast pipeline.

use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array2, Ix2};

use formulary_core::contrast::contrast_from_cols_or_rows;
use formulary_core::convert::matrix_rank;
use formulary_core::{
    factor_term, term, ContrastSpec, Design, DesignConfig, Factor, Formula, FormularyError, Level,
    Table,
};

fn two_rows() -> Table {
    Table::new()
        .with_column("x1", vec![51.0, 64.0])
        .unwrap()
        .with_column("x3", vec![39.0, 54.0])
        .unwrap()
}

#[test]
fn test_interaction_with_intercept() {
    let (x1, x3) = (term("x1"), term("x3"));
    let f = &Formula::new(vec![x1.clone(), x3.clone(), &x1 * &x3]) + &Formula::intercept();
    assert_eq!(f.design_names(), vec!["x1", "x3", "x1*x3", "1"]);

    let d = f
        .design(&two_rows(), None, &DesignConfig::float())
        .unwrap()
        .into_float()
        .into_dimensionality::<Ix2>()
        .unwrap();
    assert_eq!(d, array![[51.0, 39.0, 1989.0, 1.0], [64.0, 54.0, 3456.0, 1.0]]);
}

#[test]
fn test_named_design_fields() {
    let f = Formula::new(vec![term("x1"), term("x3")]);
    match f.design(&two_rows(), None, &DesignConfig::default()).unwrap() {
        Design::Named(named) => {
            assert_eq!(named.names, vec!["x1", "x3"]);
            assert_eq!(named.column("x3").unwrap(), array![39.0, 54.0]);
        }
        other => panic!("expected a named design, got {:?}", other),
    }
}

#[test]
fn test_extra_input_columns_are_ignored() {
    let obs = two_rows().with_column("unused", vec!["p", "q"]).unwrap();
    let d = Formula::intercept()
        .design(&obs, None, &DesignConfig::float())
        .unwrap()
        .into_float();
    assert_eq!(d, array![1.0, 1.0].into_dyn());
}

#[test]
fn test_factor_indicators() {
    let obs = Table::new().with_column("f", vec!["a", "a", "b"]).unwrap();
    let factor = Factor::new("f", vec![Level::from("a"), Level::from("b")]).unwrap();

    match factor.formula().design(&obs, None, &DesignConfig::default()).unwrap() {
        Design::Named(named) => {
            assert_eq!(named.names, vec!["f_a", "f_b"]);
            assert_eq!(named.column("f_a").unwrap(), array![1.0, 1.0, 0.0]);
            assert_eq!(named.column("f_b").unwrap(), array![0.0, 0.0, 1.0]);
        }
        other => panic!("expected a named design, got {:?}", other),
    }
}

#[test]
fn test_factor_from_table_with_bytes() {
    let obs = Table::new()
        .with_column("y", vec![b"a".to_vec(), b"a".to_vec(), b"b".to_vec(), b"b".to_vec()])
        .unwrap()
        .with_column("x", vec![3.0, 4.0, 5.0, 3.0])
        .unwrap();
    let f = Formula::from_table(&obs, &[], &[]).unwrap();
    assert_eq!(f.design_names(), vec!["y_a", "y_b", "x"]);

    let d = f.compile().unwrap().design_matrix(&obs, None).unwrap();
    assert_eq!(d.column(0), array![1.0, 1.0, 0.0, 0.0]);
    assert_eq!(d.column(2), array![3.0, 4.0, 5.0, 3.0]);

    let numeric = Factor::from_column(obs.column("x").unwrap(), "x").unwrap();
    assert_eq!(numeric.formula().design_names(), vec!["x_3", "x_4", "x_5"]);
}

#[test]
fn test_main_effect_has_k_minus_one_terms() {
    let factor = Factor::new("a", vec!["x".into(), "y".into(), "z".into(), "w".into()]).unwrap();
    let me = factor.main_effect().unwrap();
    assert_eq!(me.len(), 3);
    let reference = factor_term("a", "z");
    for (t, level) in me.terms().iter().zip(["w", "x", "y"]) {
        assert_eq!(*t, factor_term("a", level) - &reference);
    }
}

#[test]
fn test_empty_formula_is_identity() {
    let x = Formula::new(vec![term("x1"), term("x3"), term("x1")]);
    assert_eq!(&Formula::empty() + &x, x);
    assert_eq!(&x - &Formula::empty(), x);
}

#[test]
fn test_undefined_shape() {
    let f = Formula::new(vec![formulary_core::parameter("theta")]);
    let err = f.design(&two_rows(), None, &DesignConfig::float()).unwrap_err();
    assert!(matches!(err, FormularyError::UndefinedShape(_)));
}

#[test]
fn test_contrasts_are_full_rank() {
    let obs = Table::new()
        .with_column("g", vec!["a", "a", "b", "b", "c", "c"])
        .unwrap()
        .with_column("x", vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0])
        .unwrap();
    let g = Factor::new("g", vec!["a".into(), "b".into(), "c".into()]).unwrap();
    let f = &(&g + &Formula::from(term("x"))) + &Formula::intercept();
    let compiled = f.compile().unwrap();

    let mut specs = BTreeMap::new();
    specs.insert("levels".to_string(), ContrastSpec::from(g.main_effect().unwrap()));
    specs.insert("x".to_string(), ContrastSpec::from(term("x")));
    // Intercept and factor levels are collinear in this design.
    specs.insert("everything".to_string(), ContrastSpec::from(f.clone()));

    let (d, contrasts) = compiled
        .contrasts(&obs, None, &specs, &Default::default())
        .unwrap();
    for (name, c) in &contrasts {
        let image_rank = matrix_rank(&d.dot(&c.matrix.t()), None).unwrap();
        assert_eq!(image_rank, c.matrix.nrows(), "contrast {}", name);
    }
    assert!(contrasts["everything"].reprojected);
    assert!(!contrasts["x"].reprojected);
}

#[test]
fn test_standalone_contrast() {
    let d: Array2<f64> = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
    let c = contrast_from_cols_or_rows(&array![[0.0, 1.0]], &d, None).unwrap();
    assert_abs_diff_eq!(c, array![0.0, 1.0].into_dyn(), epsilon = 1e-10);
}
