//! String form of expressions.
//!
//! The printed form doubles as the field name of a design-matrix column, so
//! it follows the familiar computer-algebra conventions: `x1*x3`, `x**2`,
//! `a_x - a_z`, `x/2`, `exp(t*theta)`.

use std::fmt;

use super::expr::{Expr, ExprKind};
use super::number::Number;

// Binding strength, used to decide where parentheses are needed.
const PREC_ADD: u8 = 1;
const PREC_MUL: u8 = 2;
const PREC_POW: u8 = 3;
const PREC_ATOM: u8 = 4;

fn precedence(e: &Expr) -> u8 {
    match e.kind() {
        ExprKind::Add(_) => PREC_ADD,
        ExprKind::Mul(_) => PREC_MUL,
        ExprKind::Pow(..) => PREC_POW,
        ExprKind::Num(n) => match n {
            Number::Rational(_, d) if *d != 1 => PREC_MUL,
            _ if n.is_negative() => PREC_ADD,
            _ => PREC_ATOM,
        },
        ExprKind::Sym(_) | ExprKind::Func(..) => PREC_ATOM,
    }
}

fn parenthesize(e: &Expr, min_prec: u8) -> String {
    if precedence(e) < min_prec {
        format!("({})", e)
    } else {
        e.to_string()
    }
}

/// Does the term print with a leading minus sign?
fn is_negative_term(e: &Expr) -> bool {
    match e.as_number() {
        Some(n) => n.is_negative(),
        None => e.split_coefficient().0.is_negative(),
    }
}

fn fmt_mul(factors: &[Expr], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut numer: Vec<String> = Vec::new();
    let mut denom: Vec<String> = Vec::new();
    let mut sign = "";

    for factor in factors {
        match factor.kind() {
            ExprKind::Num(n) => {
                let n = if n.is_negative() {
                    sign = "-";
                    n.abs()
                } else {
                    *n
                };
                match n {
                    Number::Rational(p, q) => {
                        if p != 1 {
                            numer.push(p.to_string());
                        }
                        if q != 1 {
                            denom.push(q.to_string());
                        }
                    }
                    Number::Float(v) => numer.push(v.to_string()),
                }
            }
            ExprKind::Pow(base, exp) if exp.as_number().map_or(false, |e| e.is_negative()) => {
                let flipped = Expr::pow(base.clone(), Expr::neg(exp.clone()));
                denom.push(parenthesize(&flipped, PREC_POW));
            }
            _ => numer.push(parenthesize(factor, PREC_MUL)),
        }
    }

    let numer = if numer.is_empty() {
        "1".to_string()
    } else {
        numer.join("*")
    };
    match denom.len() {
        0 => write!(f, "{}{}", sign, numer),
        1 => write!(f, "{}{}/{}", sign, numer, denom[0]),
        _ => write!(f, "{}{}/({})", sign, numer, denom.join("*")),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Num(n) => write!(f, "{}", n),
            ExprKind::Sym(s) => write!(f, "{}", s),
            ExprKind::Add(terms) => {
                // Constants print last, as in `x + 1`.
                let (constants, others): (Vec<&Expr>, Vec<&Expr>) =
                    terms.iter().partition(|t| t.is_number());
                for (i, term) in others.iter().chain(constants.iter()).enumerate() {
                    let negative = is_negative_term(term);
                    let shown = if negative {
                        Expr::neg((*term).clone())
                    } else {
                        (*term).clone()
                    };
                    match (i, negative) {
                        (0, true) => write!(f, "-{}", parenthesize(&shown, PREC_MUL))?,
                        (0, false) => write!(f, "{}", shown)?,
                        (_, true) => write!(f, " - {}", parenthesize(&shown, PREC_MUL))?,
                        (_, false) => write!(f, " + {}", shown)?,
                    }
                }
                Ok(())
            }
            ExprKind::Mul(factors) => fmt_mul(factors, f),
            ExprKind::Pow(base, exp) => {
                if let Some(e) = exp.as_number() {
                    if e == Number::rational(1, 2) {
                        return write!(f, "sqrt({})", base);
                    }
                    if e == Number::int(-1) {
                        return write!(f, "1/{}", parenthesize(base, PREC_POW));
                    }
                }
                let base = parenthesize(base, PREC_ATOM);
                let exp = match exp.kind() {
                    ExprKind::Num(n) if !n.is_negative() && n.as_integer().is_some() => exp.to_string(),
                    ExprKind::Sym(_) | ExprKind::Func(..) => exp.to_string(),
                    _ => format!("({})", exp),
                };
                write!(f, "{}**{}", base, exp)
            }
            ExprKind::Func(func, arg) => write!(f, "{}({})", func.name(), arg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::{Level, Symbol};

    fn term(name: &str) -> Expr {
        Expr::symbol(Symbol::Term(name.to_string()))
    }

    #[test]
    fn test_products_and_sums() {
        let x1 = term("x1");
        let x3 = term("x3");
        assert_eq!(Expr::mul([x1.clone(), x3.clone()]).to_string(), "x1*x3");
        assert_eq!(Expr::add([x1.clone(), Expr::one()]).to_string(), "x1 + 1");
        assert_eq!(x1.powi(2).to_string(), "x1**2");
    }

    #[test]
    fn test_differences() {
        let fa = Expr::symbol(Symbol::FactorTerm {
            factor: "a".into(),
            level: Level::from("x"),
        });
        let fz = Expr::symbol(Symbol::FactorTerm {
            factor: "a".into(),
            level: Level::from("z"),
        });
        assert_eq!(Expr::sub(fa, fz).to_string(), "a_x - a_z");
    }

    #[test]
    fn test_rationals_and_functions() {
        let x = term("x");
        assert_eq!(Expr::div(x.clone(), Expr::int(2)).to_string(), "x/2");
        assert_eq!(Expr::neg(x.clone()).to_string(), "-x");
        let theta = Expr::symbol(Symbol::Parameter("theta".into()));
        assert_eq!(Expr::mul([theta, term("t")]).exp().to_string(), "exp(t*theta)");
        assert_eq!(x.powi(-1).to_string(), "1/x");
    }
}
