//! Symbolic differentiation.
//!
//! Results come out of the canonical constructors, so they are already
//! simplified: differentiating `_b0*x + _b1*y` with respect to `_b0` gives
//! exactly `x`.

use super::expr::{Expr, ExprKind, Func, Symbol};

/// Partial derivative of `expr` with respect to `symbol`.
pub fn diff(expr: &Expr, symbol: &Symbol) -> Expr {
    if !expr.contains(symbol) {
        return Expr::zero();
    }
    match expr.kind() {
        ExprKind::Num(_) => Expr::zero(),
        ExprKind::Sym(s) => {
            if s == symbol {
                Expr::one()
            } else {
                Expr::zero()
            }
        }
        ExprKind::Add(terms) => Expr::add(terms.iter().map(|t| diff(t, symbol)).collect::<Vec<_>>()),
        ExprKind::Mul(factors) => {
            // Product rule: sum over i of (d f_i) * prod_{j != i} f_j
            let mut pieces = Vec::with_capacity(factors.len());
            for (i, factor) in factors.iter().enumerate() {
                let d = diff(factor, symbol);
                if d.is_zero() {
                    continue;
                }
                let mut product: Vec<Expr> = Vec::with_capacity(factors.len());
                product.extend(factors[..i].iter().cloned());
                product.extend(factors[i + 1..].iter().cloned());
                product.push(d);
                pieces.push(Expr::mul(product));
            }
            Expr::add(pieces)
        }
        ExprKind::Pow(base, exp) => {
            let d_base = diff(base, symbol);
            if !exp.contains(symbol) {
                // d(u^n) = n * u^(n-1) * du
                return Expr::mul([
                    exp.clone(),
                    Expr::pow(base.clone(), Expr::sub(exp.clone(), Expr::one())),
                    d_base,
                ]);
            }
            // d(u^v) = u^v * (dv * log(u) + v * du / u)
            let d_exp = diff(exp, symbol);
            Expr::mul([
                expr.clone(),
                Expr::add([
                    Expr::mul([d_exp, base.ln()]),
                    Expr::mul([exp.clone(), d_base, Expr::pow(base.clone(), Expr::int(-1))]),
                ]),
            ])
        }
        ExprKind::Func(func, arg) => {
            let d_arg = diff(arg, symbol);
            let outer = match func {
                Func::Exp => expr.clone(),
                Func::Log => Expr::pow(arg.clone(), Expr::int(-1)),
                Func::Sin => arg.cos(),
                Func::Cos => Expr::neg(arg.sin()),
                Func::Tan => Expr::pow(arg.cos(), Expr::int(-2)),
                Func::Abs => Expr::func(Func::Sign, arg.clone()),
                Func::Sign => Expr::zero(),
            };
            Expr::mul([outer, d_arg])
        }
    }
}

impl Expr {
    /// Partial derivative with respect to `symbol`.
    pub fn diff(&self, symbol: &Symbol) -> Expr {
        diff(self, symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Symbol {
        Symbol::Parameter(name.to_string())
    }

    fn var(name: &str) -> Expr {
        Expr::symbol(sym(name))
    }

    #[test]
    fn test_linear_coefficients_are_erased() {
        let x = Expr::symbol(Symbol::Term("x".into()));
        let y = Expr::symbol(Symbol::Term("y".into()));
        let mean = Expr::add([Expr::mul([var("b0"), x.clone()]), Expr::mul([var("b1"), y.clone()])]);
        assert_eq!(mean.diff(&sym("b0")), x);
        assert_eq!(mean.diff(&sym("b1")), y);
        assert!(mean.diff(&sym("theta")).is_zero());
    }

    #[test]
    fn test_power_rule() {
        let x = var("x");
        let d = x.powi(3).diff(&sym("x"));
        assert_eq!(d, Expr::mul([Expr::int(3), x.powi(2)]));
    }

    #[test]
    fn test_chain_rule_keeps_nonlinearity() {
        // d/dtheta exp(theta*t) = t*exp(theta*t)
        let t = Expr::symbol(Symbol::Term("t".into()));
        let e = Expr::mul([var("theta"), t.clone()]).exp();
        assert_eq!(e.diff(&sym("theta")), Expr::mul([t, e.clone()]));
    }

    #[test]
    fn test_log_derivative() {
        let x = var("x");
        assert_eq!(x.ln().diff(&sym("x")), x.powi(-1));
    }
}
