//! Expression tree kept in canonical form.
//!
//! Every constructor normalizes its result (flatten, fold constants, collect
//! like terms and like bases, drop identities, sort operands). Two canonical
//! trees are symbolically equal exactly when they are structurally equal,
//! which is what `PartialEq`, `Ord` and `Hash` compare.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use super::number::Number;

// =============================================================================
// Atoms
// =============================================================================

/// A level of a categorical variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Int(i64),
    Text(String),
}

impl Level {
    pub fn is_text(&self) -> bool {
        matches!(self, Level::Text(_))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Int(n) => write!(f, "{}", n),
            Level::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Level {
    fn from(n: i64) -> Self {
        Level::Int(n)
    }
}

impl From<i32> for Level {
    fn from(n: i32) -> Self {
        Level::Int(n as i64)
    }
}

impl From<&str> for Level {
    fn from(s: &str) -> Self {
        Level::Text(s.to_string())
    }
}

impl From<String> for Level {
    fn from(s: String) -> Self {
        Level::Text(s)
    }
}

/// Positional slot used while compiling a design; see `design::SlotArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Param(usize),
    Term(usize),
}

/// The closed set of symbol kinds that can appear in an expression.
///
/// Only `Term` and `FactorTerm` are regressors (`is_term`); everything else
/// is a parameter of the mean and gets differentiated away or supplied
/// numerically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// A named regressor, read from the input column of the same name.
    Term(String),
    /// Indicator of one level of a categorical column.
    FactorTerm { factor: String, level: Level },
    /// Regression coefficient bound to one term of a formula.
    Coefficient {
        prefix: String,
        index: usize,
        term: Expr,
    },
    /// A free, non-regressor parameter (e.g. a nonlinear rate).
    Parameter(String),
    /// Variance of the i-th random effect.
    Variance(usize),
    /// Compilation placeholder.
    Placeholder(Slot),
}

impl Symbol {
    pub fn is_term(&self) -> bool {
        matches!(self, Symbol::Term(_) | Symbol::FactorTerm { .. })
    }

    pub fn is_factor_term(&self) -> bool {
        matches!(self, Symbol::FactorTerm { .. })
    }

    /// The printed name; also the field name used in tabular schemas.
    pub fn name(&self) -> String {
        match self {
            Symbol::Term(name) | Symbol::Parameter(name) => name.clone(),
            Symbol::FactorTerm { factor, level } => format!("{}_{}", factor, level),
            Symbol::Coefficient { prefix, index, .. } => format!("_{}{}", prefix, index),
            Symbol::Variance(index) => format!("_s2_{}", index),
            Symbol::Placeholder(Slot::Param(i)) => format!("__p{}__", i),
            Symbol::Placeholder(Slot::Term(i)) => format!("__t{}__", i),
        }
    }

    /// Name of the raw input column a regressor is read from.
    pub fn input_name(&self) -> Option<String> {
        match self {
            Symbol::Term(name) => Some(name.clone()),
            Symbol::FactorTerm { factor, .. } => Some(factor.clone()),
            _ => None,
        }
    }

    // Sort key: alphabetic stem, then a numeric index so that `_b2` sorts
    // before `_b10`.
    fn stem(&self) -> (String, usize) {
        match self {
            Symbol::Coefficient { prefix, index, .. } => (format!("_{}", prefix), *index),
            Symbol::Variance(index) => ("_s2_".to_string(), *index),
            Symbol::Placeholder(Slot::Param(i)) => ("__p".to_string(), *i),
            Symbol::Placeholder(Slot::Term(i)) => ("__t".to_string(), *i),
            other => (other.name(), 0),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Symbol::Term(_) => 0,
            Symbol::FactorTerm { .. } => 1,
            Symbol::Coefficient { .. } => 2,
            Symbol::Parameter(_) => 3,
            Symbol::Variance(_) => 4,
            Symbol::Placeholder(_) => 5,
        }
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stem()
            .cmp(&other.stem())
            .then_with(|| self.rank().cmp(&other.rank()))
            .then_with(|| match (self, other) {
                (
                    Symbol::FactorTerm { factor: f1, level: l1 },
                    Symbol::FactorTerm { factor: f2, level: l2 },
                ) => (f1, l1).cmp(&(f2, l2)),
                (
                    Symbol::Coefficient { prefix: p1, term: t1, .. },
                    Symbol::Coefficient { prefix: p2, term: t2, .. },
                ) => (p1, t1).cmp(&(p2, t2)),
                _ => Ordering::Equal,
            })
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Elementary functions of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Func {
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Abs,
    Sign,
}

impl Func {
    pub fn name(&self) -> &'static str {
        match self {
            Func::Exp => "exp",
            Func::Log => "log",
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Abs => "abs",
            Func::Sign => "sign",
        }
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Func::Exp => x.exp(),
            Func::Log => x.ln(),
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Tan => x.tan(),
            Func::Abs => x.abs(),
            Func::Sign => {
                if x == 0.0 {
                    0.0
                } else {
                    x.signum()
                }
            }
        }
    }

    // Exact values at numeric arguments; anything else stays symbolic.
    fn fold(&self, n: &Number) -> Option<Number> {
        match self {
            Func::Exp | Func::Cos if n.is_zero() => Some(Number::one()),
            Func::Log if n.is_one() => Some(Number::zero()),
            Func::Sin | Func::Tan if n.is_zero() => Some(Number::zero()),
            Func::Abs => Some(n.abs()),
            Func::Sign => Some(Number::from_f64(self.apply(n.to_f64()))),
            _ => None,
        }
    }
}

// =============================================================================
// Expression tree
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExprKind {
    Num(Number),
    Sym(Symbol),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Expr, Expr),
    Func(Func, Expr),
}

/// An immutable, shareable symbolic expression.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Expr {
    kind: Arc<ExprKind>,
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Expr {
    fn from_kind(kind: ExprKind) -> Self {
        Expr {
            kind: Arc::new(kind),
        }
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    // -------------------------------------------------------------------------
    // Leaves
    // -------------------------------------------------------------------------

    pub fn num(n: Number) -> Self {
        Expr::from_kind(ExprKind::Num(n))
    }

    pub fn int(n: i64) -> Self {
        Expr::num(Number::int(n))
    }

    pub fn float(f: f64) -> Self {
        Expr::num(Number::from_f64(f))
    }

    pub fn zero() -> Self {
        Expr::int(0)
    }

    pub fn one() -> Self {
        Expr::int(1)
    }

    pub fn symbol(symbol: Symbol) -> Self {
        Expr::from_kind(ExprKind::Sym(symbol))
    }

    // -------------------------------------------------------------------------
    // Canonical constructors
    // -------------------------------------------------------------------------

    /// Canonical sum: like terms are collected, so `x + x` is `2*x` here.
    pub fn add(args: impl IntoIterator<Item = Expr>) -> Self {
        let mut constant = Number::zero();
        let mut collected: BTreeMap<Expr, Number> = BTreeMap::new();
        let mut pending: Vec<Expr> = args.into_iter().collect();
        pending.reverse();

        while let Some(arg) = pending.pop() {
            match arg.kind() {
                ExprKind::Num(n) => constant = constant + *n,
                ExprKind::Add(inner) => pending.extend(inner.iter().rev().cloned()),
                _ => {
                    let (coef, rest) = arg.split_coefficient();
                    let slot = collected.entry(rest).or_insert_with(Number::zero);
                    *slot = *slot + coef;
                }
            }
        }

        let mut terms: Vec<Expr> = collected
            .into_iter()
            .filter(|(_, coef)| !coef.is_zero())
            .map(|(rest, coef)| {
                if coef.is_one() {
                    rest
                } else {
                    Expr::mul([Expr::num(coef), rest])
                }
            })
            .collect();
        if !constant.is_zero() {
            terms.push(Expr::num(constant));
        }
        terms.sort();

        match terms.len() {
            0 => Expr::zero(),
            1 => terms.remove(0),
            _ => Expr::from_kind(ExprKind::Add(terms)),
        }
    }

    /// Canonical product: like bases are collected, so `x*x` is `x**2` here.
    pub fn mul(args: impl IntoIterator<Item = Expr>) -> Self {
        let mut coef = Number::one();
        let mut bases: BTreeMap<Expr, Vec<Expr>> = BTreeMap::new();
        let mut pending: Vec<Expr> = args.into_iter().collect();

        while let Some(arg) = pending.pop() {
            match arg.kind() {
                ExprKind::Num(n) => coef = coef * *n,
                ExprKind::Mul(inner) => pending.extend(inner.iter().cloned()),
                ExprKind::Pow(base, exp) => bases.entry(base.clone()).or_default().push(exp.clone()),
                _ => bases.entry(arg.clone()).or_default().push(Expr::one()),
            }
        }
        if coef.is_zero() {
            return Expr::zero();
        }

        let mut factors = Vec::with_capacity(bases.len() + 1);
        let mut spilled = Vec::new();
        for (base, exps) in bases {
            let power = Expr::pow(base, Expr::add(exps));
            match power.kind() {
                ExprKind::Num(n) => coef = coef * *n,
                ExprKind::Mul(_) => spilled.push(power),
                _ => factors.push(power),
            }
        }
        if coef.is_zero() {
            return Expr::zero();
        }
        if !spilled.is_empty() {
            // A collected power distributed over a product; renormalize.
            factors.extend(spilled);
            factors.push(Expr::num(coef));
            return Expr::mul(factors);
        }
        if factors.is_empty() {
            return Expr::num(coef);
        }
        if !coef.is_one() {
            factors.push(Expr::num(coef));
        }
        factors.sort();

        if factors.len() == 1 {
            factors.remove(0)
        } else {
            Expr::from_kind(ExprKind::Mul(factors))
        }
    }

    pub fn pow(base: Expr, exp: Expr) -> Self {
        if let Some(e) = exp.as_number() {
            if e.is_zero() {
                return Expr::one();
            }
            if e.is_one() {
                return base;
            }
        }
        let int_exp = exp.as_number().and_then(|e| e.as_integer());

        match (base.kind(), exp.as_number()) {
            (ExprKind::Num(b), _) if b.is_one() => Expr::one(),
            (ExprKind::Num(b), Some(e)) => {
                if b.is_negative() && e.as_integer().is_none() {
                    Expr::from_kind(ExprKind::Pow(base.clone(), exp))
                } else {
                    Expr::num(b.pow(&e))
                }
            }
            (ExprKind::Pow(inner, inner_exp), _) if int_exp.is_some() => {
                Expr::pow(inner.clone(), Expr::mul([inner_exp.clone(), exp]))
            }
            (ExprKind::Mul(factors), _) if int_exp.is_some() => Expr::mul(
                factors
                    .iter()
                    .map(|f| Expr::pow(f.clone(), exp.clone()))
                    .collect::<Vec<_>>(),
            ),
            _ => Expr::from_kind(ExprKind::Pow(base, exp)),
        }
    }

    pub fn func(func: Func, arg: Expr) -> Self {
        if let Some(n) = arg.as_number() {
            if let Some(value) = func.fold(&n) {
                return Expr::num(value);
            }
        }
        match (func, arg.kind()) {
            (Func::Log, ExprKind::Func(Func::Exp, inner)) => inner.clone(),
            (Func::Exp, ExprKind::Func(Func::Log, inner)) => inner.clone(),
            _ => Expr::from_kind(ExprKind::Func(func, arg)),
        }
    }

    pub fn neg(e: Expr) -> Self {
        Expr::mul([Expr::int(-1), e])
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Expr::add([a, Expr::neg(b)])
    }

    pub fn div(a: Expr, b: Expr) -> Self {
        Expr::mul([a, Expr::pow(b, Expr::int(-1))])
    }

    pub fn exp(&self) -> Self {
        Expr::func(Func::Exp, self.clone())
    }

    pub fn ln(&self) -> Self {
        Expr::func(Func::Log, self.clone())
    }

    pub fn sin(&self) -> Self {
        Expr::func(Func::Sin, self.clone())
    }

    pub fn cos(&self) -> Self {
        Expr::func(Func::Cos, self.clone())
    }

    pub fn powi(&self, n: i64) -> Self {
        Expr::pow(self.clone(), Expr::int(n))
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn as_number(&self) -> Option<Number> {
        match self.kind() {
            ExprKind::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self.kind() {
            ExprKind::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self.kind(), ExprKind::Num(_))
    }

    pub fn is_zero(&self) -> bool {
        self.as_number().map_or(false, |n| n.is_zero())
    }

    pub fn is_one(&self) -> bool {
        self.as_number().map_or(false, |n| n.is_one())
    }

    /// Is this expression a single regressor atom (Term or FactorTerm)?
    pub fn is_term(&self) -> bool {
        self.as_symbol().map_or(false, Symbol::is_term)
    }

    pub fn is_factor_term(&self) -> bool {
        self.as_symbol().map_or(false, Symbol::is_factor_term)
    }

    /// Split off the leading numeric factor: `3*x*y` becomes `(3, x*y)`.
    pub fn split_coefficient(&self) -> (Number, Expr) {
        if let ExprKind::Mul(factors) = self.kind() {
            if let Some(n) = factors[0].as_number() {
                let rest: Vec<Expr> = factors[1..].to_vec();
                let rest = if rest.len() == 1 {
                    rest.into_iter().next().unwrap_or_else(Expr::one)
                } else {
                    Expr::from_kind(ExprKind::Mul(rest))
                };
                return (n, rest);
            }
        }
        (Number::one(), self.clone())
    }

    /// Immediate sub-expressions.
    pub fn args(&self) -> Vec<&Expr> {
        match self.kind() {
            ExprKind::Num(_) | ExprKind::Sym(_) => Vec::new(),
            ExprKind::Add(xs) | ExprKind::Mul(xs) => xs.iter().collect(),
            ExprKind::Pow(b, e) => vec![b, e],
            ExprKind::Func(_, a) => vec![a],
        }
    }

    /// Every symbol occurring in the expression, in canonical order.
    ///
    /// The term a coefficient is bound to is metadata, not an operand, so
    /// its symbols are not reported.
    pub fn symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self.kind() {
            ExprKind::Sym(s) => {
                out.insert(s.clone());
            }
            _ => {
                for arg in self.args() {
                    arg.collect_symbols(out);
                }
            }
        }
    }

    /// Regressor atoms of the expression.
    pub fn terms(&self) -> BTreeSet<Symbol> {
        self.symbols().into_iter().filter(Symbol::is_term).collect()
    }

    /// Non-regressor symbols of the expression.
    pub fn params(&self) -> BTreeSet<Symbol> {
        self.symbols()
            .into_iter()
            .filter(|s| !s.is_term() && !matches!(s, Symbol::Placeholder(_)))
            .collect()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        match self.kind() {
            ExprKind::Sym(s) => s == symbol,
            _ => self.args().iter().any(|a| a.contains(symbol)),
        }
    }

    // -------------------------------------------------------------------------
    // Rewriting
    // -------------------------------------------------------------------------

    /// Rebuild with each child mapped, renormalizing on the way up.
    pub fn map_args(&self, f: &mut impl FnMut(&Expr) -> Expr) -> Expr {
        match self.kind() {
            ExprKind::Num(_) | ExprKind::Sym(_) => self.clone(),
            ExprKind::Add(xs) => Expr::add(xs.iter().map(|x| f(x)).collect::<Vec<_>>()),
            ExprKind::Mul(xs) => Expr::mul(xs.iter().map(|x| f(x)).collect::<Vec<_>>()),
            ExprKind::Pow(b, e) => Expr::pow(f(b), f(e)),
            ExprKind::Func(func, a) => Expr::func(*func, f(a)),
        }
    }

    /// Replace every occurrence of `old` (matched structurally) by `new`.
    pub fn subs(&self, old: &Expr, new: &Expr) -> Expr {
        if self == old {
            return new.clone();
        }
        self.map_args(&mut |child| child.subs(old, new))
    }

    /// Replace symbols in one pass.
    pub fn substitute(&self, map: &HashMap<Symbol, Expr>) -> Expr {
        match self.kind() {
            ExprKind::Sym(s) => map.get(s).cloned().unwrap_or_else(|| self.clone()),
            _ => self.map_args(&mut |child| child.substitute(map)),
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + self.args().iter().map(|a| a.node_count()).sum::<usize>()
    }
}

impl From<Symbol> for Expr {
    fn from(symbol: Symbol) -> Self {
        Expr::symbol(symbol)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::int(n)
    }
}

impl From<f64> for Expr {
    fn from(f: f64) -> Self {
        Expr::float(f)
    }
}

// =============================================================================
// Operators
// =============================================================================
//
// The operators carry the two regressor identities:
//   - a Term plus itself is itself (a regressor listed twice is one regressor)
//   - a FactorTerm times itself is itself (indicators are 0/1 valued)
// The canonical constructors above do plain algebra.
//
// =============================================================================

fn term_add(a: Expr, b: Expr) -> Expr {
    if a.is_term() && a == b {
        return a;
    }
    Expr::add([a, b])
}

fn term_mul(a: Expr, b: Expr) -> Expr {
    if a.is_factor_term() && a == b {
        return a;
    }
    Expr::mul([a, b])
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $body:expr) => {
        impl std::ops::$trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $body(self, rhs)
            }
        }

        impl std::ops::$trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $body(self.clone(), rhs.clone())
            }
        }

        impl std::ops::$trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $body(self, rhs.clone())
            }
        }

        impl std::ops::$trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $body(self.clone(), rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, term_add);
impl_binary_op!(Sub, sub, Expr::sub);
impl_binary_op!(Mul, mul, term_mul);
impl_binary_op!(Div, div, Expr::div);

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::neg(self)
    }
}

impl std::ops::Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::neg(self.clone())
    }
}
