//! Symbolic-to-numeric bytecode compiler.
//!
//! A list of expressions compiles to one stack program per expression, all
//! sharing a variable slot order fixed at compile time. Programs run
//! column-wise: a slot holds either a scalar or a whole column, and binary
//! operations broadcast scalars against columns. An expression that does not
//! touch any column (the intercept, say) evaluates to a scalar.

use std::collections::HashMap;

use ndarray::{Array1, Zip};

use super::expr::{Expr, ExprKind, Func, Symbol};
use crate::error::{FormularyError, Result};

/// Bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum BytecodeOp {
    /// Push a constant (index into the constants table).
    PushConst(usize),
    /// Push a variable (index into the slot list).
    LoadVar(usize),
    /// Pop n, push their sum.
    Add(usize),
    /// Pop n, push their product.
    Mul(usize),
    /// Pop exponent and base, push base ** exponent.
    Pow,
    /// Apply a one-argument function to the top of the stack.
    Call(Func),
}

/// A value on the evaluation stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Column(Array1<f64>),
}

impl Value {
    /// Expand to a full column of length `n` (a scalar becomes `s * ones(n)`).
    pub fn into_column(self, n: usize) -> Result<Array1<f64>> {
        match self {
            Value::Scalar(s) => Ok(Array1::from_elem(n, s)),
            Value::Column(c) if c.len() == n => Ok(c),
            Value::Column(c) => Err(FormularyError::ShapeMismatch(format!(
                "column of length {} where {} rows were expected",
                c.len(),
                n
            ))),
        }
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(s) => Value::Scalar(f(s)),
            Value::Column(c) => Value::Column(c.mapv(f)),
        }
    }

    fn zip_with(self, other: Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        Ok(match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
            (Value::Scalar(a), Value::Column(b)) => Value::Column(b.mapv(|y| f(a, y))),
            (Value::Column(a), Value::Scalar(b)) => Value::Column(a.mapv(|x| f(x, b))),
            (Value::Column(a), Value::Column(b)) => {
                if a.len() != b.len() {
                    return Err(FormularyError::ShapeMismatch(format!(
                        "cannot combine columns of length {} and {}",
                        a.len(),
                        b.len()
                    )));
                }
                Value::Column(Zip::from(&a).and(&b).map_collect(|&x, &y| f(x, y)))
            }
        })
    }
}

fn power(base: f64, exp: f64) -> f64 {
    if exp.fract() == 0.0 && exp.abs() <= i32::MAX as f64 {
        base.powi(exp as i32)
    } else {
        base.powf(exp)
    }
}

/// Compiled program for one expression.
#[derive(Debug, Clone)]
pub struct Program {
    pub ops: Vec<BytecodeOp>,
    pub constants: Vec<f64>,
    pub max_stack: usize,
}

impl Program {
    /// Run the program against slot values.
    pub fn eval(&self, slots: &[Value]) -> Result<Value> {
        let underflow = || FormularyError::Evaluation("stack underflow".to_string());
        let mut stack: Vec<Value> = Vec::with_capacity(self.max_stack);

        for op in &self.ops {
            match op {
                BytecodeOp::PushConst(idx) => stack.push(Value::Scalar(self.constants[*idx])),
                BytecodeOp::LoadVar(idx) => {
                    let value = slots.get(*idx).ok_or_else(|| {
                        FormularyError::Evaluation(format!(
                            "slot {} requested but only {} values supplied",
                            idx,
                            slots.len()
                        ))
                    })?;
                    stack.push(value.clone());
                }
                BytecodeOp::Add(n) | BytecodeOp::Mul(n) => {
                    if stack.len() < *n || *n == 0 {
                        return Err(underflow());
                    }
                    let operands = stack.split_off(stack.len() - n);
                    let is_add = matches!(op, BytecodeOp::Add(_));
                    let mut acc: Option<Value> = None;
                    for operand in operands {
                        acc = Some(match acc {
                            None => operand,
                            Some(a) if is_add => a.zip_with(operand, |x, y| x + y)?,
                            Some(a) => a.zip_with(operand, |x, y| x * y)?,
                        });
                    }
                    stack.push(acc.ok_or_else(underflow)?);
                }
                BytecodeOp::Pow => {
                    let exp = stack.pop().ok_or_else(underflow)?;
                    let base = stack.pop().ok_or_else(underflow)?;
                    stack.push(base.zip_with(exp, power)?);
                }
                BytecodeOp::Call(func) => {
                    let arg = stack.pop().ok_or_else(underflow)?;
                    stack.push(arg.map(|x| func.apply(x)));
                }
            }
        }

        let result = stack.pop().ok_or_else(underflow)?;
        if !stack.is_empty() {
            return Err(FormularyError::Evaluation(format!(
                "{} values left on the stack",
                stack.len()
            )));
        }
        Ok(result)
    }
}

/// Programs for a list of expressions over a shared slot order.
#[derive(Debug, Clone)]
pub struct CompiledExprs {
    pub programs: Vec<Program>,
    pub n_slots: usize,
}

impl CompiledExprs {
    /// Evaluate every program; one value per compiled expression.
    pub fn eval(&self, slots: &[Value]) -> Result<Vec<Value>> {
        if slots.len() != self.n_slots {
            return Err(FormularyError::Evaluation(format!(
                "expected {} slot values, got {}",
                self.n_slots,
                slots.len()
            )));
        }
        self.programs.iter().map(|p| p.eval(slots)).collect()
    }
}

/// Bytecode compiler with an explicit symbol-to-slot binding.
#[derive(Debug)]
pub struct BytecodeCompiler<'a> {
    slots: &'a HashMap<Symbol, usize>,
    constants: Vec<f64>,
    const_map: HashMap<u64, usize>,
}

impl<'a> BytecodeCompiler<'a> {
    pub fn new(slots: &'a HashMap<Symbol, usize>) -> Self {
        BytecodeCompiler {
            slots,
            constants: Vec::new(),
            const_map: HashMap::new(),
        }
    }

    /// Compile one expression; every symbol in it must have a slot.
    pub fn compile(&mut self, expr: &Expr) -> Result<Program> {
        self.constants.clear();
        self.const_map.clear();
        let mut ops = Vec::new();
        let mut depth = 0;
        let mut max_stack = 0;
        self.compile_expr(expr, &mut ops, &mut depth, &mut max_stack)?;
        Ok(Program {
            ops,
            constants: std::mem::take(&mut self.constants),
            max_stack,
        })
    }

    fn add_constant(&mut self, value: f64) -> usize {
        let bits = value.to_bits();
        if let Some(&idx) = self.const_map.get(&bits) {
            return idx;
        }
        let idx = self.constants.len();
        self.constants.push(value);
        self.const_map.insert(bits, idx);
        idx
    }

    fn push(ops: &mut Vec<BytecodeOp>, op: BytecodeOp, depth: &mut usize, max_stack: &mut usize) {
        ops.push(op);
        *depth += 1;
        *max_stack = (*max_stack).max(*depth);
    }

    fn compile_expr(
        &mut self,
        expr: &Expr,
        ops: &mut Vec<BytecodeOp>,
        depth: &mut usize,
        max_stack: &mut usize,
    ) -> Result<()> {
        match expr.kind() {
            ExprKind::Num(n) => {
                let idx = self.add_constant(n.to_f64());
                Self::push(ops, BytecodeOp::PushConst(idx), depth, max_stack);
            }
            ExprKind::Sym(s) => {
                let idx = *self.slots.get(s).ok_or_else(|| {
                    FormularyError::Evaluation(format!("symbol {} has no bound slot", s))
                })?;
                Self::push(ops, BytecodeOp::LoadVar(idx), depth, max_stack);
            }
            ExprKind::Add(args) | ExprKind::Mul(args) => {
                for arg in args {
                    self.compile_expr(arg, ops, depth, max_stack)?;
                }
                ops.push(match expr.kind() {
                    ExprKind::Add(_) => BytecodeOp::Add(args.len()),
                    _ => BytecodeOp::Mul(args.len()),
                });
                *depth -= args.len() - 1;
            }
            ExprKind::Pow(base, exp) => {
                self.compile_expr(base, ops, depth, max_stack)?;
                self.compile_expr(exp, ops, depth, max_stack)?;
                ops.push(BytecodeOp::Pow);
                *depth -= 1;
            }
            ExprKind::Func(func, arg) => {
                self.compile_expr(arg, ops, depth, max_stack)?;
                ops.push(BytecodeOp::Call(*func));
            }
        }
        Ok(())
    }
}

/// Compile a list of expressions against a slot binding.
pub fn compile_all(exprs: &[Expr], slots: &HashMap<Symbol, usize>) -> Result<CompiledExprs> {
    let mut compiler = BytecodeCompiler::new(slots);
    let programs = exprs
        .iter()
        .map(|e| compiler.compile(e))
        .collect::<Result<Vec<_>>>()?;
    Ok(CompiledExprs {
        programs,
        n_slots: slots.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn bound(names: &[&str]) -> (Vec<Expr>, HashMap<Symbol, usize>) {
        let symbols: Vec<Symbol> = names.iter().map(|n| Symbol::Parameter(n.to_string())).collect();
        let exprs = symbols.iter().cloned().map(Expr::symbol).collect();
        let slots = symbols.into_iter().enumerate().map(|(i, s)| (s, i)).collect();
        (exprs, slots)
    }

    #[test]
    fn test_compile_constant() {
        let compiled = compile_all(&[Expr::int(42)], &HashMap::new()).unwrap();
        assert_eq!(compiled.eval(&[]).unwrap(), vec![Value::Scalar(42.0)]);
    }

    #[test]
    fn test_polynomial_over_columns() {
        // x^2 + 2*x + 1
        let (vars, slots) = bound(&["x"]);
        let x = vars[0].clone();
        let expr = Expr::add([x.powi(2), Expr::mul([Expr::int(2), x]), Expr::one()]);
        let compiled = compile_all(&[expr], &slots).unwrap();

        let out = compiled.eval(&[Value::Column(array![0.0, 1.0, 3.0])]).unwrap();
        assert_eq!(out, vec![Value::Column(array![1.0, 4.0, 16.0])]);
    }

    #[test]
    fn test_scalar_broadcasts_against_column() {
        let (vars, slots) = bound(&["a", "x"]);
        let expr = Expr::mul([vars[0].clone(), vars[1].clone()]);
        let compiled = compile_all(&[expr, Expr::one()], &slots).unwrap();

        let out = compiled
            .eval(&[Value::Scalar(2.0), Value::Column(array![1.0, 2.0])])
            .unwrap();
        assert_eq!(out[0], Value::Column(array![2.0, 4.0]));
        assert_eq!(out[1], Value::Scalar(1.0));
        assert_eq!(out[1].clone().into_column(2).unwrap(), array![1.0, 1.0]);
    }

    #[test]
    fn test_unbound_symbol_is_an_error() {
        let (vars, _) = bound(&["x"]);
        assert!(compile_all(&vars, &HashMap::new()).is_err());
    }

    #[test]
    fn test_function_call_over_column() {
        let (vars, slots) = bound(&["x"]);
        let compiled = compile_all(&[vars[0].exp()], &slots).unwrap();
        let out = compiled.eval(&[Value::Column(array![0.0, 1.0])]).unwrap();
        match &out[0] {
            Value::Column(c) => {
                assert!((c[0] - 1.0).abs() < 1e-12);
                assert!((c[1] - 1f64.exp()).abs() < 1e-12);
            }
            other => panic!("expected a column, got {:?}", other),
        }
    }
}
