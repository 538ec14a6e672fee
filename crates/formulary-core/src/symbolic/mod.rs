// =============================================================================
// Symbolic Engine
// =============================================================================
//
// A small computer-algebra core, just large enough for regression formulae:
//
//   - number:   exact rational constants with a float fallback
//   - expr:     canonical expression tree and the closed set of symbol kinds
//   - display:  printed form (doubles as design-matrix field names)
//   - diff:     partial derivatives
//   - compiler: bytecode compilation and column-wise numeric evaluation
//
// Expressions are immutable and cheap to clone (reference counted). Every
// constructor returns canonical form, so structural equality is symbolic
// equality.
//
// =============================================================================

pub mod compiler;
pub mod diff;
mod display;
pub mod expr;
pub mod number;

pub use compiler::{compile_all, BytecodeOp, CompiledExprs, Program, Value};
pub use diff::diff;
pub use expr::{Expr, ExprKind, Func, Level, Slot, Symbol};
pub use number::Number;
