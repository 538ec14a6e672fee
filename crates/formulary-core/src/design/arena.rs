//! Positional placeholders for one compilation pass.
//!
//! Before compiling, every parameter and every regressor in the design
//! expression is renamed to a placeholder `__p{i}__` / `__t{j}__`. The
//! compiled program then only knows input positions: parameters first,
//! regressors after them. Placeholders are a separate symbol kind, so they
//! cannot collide with user names.

use std::collections::HashMap;

use crate::symbolic::{Expr, Slot, Symbol};

#[derive(Debug, Clone)]
pub struct SlotArena {
    params: Vec<Symbol>,
    terms: Vec<Symbol>,
}

impl SlotArena {
    pub fn new(params: Vec<Symbol>, terms: Vec<Symbol>) -> Self {
        SlotArena { params, terms }
    }

    pub fn params(&self) -> &[Symbol] {
        &self.params
    }

    pub fn terms(&self) -> &[Symbol] {
        &self.terms
    }

    /// Total number of inputs of the compiled program.
    pub fn len(&self) -> usize {
        self.params.len() + self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> impl Iterator<Item = (&Symbol, Slot)> {
        let params = self.params.iter().enumerate().map(|(i, s)| (s, Slot::Param(i)));
        let terms = self.terms.iter().enumerate().map(|(j, s)| (s, Slot::Term(j)));
        params.chain(terms)
    }

    /// Original symbol to placeholder.
    pub fn renaming(&self) -> HashMap<Symbol, Expr> {
        self.slots()
            .map(|(s, slot)| (s.clone(), Expr::symbol(Symbol::Placeholder(slot))))
            .collect()
    }

    /// Placeholder to input position.
    pub fn positions(&self) -> HashMap<Symbol, usize> {
        let n_params = self.params.len();
        self.slots()
            .map(|(_, slot)| {
                let pos = match slot {
                    Slot::Param(i) => i,
                    Slot::Term(j) => n_params + j,
                };
                (Symbol::Placeholder(slot), pos)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_come_before_terms() {
        let arena = SlotArena::new(
            vec![Symbol::Parameter("theta".into())],
            vec![Symbol::Term("x".into()), Symbol::Term("y".into())],
        );
        assert_eq!(arena.len(), 3);

        let renaming = arena.renaming();
        assert_eq!(renaming[&Symbol::Term("y".into())].to_string(), "__t1__");
        assert_eq!(renaming[&Symbol::Parameter("theta".into())].to_string(), "__p0__");

        let positions = arena.positions();
        assert_eq!(positions[&Symbol::Placeholder(Slot::Param(0))], 0);
        assert_eq!(positions[&Symbol::Placeholder(Slot::Term(1))], 2);
    }
}
