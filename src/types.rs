//! Type-safe wrappers for decision variables, states and symbols.
//!
//! This module provides the small value types every stage passes around:
//! [`Var`] names a decision variable (and doubles as a level), [`StateId`]
//! names a state of an automaton arena, and [`Symbol`] is the alphabet of
//! the tree automata.
use std::fmt;

/// A variable identifier (1-indexed).
///
/// Variables are the levels of an automaton: a transition tagged with `x3`
/// decides the third variable. The virtual terminal level of an automaton
/// over `n` variables is `x{n+1}`.
///
/// # Invariants
///
/// - Variable IDs must be >= 1 (0 is reserved)
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(u32);

impl Var {
    /// Creates a new variable with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if `id == 0`. Variables must be 1-indexed.
    pub fn new(id: u32) -> Self {
        assert_ne!(id, 0, "Variable IDs must be >= 1");
        Var(id)
    }

    /// Returns the raw variable ID as a `u32`.
    pub fn id(self) -> u32 {
        self.0
    }

    /// Returns the next variable down (`id + 1`).
    pub fn next(self) -> Self {
        Var(self.0 + 1)
    }

    /// Returns the previous variable up (`id - 1`), or `None` for `x1`.
    pub fn prev(self) -> Option<Self> {
        if self.0 > 1 {
            Some(Var(self.0 - 1))
        } else {
            None
        }
    }

    /// The terminal level of an automaton over `max_var` variables.
    pub fn terminal(max_var: u32) -> Self {
        Var(max_var + 1)
    }

    /// The zero-based index of this variable in an assignment slice.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

impl From<Var> for u32 {
    fn from(var: Var) -> Self {
        var.0
    }
}

/// Identifier of a state inside one [`Automaton`][crate::automaton::Automaton] arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StateId(u32);

impl StateId {
    pub const fn new(id: u32) -> Self {
        StateId(id)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Transition symbol.
///
/// Ordering puts terminals first (`0` before `1`), then branches, then ports
/// by index. Stages that group by symbol rely on this order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Symbol {
    /// Terminal leaf `0` / `1`.
    Terminal(bool),
    /// Binary branch `LH` (low child first, high child second).
    Branch,
    /// Placeholder output of a box, numbered in port order.
    Port(u32),
}

impl Symbol {
    pub fn arity(self) -> usize {
        match self {
            Symbol::Branch => 2,
            Symbol::Terminal(_) | Symbol::Port(_) => 0,
        }
    }

    pub fn is_port(self) -> bool {
        matches!(self, Symbol::Port(_))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Terminal(false) => write!(f, "0"),
            Symbol::Terminal(true) => write!(f, "1"),
            Symbol::Branch => write!(f, "LH"),
            Symbol::Port(k) => write!(f, "Port{}", k),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_creation() {
        let v = Var::new(1);
        assert_eq!(v.id(), 1);
        assert_eq!(v.index(), 0);
        assert_eq!(format!("{}", v), "x1");
    }

    #[test]
    #[should_panic(expected = "Variable IDs must be >= 1")]
    fn test_var_zero_panics() {
        Var::new(0);
    }

    #[test]
    fn test_var_neighbours() {
        let v = Var::new(3);
        assert_eq!(v.next(), Var::new(4));
        assert_eq!(v.prev(), Some(Var::new(2)));
        assert_eq!(Var::new(1).prev(), None);
        assert_eq!(Var::terminal(5), Var::new(6));
    }

    #[test]
    fn test_symbol_order_and_display() {
        let mut symbols = vec![Symbol::Port(1), Symbol::Branch, Symbol::Terminal(true), Symbol::Port(0), Symbol::Terminal(false)];
        symbols.sort();
        let shown: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();
        assert_eq!(shown, ["0", "1", "LH", "Port0", "Port1"]);
        assert_eq!(Symbol::Branch.arity(), 2);
        assert_eq!(Symbol::Port(3).arity(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(StateId::new(7).to_string(), "q7");
    }
}
