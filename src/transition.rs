//! Transitions and box slots.

use std::fmt;

use crate::types::{StateId, Symbol, Var};

/// Box reference attached to one branch position of a transition.
///
/// `NoBox` consumes exactly one child. `Boxed(name)` consumes as many
/// children as the named box has ports; the count comes from
/// [`BoxCatalogue::slot_arity`][crate::boxes::BoxCatalogue::slot_arity].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoxSlot {
    NoBox,
    Boxed(String),
}

impl BoxSlot {
    pub fn boxed(name: impl Into<String>) -> Self {
        BoxSlot::Boxed(name.into())
    }

    pub fn is_boxed(&self) -> bool {
        matches!(self, BoxSlot::Boxed(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            BoxSlot::NoBox => None,
            BoxSlot::Boxed(name) => Some(name),
        }
    }
}

impl fmt::Display for BoxSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxSlot::NoBox => write!(f, "_"),
            BoxSlot::Boxed(name) => write!(f, "{}", name),
        }
    }
}

/// A tree-automaton transition `source -[symbol, var]-> (children)`.
///
/// Branch transitions carry one slot per branch position; leaf transitions
/// (terminals and ports) carry none. The variable tag is absent on
/// self-loops and on transitions whose level is not resolved yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transition {
    pub source: StateId,
    pub symbol: Symbol,
    pub children: Vec<StateId>,
    pub slots: Vec<BoxSlot>,
    pub var: Option<Var>,
}

impl Transition {
    pub fn new(source: StateId, symbol: Symbol, children: Vec<StateId>, slots: Vec<BoxSlot>, var: Option<Var>) -> Self {
        Self {
            source,
            symbol,
            children,
            slots,
            var,
        }
    }

    /// Unboxed branch transition `source -[LH, var]-> (low, high)`.
    pub fn branch(source: StateId, var: Option<Var>, low: StateId, high: StateId) -> Self {
        Self::new(source, Symbol::Branch, vec![low, high], vec![BoxSlot::NoBox, BoxSlot::NoBox], var)
    }

    /// Branch transition with explicit slots.
    ///
    /// `children` must list the children of every slot in order, so a
    /// two-port box in the low slot takes the first two children.
    pub fn boxed_branch(source: StateId, var: Option<Var>, low: BoxSlot, high: BoxSlot, children: Vec<StateId>) -> Self {
        Self::new(source, Symbol::Branch, children, vec![low, high], var)
    }

    pub fn terminal(source: StateId, value: bool, var: Option<Var>) -> Self {
        Self::new(source, Symbol::Terminal(value), Vec::new(), Vec::new(), var)
    }

    pub fn port(source: StateId, index: u32) -> Self {
        Self::new(source, Symbol::Port(index), Vec::new(), Vec::new(), None)
    }

    pub fn is_self_loop(&self) -> bool {
        self.children.contains(&self.source)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn has_box(&self) -> bool {
        self.slots.iter().any(BoxSlot::is_boxed)
    }

    /// All children are the same state.
    pub fn is_unified(&self) -> bool {
        match self.children.split_first() {
            Some((first, rest)) => rest.iter().all(|c| c == first),
            None => false,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}", self.source, self.symbol)?;
        if let Some(var) = self.var {
            write!(f, ", {}", var)?;
        }
        if self.has_box() {
            write!(f, "; ")?;
            for (i, slot) in self.slots.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", slot)?;
            }
        }
        write!(f, "]->")?;
        if !self.children.is_empty() {
            write!(f, " (")?;
            for (i, c) in self.children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", c)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
