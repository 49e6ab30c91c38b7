//! Errors raised by the canonicalization stages.
//!
//! A failed box match is not an error: the folder reports it as `None` and
//! moves on. What surfaces here is malformed input ([`StructuralError`]) and
//! a broken normal form ([`AbddError::NormalizationInconsistency`]), plus
//! the enumeration limit of the evaluator.

use std::fmt;

use crate::types::{StateId, Symbol, Var};

/// Malformed input. Raised before a stage touches its working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// A slot names a box that is not in the catalogue.
    UnknownBox { name: String },
    /// The children of a transition do not match the arity of its slots.
    ArityMismatch { state: StateId, expected: usize, found: usize },
    /// A transition (or the state a port is redirected to) has no variable tag.
    MissingVariable { state: StateId },
    /// One state carries tagged transitions for two different variables.
    ConflictingVariables { state: StateId, first: Var, second: Var },
    /// A tag lies outside `x1..=x{max_var}` (or the terminal level).
    VariableOutOfRange { state: StateId, var: Var, max_var: u32 },
    /// A box slot where a box-free automaton was required.
    BoxedInput { state: StateId },
    /// A box automaton violates the catalogue rules.
    InvalidBox { name: String, reason: String },
    /// A root box where a box-free automaton was required.
    BoxedRoot { name: String },
    /// The root box targets do not match the ports of the box.
    RootBoxArity { name: String, expected: usize, found: usize },
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::UnknownBox { name } => write!(f, "unknown box '{}'", name),
            StructuralError::ArityMismatch { state, expected, found } => {
                write!(f, "transition from {} has {} children, slots require {}", state, found, expected)
            }
            StructuralError::MissingVariable { state } => write!(f, "missing variable tag at {}", state),
            StructuralError::ConflictingVariables { state, first, second } => {
                write!(f, "state {} is tagged with both {} and {}", state, first, second)
            }
            StructuralError::VariableOutOfRange { state, var, max_var } => {
                write!(f, "variable {} at {} is out of range (max_var = {})", var, state, max_var)
            }
            StructuralError::BoxedInput { state } => write!(f, "unexpected box slot at {}", state),
            StructuralError::InvalidBox { name, reason } => write!(f, "invalid box '{}': {}", name, reason),
            StructuralError::BoxedRoot { name } => write!(f, "unexpected root box '{}'", name),
            StructuralError::RootBoxArity { name, expected, found } => {
                write!(f, "root box '{}' has {} targets, the box has {} ports", name, found, expected)
            }
        }
    }
}

impl std::error::Error for StructuralError {}

/// Error returned by the pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbddError {
    /// Malformed input.
    Structural(StructuralError),
    /// The normalizer produced two transitions with the same symbol, child
    /// sequence and variable tag.
    NormalizationInconsistency { symbol: Symbol, children: Vec<StateId> },
    /// Evaluation would enumerate more than `2^limit` assignments.
    TooManyVariables { max_var: u32, limit: u32 },
}

impl From<StructuralError> for AbddError {
    fn from(e: StructuralError) -> Self {
        AbddError::Structural(e)
    }
}

impl fmt::Display for AbddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbddError::Structural(e) => write!(f, "structural error: {}", e),
            AbddError::NormalizationInconsistency { symbol, children } => {
                write!(f, "normalization inconsistency: duplicate {} transitions into (", symbol)?;
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, ")")
            }
            AbddError::TooManyVariables { max_var, limit } => {
                write!(f, "cannot evaluate over {} variables (limit is {})", max_var, limit)
            }
        }
    }
}

impl std::error::Error for AbddError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AbddError::Structural(e) => Some(e),
            AbddError::NormalizationInconsistency { .. } | AbddError::TooManyVariables { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = AbddError::from(StructuralError::UnknownBox { name: "Y".to_string() });
        assert_eq!(e.to_string(), "structural error: unknown box 'Y'");

        let e = AbddError::NormalizationInconsistency {
            symbol: Symbol::Branch,
            children: vec![StateId::new(1), StateId::new(2)],
        };
        assert_eq!(e.to_string(), "normalization inconsistency: duplicate LH transitions into (q1, q2)");

        let e = AbddError::TooManyVariables { max_var: 64, limit: 20 };
        assert_eq!(e.to_string(), "cannot evaluate over 64 variables (limit is 20)");
    }
}
