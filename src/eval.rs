//! Evaluation: reading the Boolean function an automaton represents.
//!
//! An automaton accepts whole decision trees, written here as truth tables
//! of length `2^max_var` (row `r` assigns `x1` the most significant bit of
//! `r`). A state accepts a subtree at level `l` through a transition tagged
//! `l` or untagged: a branch needs both children to accept the two halves
//! at `l + 1`, a leaf needs `l` to be the terminal level. Roots are entered
//! at `x1`.
//!
//! [`truth_table`] reports the value of a row when every accepted table
//! agrees on it.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

use log::trace;
use num_bigint::BigUint;

use crate::automaton::Automaton;
use crate::boxes::BoxCatalogue;
use crate::error::AbddError;
use crate::transition::Transition;
use crate::types::{StateId, Symbol, Var};
use crate::unfold::{is_unfolded, unfold};

/// Largest variable count the evaluator enumerates.
pub const MAX_EVAL_VARS: u32 = 20;

impl Automaton {
    /// Complete decision tree of `f` over `x1..=x{num_vars}`.
    ///
    /// Every inner node is tagged with its variable, leaves are tagged with
    /// the terminal level. `f` receives the values of `x1..` in order.
    pub fn from_truth_table<F>(num_vars: u32, f: F) -> Automaton
    where
        F: Fn(&[bool]) -> bool,
    {
        let mut aut = Automaton::new();
        let root = aut.add_state();
        aut.add_root(root);

        let mut layer: Vec<(StateId, Vec<bool>)> = vec![(root, Vec::new())];
        for v in 1..=num_vars {
            let var = Var::new(v);
            let mut next = Vec::with_capacity(layer.len() * 2);
            for (state, path) in layer {
                let low = aut.add_state();
                let high = aut.add_state();
                aut.add_transition(Transition::branch(state, Some(var), low, high));
                let mut low_path = path.clone();
                low_path.push(false);
                let mut high_path = path;
                high_path.push(true);
                next.push((low, low_path));
                next.push((high, high_path));
            }
            layer = next;
        }

        let terminal = Var::terminal(num_vars);
        for (state, path) in layer {
            aut.add_transition(Transition::terminal(state, f(&path), Some(terminal)));
        }
        aut
    }
}

fn unfolded<'a>(aut: &'a Automaton, catalogue: &BoxCatalogue, max_var: u32) -> Result<Cow<'a, Automaton>, AbddError> {
    if max_var > MAX_EVAL_VARS {
        return Err(AbddError::TooManyVariables {
            max_var,
            limit: MAX_EVAL_VARS,
        });
    }
    if is_unfolded(aut) {
        Ok(Cow::Borrowed(aut))
    } else {
        Ok(Cow::Owned(unfold(aut, catalogue, max_var)?))
    }
}

/// Transitions of `state` that may be read at `level`.
fn at_level(aut: &Automaton, state: StateId, level: Var) -> impl Iterator<Item = &Transition> + '_ {
    aut.transitions(state).iter().filter(move |t| t.var.map_or(true, |v| v == level))
}

/// Memoized sets of subtables accepted per (state, level).
struct Tables<'a> {
    aut: &'a Automaton,
    terminal: Var,
    cache: HashMap<(StateId, Var), BTreeSet<Vec<bool>>>,
}

impl Tables<'_> {
    fn accepted(&mut self, state: StateId, level: Var) -> BTreeSet<Vec<bool>> {
        if let Some(tables) = self.cache.get(&(state, level)) {
            return tables.clone();
        }
        let aut = self.aut;
        let mut tables = BTreeSet::new();
        for t in at_level(aut, state, level) {
            match (t.symbol, t.children.as_slice()) {
                (Symbol::Terminal(value), []) if level == self.terminal => {
                    tables.insert(vec![value]);
                }
                (Symbol::Branch, &[low, high]) if level < self.terminal => {
                    let lows = self.accepted(low, level.next());
                    if lows.is_empty() {
                        continue;
                    }
                    let highs = self.accepted(high, level.next());
                    for l in &lows {
                        for h in &highs {
                            tables.insert([l.as_slice(), h.as_slice()].concat());
                        }
                    }
                }
                _ => {}
            }
        }
        self.cache.insert((state, level), tables.clone());
        tables
    }
}

/// Memoized membership of one table, per (state, level, offset).
struct Membership<'a> {
    aut: &'a Automaton,
    terminal: Var,
    table: &'a [bool],
    cache: HashMap<(StateId, Var, usize), bool>,
}

impl Membership<'_> {
    fn accepts(&mut self, state: StateId, level: Var, offset: usize) -> bool {
        if let Some(&known) = self.cache.get(&(state, level, offset)) {
            return known;
        }
        let aut = self.aut;
        let half = (1usize << (self.terminal.id() - level.id())) / 2;
        let mut accepted = false;
        for t in at_level(aut, state, level) {
            accepted = match (t.symbol, t.children.as_slice()) {
                (Symbol::Terminal(value), []) => level == self.terminal && self.table[offset] == value,
                (Symbol::Branch, &[low, high]) if level < self.terminal => {
                    self.accepts(low, level.next(), offset) && self.accepts(high, level.next(), offset + half)
                }
                _ => false,
            };
            if accepted {
                break;
            }
        }
        self.cache.insert((state, level, offset), accepted);
        accepted
    }
}

/// Every truth table `aut` accepts over `x1..=x{max_var}`.
///
/// Box references, including a root box, are unfolded first.
pub fn language(aut: &Automaton, catalogue: &BoxCatalogue, max_var: u32) -> Result<BTreeSet<Vec<bool>>, AbddError> {
    let aut = unfolded(aut, catalogue, max_var)?;
    let mut tables = Tables {
        aut: &aut,
        terminal: Var::terminal(max_var),
        cache: HashMap::new(),
    };
    let mut result = BTreeSet::new();
    for &root in aut.roots() {
        result.extend(tables.accepted(root, Var::new(1)));
    }
    trace!("language: {} table(s) over {} variable(s)", result.len(), max_var);
    Ok(result)
}

/// `aut` accepts the decision tree with leaves `table`.
///
/// A table whose length is not `2^max_var` is never accepted.
pub fn accepts(aut: &Automaton, catalogue: &BoxCatalogue, table: &[bool], max_var: u32) -> Result<bool, AbddError> {
    let aut = unfolded(aut, catalogue, max_var)?;
    if table.len() != 1usize << max_var {
        return Ok(false);
    }
    let mut membership = Membership {
        aut: &aut,
        terminal: Var::terminal(max_var),
        table,
        cache: HashMap::new(),
    };
    Ok(aut.roots().iter().any(|&root| membership.accepts(root, Var::new(1), 0)))
}

/// Values under all `2^max_var` assignments. Row `r` assigns `x1` the most
/// significant bit of `r`.
///
/// A row is `None` when no table is accepted or accepted tables disagree
/// on it.
pub fn truth_table(aut: &Automaton, catalogue: &BoxCatalogue, max_var: u32) -> Result<Vec<Option<bool>>, AbddError> {
    let tables = language(aut, catalogue, max_var)?;
    let rows = 1usize << max_var;
    let mut iter = tables.iter();
    let Some(first) = iter.next() else {
        return Ok(vec![None; rows]);
    };
    let mut result: Vec<Option<bool>> = first.iter().map(|&v| Some(v)).collect();
    for table in iter {
        for (value, &other) in result.iter_mut().zip(table) {
            if *value != Some(other) {
                *value = None;
            }
        }
    }
    Ok(result)
}

/// Value of `aut` under `assignment` (`assignment[i]` is `x{i+1}`).
///
/// Box references are unfolded first. Returns `None` when no tree is
/// accepted or accepted trees disagree at this assignment.
pub fn evaluate(aut: &Automaton, catalogue: &BoxCatalogue, assignment: &[bool]) -> Result<Option<bool>, AbddError> {
    let max_var = u32::try_from(assignment.len()).unwrap_or(u32::MAX);
    let table = truth_table(aut, catalogue, max_var)?;
    let row = assignment.iter().fold(0usize, |row, &bit| (row << 1) | bit as usize);
    Ok(table[row])
}

/// Both automata accept the same truth tables.
pub fn equivalent(a: &Automaton, b: &Automaton, catalogue: &BoxCatalogue, max_var: u32) -> Result<bool, AbddError> {
    Ok(language(a, catalogue, max_var)? == language(b, catalogue, max_var)?)
}

/// Number of assignments whose row is `Some(true)` in [`truth_table`].
pub fn sat_count(aut: &Automaton, catalogue: &BoxCatalogue, max_var: u32) -> Result<BigUint, AbddError> {
    let table = truth_table(aut, catalogue, max_var)?;
    let count = table.iter().filter(|v| **v == Some(true)).count();
    Ok(BigUint::from(count))
}
