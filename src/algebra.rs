//! Tree-automaton algebra: reachability, trimming and non-emptiness.
//!
//! These are the plain automaton operations the canonicalization stages are
//! built on. None of them looks at variable tags or box slots: a transition
//! is just a source, a symbol and its children.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use log::trace;

use crate::automaton::Automaton;
use crate::transition::Transition;
use crate::types::StateId;

/// States reachable from the roots (roots included).
pub fn reachable_top_down(aut: &Automaton) -> BTreeSet<StateId> {
    let mut visited = BTreeSet::new();
    let mut queue: VecDeque<StateId> = aut.roots().iter().copied().collect();
    while let Some(state) = queue.pop_front() {
        if !visited.insert(state) {
            continue;
        }
        for t in aut.transitions(state) {
            for &child in &t.children {
                if !visited.contains(&child) {
                    queue.push_back(child);
                }
            }
        }
    }
    visited
}

/// Productive states: those accepting at least one finite tree.
pub fn reachable_bottom_up(aut: &Automaton) -> BTreeSet<StateId> {
    productive_with_choice(aut).0
}

fn productive_with_choice(aut: &Automaton) -> (BTreeSet<StateId>, BTreeMap<StateId, Transition>) {
    let mut productive = BTreeSet::new();
    let mut choice = BTreeMap::new();
    loop {
        let mut changed = false;
        for t in aut.iter_transitions() {
            if productive.contains(&t.source) {
                continue;
            }
            if t.children.iter().all(|c| productive.contains(c)) {
                productive.insert(t.source);
                choice.insert(t.source, t.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    (productive, choice)
}

/// Removes useless states: keeps what is both productive and reachable from
/// a root through productive transitions.
pub fn trim(aut: &mut Automaton) {
    let before = aut.num_states();
    let productive = reachable_bottom_up(aut);
    aut.retain_states(&productive);
    let reachable = reachable_top_down(aut);
    aut.retain_states(&reachable);
    trace!("trim: {} -> {} states", before, aut.num_states());
}

/// A tree accepted by an automaton, stored as one chosen transition per
/// state so shared subtrees stay shared.
#[derive(Debug, Clone)]
pub struct Witness {
    root: StateId,
    choice: BTreeMap<StateId, Transition>,
}

impl Witness {
    pub fn root(&self) -> StateId {
        self.root
    }

    fn fmt_at(&self, state: StateId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(t) = self.choice.get(&state) else {
            return write!(f, "?");
        };
        write!(f, "{}", t.symbol)?;
        if !t.children.is_empty() {
            write!(f, "[")?;
            for (i, &c) in t.children.iter().enumerate() {
                if i > 0 {
                    write!(f, ";")?;
                }
                self.fmt_at(c, f)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_at(self.root, f)
    }
}

/// Returns a witness tree if some root accepts anything.
pub fn non_empty(aut: &Automaton) -> Option<Witness> {
    let (productive, choice) = productive_with_choice(aut);
    let root = aut.roots().iter().copied().find(|r| productive.contains(r))?;
    Some(Witness { root, choice })
}

/// Whole-automaton reachability: `result[s]` holds every state reachable
/// from `s` in one or more steps. `s` itself is included only when it lies
/// on a cycle.
pub fn reachability_relation(aut: &Automaton) -> BTreeMap<StateId, BTreeSet<StateId>> {
    let mut relation = BTreeMap::new();
    for state in aut.states() {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<StateId> = Vec::new();
        for t in aut.transitions(state) {
            stack.extend(t.children.iter().copied());
        }
        while let Some(s) = stack.pop() {
            if !seen.insert(s) {
                continue;
            }
            for t in aut.transitions(s) {
                stack.extend(t.children.iter().copied().filter(|c| !seen.contains(c)));
            }
        }
        relation.insert(state, seen);
    }
    relation
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::types::Var;

    fn q(id: u32) -> StateId {
        StateId::new(id)
    }

    /// q0 -> (q1, q2), q1 -> 0, q2 loops forever, q3 -> 1 is unreachable.
    fn sample() -> Automaton {
        let mut aut = Automaton::new();
        aut.add_root(q(0));
        aut.add_transition(Transition::branch(q(0), Some(Var::new(1)), q(1), q(2)));
        aut.add_transition(Transition::branch(q(0), Some(Var::new(1)), q(1), q(1)));
        aut.add_transition(Transition::terminal(q(1), false, None));
        aut.add_transition(Transition::branch(q(2), None, q(2), q(2)));
        aut.add_transition(Transition::terminal(q(3), true, None));
        aut
    }

    #[test]
    fn test_reachability() {
        let aut = sample();
        let top_down = reachable_top_down(&aut);
        assert_eq!(top_down, [q(0), q(1), q(2)].into_iter().collect());
        let bottom_up = reachable_bottom_up(&aut);
        assert_eq!(bottom_up, [q(0), q(1), q(3)].into_iter().collect());
    }

    #[test]
    fn test_trim() {
        let mut aut = sample();
        trim(&mut aut);
        println!("{}", aut);
        assert_eq!(aut.states().collect::<Vec<_>>(), vec![q(0), q(1)]);
        assert_eq!(aut.num_transitions(), 2);
    }

    #[test]
    fn test_non_empty() {
        let aut = sample();
        let witness = non_empty(&aut).unwrap();
        assert_eq!(witness.root(), q(0));
        assert_eq!(witness.to_string(), "LH[0;0]");

        let mut empty = Automaton::new();
        empty.add_root(q(0));
        empty.add_transition(Transition::branch(q(0), None, q(0), q(0)));
        assert!(non_empty(&empty).is_none());
    }

    #[test]
    fn test_reachability_relation() {
        let aut = sample();
        let reach = reachability_relation(&aut);
        assert_eq!(reach[&q(0)], [q(1), q(2)].into_iter().collect());
        assert!(reach[&q(1)].is_empty());
        // Only states on a cycle reach themselves.
        assert!(reach[&q(2)].contains(&q(2)));
        assert!(!reach[&q(0)].contains(&q(0)));
    }
}
