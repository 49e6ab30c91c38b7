//! Tree automata as a state arena.
//!
//! An [`Automaton`] owns its states: a state is a [`StateId`] key of the
//! transition map, and children are plain keys into the same map. Cloning an
//! automaton clones the arena, which is how every stage keeps its input
//! intact.
//!
//! A folded automaton may also carry a [`RootBox`]: a box read from `x1`
//! whose ports continue into the root states.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::error::StructuralError;
use crate::transition::Transition;
use crate::types::{StateId, Var};

/// Box applied above the roots.
///
/// The tree starts with a copy of box `name` at `x1`. Port `i` of that copy
/// continues into `targets[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBox {
    pub name: String,
    pub targets: Vec<StateId>,
}

impl fmt::Display for RootBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, t) in self.targets.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", t)?;
        }
        write!(f, ")")
    }
}

/// Tree automaton over `LH`, `0`/`1` and port symbols.
///
/// Transitions are keyed by their source state and kept in insertion
/// order. Every child of a transition is a state of the arena, possibly
/// without outgoing transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Automaton {
    roots: Vec<StateId>,
    root_box: Option<RootBox>,
    transitions: BTreeMap<StateId, Vec<Transition>>,
    next_state: u32,
}

impl Automaton {
    /// Creates an empty automaton: no states, no roots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh state.
    pub fn add_state(&mut self) -> StateId {
        let id = StateId::new(self.next_state);
        self.next_state += 1;
        self.transitions.insert(id, Vec::new());
        id
    }

    fn register(&mut self, id: StateId) {
        self.transitions.entry(id).or_default();
        if id.raw() >= self.next_state {
            self.next_state = id.raw() + 1;
        }
    }

    /// Marks `state` as a root (once).
    pub fn add_root(&mut self, state: StateId) {
        self.register(state);
        if !self.roots.contains(&state) {
            self.roots.push(state);
        }
    }

    pub fn set_roots(&mut self, roots: Vec<StateId>) {
        self.roots.clear();
        for root in roots {
            self.add_root(root);
        }
    }

    pub fn roots(&self) -> &[StateId] {
        &self.roots
    }

    pub fn root_box(&self) -> Option<&RootBox> {
        self.root_box.as_ref()
    }

    /// Puts box `name` above the tree. The roots become `targets`.
    pub fn set_root_box(&mut self, name: &str, targets: Vec<StateId>) {
        self.set_roots(targets.clone());
        self.root_box = Some(RootBox { name: name.to_string(), targets });
    }

    /// Detaches the root box. The roots stay in place.
    pub fn take_root_box(&mut self) -> Option<RootBox> {
        self.root_box.take()
    }

    /// Adds a transition, registering its source and children as states.
    ///
    /// Returns `false` if an identical transition was already present.
    pub fn add_transition(&mut self, transition: Transition) -> bool {
        self.register(transition.source);
        for &child in &transition.children {
            self.register(child);
        }
        let list = self.transitions.entry(transition.source).or_default();
        if list.contains(&transition) {
            false
        } else {
            list.push(transition);
            true
        }
    }

    /// Outgoing transitions of `state` (empty for unknown states).
    pub fn transitions(&self, state: StateId) -> &[Transition] {
        self.transitions.get(&state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn transitions_mut(&mut self, state: StateId) -> Option<&mut Vec<Transition>> {
        self.transitions.get_mut(&state)
    }

    /// Detaches the transitions of `state`, leaving the state in place.
    pub fn take_transitions(&mut self, state: StateId) -> Vec<Transition> {
        self.transitions.get_mut(&state).map(std::mem::take).unwrap_or_default()
    }

    /// Replaces the transitions of `state`.
    pub fn set_transitions(&mut self, state: StateId, transitions: Vec<Transition>) {
        self.register(state);
        for t in &transitions {
            for &child in &t.children {
                self.register(child);
            }
        }
        self.transitions.insert(state, transitions);
    }

    /// All transitions, ordered by source state.
    pub fn iter_transitions(&self) -> impl Iterator<Item = &Transition> + '_ {
        self.transitions.values().flatten()
    }

    pub fn states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.transitions.keys().copied()
    }

    pub fn contains(&self, state: StateId) -> bool {
        self.transitions.contains_key(&state)
    }

    pub fn num_states(&self) -> usize {
        self.transitions.len()
    }

    pub fn num_transitions(&self) -> usize {
        self.transitions.values().map(Vec::len).sum()
    }

    /// No roots, no root box and no states.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.root_box.is_none() && self.transitions.is_empty()
    }

    /// `state` has a transition back into itself.
    pub fn has_self_loop(&self, state: StateId) -> bool {
        self.transitions(state).iter().any(Transition::is_self_loop)
    }

    /// First self-loop transition of `state`.
    pub fn self_loop(&self, state: StateId) -> Option<&Transition> {
        self.transitions(state).iter().find(|t| t.is_self_loop())
    }

    /// Variable decided by the tagged transitions of `state`.
    ///
    /// Returns `Ok(None)` when no transition of `state` is tagged.
    pub fn natural_level(&self, state: StateId) -> Result<Option<Var>, StructuralError> {
        let mut level: Option<Var> = None;
        for var in self.transitions(state).iter().filter_map(|t| t.var) {
            match level {
                None => level = Some(var),
                Some(first) if first != var => {
                    return Err(StructuralError::ConflictingVariables { state, first, second: var });
                }
                Some(_) => {}
            }
        }
        Ok(level)
    }

    /// Natural levels of every state that has one.
    pub fn natural_levels(&self) -> Result<BTreeMap<StateId, Var>, StructuralError> {
        let mut levels = BTreeMap::new();
        for state in self.states() {
            if let Some(var) = self.natural_level(state)? {
                levels.insert(state, var);
            }
        }
        Ok(levels)
    }

    /// Drops every state outside `keep` together with all transitions that
    /// touch a dropped state. Roots outside `keep` are dropped too.
    ///
    /// A root box loses all of its roots as soon as one target is dropped:
    /// a box with a dead port accepts nothing.
    pub fn retain_states(&mut self, keep: &BTreeSet<StateId>) {
        self.transitions.retain(|s, _| keep.contains(s));
        for list in self.transitions.values_mut() {
            list.retain(|t| t.children.iter().all(|c| keep.contains(c)));
        }
        self.roots.retain(|r| keep.contains(r));
        if let Some(root_box) = &self.root_box {
            if root_box.targets.iter().any(|t| !keep.contains(t)) {
                self.root_box = None;
                self.roots.clear();
            }
        }
    }

    /// Keeps only the transitions for which `pred` returns `true`.
    pub fn retain_transitions<F>(&mut self, mut pred: F)
    where
        F: FnMut(&Transition) -> bool,
    {
        for list in self.transitions.values_mut() {
            list.retain(|t| pred(t));
        }
    }

    /// Copy with the states renumbered `q0, q1, ...` in breadth-first order
    /// from the roots, children visited in transition order.
    pub fn renumbered(&self) -> Automaton {
        let mut order: BTreeMap<StateId, StateId> = BTreeMap::new();
        let mut queue: VecDeque<StateId> = self.roots.iter().copied().collect();
        if let Some(root_box) = &self.root_box {
            queue.extend(root_box.targets.iter().copied());
        }
        while let Some(state) = queue.pop_front() {
            if order.contains_key(&state) {
                continue;
            }
            order.insert(state, StateId::new(order.len() as u32));
            for t in self.transitions(state) {
                queue.extend(t.children.iter().filter(|c| !order.contains_key(c)));
            }
        }
        for state in self.states() {
            let fresh = StateId::new(order.len() as u32);
            order.entry(state).or_insert(fresh);
        }

        let rename = |s: &StateId| order[s];
        let mut result = Automaton {
            roots: self.roots.iter().map(rename).collect(),
            root_box: self.root_box.as_ref().map(|rb| RootBox {
                name: rb.name.clone(),
                targets: rb.targets.iter().map(rename).collect(),
            }),
            transitions: BTreeMap::new(),
            next_state: order.len() as u32,
        };
        for (source, list) in &self.transitions {
            let renamed = list
                .iter()
                .map(|t| Transition {
                    source: rename(source),
                    children: t.children.iter().map(rename).collect(),
                    ..t.clone()
                })
                .collect();
            result.transitions.insert(rename(source), renamed);
        }
        result
    }
}

impl fmt::Display for Automaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "roots: [")?;
        for (i, r) in self.roots.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", r)?;
        }
        writeln!(f, "]")?;
        if let Some(root_box) = &self.root_box {
            writeln!(f, "root box: {}", root_box)?;
        }
        for t in self.iter_transitions() {
            writeln!(f, "  {}", t)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn q(id: u32) -> StateId {
        StateId::new(id)
    }

    fn small() -> Automaton {
        let mut aut = Automaton::new();
        let root = aut.add_state();
        let z = aut.add_state();
        let o = aut.add_state();
        aut.add_root(root);
        aut.add_transition(Transition::branch(root, Some(Var::new(1)), z, o));
        aut.add_transition(Transition::terminal(z, false, Some(Var::new(2))));
        aut.add_transition(Transition::terminal(o, true, Some(Var::new(2))));
        aut
    }

    #[test]
    fn test_arena_allocation() {
        let mut aut = Automaton::new();
        assert!(aut.is_empty());
        let a = aut.add_state();
        let b = aut.add_state();
        assert_eq!((a, b), (q(0), q(1)));

        // Explicit ids bump the allocator.
        aut.add_transition(Transition::branch(q(7), None, q(7), q(7)));
        assert_eq!(aut.add_state(), q(8));
    }

    #[test]
    fn test_duplicate_transition_ignored() {
        let mut aut = small();
        let n = aut.num_transitions();
        assert!(!aut.add_transition(Transition::terminal(q(1), false, Some(Var::new(2)))));
        assert_eq!(aut.num_transitions(), n);
    }

    #[test]
    fn test_natural_levels() {
        let mut aut = small();
        let levels = aut.natural_levels().unwrap();
        assert_eq!(levels[&q(0)], Var::new(1));
        assert_eq!(levels[&q(1)], Var::new(2));

        aut.add_transition(Transition::branch(q(0), Some(Var::new(2)), q(1), q(1)));
        assert_eq!(
            aut.natural_level(q(0)),
            Err(StructuralError::ConflictingVariables {
                state: q(0),
                first: Var::new(1),
                second: Var::new(2),
            })
        );
    }

    #[test]
    fn test_retain_states() {
        let mut aut = small();
        let keep: BTreeSet<StateId> = [q(0), q(1)].into_iter().collect();
        aut.retain_states(&keep);
        assert_eq!(aut.num_states(), 2);
        // The branch lost its high child, so it is gone.
        assert!(aut.transitions(q(0)).is_empty());
        assert_eq!(aut.roots(), &[q(0)]);
    }

    #[test]
    fn test_root_box_needs_every_target() {
        let mut aut = small();
        aut.set_root_box("LPort", vec![q(1), q(2)]);
        println!("{}", aut);
        assert_eq!(aut.roots(), &[q(1), q(2)]);
        assert!(aut.to_string().contains("root box: LPort(q1, q2)\n"));

        let keep: BTreeSet<StateId> = [q(0), q(1)].into_iter().collect();
        aut.retain_states(&keep);
        assert_eq!(aut.root_box(), None);
        assert!(aut.roots().is_empty());
    }

    #[test]
    fn test_renumbered() {
        let mut aut = Automaton::new();
        aut.add_root(q(5));
        aut.add_transition(Transition::branch(q(5), Some(Var::new(1)), q(9), q(2)));
        aut.add_transition(Transition::terminal(q(9), false, Some(Var::new(2))));
        aut.add_transition(Transition::terminal(q(2), true, Some(Var::new(2))));
        aut.add_transition(Transition::terminal(q(7), true, Some(Var::new(2))));

        let renumbered = aut.renumbered();
        println!("{}", renumbered);
        assert_eq!(renumbered.roots(), &[q(0)]);
        assert_eq!(renumbered.transitions(q(0)), &[Transition::branch(q(0), Some(Var::new(1)), q(1), q(2))]);
        assert_eq!(renumbered.transitions(q(1)), &[Transition::terminal(q(1), false, Some(Var::new(2)))]);
        // Unreachable states come last.
        assert_eq!(renumbered.transitions(q(3)), &[Transition::terminal(q(3), true, Some(Var::new(2)))]);
        assert_eq!(renumbered.num_states(), 4);
        assert_eq!(renumbered.renumbered(), renumbered);
    }

    #[test]
    fn test_display() {
        let aut = small();
        let shown = aut.to_string();
        println!("{}", shown);
        assert!(shown.starts_with("roots: [q0]\n"));
        assert!(shown.contains("q0 -[LH, x1]-> (q1, q2)"));
        assert!(shown.contains("q2 -[1, x2]->"));
    }
}
