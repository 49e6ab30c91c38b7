//! Normalization: a canonical, per-level automaton from an unfolded one.
//!
//! The construction is a bottom-up subset construction done one variable
//! level at a time. Each output state is a *macrostate*, a set of input
//! states that accept the same trees from that level down:
//!
//! 1. At the terminal level `x{max_var+1}`, states are grouped by the leaf
//!    symbol they produce.
//! 2. At level `v`, for every ordered pair of macrostates `(low, high)` of the
//!    level below, the sources of all `LH` transitions tagged `v` (or
//!    untagged) whose children fall into `low` and `high` form a new
//!    macrostate with a transition into `(low, high)`. The transition is
//!    tagged `v` only if some matching input transition was.
//! 3. Roots are the macrostates, at any level, that contain an input root.
//!
//! Macrostates are identified by their state set only, so the same set
//! appearing on several levels is one output state. This is how untagged
//! self-loops survive. A transition built at level `v` is kept only if its
//! macrostate is reached at `v` from a root, so a self-loop that no run
//! needs is dropped.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, trace};

use crate::algebra::{reachable_top_down, trim};
use crate::automaton::Automaton;
use crate::error::{AbddError, StructuralError};
use crate::transition::Transition;
use crate::types::{StateId, Symbol, Var};

/// Normalizes the box-free automaton `aut` over variables `x1..=x{max_var}`.
pub fn normalize(aut: &Automaton, max_var: u32) -> Result<Automaton, AbddError> {
    debug!(
        "normalize(states = {}, transitions = {}, max_var = {})",
        aut.num_states(),
        aut.num_transitions(),
        max_var
    );
    validate(aut, max_var)?;

    let terminal = Var::terminal(max_var);
    let roots: BTreeSet<StateId> = aut.roots().iter().copied().collect();
    let mut builder = Builder::default();
    // Root macrostates with the level they were formed at.
    let mut entries: Vec<(StateId, Var)> = Vec::new();

    // Terminal level.
    let mut groups: BTreeMap<Symbol, BTreeSet<StateId>> = BTreeMap::new();
    for t in aut.iter_transitions().filter(|t| t.is_leaf()) {
        groups.entry(t.symbol).or_default().insert(t.source);
    }
    let mut worklist: Vec<(BTreeSet<StateId>, StateId)> = Vec::new();
    for (symbol, states) in groups {
        let id = builder.intern(&states);
        builder.add(Transition::new(id, symbol, Vec::new(), Vec::new(), Some(terminal)), terminal);
        if !states.is_disjoint(&roots) {
            builder.out.add_root(id);
            entries.push((id, terminal));
        }
        if !worklist.iter().any(|(_, w)| *w == id) {
            worklist.push((states, id));
        }
    }
    trace!("level {}: {} macrostate(s)", terminal, worklist.len());

    for v in (1..=max_var).rev() {
        let var = Var::new(v);

        let mut member_of: BTreeMap<StateId, Vec<usize>> = BTreeMap::new();
        for (i, (states, _)) in worklist.iter().enumerate() {
            for &s in states {
                member_of.entry(s).or_default().push(i);
            }
        }

        // (low, high) -> (sources, some source carried `var`)
        let mut matches: BTreeMap<(usize, usize), (BTreeSet<StateId>, bool)> = BTreeMap::new();
        for t in aut.iter_transitions() {
            if t.symbol != Symbol::Branch || t.var.is_some_and(|tag| tag != var) {
                continue;
            }
            let (Some(lows), Some(highs)) = (member_of.get(&t.children[0]), member_of.get(&t.children[1])) else {
                continue;
            };
            for &i in lows {
                for &j in highs {
                    let entry = matches.entry((i, j)).or_default();
                    entry.0.insert(t.source);
                    entry.1 |= t.var.is_some();
                }
            }
        }

        let mut next: Vec<(BTreeSet<StateId>, StateId)> = Vec::new();
        for ((i, j), (sources, tagged)) in matches {
            let id = builder.intern(&sources);
            let tag = if tagged { Some(var) } else { None };
            builder.add(Transition::branch(id, tag, worklist[i].1, worklist[j].1), var);
            if !sources.is_disjoint(&roots) {
                builder.out.add_root(id);
                entries.push((id, var));
            }
            if !next.iter().any(|(_, n)| *n == id) {
                next.push((sources, id));
            }
        }
        trace!("level {}: {} macrostate(s)", var, next.len());
        worklist = next;
    }

    let used = builder.used_from(entries);
    let mut result = builder.out;
    result.retain_transitions(|t| used.contains(t));
    trim(&mut result);
    prune_order_violations(&mut result);
    trim(&mut result);
    check_normalized(&result)?;

    debug!(
        "normalize: {} macrostate(s) -> states = {}, transitions = {}",
        builder.registry.len(),
        result.num_states(),
        result.num_transitions()
    );
    Ok(result)
}

/// Output automaton plus the macrostate registry.
#[derive(Default)]
struct Builder {
    out: Automaton,
    registry: BTreeMap<BTreeSet<StateId>, StateId>,
    /// Transitions built for a macrostate at a given level.
    built: BTreeMap<(StateId, Var), Vec<Transition>>,
}

impl Builder {
    fn intern(&mut self, states: &BTreeSet<StateId>) -> StateId {
        if let Some(&id) = self.registry.get(states) {
            return id;
        }
        let id = self.out.add_state();
        self.registry.insert(states.clone(), id);
        id
    }

    fn add(&mut self, t: Transition, level: Var) {
        self.built.entry((t.source, level)).or_default().push(t.clone());
        self.out.add_transition(t);
    }

    /// Transitions reachable from `entries`, each one only at the level it
    /// was built for.
    fn used_from(&self, entries: Vec<(StateId, Var)>) -> HashSet<Transition> {
        let mut used = HashSet::new();
        let mut visited = BTreeSet::new();
        let mut stack = entries;
        while let Some((state, level)) = stack.pop() {
            if !visited.insert((state, level)) {
                continue;
            }
            for t in self.built.get(&(state, level)).into_iter().flatten() {
                used.insert(t.clone());
                stack.extend(t.children.iter().map(|&c| (c, level.next())));
            }
        }
        used
    }
}

fn validate(aut: &Automaton, max_var: u32) -> Result<(), StructuralError> {
    if let Some(root_box) = aut.root_box() {
        return Err(StructuralError::BoxedRoot {
            name: root_box.name.clone(),
        });
    }
    for t in aut.iter_transitions() {
        if t.has_box() {
            return Err(StructuralError::BoxedInput { state: t.source });
        }
        if t.slots.len() != t.symbol.arity() || t.children.len() != t.symbol.arity() {
            return Err(StructuralError::ArityMismatch {
                state: t.source,
                expected: t.symbol.arity(),
                found: t.children.len(),
            });
        }
        match t.var {
            None if t.symbol == Symbol::Branch && !t.is_self_loop() => {
                return Err(StructuralError::MissingVariable { state: t.source });
            }
            Some(var) => {
                let limit = if t.is_leaf() { max_var + 1 } else { max_var };
                if var.id() > limit {
                    return Err(StructuralError::VariableOutOfRange {
                        state: t.source,
                        var,
                        max_var,
                    });
                }
            }
            None => {}
        }
    }
    Ok(())
}

/// Drops tagged transitions into a state whose highest tag is not below
/// the source's highest tag.
fn prune_order_violations(aut: &mut Automaton) {
    let mut highest: BTreeMap<StateId, Var> = BTreeMap::new();
    for t in aut.iter_transitions() {
        if let Some(var) = t.var {
            let entry = highest.entry(t.source).or_insert(var);
            if var > *entry {
                *entry = var;
            }
        }
    }
    let before = aut.num_transitions();
    aut.retain_transitions(|t| {
        let (Some(_), Some(&src)) = (t.var, highest.get(&t.source)) else {
            return true;
        };
        t.children.iter().all(|c| highest.get(c).map_or(true, |&m| m > src))
    });
    if aut.num_transitions() != before {
        trace!("pruned {} order-violating transition(s)", before - aut.num_transitions());
    }
}

/// Checks the normal form: among reachable transitions, no two share the
/// symbol, the child sequence and the variable tag.
///
/// The same children may appear under different variables: a state that
/// skips levels reads them once per level it is entered at.
pub fn check_normalized(aut: &Automaton) -> Result<(), AbddError> {
    let reachable = reachable_top_down(aut);
    let mut seen: BTreeSet<(Symbol, &[StateId], Option<Var>)> = BTreeSet::new();
    for t in aut.iter_transitions().filter(|t| reachable.contains(&t.source)) {
        if !seen.insert((t.symbol, t.children.as_slice(), t.var)) {
            return Err(AbddError::NormalizationInconsistency {
                symbol: t.symbol,
                children: t.children.clone(),
            });
        }
    }
    Ok(())
}

/// See [`check_normalized`].
pub fn is_normalized(aut: &Automaton) -> bool {
    check_normalized(aut).is_ok()
}
