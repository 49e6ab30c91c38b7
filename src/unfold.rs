//! Unfolding: expanding box references into explicit structure.
//!
//! Every slot that names a box is replaced by a fresh copy of the box
//! automaton. The copy is entered one level below the boxed transition, and
//! each port state of the copy continues as the corresponding child of the
//! slot: it receives copies of that child's transitions.
//!
//! Box automata carry no variables, so each copy is saturated with variable
//! tags on the fly. The root starts one level past the boxed edge, port
//! states sit at the level of the state they continue into, terminal leaves
//! sit at the terminal level, and the remaining tags follow from alternating
//! top-down and bottom-up propagation. Self-loops stay untagged.
//!
//! A root box is expanded first: its copy is entered at `x1` and becomes the
//! only root.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};

use crate::algebra::trim;
use crate::automaton::Automaton;
use crate::boxes::{BoxCatalogue, BoxDef};
use crate::error::{AbddError, StructuralError};
use crate::transition::{BoxSlot, Transition};
use crate::types::{StateId, Symbol, Var};

/// No slot of `aut` names a box and there is no root box.
pub fn is_unfolded(aut: &Automaton) -> bool {
    aut.root_box().is_none() && !aut.iter_transitions().any(Transition::has_box)
}

/// Expands every box reference of `aut`.
///
/// `max_var` is the number of decision variables; untagged terminal
/// transitions are tagged with the terminal level `x{max_var+1}`. The
/// result is box-free, trimmed and accepts the same trees as `aut`.
pub fn unfold(aut: &Automaton, catalogue: &BoxCatalogue, max_var: u32) -> Result<Automaton, AbddError> {
    debug!(
        "unfold(states = {}, transitions = {}, max_var = {})",
        aut.num_states(),
        aut.num_transitions(),
        max_var
    );
    catalogue.check_automaton(aut)?;

    let terminal = Var::terminal(max_var);
    let mut result = aut.clone();
    tag_terminals(&mut result, terminal);
    if let Some(root_box) = result.take_root_box() {
        let levels = result.natural_levels()?;
        let def = catalogue.get(&root_box.name)?;
        let mut redirects = Vec::new();
        let root = instantiate(&mut result, def, Var::new(1), &root_box.targets, &levels, terminal, &mut redirects)?;
        trace!("root box {} -> {}", root_box, root);
        result.set_roots(vec![root]);
        redirect(&mut result, redirects);
    }

    let mut passes = 0;
    while !is_unfolded(&result) {
        passes += 1;
        unfold_pass(&mut result, catalogue, terminal)?;
    }
    trim(&mut result);

    debug!(
        "unfold: {} pass(es) -> states = {}, transitions = {}",
        passes,
        result.num_states(),
        result.num_transitions()
    );
    Ok(result)
}

fn tag_terminals(aut: &mut Automaton, terminal: Var) {
    let states: Vec<StateId> = aut.states().collect();
    for state in states {
        if let Some(list) = aut.transitions_mut(state) {
            for t in list.iter_mut().filter(|t| t.symbol.is_terminal() && t.var.is_none()) {
                t.var = Some(terminal);
            }
        }
    }
}

/// Expands the box slots present at the start of the pass. Boxes nested
/// inside box automata show up as new boxed transitions for the next pass.
fn unfold_pass(result: &mut Automaton, catalogue: &BoxCatalogue, terminal: Var) -> Result<(), AbddError> {
    let levels = result.natural_levels()?;
    let mut redirects: Vec<(StateId, StateId)> = Vec::new();

    let states: Vec<StateId> = result.states().collect();
    for state in states {
        if !result.transitions(state).iter().any(Transition::has_box) {
            continue;
        }
        let old = result.take_transitions(state);
        let mut new = Vec::with_capacity(old.len());
        for t in old {
            if t.has_box() {
                new.push(expand(result, catalogue, &t, &levels, terminal, &mut redirects)?);
            } else {
                new.push(t);
            }
        }
        result.set_transitions(state, new);
    }
    redirect(result, redirects);
    Ok(())
}

/// Gives each port state of a box copy the transitions of its target.
fn redirect(result: &mut Automaton, redirects: Vec<(StateId, StateId)>) {
    for (port, target) in redirects {
        let copies: Vec<Transition> = result
            .transitions(target)
            .iter()
            .map(|t| Transition {
                source: port,
                ..t.clone()
            })
            .collect();
        trace!("redirect {} -> {} ({} transitions)", port, target, copies.len());
        for t in copies {
            result.add_transition(t);
        }
    }
}

/// Replaces each boxed slot of `t` by the root of a fresh box copy.
fn expand(
    result: &mut Automaton,
    catalogue: &BoxCatalogue,
    t: &Transition,
    levels: &BTreeMap<StateId, Var>,
    terminal: Var,
    redirects: &mut Vec<(StateId, StateId)>,
) -> Result<Transition, AbddError> {
    let var = t.var.ok_or(StructuralError::MissingVariable { state: t.source })?;
    let spans = catalogue.slot_spans(t)?;

    let mut children = Vec::with_capacity(t.slots.len());
    for (slot, span) in t.slots.iter().zip(spans) {
        match slot {
            BoxSlot::NoBox => children.extend_from_slice(&t.children[span]),
            BoxSlot::Boxed(name) => {
                let def = catalogue.get(name)?;
                let targets = &t.children[span];
                let root = instantiate(result, def, var.next(), targets, levels, terminal, redirects)?;
                trace!("expand {} slot {} -> {}", t.source, name, root);
                children.push(root);
            }
        }
    }
    let slots = vec![BoxSlot::NoBox; t.slots.len()];
    Ok(Transition::new(t.source, t.symbol, children, slots, t.var))
}

/// Copies `def` into `result` with fresh states and returns the copy's root.
fn instantiate(
    result: &mut Automaton,
    def: &BoxDef,
    start: Var,
    targets: &[StateId],
    levels: &BTreeMap<StateId, Var>,
    terminal: Var,
    redirects: &mut Vec<(StateId, StateId)>,
) -> Result<StateId, AbddError> {
    let port_levels = targets
        .iter()
        .map(|&s| levels.get(&s).copied().ok_or(StructuralError::MissingVariable { state: s }))
        .collect::<Result<Vec<Var>, _>>()?;

    let tags = saturate(def, start, &port_levels, terminal);

    let mut rename: BTreeMap<StateId, StateId> = BTreeMap::new();
    for state in def.automaton().states() {
        rename.insert(state, result.add_state());
    }

    for (t, tag) in def.automaton().iter_transitions().zip(tags) {
        if t.symbol.is_port() {
            continue;
        }
        let children = t.children.iter().map(|c| rename[c]).collect();
        result.add_transition(Transition::new(rename[&t.source], t.symbol, children, t.slots.clone(), tag));
    }

    for (k, port) in def.port_states().iter().enumerate() {
        redirects.push((rename[port], targets[k]));
    }
    Ok(rename[&def.root()])
}

/// Variable tags for the transitions of `def`, in iteration order.
fn saturate(def: &BoxDef, start: Var, port_levels: &[Var], terminal: Var) -> Vec<Option<Var>> {
    let transitions: Vec<&Transition> = def.automaton().iter_transitions().collect();
    let looping: BTreeSet<StateId> = transitions.iter().filter(|t| t.is_self_loop()).map(|t| t.source).collect();

    let mut level: BTreeMap<StateId, Var> = BTreeMap::new();
    level.insert(def.root(), start);
    for (&port, &l) in def.port_states().iter().zip(port_levels) {
        level.insert(port, l);
    }

    let mut tags: Vec<Option<Var>> = transitions.iter().map(|t| t.var).collect();
    for (i, t) in transitions.iter().enumerate() {
        match t.symbol {
            Symbol::Port(_) => tags[i] = level.get(&t.source).copied(),
            Symbol::Terminal(_) => {
                tags[i] = Some(terminal);
                level.insert(t.source, terminal);
            }
            Symbol::Branch => {}
        }
    }

    loop {
        let mut progress = false;

        // Top-down: a non-looping state at level l decides l.
        for (i, t) in transitions.iter().enumerate() {
            if tags[i].is_some() || t.is_leaf() || t.is_self_loop() || looping.contains(&t.source) {
                continue;
            }
            let Some(&l) = level.get(&t.source) else {
                continue;
            };
            tags[i] = Some(l);
            for &child in &t.children {
                level.entry(child).or_insert_with(|| l.next());
            }
            progress = true;
        }

        // Bottom-up: one level above a non-looping child.
        for (i, t) in transitions.iter().enumerate() {
            if tags[i].is_some() || t.is_leaf() || t.is_self_loop() || !level.contains_key(&t.source) {
                continue;
            }
            let above = t
                .children
                .iter()
                .filter(|c| !looping.contains(c))
                .filter_map(|c| level.get(c))
                .last()
                .and_then(|l| l.prev());
            if let Some(l) = above {
                tags[i] = Some(l);
                level.insert(t.source, l);
                progress = true;
            }
        }

        if !progress {
            break;
        }
    }
    tags
}
