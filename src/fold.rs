//! Folding: reinstalling box references into a normalized automaton.
//!
//! Boxes are tried in the caller's priority order, each one over the whole
//! automaton before the next. For every tagged branch transition reached
//! from the roots, each slot that is not boxed yet is offered to
//! [`box_finding`]; a match replaces the slot's child by the box's port
//! targets and names the box in the slot.
//!
//! Before each sweep, a box not installed at the root yet is looked for at
//! the root itself, entered at `x1`. A match becomes the root box and the
//! port targets become the roots.
//!
//! A port target whose level is above its natural level gets a *split*
//! state: a copy of the state's self-loop tagged with the port level, so
//! the skipped levels stay visible to the unfolder.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, trace};

use crate::algebra::trim;
use crate::automaton::Automaton;
use crate::boxes::{BoxCatalogue, BoxDef};
use crate::error::AbddError;
use crate::intersectoid::{box_finding, FoldContext, PortMapping, PortTarget};
use crate::transition::{BoxSlot, Transition};
use crate::types::{StateId, Var};

/// Folds `aut` with the boxes of `box_order`, highest priority first.
///
/// `aut` is expected to be normalized. Slots that already name a box are
/// left alone, so folding a folded automaton again changes nothing.
pub fn fold(aut: &Automaton, catalogue: &BoxCatalogue, box_order: &[&str], max_var: u32) -> Result<Automaton, AbddError> {
    debug!(
        "fold(states = {}, transitions = {}, boxes = {:?}, max_var = {})",
        aut.num_states(),
        aut.num_transitions(),
        box_order,
        max_var
    );
    let boxes = box_order.iter().map(|name| catalogue.get(name)).collect::<Result<Vec<&BoxDef>, _>>()?;
    catalogue.check_automaton(aut)?;

    let mut folder = Folder {
        catalogue,
        result: aut.clone(),
        ctx: FoldContext::new(aut, max_var)?,
        splits: BTreeMap::new(),
    };
    for def in boxes {
        if folder.fold_root(def) {
            debug!("fold: {} installed at the root", def.name());
        }
        let installed = folder.apply(def)?;
        debug!("fold: {} installed in {} slot(s)", def.name(), installed);
    }

    let mut result = folder.result;
    trim(&mut result);
    debug!(
        "fold: {} split state(s) -> states = {}, transitions = {}",
        folder.splits.len(),
        result.num_states(),
        result.num_transitions()
    );
    Ok(result)
}

struct Folder<'a> {
    catalogue: &'a BoxCatalogue,
    result: Automaton,
    ctx: FoldContext,
    /// (state, level) -> split state
    splits: BTreeMap<(StateId, Var), StateId>,
}

impl Folder<'_> {
    /// One breadth-first sweep with `def`. Returns the number of slots boxed.
    fn apply(&mut self, def: &BoxDef) -> Result<usize, AbddError> {
        let mut installed = 0;
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<StateId> = self.result.roots().iter().copied().collect();

        while let Some(state) = queue.pop_front() {
            if !visited.insert(state) {
                continue;
            }
            let mut list = self.result.transitions(state).to_vec();
            let mut changed = false;
            for t in list.iter_mut() {
                if let Some(var) = t.var {
                    if !t.is_self_loop() && !t.is_leaf() {
                        let n = self.fold_transition(def, t, var)?;
                        installed += n;
                        changed |= n > 0;
                    }
                }
                queue.extend(t.children.iter().copied().filter(|c| !visited.contains(c)));
            }
            if changed {
                let mut deduped: Vec<Transition> = Vec::with_capacity(list.len());
                for t in list {
                    if !deduped.contains(&t) {
                        deduped.push(t);
                    }
                }
                self.result.set_transitions(state, deduped);
            }
        }
        Ok(installed)
    }

    /// Installs `def` above the single root if it occurs there.
    fn fold_root(&mut self, def: &BoxDef) -> bool {
        if self.result.root_box().is_some() {
            return false;
        }
        let &[root] = self.result.roots() else {
            return false;
        };
        let top = Var::new(1);
        let Some(mapping) = box_finding(&self.result, def, root, top, &self.ctx) else {
            return false;
        };
        let Some(targets) = self.port_states(&mapping, top) else {
            trace!("root {}: {} rejected ({})", root, def.name(), mapping);
            return false;
        };
        trace!("root {}: {} {}", root, def.name(), mapping);
        self.result.set_root_box(def.name(), targets);
        true
    }

    fn fold_transition(&mut self, def: &BoxDef, t: &mut Transition, var: Var) -> Result<usize, AbddError> {
        let mut installed = 0;
        for slot in 0..t.slots.len() {
            if t.slots[slot].is_boxed() {
                continue;
            }
            let pos = self.catalogue.slot_spans(t)?[slot].start;
            let child = t.children[pos];
            let Some(mapping) = box_finding(&self.result, def, child, var.next(), &self.ctx) else {
                continue;
            };
            let Some(targets) = self.port_states(&mapping, var.next()) else {
                trace!("{} slot {}: {} rejected ({})", t.source, slot, def.name(), mapping);
                continue;
            };
            trace!("{} slot {}: {} {}", t.source, slot, def.name(), mapping);
            t.children.splice(pos..=pos, targets);
            t.slots[slot] = BoxSlot::boxed(def.name());
            installed += 1;
        }
        Ok(installed)
    }

    /// States to put behind a box entered at `entry`.
    ///
    /// Returns `None` when the box would absorb nothing or a target cannot
    /// be entered at its port level.
    fn port_states(&mut self, mapping: &PortMapping, entry: Var) -> Option<Vec<StateId>> {
        for target in mapping.targets() {
            if target.level == entry {
                return None;
            }
            let natural = self.ctx.natural_level(target.state)?;
            if target.level < natural && !self.result.has_self_loop(target.state) {
                return None;
            }
        }
        mapping.targets().iter().map(|&target| self.split(target)).collect()
    }

    /// `target.state` itself at its natural level, a split state above it.
    fn split(&mut self, target: PortTarget) -> Option<StateId> {
        let natural = self.ctx.natural_level(target.state)?;
        if target.level >= natural {
            return Some(target.state);
        }
        if let Some(&split) = self.splits.get(&(target.state, target.level)) {
            return Some(split);
        }
        let self_loop = self.result.self_loop(target.state)?.clone();
        let split = self.result.add_state();
        self.result.add_transition(Transition::new(
            split,
            self_loop.symbol,
            self_loop.children,
            self_loop.slots,
            Some(target.level),
        ));
        self.ctx.add_split(split, target.level, target.state);
        self.splits.insert((target.state, target.level), split);
        trace!("split {} at {} -> {}", target.state, target.level, split);
        Some(split)
    }
}
