//! Box finding: does a box occur at a given state, and where do its ports
//! lead?
//!
//! The search builds the *intersectoid*, a product of the automaton (read
//! from one state downwards) with the box automaton. Box transitions are
//! variable-free, so a box self-loop can absorb any run of skipped levels
//! and a box port can stop at any state. The product is then trimmed,
//! saturated with levels, and read off as a port mapping: one target state
//! and one level per port.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use log::trace;

use crate::algebra::{non_empty, reachability_relation, trim};
use crate::automaton::Automaton;
use crate::boxes::BoxDef;
use crate::error::StructuralError;
use crate::transition::{BoxSlot, Transition};
use crate::types::{StateId, Symbol, Var};

/// Per-automaton facts the mapper needs on every call.
///
/// Built once per fold; states created while folding are registered with
/// [`FoldContext::add_split`].
#[derive(Debug, Clone)]
pub struct FoldContext {
    max_var: u32,
    natural: BTreeMap<StateId, Var>,
    reach: BTreeMap<StateId, BTreeSet<StateId>>,
}

impl FoldContext {
    pub fn new(aut: &Automaton, max_var: u32) -> Result<Self, StructuralError> {
        Ok(Self {
            max_var,
            natural: aut.natural_levels()?,
            reach: reachability_relation(aut),
        })
    }

    pub fn max_var(&self) -> u32 {
        self.max_var
    }

    pub fn terminal(&self) -> Var {
        Var::terminal(self.max_var)
    }

    pub fn natural_level(&self, state: StateId) -> Option<Var> {
        self.natural.get(&state).copied()
    }

    /// `to` is reachable from `from` in one or more steps.
    pub fn reaches(&self, from: StateId, to: StateId) -> bool {
        self.reach.get(&from).is_some_and(|r| r.contains(&to))
    }

    /// Registers a state decided at `level` whose only successor is `target`.
    pub fn add_split(&mut self, state: StateId, level: Var, target: StateId) {
        self.natural.insert(state, level);
        let mut reach = self.reach.get(&target).cloned().unwrap_or_default();
        reach.insert(target);
        self.reach.insert(state, reach);
    }
}

/// Where one port of a found box continues.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PortTarget {
    pub state: StateId,
    pub level: Var,
}

/// Targets of a found box, indexed by port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    targets: Vec<PortTarget>,
}

impl PortMapping {
    pub fn targets(&self) -> &[PortTarget] {
        &self.targets
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (k, t) in self.targets.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "Port{}: ({}, {})", k, t.state, t.level)?;
        }
        write!(f, "}}")
    }
}

/// Product of an automaton with a box automaton.
struct Intersectoid {
    product: Automaton,
    ids: BTreeMap<(StateId, StateId), StateId>,
    /// Product state to the automaton state it reads.
    origin: BTreeMap<StateId, StateId>,
    queue: VecDeque<(StateId, StateId)>,
}

impl Intersectoid {
    fn build(aut: &Automaton, def: &BoxDef, root: StateId) -> Self {
        let mut this = Self {
            product: Automaton::new(),
            ids: BTreeMap::new(),
            origin: BTreeMap::new(),
            queue: VecDeque::new(),
        };
        let start = this.intern((root, def.root()));
        this.product.add_root(start);

        while let Some((q, b)) = this.queue.pop_front() {
            let source = this.ids[&(q, b)];
            for u in def.automaton().transitions(b) {
                if let Symbol::Port(k) = u.symbol {
                    this.product.add_transition(Transition::port(source, k));
                    continue;
                }
                for t in aut.transitions(q) {
                    if t.has_box() || t.symbol != u.symbol || t.children.len() != u.children.len() {
                        continue;
                    }
                    // A box branch that does not split cannot read a splitting one.
                    if u.is_unified() && !t.is_unified() {
                        continue;
                    }
                    let children = t.children.iter().zip(&u.children).map(|(&c, &d)| this.intern((c, d))).collect();
                    let slots = vec![BoxSlot::NoBox; t.symbol.arity()];
                    this.product.add_transition(Transition::new(source, t.symbol, children, slots, t.var));
                }
            }
        }
        this
    }

    fn intern(&mut self, pair: (StateId, StateId)) -> StateId {
        if let Some(&id) = self.ids.get(&pair) {
            return id;
        }
        let id = self.product.add_state();
        self.ids.insert(pair, id);
        self.origin.insert(id, pair.0);
        self.queue.push_back(pair);
        id
    }
}

/// Looks for an occurrence of `def` at `root`, the box being entered at
/// level `min_var`.
///
/// Returns the port mapping of the occurrence, or `None` if the box does
/// not occur there.
pub fn box_finding(aut: &Automaton, def: &BoxDef, root: StateId, min_var: Var, ctx: &FoldContext) -> Option<PortMapping> {
    let Intersectoid { mut product, origin, .. } = Intersectoid::build(aut, def, root);
    trim(&mut product);
    if product.roots().is_empty() {
        return None;
    }

    saturate(&mut product, min_var, ctx.terminal());
    product.retain_transitions(|t| !(t.symbol.is_port() && t.var.is_none()));
    trim(&mut product);
    if product.roots().is_empty() {
        return None;
    }

    let arity = def.port_arity();
    if arity > 1 {
        restrict_port_choices(&mut product, arity)?;
    }

    let mut targets = Vec::with_capacity(arity);
    for k in 0..arity {
        let port = Symbol::Port(k as u32);
        let target = map_port(&product, &origin, port, ctx)?;
        let natural = ctx.natural_level(target.state)?;
        if target.level > natural {
            trace!("{} {}: {} already decides {} above {}", def.name(), port, target.state, natural, target.level);
            return None;
        }
        targets.push(target);
    }
    let mapping = PortMapping { targets };
    trace!("{} found at {}: {}", def.name(), root, mapping);
    Some(mapping)
}

/// Assigns levels to the product's transitions.
///
/// The root is entered at `min_var`. Port transitions take the level of a
/// tagged sibling, and untagged states below a tagged transition sit one
/// level deeper; the first level that reaches a state wins. Self-looping
/// states only get their ports tagged.
fn saturate(product: &mut Automaton, min_var: Var, terminal: Var) {
    let root = product.roots()[0];
    if !product.has_self_loop(root) && product.transitions(root).iter().all(|t| t.var.is_none()) {
        if let Some(list) = product.transitions_mut(root) {
            for t in list.iter_mut() {
                t.var = Some(min_var);
            }
        }
    }

    let states: Vec<StateId> = product.states().collect();
    for &state in &states {
        let Some(list) = product.transitions_mut(state) else {
            continue;
        };
        let Some(level) = list.iter().filter(|t| !t.symbol.is_port()).find_map(|t| t.var) else {
            continue;
        };
        for t in list.iter_mut().filter(|t| t.symbol.is_port() && t.var.is_none()) {
            t.var = Some(level);
        }
    }

    let mut queue: VecDeque<(StateId, Var)> = VecDeque::new();
    for t in product.iter_transitions() {
        if let Some(var) = t.var {
            if !t.is_self_loop() && !t.is_leaf() {
                queue.extend(t.children.iter().map(|&c| (c, var.next())));
            }
        }
    }
    while let Some((state, level)) = queue.pop_front() {
        if level > terminal {
            continue;
        }
        let looping = product.has_self_loop(state);
        let Some(list) = product.transitions_mut(state) else {
            continue;
        };
        if looping {
            // A looping state can stop at any level it is reached at; only
            // its ports get one.
            for t in list.iter_mut().filter(|t| t.symbol.is_port() && t.var.is_none()) {
                t.var = Some(level);
            }
            continue;
        }
        if list.iter().any(|t| t.var.is_some()) {
            continue;
        }
        for t in list.iter_mut() {
            t.var = Some(level);
        }
        for t in list.iter().filter(|t| !t.is_leaf()) {
            queue.extend(t.children.iter().map(|&c| (c, level.next())));
        }
    }
}

/// Keeps only the port transitions that take part in some accepted tree
/// where every port occurs exactly once.
fn restrict_port_choices(product: &mut Automaton, arity: usize) -> Option<()> {
    let options: Vec<Vec<Transition>> = (0..arity)
        .map(|k| {
            product
                .iter_transitions()
                .filter(|t| t.symbol == Symbol::Port(k as u32))
                .cloned()
                .collect()
        })
        .collect();
    if options.iter().any(Vec::is_empty) {
        return None;
    }

    let mut keep: Vec<Transition> = Vec::new();
    let mut counter = vec![0usize; arity];
    'combinations: loop {
        let chosen: Vec<&Transition> = counter.iter().enumerate().map(|(k, &i)| &options[k][i]).collect();
        let mut candidate = product.clone();
        candidate.retain_transitions(|t| !t.symbol.is_port() || chosen.contains(&t));
        if let Some(witness) = non_empty(&candidate) {
            trace!("port choice {:?} accepts {}", counter, witness);
            for t in chosen {
                if !keep.contains(t) {
                    keep.push(t.clone());
                }
            }
        }

        let mut k = 0;
        loop {
            if k == arity {
                break 'combinations;
            }
            counter[k] += 1;
            if counter[k] < options[k].len() {
                break;
            }
            counter[k] = 0;
            k += 1;
        }
    }

    product.retain_transitions(|t| !t.symbol.is_port() || keep.contains(t));
    trim(product);
    if product.roots().is_empty() {
        None
    } else {
        Some(())
    }
}

type Groups = Vec<BTreeSet<StateId>>;

/// Picks the target of `port`: among the witness groups, deepest first,
/// the first one with a member that every other member leads to.
fn map_port(product: &Automaton, origin: &BTreeMap<StateId, StateId>, port: Symbol, ctx: &FoldContext) -> Option<PortTarget> {
    let groups = witness_groups(product, product.roots()[0], port);

    let port_level = |s: &StateId| product.transitions(*s).iter().filter(|t| t.symbol == port).find_map(|t| t.var);
    let mut leveled: Vec<(Var, BTreeSet<StateId>)> = groups
        .into_iter()
        .filter_map(|g| g.iter().filter_map(port_level).max().map(|level| (level, g)))
        .collect();
    leveled.sort_by(|a, b| b.0.cmp(&a.0));

    for (level, group) in leveled {
        let states: BTreeSet<StateId> = group.iter().filter_map(|s| origin.get(s).copied()).collect();
        let canonical = states
            .iter()
            .copied()
            .find(|&m| states.iter().all(|&n| n == m || (ctx.reaches(n, m) && !ctx.reaches(m, n))));
        match canonical {
            Some(state) => return Some(PortTarget { state, level }),
            None => trace!("{}: no canonical member among {:?}", port, states),
        }
    }
    None
}

/// Sets of product states that can play `port` together: a branch that
/// splits merges what its children offer, a branch that does not split
/// passes its child's groups through.
///
/// Depth-first with an explicit stack. A state met again while it is still
/// open contributes nothing.
fn witness_groups(product: &Automaton, root: StateId, port: Symbol) -> Groups {
    let mut memo: BTreeMap<StateId, Groups> = BTreeMap::new();
    let mut open: BTreeSet<StateId> = BTreeSet::new();
    let mut stack: Vec<(StateId, bool)> = vec![(root, false)];

    while let Some((state, expanded)) = stack.pop() {
        if memo.contains_key(&state) {
            continue;
        }
        if product.transitions(state).iter().any(|t| t.symbol == port) {
            memo.insert(state, vec![BTreeSet::from([state])]);
            continue;
        }
        let inner = product.transitions(state).iter().filter(|t| !t.is_self_loop() && !t.is_leaf());

        if !expanded {
            if !open.insert(state) {
                continue;
            }
            stack.push((state, true));
            for t in inner {
                for &c in &t.children {
                    if !memo.contains_key(&c) && !open.contains(&c) {
                        stack.push((c, false));
                    }
                }
            }
            continue;
        }

        let mut groups: Groups = Vec::new();
        for t in inner {
            if t.is_unified() {
                for g in memo.get(&t.children[0]).into_iter().flatten() {
                    if !groups.contains(g) {
                        groups.push(g.clone());
                    }
                }
            } else {
                let union: BTreeSet<StateId> = t.children.iter().filter_map(|c| memo.get(c)).flatten().flatten().copied().collect();
                if !union.is_empty() && !groups.contains(&union) {
                    groups.push(union);
                }
            }
        }
        open.remove(&state);
        memo.insert(state, groups);
    }

    memo.remove(&root).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::boxes::BoxCatalogue;

    fn q(id: u32) -> StateId {
        StateId::new(id)
    }

    fn x(id: u32) -> Option<Var> {
        Some(Var::new(id))
    }

    /// Normalized `x1 xor x2`: q0 = 0, q1 = 1, q2/q3 decide x2, q4 is the root.
    fn xor() -> Automaton {
        let mut aut = Automaton::new();
        aut.add_root(q(4));
        aut.add_transition(Transition::terminal(q(0), false, x(3)));
        aut.add_transition(Transition::terminal(q(1), true, x(3)));
        aut.add_transition(Transition::branch(q(2), x(2), q(0), q(1)));
        aut.add_transition(Transition::branch(q(3), x(2), q(1), q(0)));
        aut.add_transition(Transition::branch(q(4), x(1), q(2), q(3)));
        aut
    }

    #[test]
    fn test_skipped_levels_map_to_port() {
        // S -x3-> (A, A), A skips x4 and decides x5.
        let mut aut = Automaton::new();
        let (s, a, z, o) = (q(0), q(1), q(2), q(3));
        aut.add_root(s);
        aut.add_transition(Transition::branch(s, x(3), a, a));
        aut.add_transition(Transition::branch(a, None, a, a));
        aut.add_transition(Transition::branch(a, x(5), z, o));
        aut.add_transition(Transition::terminal(z, false, x(6)));
        aut.add_transition(Transition::terminal(o, true, x(6)));

        let catalogue = BoxCatalogue::standard();
        let ctx = FoldContext::new(&aut, 5).unwrap();
        let mapping = box_finding(&aut, catalogue.get("X").unwrap(), s, Var::new(3), &ctx).unwrap();
        println!("{}", mapping);
        assert_eq!(mapping.targets(), &[PortTarget { state: a, level: Var::new(4) }]);
    }

    #[test]
    fn test_l1_on_xor() {
        let aut = xor();
        let catalogue = BoxCatalogue::standard();
        let ctx = FoldContext::new(&aut, 2).unwrap();

        // q3 is "x2 ? 0 : 1": the low side is the constant 1.
        let mapping = box_finding(&aut, catalogue.get("L1").unwrap(), q(3), Var::new(2), &ctx).unwrap();
        assert_eq!(mapping.targets(), &[PortTarget { state: q(0), level: Var::new(3) }]);

        assert!(box_finding(&aut, catalogue.get("L1").unwrap(), q(2), Var::new(2), &ctx).is_none());
    }

    #[test]
    fn test_x_never_matches_a_split() {
        let aut = xor();
        let catalogue = BoxCatalogue::standard();
        let ctx = FoldContext::new(&aut, 2).unwrap();
        let def = catalogue.get("X").unwrap();
        for state in [q(2), q(3), q(0)] {
            assert!(box_finding(&aut, def, state, Var::new(2), &ctx).is_none());
        }
    }

    /// Two-port box: q0 -> (q1, q2), q1 -> (q3, q3), Port0 at q2, Port1 at q3.
    fn fork() -> BoxDef {
        let mut aut = Automaton::new();
        aut.add_root(q(0));
        aut.add_transition(Transition::branch(q(0), None, q(1), q(2)));
        aut.add_transition(Transition::branch(q(1), None, q(3), q(3)));
        aut.add_transition(Transition::port(q(2), 0));
        aut.add_transition(Transition::port(q(3), 1));
        BoxDef::new("Fork", aut).unwrap()
    }

    /// c -x1-> (a, b), a reaches Port1 through two alternatives.
    fn fork_sample(second: impl FnOnce(&mut Automaton, StateId, StateId)) -> Automaton {
        let (c, a, b, d, z, o) = (q(0), q(1), q(2), q(3), q(4), q(5));
        let mut aut = Automaton::new();
        aut.add_root(c);
        aut.add_transition(Transition::branch(c, x(1), a, b));
        aut.add_transition(Transition::branch(a, x(2), d, d));
        aut.add_transition(Transition::branch(b, x(2), z, o));
        aut.add_transition(Transition::branch(d, x(3), z, o));
        aut.add_transition(Transition::terminal(z, false, x(4)));
        aut.add_transition(Transition::terminal(o, true, x(4)));
        second(&mut aut, a, o);
        aut
    }

    #[test]
    fn test_no_canonical_member() {
        // a -x2-> (f, f) with f unrelated to d.
        let aut = fork_sample(|aut, a, o| {
            let f = q(6);
            aut.add_transition(Transition::branch(a, x(2), f, f));
            aut.add_transition(Transition::branch(f, x(3), o, q(4)));
        });
        let ctx = FoldContext::new(&aut, 3).unwrap();
        assert!(box_finding(&aut, &fork(), q(0), Var::new(1), &ctx).is_none());
    }

    #[test]
    fn test_canonical_member_is_reached_by_the_others() {
        // a -x2-> (o, o) and d reaches o.
        let aut = fork_sample(|aut, a, o| {
            aut.add_transition(Transition::branch(a, x(2), o, o));
        });
        let ctx = FoldContext::new(&aut, 3).unwrap();
        let mapping = box_finding(&aut, &fork(), q(0), Var::new(1), &ctx).unwrap();
        println!("{}", mapping);
        assert_eq!(
            mapping.targets(),
            &[
                PortTarget { state: q(2), level: Var::new(2) },
                PortTarget { state: q(5), level: Var::new(3) },
            ]
        );
    }

    #[test]
    fn test_port_above_natural_level_is_rejected() {
        // The port would sit at x2 but q1 already decides x1.
        let mut aut = Automaton::new();
        aut.add_root(q(0));
        aut.add_transition(Transition::branch(q(0), x(1), q(1), q(1)));
        aut.add_transition(Transition::branch(q(1), x(1), q(2), q(3)));
        aut.add_transition(Transition::terminal(q(2), false, x(3)));
        aut.add_transition(Transition::terminal(q(3), true, x(3)));
        let catalogue = BoxCatalogue::standard();
        let ctx = FoldContext::new(&aut, 2).unwrap();
        assert!(box_finding(&aut, catalogue.get("X").unwrap(), q(0), Var::new(1), &ctx).is_none());
    }

    /// !x1 & !x2
    fn nor() -> Automaton {
        let mut aut = Automaton::new();
        aut.add_root(q(4));
        aut.add_transition(Transition::terminal(q(0), false, x(3)));
        aut.add_transition(Transition::terminal(q(1), true, x(3)));
        aut.add_transition(Transition::branch(q(2), x(2), q(0), q(0)));
        aut.add_transition(Transition::branch(q(3), x(2), q(1), q(0)));
        aut.add_transition(Transition::branch(q(4), x(1), q(3), q(2)));
        aut
    }

    #[test]
    fn test_port_choices_use_each_port_once() {
        let aut = nor();
        let catalogue = BoxCatalogue::standard();
        let def = catalogue.get("LPort").unwrap();

        let Intersectoid { mut product, origin, .. } = Intersectoid::build(&aut, def, q(4));
        trim(&mut product);
        saturate(&mut product, Var::new(1), Var::new(3));
        product.retain_transitions(|t| !(t.symbol.is_port() && t.var.is_none()));
        trim(&mut product);
        println!("{}", product);
        let ports = |p: &Automaton| -> Vec<(Symbol, StateId)> {
            p.iter_transitions()
                .filter(|t| t.symbol.is_port())
                .map(|t| (t.symbol, origin[&t.source]))
                .collect()
        };
        // The constant-0 side offers both ports again, one below each child.
        assert_eq!(ports(&product).len(), 4);

        // A tree using those two has no place left for Port0 at q3.
        restrict_port_choices(&mut product, 2).unwrap();
        println!("{}", product);
        assert_eq!(ports(&product), vec![(Symbol::Port(0), q(3)), (Symbol::Port(1), q(2))]);

        let ctx = FoldContext::new(&aut, 2).unwrap();
        let mapping = box_finding(&aut, def, q(4), Var::new(1), &ctx).unwrap();
        assert_eq!(
            mapping.targets(),
            &[
                PortTarget { state: q(3), level: Var::new(2) },
                PortTarget { state: q(2), level: Var::new(2) },
            ]
        );
    }

    #[test]
    fn test_looping_state_ports_get_a_level() {
        // x1 & x2 where the 0-leaf loops: LPort reads both levels, and its
        // Port0 sits on the looping leaf.
        let mut aut = Automaton::new();
        let (r, z, t, o) = (q(0), q(1), q(2), q(3));
        aut.add_root(r);
        aut.add_transition(Transition::branch(r, x(1), z, t));
        aut.add_transition(Transition::branch(z, None, z, z));
        aut.add_transition(Transition::terminal(z, false, x(3)));
        aut.add_transition(Transition::branch(t, x(2), z, o));
        aut.add_transition(Transition::terminal(o, true, x(3)));

        let catalogue = BoxCatalogue::standard();
        let ctx = FoldContext::new(&aut, 2).unwrap();
        let mapping = box_finding(&aut, catalogue.get("LPort").unwrap(), r, Var::new(1), &ctx).unwrap();
        println!("{}", mapping);
        assert_eq!(
            mapping.targets(),
            &[
                PortTarget { state: z, level: Var::new(2) },
                PortTarget { state: o, level: Var::new(3) },
            ]
        );
    }

    #[test]
    fn test_context_split() {
        let aut = xor();
        let mut ctx = FoldContext::new(&aut, 2).unwrap();
        assert_eq!(ctx.natural_level(q(4)), Some(Var::new(1)));
        assert!(ctx.reaches(q(4), q(0)));
        assert!(!ctx.reaches(q(0), q(4)));

        ctx.add_split(q(9), Var::new(2), q(2));
        assert_eq!(ctx.natural_level(q(9)), Some(Var::new(2)));
        assert!(ctx.reaches(q(9), q(2)));
        assert!(ctx.reaches(q(9), q(1)));
    }
}
