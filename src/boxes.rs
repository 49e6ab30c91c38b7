//! Box catalogue.
//!
//! A box is a small pattern automaton with port leaves. A transition slot
//! that names a box stands for a copy of that pattern whose ports continue
//! into the children of the slot, one child per port in port order.
//!
//! The catalogue is a plain value: build it once (usually with
//! [`BoxCatalogue::standard`]) and pass it by reference to
//! [`unfold`][crate::unfold::unfold] and [`fold`][crate::fold::fold].
//!
//! ```
//! use abdd_rs::boxes::{box_order, BoxCatalogue};
//!
//! let catalogue = BoxCatalogue::standard();
//! assert_eq!(catalogue.get("X").unwrap().port_arity(), 1);
//! assert_eq!(catalogue.get("LPort").unwrap().port_arity(), 2);
//! assert_eq!(box_order("esr"), Some(&["L0", "H0", "X"][..]));
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::ops::Range;

use crate::automaton::Automaton;
use crate::error::StructuralError;
use crate::transition::{BoxSlot, Transition};
use crate::types::{StateId, Symbol};

/// Named box orders, from the plain BDD rule set up to the full catalogue.
pub const BOX_ORDERS: &[(&str, &[&str])] = &[
    ("bdd", &["X"]),
    ("zbdd", &["H0"]),
    ("tbdd", &["X", "H0"]),
    ("cbdd", &["X", "HPort"]),
    ("czdd", &["H0", "X"]),
    ("esr", &["L0", "H0", "X"]),
    ("cesr", &["L0", "H0", "L1", "H1", "X"]),
    ("full", &["L0", "H0", "L1", "H1", "X", "LPort", "HPort"]),
];

/// Looks up a named box order.
pub fn box_order(name: &str) -> Option<&'static [&'static str]> {
    BOX_ORDERS.iter().find(|(n, _)| *n == name).map(|(_, order)| *order)
}

type Shape = &'static [(u32, Symbol, &'static [u32])];

/// Transitions `(source, symbol, children)` of the standard boxes; `q0` is
/// the root.
const STANDARD_BOXES: &[(&str, Shape)] = &[
    ("X", &[(0, Symbol::Branch, &[0, 0]), (0, Symbol::Branch, &[1, 1]), (1, Symbol::Port(0), &[])]),
    (
        "L0",
        &[
            (0, Symbol::Branch, &[1, 0]),
            (0, Symbol::Branch, &[1, 2]),
            (1, Symbol::Branch, &[1, 1]),
            (1, Symbol::Terminal(false), &[]),
            (2, Symbol::Port(0), &[]),
        ],
    ),
    (
        "L1",
        &[
            (0, Symbol::Branch, &[1, 0]),
            (0, Symbol::Branch, &[1, 2]),
            (1, Symbol::Branch, &[1, 1]),
            (1, Symbol::Terminal(true), &[]),
            (2, Symbol::Port(0), &[]),
        ],
    ),
    (
        "H0",
        &[
            (0, Symbol::Branch, &[0, 2]),
            (0, Symbol::Branch, &[1, 2]),
            (1, Symbol::Port(0), &[]),
            (2, Symbol::Branch, &[2, 2]),
            (2, Symbol::Terminal(false), &[]),
        ],
    ),
    (
        "H1",
        &[
            (0, Symbol::Branch, &[0, 2]),
            (0, Symbol::Branch, &[1, 2]),
            (1, Symbol::Port(0), &[]),
            (2, Symbol::Branch, &[2, 2]),
            (2, Symbol::Terminal(true), &[]),
        ],
    ),
    (
        "LPort",
        &[
            (0, Symbol::Branch, &[1, 0]),
            (0, Symbol::Branch, &[1, 2]),
            (1, Symbol::Branch, &[1, 1]),
            (1, Symbol::Port(0), &[]),
            (2, Symbol::Port(1), &[]),
        ],
    ),
    (
        "HPort",
        &[
            (0, Symbol::Branch, &[0, 1]),
            (0, Symbol::Branch, &[2, 1]),
            (1, Symbol::Branch, &[1, 1]),
            (1, Symbol::Port(1), &[]),
            (2, Symbol::Port(0), &[]),
        ],
    ),
    ("False", &[(0, Symbol::Branch, &[0, 0]), (0, Symbol::Terminal(false), &[])]),
    ("True", &[(0, Symbol::Branch, &[0, 0]), (0, Symbol::Terminal(true), &[])]),
];

/// A named pattern automaton with a single root and `port_arity` ports.
#[derive(Debug, Clone)]
pub struct BoxDef {
    name: String,
    automaton: Automaton,
    port_states: Vec<StateId>,
}

impl BoxDef {
    /// Validates `automaton` as a box.
    ///
    /// The automaton needs exactly one root, its port symbols must be
    /// `Port0..Port{n-1}` with one port state each, and the port indices
    /// must follow the shape: port states sorted by their shortest low/high
    /// path from the root.
    pub fn new(name: impl Into<String>, automaton: Automaton) -> Result<Self, StructuralError> {
        let name = name.into();
        let invalid = |reason: String| StructuralError::InvalidBox {
            name: name.clone(),
            reason,
        };

        if automaton.roots().len() != 1 {
            return Err(invalid(format!("expected one root, found {}", automaton.roots().len())));
        }
        if automaton.root_box().is_some() {
            return Err(invalid("a box cannot carry a root box".to_string()));
        }

        let mut ports: BTreeMap<u32, StateId> = BTreeMap::new();
        for t in automaton.iter_transitions() {
            if let Symbol::Port(k) = t.symbol {
                if let Some(other) = ports.insert(k, t.source) {
                    if other != t.source {
                        return Err(invalid(format!("Port{} appears at {} and {}", k, other, t.source)));
                    }
                }
            }
        }
        for (i, &k) in ports.keys().enumerate() {
            if k as usize != i {
                return Err(invalid(format!("port indices are not contiguous (missing Port{})", i)));
            }
        }

        let port_states: Vec<StateId> = ports.values().copied().collect();
        let by_shape = ports_by_shape(&automaton, &port_states);
        if by_shape != port_states {
            return Err(invalid("port indices do not follow port order".to_string()));
        }

        Ok(Self {
            name,
            automaton,
            port_states,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn automaton(&self) -> &Automaton {
        &self.automaton
    }

    pub fn root(&self) -> StateId {
        self.automaton.roots()[0]
    }

    pub fn port_arity(&self) -> usize {
        self.port_states.len()
    }

    /// Port states in port order.
    pub fn port_states(&self) -> &[StateId] {
        &self.port_states
    }
}

/// Sorts `ports` by their shortest path from the root, comparing paths as
/// sequences of child indices (low = 0, high = 1).
fn ports_by_shape(aut: &Automaton, ports: &[StateId]) -> Vec<StateId> {
    let mut paths: BTreeMap<StateId, Vec<usize>> = BTreeMap::new();
    let mut queue = VecDeque::new();
    for &root in aut.roots() {
        paths.insert(root, Vec::new());
        queue.push_back(root);
    }
    while let Some(state) = queue.pop_front() {
        let path = paths[&state].clone();
        for t in aut.transitions(state) {
            for (i, &child) in t.children.iter().enumerate() {
                let mut candidate = path.clone();
                candidate.push(i);
                match paths.get(&child) {
                    None => {
                        paths.insert(child, candidate);
                        queue.push_back(child);
                    }
                    Some(known) if known.len() == candidate.len() && candidate < *known => {
                        paths.insert(child, candidate);
                    }
                    Some(_) => {}
                }
            }
        }
    }
    let mut sorted = ports.to_vec();
    sorted.sort_by_key(|s| paths.get(s).map(|p| (p.len(), p.clone())));
    sorted
}

/// Read-only mapping from box names to box definitions.
#[derive(Debug, Clone, Default)]
pub struct BoxCatalogue {
    boxes: BTreeMap<String, BoxDef>,
}

impl BoxCatalogue {
    /// An empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed catalogue: `X`, `L0`, `L1`, `H0`, `H1`, `LPort`, `HPort`,
    /// `False` and `True`.
    pub fn standard() -> Self {
        let mut catalogue = Self::new();
        for &(name, transitions) in STANDARD_BOXES {
            let mut aut = Automaton::new();
            aut.add_root(StateId::new(0));
            let mut port_states = Vec::new();
            for &(src, symbol, children) in transitions {
                let children: Vec<StateId> = children.iter().map(|&c| StateId::new(c)).collect();
                let slots = vec![BoxSlot::NoBox; children.len()];
                if let Symbol::Port(k) = symbol {
                    port_states.push((k, StateId::new(src)));
                }
                aut.add_transition(Transition::new(StateId::new(src), symbol, children, slots, None));
            }
            port_states.sort();
            let def = BoxDef {
                name: name.to_string(),
                automaton: aut,
                port_states: port_states.into_iter().map(|(_, s)| s).collect(),
            };
            catalogue.boxes.insert(name.to_string(), def);
        }
        catalogue
    }

    /// Adds a box. Boxes referenced from inside `def` must already be in
    /// the catalogue, so no box can reach itself.
    pub fn insert(&mut self, def: BoxDef) -> Result<(), StructuralError> {
        for t in def.automaton.iter_transitions() {
            for slot in &t.slots {
                if let BoxSlot::Boxed(inner) = slot {
                    if !self.boxes.contains_key(inner) {
                        return Err(StructuralError::InvalidBox {
                            name: def.name.clone(),
                            reason: format!("references undefined box '{}'", inner),
                        });
                    }
                }
            }
            self.check_transition(t)?;
        }
        self.boxes.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&BoxDef, StructuralError> {
        self.boxes
            .get(name)
            .ok_or_else(|| StructuralError::UnknownBox { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.boxes.contains_key(name)
    }

    /// Number of children a slot consumes.
    pub fn slot_arity(&self, slot: &BoxSlot) -> Result<usize, StructuralError> {
        match slot {
            BoxSlot::NoBox => Ok(1),
            BoxSlot::Boxed(name) => Ok(self.get(name)?.port_arity()),
        }
    }

    /// Child index ranges covered by each slot of `t`.
    ///
    /// Fails if a slot names an unknown box or the children do not add up.
    pub fn slot_spans(&self, t: &Transition) -> Result<Vec<Range<usize>>, StructuralError> {
        if t.slots.len() != t.symbol.arity() {
            return Err(StructuralError::ArityMismatch {
                state: t.source,
                expected: t.symbol.arity(),
                found: t.slots.len(),
            });
        }
        let mut spans = Vec::with_capacity(t.slots.len());
        let mut offset = 0;
        for slot in &t.slots {
            let arity = self.slot_arity(slot)?;
            spans.push(offset..offset + arity);
            offset += arity;
        }
        if offset != t.children.len() {
            return Err(StructuralError::ArityMismatch {
                state: t.source,
                expected: offset,
                found: t.children.len(),
            });
        }
        Ok(spans)
    }

    /// Checks the slot arities of `t`.
    pub fn check_transition(&self, t: &Transition) -> Result<(), StructuralError> {
        self.slot_spans(t).map(|_| ())
    }

    /// Checks every transition of `aut` and its root box.
    pub fn check_automaton(&self, aut: &Automaton) -> Result<(), StructuralError> {
        aut.iter_transitions().try_for_each(|t| self.check_transition(t))?;
        if let Some(root_box) = aut.root_box() {
            let expected = self.get(&root_box.name)?.port_arity();
            if root_box.targets.len() != expected {
                return Err(StructuralError::RootBoxArity {
                    name: root_box.name.clone(),
                    expected,
                    found: root_box.targets.len(),
                });
            }
        }
        Ok(())
    }
}
