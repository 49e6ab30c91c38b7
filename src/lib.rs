//! # abdd-rs: Automata-based Binary Decision Diagrams in Rust
//!
//! **`abdd-rs`** canonicalizes *ABDDs*: decision diagrams written as bottom-up tree automata,
//! where a transition slot may name a **box**, a small pattern automaton that stands for a
//! whole family of subtrees (for instance "skip any number of variables").
//!
//! ## What is an ABDD?
//!
//! A classic BDD is a decision diagram with *reduction rules* baked in: redundant tests are
//! removed, zero-suppressed tests are removed, and so on. An ABDD generalizes this by making the
//! rules explicit. Each rule is a box, and the chosen box order decides which reductions apply.
//! The same Boolean function therefore has one canonical ABDD per box order.
//!
//! ## The pipeline
//!
//! Canonicalization runs three stages, each a pure function from [`Automaton`][crate::automaton::Automaton]
//! to `Automaton`:
//!
//! - **[`unfold`]**: expands every box reference into explicit, variable-tagged structure.
//! - **[`normalize`]**: a level-by-level subset construction that merges states with the same
//!   behavior, producing one state per behavior and level.
//! - **[`fold`]**: reinstalls boxes in priority order, using the box finder from
//!   [`intersectoid`] to decide where a box occurs and where its ports lead.
//!
//! [`pipeline::canonicalize`] runs all three and renumbers the result, so a canonical form
//! canonicalizes to itself.
//!
//! ## Basic Usage
//!
//! ```rust
//! use abdd_rs::automaton::Automaton;
//! use abdd_rs::boxes::{box_order, BoxCatalogue};
//! use abdd_rs::eval::equivalent;
//! use abdd_rs::pipeline::canonicalize;
//!
//! // 1. The box catalogue is a plain value
//! let catalogue = BoxCatalogue::standard();
//!
//! // 2. Build f = x1 AND x3 as a complete decision tree over 3 variables
//! let tree = Automaton::from_truth_table(3, |v| v[0] && v[2]);
//!
//! // 3. Canonicalize with the classic BDD reduction (the "X" skip box)
//! let order = box_order("bdd").unwrap();
//! let canon = canonicalize(&tree, &catalogue, order, 3).unwrap();
//!
//! // 4. Same function, far fewer states
//! assert!(canon.num_states() < tree.num_states());
//! assert!(equivalent(&tree, &canon, &catalogue, 3).unwrap());
//! ```
//!
//! ## Core Components
//!
//! - **[`automaton`]**, **[`transition`]**, **[`types`]**: the state arena and its transitions.
//! - **[`algebra`]**: reachability, trimming and non-emptiness.
//! - **[`boxes`]**: the box catalogue and the named box orders.
//! - **[`eval`]**: evaluation, truth tables and model counting.
//!
//! The library logs through the [`log`](https://docs.rs/log) facade and never installs a logger.

pub mod algebra;
pub mod automaton;
pub mod boxes;
pub mod error;
pub mod eval;
pub mod fold;
pub mod intersectoid;
pub mod normalize;
pub mod pipeline;
pub mod transition;
pub mod types;
pub mod unfold;
