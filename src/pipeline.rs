//! The full canonicalization pipeline.

use log::debug;

use crate::automaton::Automaton;
use crate::boxes::BoxCatalogue;
use crate::error::AbddError;
use crate::fold::fold;
use crate::normalize::normalize;
use crate::unfold::unfold;

/// Canonical folded form of `aut`: [`unfold`], then [`normalize`], then
/// [`fold`] with `box_order`.
///
/// The input is left untouched, and the result accepts the same trees. Its
/// states are [renumbered][Automaton::renumbered] from the roots, so
/// canonicalizing it again with the same order returns it unchanged.
pub fn canonicalize(aut: &Automaton, catalogue: &BoxCatalogue, box_order: &[&str], max_var: u32) -> Result<Automaton, AbddError> {
    let unfolded = unfold(aut, catalogue, max_var)?;
    let normalized = normalize(&unfolded, max_var)?;
    let folded = fold(&normalized, catalogue, box_order, max_var)?;
    debug!(
        "canonicalize: {} -> {} -> {} -> {} states",
        aut.num_states(),
        unfolded.num_states(),
        normalized.num_states(),
        folded.num_states()
    );
    Ok(folded.renumbered())
}
