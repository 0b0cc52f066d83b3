//! Reconciling flattened values with what Terraform planned
//!
//! Flatten functions write zero values (`""`, `0`, `false`, empty
//! collections) for fields ARM left out. Where the plan or prior state had
//! null, the null is kept so the applied state matches the configuration.

use super::location;
use tfplug::Dynamic;

fn is_zero(value: &Dynamic) -> bool {
    match value {
        Dynamic::Null => true,
        Dynamic::String(s) => s.is_empty(),
        Dynamic::Number(n) => *n == 0.0,
        Dynamic::Bool(b) => !b,
        Dynamic::List(items) => items.is_empty(),
        Dynamic::Map(entries) => entries.is_empty(),
        Dynamic::Unknown => false,
    }
}

pub fn reconcile(new: Dynamic, prior: &Dynamic) -> Dynamic {
    match (new, prior) {
        (new, Dynamic::Null) if is_zero(&new) => Dynamic::Null,
        (Dynamic::Map(entries), Dynamic::Map(prior_entries)) => Dynamic::Map(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let reconciled = match prior_entries.get(&k) {
                        Some(p) => reconcile(v, p),
                        None => v,
                    };
                    (k, reconciled)
                })
                .collect(),
        ),
        (Dynamic::List(items), Dynamic::List(prior_items)) if items.len() == prior_items.len() => {
            let mut used = vec![false; prior_items.len()];
            Dynamic::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| {
                        let j = counterpart(&v, i, prior_items, &used);
                        used[j] = true;
                        reconcile(v, &prior_items[j])
                    })
                    .collect(),
            )
        }
        (new, _) => new,
    }
}

/// Index of the prior element `new` should be reconciled against. Set
/// blocks come back from ARM in any order, so an element is paired with the
/// first unused prior element whose known scalar fields it matches, falling
/// back to position.
fn counterpart(new: &Dynamic, position: usize, prior: &[Dynamic], used: &[bool]) -> usize {
    let agrees = |candidate: &Dynamic| match (new, candidate) {
        (Dynamic::Map(fields), Dynamic::Map(prior_fields)) => prior_fields.iter().all(|(k, p)| {
            match p {
                Dynamic::String(_) | Dynamic::Number(_) | Dynamic::Bool(_) => fields.get(k) == Some(p),
                _ => true,
            }
        }),
        _ => false,
    };
    if !used[position] && agrees(&prior[position]) {
        return position;
    }
    (0..prior.len())
        .find(|&j| !used[j] && agrees(&prior[j]))
        .or_else(|| (!used[position]).then_some(position))
        .or_else(|| used.iter().position(|u| !u))
        .unwrap_or(position)
}

/// Reconciles a whole resource object and keeps the prior spelling of
/// `location` when ARM returned an equivalent region name.
pub fn reconcile_resource(new: Dynamic, prior: &Dynamic) -> Dynamic {
    let mut state = reconcile(new, prior);
    if let (Dynamic::Map(entries), Some(prior_location)) =
        (&mut state, prior.attr("location").and_then(Dynamic::as_str))
    {
        if let Some(Dynamic::String(current)) = entries.get_mut("location") {
            *current = location::keep_prior_spelling(current, Some(prior_location));
        }
    }
    state
}
