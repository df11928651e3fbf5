//! Per-trait merge rules.
//!
//! Pure state transformation: given the previous profile state and one
//! normalized batch, produce the next state. Nothing here touches locks or
//! publication; the caller owns atomicity.

use chrono::{DateTime, Utc};

use crate::normalize::NormalizedTrait;
use crate::profile::record::TraitRecord;
use crate::profile::store::ProfileState;

/// Minimum length gain before an incoming description replaces a retained
/// one. Keeps terse re-extractions from churning an established summary.
const DESCRIPTION_GROWTH_MARGIN: usize = 8;

/// Counts of what one batch application did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub created: usize,
    pub updated: usize,
}

/// Exponentially-weighted update: `alpha` weights the new observation,
/// `1 - alpha` the retained strength. Both inputs live in [0, 1], so the
/// result does too; the clamp only guards float rounding.
fn ewma(existing: f64, incoming: f64, alpha: f64) -> f64 {
    (alpha * incoming + (1.0 - alpha) * existing).clamp(0.0, 1.0)
}

/// Display names that reach the same key differ only in case, spacing, or
/// punctuation. Prefer the variant with fewer non-alphanumeric characters;
/// on a tie, keep what is already there.
fn replace_display_name(existing: &str, incoming: &str) -> bool {
    let weight = |name: &str| name.chars().filter(|c| !c.is_alphanumeric()).count();
    weight(incoming) < weight(existing)
}

/// Take the incoming description when it fills an empty slot or grows the
/// retained one by at least [`DESCRIPTION_GROWTH_MARGIN`] characters.
fn replace_description(existing: &str, incoming: &str) -> bool {
    if incoming.is_empty() {
        return false;
    }
    if existing.is_empty() {
        return true;
    }
    incoming.len() > existing.len() + DESCRIPTION_GROWTH_MARGIN
}

/// Merge one observation into an existing record.
fn merge_observation(
    record: &mut TraitRecord,
    incoming: &NormalizedTrait,
    observed_at: DateTime<Utc>,
    decay_factor: f64,
    history_cap: usize,
) {
    let new_strength = ewma(record.strength, incoming.strength, decay_factor);
    record.strength = new_strength;
    record.observation_count += 1;
    record.last_observed = observed_at;
    record.push_history(observed_at, new_strength, history_cap);

    if replace_display_name(&record.display_name, &incoming.display_name) {
        record.display_name = incoming.display_name.clone();
    }
    if replace_description(&record.description, &incoming.description) {
        record.description = incoming.description.clone();
    }
}

/// Apply a normalized batch to a profile state in place.
///
/// Unseen keys create records seeded with the candidate strength; seen keys
/// merge via the exponentially-weighted rule. The caller publishes the
/// resulting state as one atomic swap.
pub fn apply_batch(
    state: &mut ProfileState,
    batch: &[NormalizedTrait],
    observed_at: DateTime<Utc>,
    decay_factor: f64,
    history_cap: usize,
) -> MergeStats {
    let mut stats = MergeStats::default();
    for incoming in batch {
        match state.traits.get_mut(&incoming.key) {
            Some(record) => {
                merge_observation(record, incoming, observed_at, decay_factor, history_cap);
                stats.updated += 1;
            }
            None => {
                state
                    .traits
                    .insert(incoming.key.clone(), TraitRecord::from_observation(incoming, observed_at));
                stats.created += 1;
            }
        }
    }
    stats
}
