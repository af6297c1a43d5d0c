//! Fair contribution selection
//!
//! Converts each contributor's track bundle into a bounded number of
//! entries in the shared contribution map. Quotas grow with the log of
//! a contributor's distinct track count, so prolific sharers cannot
//! dominate the playlist, while anyone with at least one track gets at
//! least one slot. Which tracks fill a quota is randomized; how many
//! is not.

use crate::tracks::TrackBundle;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// Track id -> ordered, duplicate-free contributor display names
pub type ContributionMap = BTreeMap<String, Vec<String>>;

/// Playlist slots a contributor may claim for `n` distinct tracks:
/// `max(1, floor(log2(n)))`. A contributor with no tracks claims no
/// slots.
pub fn quota_for(unique_track_count: usize) -> usize {
    match unique_track_count {
        0 => 0,
        n => n.ilog2().max(1) as usize,
    }
}

/// Build the contribution map from every contributor's bundle.
///
/// Contributors are processed in map order. Each spends their quota on
/// direct track ids first, then playlist-derived ids, then
/// album-derived ids, each set scanned in a uniform random
/// permutation. Ids already claimed by the map are remembered and, if
/// quota is left after all three sets, spent as additional credit on
/// those collided tracks. Residual quota with no candidates left is
/// not an error.
pub fn build_contribution_map<R: Rng>(
    bundles: &BTreeMap<String, TrackBundle>,
    display_names: &HashMap<String, String>,
    rng: &mut R,
) -> ContributionMap {
    let mut contributions = ContributionMap::new();

    for (contributor_id, bundle) in bundles {
        if bundle.unique_track_count == 0 {
            continue;
        }

        let Some(name) = display_names.get(contributor_id) else {
            warn!(contributor = %contributor_id, "Contributor has no display name, skipping");
            continue;
        };

        let mut quota = quota_for(bundle.unique_track_count);
        let mut collisions: Vec<String> = Vec::new();

        let priority_order = [
            &bundle.single_track_ids,
            &bundle.playlist_track_ids,
            &bundle.album_track_ids,
        ];
        'sets: for set in priority_order {
            for track_id in shuffled(set, rng) {
                if quota == 0 {
                    break 'sets;
                }
                if contributions.contains_key(&track_id) {
                    collisions.push(track_id);
                } else {
                    contributions.insert(track_id, vec![name.clone()]);
                    quota -= 1;
                }
            }
        }

        // Out of unique tracks: credit the contributor on tracks
        // someone else already claimed, in collision order
        for track_id in collisions {
            if quota == 0 {
                break;
            }
            if let Some(names) = contributions.get_mut(&track_id) {
                if !names.iter().any(|existing| existing == name) {
                    names.push(name.clone());
                    quota -= 1;
                }
            }
        }
    }

    contributions
}

/// Uniform random permutation of a set's elements.
///
/// The elements are sorted before shuffling so a seeded generator
/// produces a reproducible permutation regardless of set iteration
/// order.
fn shuffled<R: Rng>(set: &HashSet<String>, rng: &mut R) -> Vec<String> {
    let mut ids: Vec<String> = set.iter().cloned().collect();
    ids.sort();
    ids.shuffle(rng);
    ids
}
