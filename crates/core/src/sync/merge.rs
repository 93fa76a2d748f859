//! Snapshot reconciliation: replace or merge remote truth into local state.
//!
//! The merge is deliberately a last-writer-wins-by-origin policy, not a
//! timestamp CRDT: the only source of divergence this engine supports is
//! "local has pending unsynced writes" from a single active device. Two
//! devices holding unsynced queues for the same user is out of scope.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::budget::{EntityId, Snapshot};

/// Merge a remote snapshot into local state, entity by entity.
///
/// For each collection: remote items seed the result, local items of the
/// same id unconditionally win, remote-only ids are adopted, and local-only
/// ids (not yet synced, hence absent remotely) are preserved.
pub fn merge_snapshots(local: Snapshot, remote: Snapshot) -> Snapshot {
    Snapshot {
        user_id: local.user_id,
        income_sources: merge_collection(remote.income_sources, local.income_sources),
        cycles: merge_collection(remote.cycles, local.cycles),
        categories: merge_collection(remote.categories, local.categories),
        transactions: merge_collection(remote.transactions, local.transactions),
        preferences: merge_preferences(remote.preferences, local.preferences),
        updated_at: local.updated_at,
    }
}

fn merge_collection<T: EntityId + Clone>(remote: Vec<T>, local: Vec<T>) -> Vec<T> {
    let local_index: HashMap<&str, usize> = local
        .iter()
        .enumerate()
        .map(|(i, item)| (item.entity_id(), i))
        .collect();

    let mut used_local = vec![false; local.len()];
    let mut merged = Vec::with_capacity(remote.len() + local.len());
    for item in remote {
        match local_index.get(item.entity_id()) {
            Some(&i) => {
                merged.push(local[i].clone());
                used_local[i] = true;
            }
            None => merged.push(item),
        }
    }
    for (i, item) in local.iter().enumerate() {
        if !used_local[i] {
            merged.push(item.clone());
        }
    }
    merged
}

/// Shallow key-wise merge with local values taking precedence.
fn merge_preferences(remote: Map<String, Value>, local: Map<String, Value>) -> Map<String, Value> {
    let mut merged = remote;
    for (key, value) in local {
        merged.insert(key, value);
    }
    merged
}
