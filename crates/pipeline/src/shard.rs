//! Client sharding for parallel per-user stages.
//!
//! A client's whole history always lands in one shard, and each shard runs
//! single-threaded, so per-user ordering is never split across workers.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use rayon::prelude::*;

/// Computes a stable shard index for a client key.
///
/// `DefaultHasher::new()` uses fixed keys, so the mapping is the same on every run.
pub fn shard_of(key: &str, shards: usize) -> usize {
    let shards = shards.max(1);
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// Resolves the configured shard count (0 = one per rayon worker).
pub fn effective_shards(configured: usize) -> usize {
    if configured == 0 {
        rayon::current_num_threads().max(1)
    } else {
        configured
    }
}

/// Groups items by client key, clients in key order, items in input order.
pub fn group_by_client<T>(items: Vec<T>, key: impl Fn(&T) -> &str) -> BTreeMap<String, Vec<T>> {
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        let client = key(&item);
        match groups.get_mut(client) {
            Some(group) => group.push(item),
            None => {
                let client = client.to_string();
                groups.insert(client, vec![item]);
            }
        }
    }
    groups
}

/// Runs `work` once per client, clients spread over `shards` parallel shards.
///
/// Results come back shard by shard; callers sort them into their final order.
pub fn run_sharded<T, R, F>(groups: BTreeMap<String, T>, shards: usize, work: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(String, T) -> R + Sync,
{
    let shards = shards.max(1);
    let mut buckets: Vec<Vec<(String, T)>> = (0..shards).map(|_| Vec::new()).collect();
    for (client, group) in groups {
        buckets[shard_of(&client, shards)].push((client, group));
    }

    buckets
        .into_par_iter()
        .map(|bucket| {
            bucket
                .into_iter()
                .map(|(client, group)| work(client, group))
                .collect::<Vec<R>>()
        })
        .flatten()
        .collect()
}
