use indexmap::IndexMap;
use shardkv_common::shard::{self, Shard};

use crate::error::Error;

/// Full re-partition: split `[min_key, max_key]` into `servers.len()`
/// near-equal contiguous shards and assign the i-th one (sorted by lower)
/// to the i-th server in insertion order. Every server ends up owning
/// exactly one shard. Minimizing churn is an explicit non-goal: a
/// rebalance may move any key.
pub fn rebalance(
    servers: &mut IndexMap<String, Vec<Shard>>,
    min_key: u32,
    max_key: u32,
) -> Result<(), Error> {
    if servers.is_empty() {
        return Ok(());
    }

    let whole = Shard::new(min_key, max_key);
    let pieces = shard::split(whole, servers.len() as u32)?;

    for (slot, shards) in servers.values_mut().enumerate() {
        *shards = vec![pieces[slot]];
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rebalance_three_way() {
        let mut servers: IndexMap<String, Vec<Shard>> = IndexMap::new();
        servers.insert("A".into(), vec![]);
        servers.insert("B".into(), vec![]);
        servers.insert("C".into(), vec![]);

        rebalance(&mut servers, 0, 999).unwrap();

        assert_eq!(servers["A"], vec![Shard::new(0, 333)]);
        assert_eq!(servers["B"], vec![Shard::new(334, 666)]);
        assert_eq!(servers["C"], vec![Shard::new(667, 999)]);
    }

    #[test]
    fn test_rebalance_two_way() {
        let mut servers: IndexMap<String, Vec<Shard>> = IndexMap::new();
        servers.insert("A".into(), vec![]);
        servers.insert("C".into(), vec![]);

        rebalance(&mut servers, 0, 999).unwrap();

        assert_eq!(servers["A"], vec![Shard::new(0, 499)]);
        assert_eq!(servers["C"], vec![Shard::new(500, 999)]);
    }

    #[test]
    fn test_rebalance_empty_is_noop() {
        let mut servers: IndexMap<String, Vec<Shard>> = IndexMap::new();
        rebalance(&mut servers, 0, 999).unwrap();
        assert!(servers.is_empty());
    }
}
