use indexmap::IndexMap;
use shardkv_common::shard::{self, Overlap, Shard};
use tracing::info;

use crate::error::Error;
use crate::rebalance::rebalance;

/// Current shard assignment: server name -> the shards it owns, in join
/// order. Join order matters: `rebalance` hands out pieces in that order,
/// and `Leave` must preserve it for the remaining servers (hence
/// `shift_remove`, never `swap_remove`).
#[derive(Debug, Default)]
pub struct State {
    servers: IndexMap<String, Vec<Shard>>,
    min_key: u32,
    max_key: u32,
}

impl State {
    pub fn new(min_key: u32, max_key: u32) -> Self {
        Self {
            servers: IndexMap::new(),
            min_key,
            max_key,
        }
    }

    fn num_shards(&self) -> u32 {
        self.max_key - self.min_key + 1
    }

    /// Add a new server and fully re-partition the keyspace across every
    /// server, including the new one.
    pub fn join(&mut self, server: String) -> Result<(), Error> {
        if self.servers.contains_key(&server) {
            return Err(Error::ServerExists);
        }
        if self.servers.len() as u32 >= self.num_shards() {
            return Err(Error::NoShardsLeft);
        }
        self.servers.insert(server.clone(), vec![]);
        rebalance(&mut self.servers, self.min_key, self.max_key)?;
        info!(server, "joined, rebalanced");
        Ok(())
    }

    /// Remove a server and fully re-partition the remaining servers' keyspace.
    /// Errors if removing it would leave no servers at all.
    pub fn leave(&mut self, server: &str) -> Result<(), Error> {
        self.leave_many(std::slice::from_ref(&server.to_string()))
    }

    /// Remove every named server as one atomic step. Every name is checked
    /// against `self.servers` before any of them is removed, so a request
    /// naming one unknown server has no effect at all, not even on the
    /// names that were valid.
    pub fn leave_many(&mut self, servers: &[String]) -> Result<(), Error> {
        for server in servers {
            if !self.servers.contains_key(server) {
                return Err(Error::ServerNotFound);
            }
        }
        let distinct: std::collections::HashSet<&str> =
            servers.iter().map(String::as_str).collect();
        if self.servers.len() <= distinct.len() {
            return Err(Error::NoShardsLeft);
        }
        for server in &distinct {
            self.servers.shift_remove(*server);
        }
        rebalance(&mut self.servers, self.min_key, self.max_key)?;
        info!(count = distinct.len(), "left, rebalanced");
        Ok(())
    }

    /// Move `shard` onto `server`, stealing the overlapping portions from
    /// whichever servers currently own them. `server` need not have owned
    /// anything in `shard` before.
    ///
    /// For every existing owner's shard `existing`, the relation is taken as
    /// `overlap(shard, existing)` — `shard` is "a", `existing` is "b" — so
    /// `OverlapStart` means `shard` overlaps the low end of `existing` and
    /// `OverlapEnd` the high end.
    pub fn mv(&mut self, server: String, moved: Shard) -> Result<(), Error> {
        if !self.servers.contains_key(&server) {
            return Err(Error::ServerNotFound);
        }

        for (owner, shards) in self.servers.iter_mut() {
            if *owner == server {
                continue;
            }
            let mut kept = Vec::with_capacity(shards.len());
            for existing in shards.drain(..) {
                match shard::overlap(moved, existing) {
                    Overlap::NoOverlap => kept.push(existing),
                    Overlap::CompletelyContains => {
                        // moved swallows existing whole; existing owns nothing here.
                    }
                    Overlap::CompletelyContained => {
                        let (_, remainder) = shard::extract(existing, moved);
                        kept.extend(remainder);
                    }
                    Overlap::OverlapStart => {
                        // moved covers the high end of existing; existing keeps the low prefix.
                        if moved.lower > existing.lower {
                            kept.push(Shard::new(existing.lower, moved.lower - 1));
                        }
                    }
                    Overlap::OverlapEnd => {
                        // moved covers the low end of existing; existing keeps the high suffix.
                        if moved.upper < existing.upper {
                            kept.push(Shard::new(moved.upper + 1, existing.upper));
                        }
                    }
                }
            }
            *shards = kept;
        }

        let dest = self.servers.get_mut(&server).expect("checked above");
        dest.push(moved);
        shard::sort_by_lower(dest);
        info!(server, lower = moved.lower, upper = moved.upper, "moved");
        Ok(())
    }

    /// Snapshot of every server's shards, sorted by lower bound.
    pub fn query(&self) -> IndexMap<String, Vec<Shard>> {
        let mut out = self.servers.clone();
        for shards in out.values_mut() {
            shard::sort_by_lower(shards);
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_join_rebalances() {
        let mut state = State::new(0, 999);
        state.join("A".into()).unwrap();
        state.join("B".into()).unwrap();
        state.join("C".into()).unwrap();

        let q = state.query();
        assert_eq!(q["A"], vec![Shard::new(0, 333)]);
        assert_eq!(q["B"], vec![Shard::new(334, 666)]);
        assert_eq!(q["C"], vec![Shard::new(667, 999)]);
    }

    #[test]
    fn test_join_duplicate_fails() {
        let mut state = State::new(0, 999);
        state.join("A".into()).unwrap();
        assert!(matches!(state.join("A".into()), Err(Error::ServerExists)));
    }

    #[test]
    fn test_leave_rebalances_remaining() {
        let mut state = State::new(0, 999);
        state.join("A".into()).unwrap();
        state.join("B".into()).unwrap();
        state.join("C".into()).unwrap();

        state.leave("B").unwrap();

        let q = state.query();
        assert_eq!(q.len(), 2);
        assert_eq!(q["A"], vec![Shard::new(0, 499)]);
        assert_eq!(q["C"], vec![Shard::new(500, 999)]);
    }

    #[test]
    fn test_leave_last_server_fails() {
        let mut state = State::new(0, 999);
        state.join("A".into()).unwrap();
        assert!(matches!(state.leave("A"), Err(Error::NoShardsLeft)));
    }

    #[test]
    fn test_leave_unknown_server_fails() {
        let mut state = State::new(0, 999);
        state.join("A".into()).unwrap();
        assert!(matches!(state.leave("ghost"), Err(Error::ServerNotFound)));
    }

    /// An unknown name anywhere in the batch must not remove or rebalance
    /// the valid names alongside it.
    #[test]
    fn test_leave_many_unknown_server_has_no_partial_effect() {
        let mut state = State::new(0, 999);
        state.join("A".into()).unwrap();
        state.join("B".into()).unwrap();
        state.join("C".into()).unwrap();

        let result = state.leave_many(&["B".to_string(), "ghost".to_string()]);
        assert!(matches!(result, Err(Error::ServerNotFound)));

        let q = state.query();
        assert_eq!(q.len(), 3);
        assert_eq!(q["A"], vec![Shard::new(0, 333)]);
        assert_eq!(q["B"], vec![Shard::new(334, 666)]);
        assert_eq!(q["C"], vec![Shard::new(667, 999)]);
    }

    #[test]
    fn test_leave_many_removes_all_named_servers() {
        let mut state = State::new(0, 999);
        state.join("A".into()).unwrap();
        state.join("B".into()).unwrap();
        state.join("C".into()).unwrap();

        state
            .leave_many(&["B".to_string(), "C".to_string()])
            .unwrap();

        let q = state.query();
        assert_eq!(q.len(), 1);
        assert_eq!(q["A"], vec![Shard::new(0, 999)]);
    }

    #[test]
    fn test_join_at_capacity_fails_without_mutating() {
        let mut state = State::new(0, 1);
        state.join("A".into()).unwrap();
        state.join("B".into()).unwrap();
        // [0,1] is fully split into two singleton shards; no room for a third.
        assert!(matches!(state.join("C".into()), Err(Error::NoShardsLeft)));

        let q = state.query();
        assert_eq!(q.len(), 2);
        assert_eq!(q["A"], vec![Shard::new(0, 0)]);
        assert_eq!(q["B"], vec![Shard::new(1, 1)]);
    }

    /// Three-way even split, then move [500,600] onto A.
    #[test]
    fn test_move_slice_from_middle_owner() {
        let mut state = State::new(0, 999);
        state.join("A".into()).unwrap();
        state.join("B".into()).unwrap();
        state.join("C".into()).unwrap();
        // starting point: A:[0,333] B:[334,666] C:[667,999]

        state.mv("A".into(), Shard::new(500, 600)).unwrap();

        let q = state.query();
        assert_eq!(q["A"], vec![Shard::new(0, 333), Shard::new(500, 600)]);
        assert_eq!(q["B"], vec![Shard::new(334, 499), Shard::new(601, 666)]);
        assert_eq!(q["C"], vec![Shard::new(667, 999)]);
    }

    #[test]
    fn test_move_onto_unknown_server_fails() {
        let mut state = State::new(0, 999);
        state.join("A".into()).unwrap();
        assert!(matches!(
            state.mv("ghost".into(), Shard::new(0, 10)),
            Err(Error::ServerNotFound)
        ));
    }

    #[test]
    fn test_move_whole_owner_shard_empties_it() {
        let mut state = State::new(0, 999);
        state.join("A".into()).unwrap();
        state.join("B".into()).unwrap();
        // A:[0,499] B:[500,999]

        state.mv("A".into(), Shard::new(500, 999)).unwrap();

        let q = state.query();
        assert_eq!(q["A"], vec![Shard::new(0, 499), Shard::new(500, 999)]);
        assert!(q["B"].is_empty());
    }
}
