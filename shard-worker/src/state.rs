use std::collections::BTreeMap;

use shardkv_common::keys::{self, KeyKind};
use shardkv_common::rpc::Stub;
use shardkv_common::wire::ServerShards;
use tracing::warn;

use crate::error::Error;
use crate::store::Store;

/// What a local `Put`/`Append` produced that still needs to be forwarded:
/// appending a post id onto a `<user>_posts` list owned by another
/// replication group. `owner` is that group's Manager address — the
/// Manager proxies the `Append` to whichever worker is currently primary.
#[derive(Debug, Clone)]
pub struct PendingForward {
    pub owner: String,
    pub list_key: String,
    pub value: String,
}

/// Everything the worker's single lock guards: the store, the cached shard
/// assignment, and the replication/view bookkeeping.
pub struct WorkerState {
    address: String,
    store: Store,
    /// shard lower bound -> (upper bound, owning group's Manager address);
    /// a `BTreeMap` so "which shard owns id X" is a `range(..=X).next_back()`
    /// lookup, the Rust equivalent of the original `std::map` +
    /// `upper_bound` trick.
    assignment: BTreeMap<u32, (u32, String)>,
    manager_stub: Stub,
    shardmaster_address: String,
    backup_stub: Option<Stub>,
    view_number: u64,
    is_primary: bool,
}

impl WorkerState {
    pub fn new(address: String, manager_address: String) -> Self {
        Self {
            address,
            store: Store::default(),
            assignment: BTreeMap::new(),
            manager_stub: Stub::new(manager_address),
            shardmaster_address: String::new(),
            backup_stub: None,
            view_number: 0,
            is_primary: false,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn manager_stub(&self) -> Stub {
        self.manager_stub.clone()
    }

    pub fn backup_stub(&self) -> Option<Stub> {
        self.backup_stub.clone()
    }

    pub fn shardmaster_address(&self) -> String {
        self.shardmaster_address.clone()
    }

    pub fn view_number(&self) -> u64 {
        self.view_number
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Rebuilds the cached assignment map from a fresh `Query()` response.
    pub fn set_assignment(&mut self, config: Vec<ServerShards>) {
        self.assignment.clear();
        for server in config {
            for shard in server.shards {
                self.assignment.insert(shard.lower, (shard.upper, server.server.clone()));
            }
        }
    }

    /// The endpoint owning the shard that contains `id`, if known.
    pub fn owner_of(&self, id: u32) -> Option<&str> {
        self.assignment
            .range(..=id)
            .next_back()
            .filter(|(_, (upper, _))| id <= *upper)
            .map(|(_, (_, owner))| owner.as_str())
    }

    /// The stable identity the Shardmaster records as an "owner": the
    /// worker's Manager, not the worker's own bind address. Primary and
    /// backup are different physical processes behind the same Manager, so
    /// this is what lets a backup's own `manages_key` agree with its
    /// primary's for a forwarded write, and what a remote group's workers
    /// dial for cross-group forwards (the Manager proxies to its primary).
    fn group_address(&self) -> &str {
        self.manager_stub.endpoint()
    }

    /// `managesKey`: `all_users` is global; everything else is
    /// owned by whoever the assignment map says owns its id.
    pub fn manages_key(&self, key: &str) -> bool {
        if key == keys::ALL_USERS {
            return true;
        }
        match keys::key_id(key) {
            Ok(id) => self.owner_of(id) == Some(self.group_address()),
            Err(_) => false,
        }
    }

    pub fn get(&self, key: &str) -> Result<String, Error> {
        if !self.manages_key(key) {
            return Err(Error::NotResponsible);
        }
        self.store.get(key).map(str::to_string).ok_or(Error::NotFound)
    }

    /// Applies a `Put` locally (the backup has already been forwarded to by
    /// the caller). Returns a pending cross-worker forward for a post's
    /// owner-list update, if the owning worker is not this one.
    pub fn put_local(
        &mut self,
        key: &str,
        value: &str,
        user: Option<String>,
    ) -> Result<Option<PendingForward>, Error> {
        if !self.manages_key(key) {
            return Err(Error::NotResponsible);
        }
        self.store.set(key, value);

        match keys::classify(key) {
            KeyKind::User => {
                let current = self.store.get(keys::ALL_USERS).unwrap_or("").to_string();
                let updated = keys::append_dedup(&current, key);
                self.store.set(keys::ALL_USERS, updated);
                Ok(None)
            }
            KeyKind::Post => {
                let Some(user) = user else {
                    warn!(key, "put of a post key with no author, skipping post-list update");
                    return Ok(None);
                };
                self.store.set_author(key, user.clone());
                let user_id = match keys::key_id(&user) {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(%err, user, "author key is malformed, skipping post-list update");
                        return Ok(None);
                    }
                };
                let list_key = format!("{user}_posts");
                match self.owner_of(user_id) {
                    Some(owner) if owner == self.group_address() => {
                        let current = self.store.get(&list_key).unwrap_or("").to_string();
                        let updated = keys::append_dedup(&current, key);
                        self.store.set(list_key, updated);
                        Ok(None)
                    }
                    Some(owner) => Ok(Some(PendingForward {
                        owner: owner.to_string(),
                        list_key,
                        value: key.to_string(),
                    })),
                    None => {
                        warn!(user, "no known owner for author's post list yet");
                        Ok(None)
                    }
                }
            }
            KeyKind::List | KeyKind::AllUsers | KeyKind::Other => {
                warn!(key, "put of a key outside the user/post taxonomy");
                Ok(None)
            }
        }
    }

    /// Applies an `Append` locally (the backup has already been forwarded
    /// to). Delegates to `put_local` for the "doesn't exist yet and is a
    /// user/post key" case.
    pub fn append_local(&mut self, key: &str, value: &str) -> Result<Option<PendingForward>, Error> {
        if !self.manages_key(key) {
            return Err(Error::NotResponsible);
        }
        let kind = keys::classify(key);
        let is_internal_list = matches!(kind, KeyKind::List | KeyKind::AllUsers | KeyKind::Other);

        if self.store.contains(key) || is_internal_list {
            if key.ends_with('s') {
                let current = self.store.get(key).unwrap_or("").to_string();
                let updated = keys::append_dedup(&current, value);
                self.store.set(key, updated);
            } else {
                let mut current = self.store.get(key).unwrap_or("").to_string();
                current.push_str(value);
                self.store.set(key, current);
            }
            Ok(None)
        } else {
            self.put_local(key, value, None)
        }
    }

    pub fn delete(&mut self, key: &str) -> Result<(), Error> {
        if !self.manages_key(key) {
            return Err(Error::NotResponsible);
        }
        self.store.remove(key).ok_or(Error::NotFound)?;
        if keys::is_user_key(key) {
            let current = self.store.get(keys::ALL_USERS).unwrap_or("").to_string();
            let updated = keys::remove_from_list(&current, key);
            self.store.set(keys::ALL_USERS, updated);
        }
        Ok(())
    }

    pub fn dump(&self) -> std::collections::HashMap<String, String> {
        self.store.dump()
    }

    pub fn merge_dump(&mut self, snapshot: std::collections::HashMap<String, String>) {
        self.store.merge(snapshot);
    }

    /// Keys stored locally that this worker no longer manages, grouped by
    /// their new owner. Used by the reconciliation loop (§4.4 step 3-4).
    pub fn unmanaged_keys_by_owner(&self) -> Vec<(String, Vec<(String, String, Option<String>)>)> {
        let mut by_owner: std::collections::HashMap<String, Vec<(String, String, Option<String>)>> =
            std::collections::HashMap::new();

        for key in self.store.iter_keys() {
            if key == keys::ALL_USERS {
                continue;
            }
            let Ok(id) = keys::key_id(key) else { continue };
            let Some(owner) = self.owner_of(id) else { continue };
            if owner == self.group_address() {
                continue;
            }
            let value = self.store.get(key).unwrap_or("").to_string();
            let author = self.store.author(key).map(str::to_string);
            by_owner
                .entry(owner.to_string())
                .or_default()
                .push((key.to_string(), value, author));
        }
        by_owner.into_iter().collect()
    }

    pub fn remove_migrated_key(&mut self, key: &str) {
        self.store.remove(key);
        if keys::is_user_key(key) {
            let current = self.store.get(keys::ALL_USERS).unwrap_or("").to_string();
            let updated = keys::remove_from_list(&current, key);
            self.store.set(keys::ALL_USERS, updated);
        }
    }

    pub fn apply_ping_response(
        &mut self,
        primary: &str,
        backup: &str,
        shardmaster: String,
        view_id: u64,
    ) {
        self.shardmaster_address = shardmaster;
        self.is_primary = primary == self.address;

        if self.is_primary && !backup.is_empty() {
            let needs_new_stub = self
                .backup_stub
                .as_ref()
                .map(|s| s.endpoint() != backup)
                .unwrap_or(true);
            if needs_new_stub {
                self.backup_stub = Some(Stub::new(backup));
            }
        } else {
            self.backup_stub = None;
        }

        self.view_number = view_id;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use shardkv_common::Shard;

    fn assigned(state: &mut WorkerState, entries: &[(&str, u32, u32)]) {
        let config = entries
            .iter()
            .map(|(server, lower, upper)| ServerShards {
                server: server.to_string(),
                shards: vec![Shard::new(*lower, *upper)],
            })
            .collect();
        state.set_assignment(config);
    }

    #[test]
    fn test_manages_key_all_users_is_universal() {
        let mut state = WorkerState::new("W1".to_string(), "M1".to_string());
        assigned(&mut state, &[("M2", 0, 999)]);
        assert!(state.manages_key("all_users"));
    }

    #[test]
    fn test_manages_key_by_assignment() {
        let mut state = WorkerState::new("W1".to_string(), "M1".to_string());
        assigned(&mut state, &[("M1", 0, 499), ("M2", 500, 999)]);
        assert!(state.manages_key("u_5"));
        assert!(!state.manages_key("u_700"));
    }

    #[test]
    fn test_put_user_key_updates_all_users() {
        let mut state = WorkerState::new("W1".to_string(), "M1".to_string());
        assigned(&mut state, &[("M1", 0, 999)]);
        state.put_local("u_5", "alice", None).unwrap();
        assert_eq!(state.get("all_users").unwrap(), "u_5,");
    }

    #[test]
    fn test_put_post_key_local_owner_updates_post_list() {
        let mut state = WorkerState::new("W1".to_string(), "M1".to_string());
        assigned(&mut state, &[("M1", 0, 999)]);
        state.put_local("u_5", "alice", None).unwrap();
        let forward = state.put_local("p_3", "hello", Some("u_5".to_string())).unwrap();
        assert!(forward.is_none());
        assert_eq!(state.get("u_5_posts").unwrap(), "p_3,");
    }

    #[test]
    fn test_put_post_key_remote_owner_returns_forward() {
        let mut state = WorkerState::new("W1".to_string(), "M1".to_string());
        assigned(&mut state, &[("M1", 0, 499), ("M2", 500, 999)]);
        // p_3's own shard (id 3) is local, but its author u_700 is remote.
        let forward = state
            .put_local("p_3", "hello", Some("u_700".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(forward.owner, "M2");
        assert_eq!(forward.list_key, "u_700_posts");
        assert_eq!(forward.value, "p_3");
    }

    #[test]
    fn test_append_dedup_on_list_key() {
        let mut state = WorkerState::new("W1".to_string(), "M1".to_string());
        assigned(&mut state, &[("M1", 0, 999)]);
        state.append_local("u_5_posts", "p_1").unwrap();
        state.append_local("u_5_posts", "p_1").unwrap();
        assert_eq!(state.get("u_5_posts").unwrap(), "p_1,");
    }

    #[test]
    fn test_delete_user_key_prunes_all_users() {
        let mut state = WorkerState::new("W1".to_string(), "M1".to_string());
        assigned(&mut state, &[("M1", 0, 999)]);
        state.put_local("u_5", "alice", None).unwrap();
        state.delete("u_5").unwrap();
        assert_eq!(state.get("all_users").unwrap(), "");
        assert!(matches!(state.get("u_5"), Err(Error::NotFound)));
    }

    #[test]
    fn test_migration_marks_key_unmanaged_after_reassignment() {
        let mut state = WorkerState::new("W1".to_string(), "M1".to_string());
        assigned(&mut state, &[("M1", 0, 999)]);
        state.put_local("u_700", "carol", None).unwrap();
        assigned(&mut state, &[("M1", 0, 499), ("M2", 500, 999)]);

        let by_owner = state.unmanaged_keys_by_owner();
        assert_eq!(by_owner.len(), 1);
        assert_eq!(by_owner[0].0, "M2");
        assert_eq!(by_owner[0].1[0].0, "u_700");
    }
}
