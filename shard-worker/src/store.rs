use std::collections::HashMap;

/// The raw key-value map plus the post-author side table. No locking, no
/// ownership logic — just storage, mirroring the way `shardkv_common::shard`
/// keeps pure algebra separate from the services that use it.
#[derive(Debug, Default)]
pub struct Store {
    kv: HashMap<String, String>,
    authors: HashMap<String, String>,
}

impl Store {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.kv.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.kv.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.kv.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.kv.remove(key)
    }

    pub fn set_author(&mut self, post_key: impl Into<String>, user: impl Into<String>) {
        self.authors.insert(post_key.into(), user.into());
    }

    pub fn author(&self, post_key: &str) -> Option<&str> {
        self.authors.get(post_key).map(String::as_str)
    }

    pub fn iter_keys(&self) -> impl Iterator<Item = &str> {
        self.kv.keys().map(String::as_str)
    }

    pub fn dump(&self) -> HashMap<String, String> {
        self.kv.clone()
    }

    /// Bulk-merge a `Dump()` response from a primary into this (presumably
    /// empty) backup store.
    pub fn merge(&mut self, snapshot: HashMap<String, String>) {
        self.kv.extend(snapshot);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let mut store = Store::default();
        store.set("u_5", "alice");
        assert_eq!(store.get("u_5"), Some("alice"));
        assert!(store.contains("u_5"));
        assert_eq!(store.remove("u_5"), Some("alice".to_string()));
        assert!(!store.contains("u_5"));
    }

    #[test]
    fn test_merge_does_not_clobber_unrelated_keys() {
        let mut store = Store::default();
        store.set("u_1", "a");
        let mut snapshot = HashMap::new();
        snapshot.insert("u_2".to_string(), "b".to_string());
        store.merge(snapshot);
        assert_eq!(store.get("u_1"), Some("a"));
        assert_eq!(store.get("u_2"), Some("b"));
    }
}
