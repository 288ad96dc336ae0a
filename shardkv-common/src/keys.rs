//! Key taxonomy: the small grammar the worker's auxiliary bookkeeping
//! (author map, per-user post lists, `all_users`) is built on.

use crate::shard::{self, Error};

/// The sentinel key every worker manages regardless of shard assignment.
pub const ALL_USERS: &str = "all_users";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// `u_<id>`: a user record.
    User,
    /// `p_<id>`: a post record.
    Post,
    /// Any other key ending in `s`: an append-only comma list, e.g. a
    /// `<user>_posts` list.
    List,
    /// `all_users`, the global sentinel.
    AllUsers,
    /// Anything else.
    Other,
}

pub fn classify(key: &str) -> KeyKind {
    if key == ALL_USERS {
        return KeyKind::AllUsers;
    }
    let starts_with_u = key.starts_with('u');
    let ends_with_s = key.ends_with('s');
    if starts_with_u && !ends_with_s {
        KeyKind::User
    } else if key.starts_with('p') {
        KeyKind::Post
    } else if ends_with_s {
        KeyKind::List
    } else {
        KeyKind::Other
    }
}

pub fn is_user_key(key: &str) -> bool {
    classify(key) == KeyKind::User
}

pub fn is_post_key(key: &str) -> bool {
    classify(key) == KeyKind::Post
}

/// The key id this key belongs to, used to look up the owning shard.
/// `all_users` has no id: it's owned by every worker.
pub fn key_id(key: &str) -> Result<u32, Error> {
    shard::extract_id(key)
}

/// Remove `user` from a comma-separated list of user keys (as used by
/// `all_users`), preserving the order of the remaining entries.
pub fn remove_from_list(list: &str, user: &str) -> String {
    list.split(',')
        .filter(|token| !token.is_empty() && *token != user)
        .map(|token| format!("{token},"))
        .collect()
}

/// Append `value` to a comma-separated list, deduplicating.
pub fn append_dedup(list: &str, value: &str) -> String {
    if list.split(',').any(|token| token == value) {
        list.to_string()
    } else {
        format!("{list}{value},")
    }
}
