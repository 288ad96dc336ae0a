//! Shard algebra: pure functions over contiguous integer key ranges.
//!
//! No I/O, no locking. The Shardmaster, Shard Manager and Shard Worker all
//! build their higher-level behavior on top of these primitives.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A contiguous, inclusive range of key ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Shard {
    pub lower: u32,
    pub upper: u32,
}

impl Shard {
    pub fn new(lower: u32, upper: u32) -> Self {
        Self { lower, upper }
    }

    /// Number of keys covered by this shard.
    pub fn size(&self) -> u64 {
        u64::from(self.upper) - u64::from(self.lower) + 1
    }

    /// Whether `id` falls inside this shard.
    pub fn contains(&self, id: u32) -> bool {
        self.lower <= id && id <= self.upper
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("num_shards must be greater than zero")]
    ZeroShards,
    #[error("shard of size {size} cannot be split into {num_shards} pieces")]
    TooManyShards { size: u64, num_shards: u64 },
    #[error("split position {pos} is outside shard [{lower}, {upper})")]
    SplitOutOfRange { pos: u32, lower: u32, upper: u32 },
    #[error("shard of size {size} is too small to split in half")]
    TooSmallToHalve { size: u64 },
    #[error("illformed key {0:?}: expected at least two '_'-delimited tokens")]
    IllformedKey(String),
    #[error("key id {0:?} is not a valid integer")]
    NotAnInteger(String),
}

/// Split `s` into `n` contiguous sub-shards whose sizes differ by at most
/// one. The first `size(s) mod n` pieces get the extra unit.
///
/// Relaxed from the original source's strict `size(s) > n`: a shard of
/// size exactly `n` splits cleanly into `n` singletons, see DESIGN.md.
pub fn split(s: Shard, n: u32) -> Result<Vec<Shard>, Error> {
    if n == 0 {
        return Err(Error::ZeroShards);
    }
    let size = s.size();
    let n64 = u64::from(n);
    if size < n64 {
        return Err(Error::TooManyShards {
            size,
            num_shards: n64,
        });
    }

    let base = size / n64;
    let remainder = size % n64;
    let mut shards = Vec::with_capacity(n as usize);
    let mut lower = s.lower;
    for i in 0..n64 {
        let piece_size = base + u64::from(i < remainder);
        let upper = lower + (piece_size as u32) - 1;
        shards.push(Shard::new(lower, upper));
        lower = upper + 1;
    }
    Ok(shards)
}

/// Split `s` at `p`, returning `({s.lower, p}, {p+1, s.upper})`.
pub fn split_at(s: Shard, p: u32) -> Result<(Shard, Shard), Error> {
    if p < s.lower || p >= s.upper {
        return Err(Error::SplitOutOfRange {
            pos: p,
            lower: s.lower,
            upper: s.upper,
        });
    }
    Ok((Shard::new(s.lower, p), Shard::new(p + 1, s.upper)))
}

/// Split `s` into two roughly-equal halves.
pub fn split_half(s: Shard) -> Result<(Shard, Shard), Error> {
    let size = s.size();
    if size < 2 {
        return Err(Error::TooSmallToHalve { size });
    }
    let p = s.lower + (size / 2) as u32;
    split_at(s, p)
}

/// Given `sub` (assumed to be a subset of `s`), return `(sub, remainder)`
/// where `remainder` is zero, one or two contiguous shards covering
/// `s \ sub`.
pub fn extract(s: Shard, sub: Shard) -> (Shard, Vec<Shard>) {
    let mut remainder = Vec::with_capacity(2);
    if s.lower + 1 <= sub.lower {
        remainder.push(Shard::new(s.lower, sub.lower - 1));
    }
    if sub.upper + 1 <= s.upper {
        remainder.push(Shard::new(sub.upper + 1, s.upper));
    }
    (sub, remainder)
}

/// The five-valued overlap relation between two shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    NoOverlap,
    CompletelyContains,
    CompletelyContained,
    OverlapStart,
    OverlapEnd,
}

/// Overlap relation of `a` with respect to `b`. Ties (`a == b`) resolve to
/// `CompletelyContained`.
pub fn overlap(a: Shard, b: Shard) -> Overlap {
    if a.upper < b.lower || b.upper < a.lower {
        Overlap::NoOverlap
    } else if b.lower <= a.lower && a.upper <= b.upper {
        Overlap::CompletelyContained
    } else if a.lower < b.lower && a.upper > b.upper {
        Overlap::CompletelyContains
    } else if a.lower >= b.lower && a.upper > b.upper {
        Overlap::OverlapStart
    } else {
        Overlap::OverlapEnd
    }
}

pub fn sort_by_lower(shards: &mut [Shard]) {
    shards.sort_by_key(|s| s.lower);
}

pub fn sort_by_size_asc(shards: &mut [Shard]) {
    shards.sort_by_key(|s| s.size());
}

pub fn sort_by_size_desc(shards: &mut [Shard]) {
    shards.sort_by_key(|s| std::cmp::Reverse(s.size()));
}

/// Parse the key id out of a key: split on `_` and parse the second token,
/// e.g. `extract_id("u_42") == 42`, `extract_id("u_42_posts") == 42`.
pub fn extract_id(key: &str) -> Result<u32, Error> {
    let mut tokens = key.split('_');
    let _first = tokens.next();
    let second = tokens
        .next()
        .ok_or_else(|| Error::IllformedKey(key.to_string()))?;
    second
        .parse::<u32>()
        .map_err(|_| Error::NotAnInteger(second.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_even() {
        let s = Shard::new(0, 999);
        let pieces = split(s, 3).unwrap();
        assert_eq!(
            pieces,
            vec![Shard::new(0, 333), Shard::new(334, 666), Shard::new(667, 999)]
        );
    }

    #[test]
    fn test_split_exact_size() {
        // size(s) == n is now permitted (relaxed from the source's `>`).
        let s = Shard::new(0, 2);
        let pieces = split(s, 3).unwrap();
        assert_eq!(
            pieces,
            vec![Shard::new(0, 0), Shard::new(1, 1), Shard::new(2, 2)]
        );
    }

    #[test]
    fn test_split_too_many() {
        let s = Shard::new(0, 1);
        assert_eq!(
            split(s, 3),
            Err(Error::TooManyShards {
                size: 2,
                num_shards: 3
            })
        );
    }

    #[test]
    fn test_split_zero() {
        assert_eq!(split(Shard::new(0, 9), 0), Err(Error::ZeroShards));
    }

    #[test]
    fn test_split_at() {
        let s = Shard::new(0, 9);
        assert_eq!(
            split_at(s, 4).unwrap(),
            (Shard::new(0, 4), Shard::new(5, 9))
        );
        assert!(split_at(s, 9).is_err());
        assert!(split_at(s, 0).is_ok());
    }

    #[test]
    fn test_split_half() {
        let s = Shard::new(0, 9);
        assert_eq!(
            split_half(s).unwrap(),
            (Shard::new(0, 4), Shard::new(5, 9))
        );
        assert!(split_half(Shard::new(0, 0)).is_err());
    }

    #[test]
    fn test_extract_middle() {
        let s = Shard::new(0, 99);
        let sub = Shard::new(30, 60);
        let (got_sub, remainder) = extract(s, sub);
        assert_eq!(got_sub, sub);
        assert_eq!(remainder, vec![Shard::new(0, 29), Shard::new(61, 99)]);
    }

    #[test]
    fn test_extract_prefix() {
        let s = Shard::new(0, 99);
        let sub = Shard::new(0, 60);
        let (_, remainder) = extract(s, sub);
        assert_eq!(remainder, vec![Shard::new(61, 99)]);
    }

    #[test]
    fn test_extract_whole() {
        let s = Shard::new(0, 99);
        let (_, remainder) = extract(s, s);
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_overlap_relations() {
        let a = Shard::new(0, 9);
        assert_eq!(overlap(a, Shard::new(20, 30)), Overlap::NoOverlap);
        assert_eq!(overlap(a, Shard::new(0, 9)), Overlap::CompletelyContained);
        assert_eq!(
            overlap(Shard::new(2, 5), Shard::new(0, 9)),
            Overlap::CompletelyContained
        );
        assert_eq!(
            overlap(Shard::new(0, 9), Shard::new(2, 5)),
            Overlap::CompletelyContains
        );
        assert_eq!(
            overlap(Shard::new(5, 15), Shard::new(0, 9)),
            Overlap::OverlapStart
        );
        assert_eq!(
            overlap(Shard::new(0, 9), Shard::new(5, 15)),
            Overlap::OverlapEnd
        );
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(extract_id("u_42").unwrap(), 42);
        assert_eq!(extract_id("u_42_posts").unwrap(), 42);
        assert_eq!(extract_id("p_7").unwrap(), 7);
        assert!(extract_id("all_users").is_err());
        assert!(extract_id("noUnderscore").is_err());
        assert!(extract_id("u_notanumber").is_err());
    }

    #[test]
    fn test_sort_helpers() {
        let mut shards = vec![Shard::new(10, 19), Shard::new(0, 4), Shard::new(5, 9)];
        sort_by_lower(&mut shards);
        assert_eq!(shards[0], Shard::new(0, 4));

        let mut shards = vec![Shard::new(0, 9), Shard::new(0, 0), Shard::new(0, 4)];
        sort_by_size_asc(&mut shards);
        assert_eq!(shards[0].size(), 1);
        sort_by_size_desc(&mut shards);
        assert_eq!(shards[0].size(), 10);
    }
}
