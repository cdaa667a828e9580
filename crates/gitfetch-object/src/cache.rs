//! LRU cache for parsed commits.

use std::num::NonZeroUsize;

use gitfetch_hash::ObjectId;
use lru::LruCache;

use crate::Commit;

/// LRU cache of parsed commits keyed by OID.
///
/// The negotiation session parses a commit when it is pushed into the walk
/// and reads its parents again when it is popped; the cache makes the second
/// read free without sharing mutable state with the object store.
pub struct CommitCache {
    cache: LruCache<ObjectId, Commit>,
}

impl CommitCache {
    /// Create with the given capacity (number of commits).
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            ),
        }
    }

    /// Get a cached commit (promotes it to most-recently-used).
    pub fn get(&mut self, oid: &ObjectId) -> Option<&Commit> {
        self.cache.get(oid)
    }

    /// Insert a parsed commit.
    pub fn insert(&mut self, oid: ObjectId, commit: Commit) {
        self.cache.push(oid, commit);
    }

    /// Whether an OID is cached (without promoting it).
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.cache.contains(oid)
    }

    /// Current number of cached commits.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use crate::{GitDate, Signature};

    fn commit(n: u8) -> (ObjectId, Commit) {
        let mut raw = [0u8; 20];
        raw[0] = n;
        let sig = Signature {
            name: BString::from("a"),
            email: BString::from("a@b"),
            date: GitDate { seconds: n as i64, tz_offset: 0 },
        };
        let commit = Commit {
            tree: ObjectId::NULL,
            parents: vec![],
            author: sig.clone(),
            committer: sig,
            message: BString::from(""),
        };
        (ObjectId::from(raw), commit)
    }

    #[test]
    fn insert_and_get() {
        let mut cache = CommitCache::new(4);
        let (oid, c) = commit(1);
        cache.insert(oid, c.clone());
        assert_eq!(cache.get(&oid), Some(&c));
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = CommitCache::new(2);
        let (o1, c1) = commit(1);
        let (o2, c2) = commit(2);
        let (o3, c3) = commit(3);
        cache.insert(o1, c1);
        cache.insert(o2, c2);
        cache.get(&o1);
        cache.insert(o3, c3);
        assert!(cache.contains(&o1));
        assert!(!cache.contains(&o2));
        assert_eq!(cache.len(), 2);
    }
}
