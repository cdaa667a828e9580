//! Commit-graph walker driving the `have` emission order.
//!
//! The walk pops commits by descending committer date and tracks five flag
//! bits per object in a side table owned by the session, so no state leaks
//! onto the store's objects and nothing survives past one fetch call.
//!
//! `non_common_revs` counts queue entries that are `SEEN` but neither
//! `COMMON` nor `POPPED`; the walk is exhausted when it reaches zero, even
//! if the queue still holds common history.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;

use gitfetch_hash::ObjectId;
use gitfetch_object::{CommitCache, Object};
use gitfetch_store::ObjectStore;

bitflags::bitflags! {
    /// Per-object walk state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WalkFlags: u8 {
        /// Object and its transitive dependencies exist locally.
        const COMPLETE = 1 << 0;
        /// Server is known to have this object.
        const COMMON = 1 << 1;
        /// Locally-present remote ref tip; announced at walk start.
        const COMMON_REF = 1 << 2;
        /// Pushed into the walk queue at least once.
        const SEEN = 1 << 3;
        /// Emitted from the walk queue.
        const POPPED = 1 << 4;
    }
}

/// Parsed commit fields the walk consumes.
pub(crate) struct CommitInfo {
    pub date: i64,
    pub parents: Vec<ObjectId>,
}

struct QueueEntry {
    date: i64,
    /// Insertion counter; earlier insertions pop first at equal dates.
    ctr: u64,
    oid: ObjectId,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date && self.ctr == other.ctr
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: newest date first, then stable insertion order.
        self.date
            .cmp(&other.date)
            .then_with(|| other.ctr.cmp(&self.ctr))
    }
}

/// A commit list ordered by descending committer date.
pub(crate) struct DateQueue {
    heap: BinaryHeap<QueueEntry>,
    ctr: u64,
}

impl DateQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            ctr: 0,
        }
    }

    pub(crate) fn push(&mut self, oid: ObjectId, date: i64) {
        let ctr = self.ctr;
        self.ctr += 1;
        self.heap.push(QueueEntry { date, ctr, oid });
    }

    pub(crate) fn pop(&mut self) -> Option<(ObjectId, i64)> {
        self.heap.pop().map(|e| (e.oid, e.date))
    }

    pub(crate) fn peek_date(&self) -> Option<i64> {
        self.heap.peek().map(|e| e.date)
    }
}

/// Per-session walk state over a borrowed object store.
pub struct Walker<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    flags: HashMap<ObjectId, WalkFlags>,
    cache: CommitCache,
    rev_list: DateQueue,
    non_common_revs: usize,
}

const COMMIT_CACHE_CAPACITY: usize = 4096;

impl<'a, S: ObjectStore + ?Sized> Walker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            flags: HashMap::new(),
            cache: CommitCache::new(COMMIT_CACHE_CAPACITY),
            rev_list: DateQueue::new(),
            non_common_revs: 0,
        }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    /// Current flags for an object (empty if never touched).
    pub fn flags(&self, oid: &ObjectId) -> WalkFlags {
        self.flags.get(oid).copied().unwrap_or_default()
    }

    pub(crate) fn add_flags(&mut self, oid: ObjectId, add: WalkFlags) {
        *self.flags.entry(oid).or_default() |= add;
    }

    /// Queue entries that are `SEEN` but neither `COMMON` nor `POPPED`.
    pub fn non_common_revs(&self) -> usize {
        self.non_common_revs
    }

    /// Parse a commit, answering from the session cache when possible.
    /// Any failure (absent object, not a commit, corrupt bytes) yields
    /// `None`: the walk is an optimization and never dies on local damage.
    pub(crate) fn commit_info(&mut self, oid: ObjectId) -> Option<CommitInfo> {
        if let Some(commit) = self.cache.get(&oid) {
            return Some(CommitInfo {
                date: commit.commit_date(),
                parents: commit.parents.clone(),
            });
        }
        let commit = match self.store.read(&oid) {
            Ok(Some(Object::Commit(c))) => c,
            _ => return None,
        };
        let info = CommitInfo {
            date: commit.commit_date(),
            parents: commit.parents.clone(),
        };
        self.cache.insert(oid, commit);
        Some(info)
    }

    /// Parents of a commit only if it was already parsed this session.
    fn cached_parents(&mut self, oid: &ObjectId) -> Option<Vec<ObjectId>> {
        self.cache.get(oid).map(|c| c.parents.clone())
    }

    /// Insert a commit into the walk with the given mark.
    ///
    /// A commit already carrying any bit of `mark` is left alone. The mark
    /// is recorded even when the commit fails to parse; only parseable
    /// commits enter the queue.
    pub fn push(&mut self, oid: ObjectId, mark: WalkFlags) {
        let flags = self.flags(&oid);
        if flags.intersects(mark) {
            return;
        }
        self.add_flags(oid, mark);
        let new_flags = flags | mark;

        let Some(info) = self.commit_info(oid) else {
            return;
        };
        self.rev_list.push(oid, info.date);

        if !new_flags.contains(WalkFlags::COMMON) {
            self.non_common_revs += 1;
        }
    }

    /// Mark a commit (unless `ancestors_only`) and everything reachable
    /// from it as known to the server.
    ///
    /// Runs iteratively over an explicit stack: histories are deeper than
    /// stacks. Hitting an already-`COMMON` node stops that branch, which
    /// makes the operation idempotent. With `skip_parse`, descent stops at
    /// commits not parsed earlier in this session.
    pub fn mark_common(&mut self, oid: ObjectId, ancestors_only: bool, skip_parse: bool) {
        let mut stack = vec![(oid, ancestors_only)];

        while let Some((oid, ancestors_only)) = stack.pop() {
            let flags = self.flags(&oid);
            if flags.contains(WalkFlags::COMMON) {
                continue;
            }

            if !ancestors_only {
                self.add_flags(oid, WalkFlags::COMMON);
            }

            if !flags.contains(WalkFlags::SEEN) {
                self.push(oid, WalkFlags::SEEN);
                continue;
            }

            if !ancestors_only && !flags.contains(WalkFlags::POPPED) {
                self.non_common_revs = self.non_common_revs.saturating_sub(1);
            }

            let parents = if skip_parse {
                self.cached_parents(&oid)
            } else {
                self.commit_info(oid).map(|i| i.parents)
            };
            let Some(parents) = parents else {
                continue;
            };
            for parent in parents {
                stack.push((parent, false));
            }
        }
    }

    /// Pop the next commit to announce as `have`, skipping and expanding
    /// common history along the way.
    ///
    /// Returns `None` when the queue is exhausted or nothing non-common
    /// remains to discover.
    pub fn next_rev(&mut self) -> Option<ObjectId> {
        loop {
            if self.non_common_revs == 0 {
                return None;
            }
            let (oid, _) = self.rev_list.pop()?;

            let parents = self.commit_info(oid).map(|i| i.parents).unwrap_or_default();

            let flags = self.flags(&oid);
            self.add_flags(oid, WalkFlags::POPPED);
            if !flags.contains(WalkFlags::COMMON) {
                self.non_common_revs = self.non_common_revs.saturating_sub(1);
            }

            let (emit, mark) = if flags.contains(WalkFlags::COMMON) {
                // Already common: nothing to say, prune ancestors.
                (false, WalkFlags::COMMON | WalkFlags::SEEN)
            } else if flags.contains(WalkFlags::COMMON_REF) {
                // Announce the tip, but its ancestors are implied.
                (true, WalkFlags::COMMON | WalkFlags::SEEN)
            } else {
                (true, WalkFlags::SEEN)
            };

            for parent in &parents {
                if !self.flags(parent).contains(WalkFlags::SEEN) {
                    self.push(*parent, mark);
                }
                if mark.contains(WalkFlags::COMMON) {
                    self.mark_common(*parent, true, false);
                }
            }

            if emit {
                return Some(oid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitfetch_store::MemoryStore;

    /// Linear chain of `n` commits with ascending dates; returns tip-last.
    fn chain(store: &mut MemoryStore, n: usize) -> Vec<ObjectId> {
        let mut oids = Vec::new();
        let mut parent: Option<ObjectId> = None;
        for i in 0..n {
            let parents: Vec<_> = parent.into_iter().collect();
            let oid = store.insert_commit(&parents, 1000 + i as i64, &format!("c{i}"));
            oids.push(oid);
            parent = Some(oid);
        }
        oids
    }

    #[test]
    fn walk_emits_date_descending() {
        let mut store = MemoryStore::new();
        let oids = chain(&mut store, 5);
        let mut walker = Walker::new(&store);

        walker.push(*oids.last().unwrap(), WalkFlags::SEEN);

        let mut emitted = Vec::new();
        while let Some(oid) = walker.next_rev() {
            emitted.push(oid);
        }
        let expected: Vec<_> = oids.iter().rev().copied().collect();
        assert_eq!(emitted, expected);
    }

    #[test]
    fn push_is_idempotent_per_mark() {
        let mut store = MemoryStore::new();
        let oids = chain(&mut store, 1);
        let mut walker = Walker::new(&store);

        walker.push(oids[0], WalkFlags::SEEN);
        walker.push(oids[0], WalkFlags::SEEN);
        assert_eq!(walker.non_common_revs(), 1);

        assert_eq!(walker.next_rev(), Some(oids[0]));
        assert_eq!(walker.next_rev(), None);
    }

    #[test]
    fn unparseable_push_is_silent() {
        let store = MemoryStore::new();
        let mut walker = Walker::new(&store);
        let missing = ObjectId::from([7; 20]);

        walker.push(missing, WalkFlags::SEEN);
        assert_eq!(walker.non_common_revs(), 0);
        assert_eq!(walker.next_rev(), None);
        // The mark itself sticks even without a queue entry.
        assert!(walker.flags(&missing).contains(WalkFlags::SEEN));
    }

    #[test]
    fn common_ref_tip_is_emitted_once_and_prunes_ancestors() {
        let mut store = MemoryStore::new();
        let oids = chain(&mut store, 4);
        let tip = *oids.last().unwrap();
        let mut walker = Walker::new(&store);

        walker.push(tip, WalkFlags::COMMON_REF | WalkFlags::SEEN);
        walker.mark_common(tip, true, true);

        assert_eq!(walker.next_rev(), Some(tip));
        // Ancestors became common; nothing further to announce.
        assert_eq!(walker.next_rev(), None);
    }

    #[test]
    fn mark_common_prunes_seen_history() {
        let mut store = MemoryStore::new();
        let oids = chain(&mut store, 6);
        let tip = *oids.last().unwrap();
        let mut walker = Walker::new(&store);

        walker.push(tip, WalkFlags::SEEN);
        // Emit the two newest, then learn the third is common.
        assert_eq!(walker.next_rev(), Some(oids[5]));
        assert_eq!(walker.next_rev(), Some(oids[4]));
        walker.mark_common(oids[3], false, true);

        // Everything older is common now.
        assert_eq!(walker.next_rev(), None);
        assert_eq!(walker.non_common_revs(), 0);
    }

    #[test]
    fn mark_common_is_idempotent() {
        let mut store = MemoryStore::new();
        let oids = chain(&mut store, 3);
        let mut walker = Walker::new(&store);

        walker.push(oids[2], WalkFlags::SEEN);
        walker.next_rev();
        walker.mark_common(oids[1], false, true);
        let after_first = walker.non_common_revs();
        walker.mark_common(oids[1], false, true);
        assert_eq!(walker.non_common_revs(), after_first);
    }

    #[test]
    fn common_ancestry_propagates_through_parents() {
        let mut store = MemoryStore::new();
        let oids = chain(&mut store, 5);
        let tip = *oids.last().unwrap();
        let mut walker = Walker::new(&store);

        walker.push(tip, WalkFlags::SEEN);
        // Walk everything so the chain is in the session cache.
        while walker.next_rev().is_some() {}

        walker.mark_common(oids[3], false, true);
        for oid in &oids[..4] {
            assert!(
                walker.flags(oid).contains(WalkFlags::COMMON),
                "ancestor {oid} should be common"
            );
        }
        assert!(!walker.flags(&tip).contains(WalkFlags::COMMON));
    }

    #[test]
    fn merge_commits_walk_both_parents() {
        let mut store = MemoryStore::new();
        let a = store.insert_commit(&[], 100, "a");
        let b = store.insert_commit(&[], 200, "b");
        let merge = store.insert_commit(&[a, b], 300, "merge");
        let mut walker = Walker::new(&store);

        walker.push(merge, WalkFlags::SEEN);
        let emitted: Vec<_> = std::iter::from_fn(|| walker.next_rev()).collect();
        assert_eq!(emitted, vec![merge, b, a]);
    }

    #[test]
    fn equal_dates_pop_in_insertion_order() {
        let mut q = DateQueue::new();
        let x = ObjectId::from([1; 20]);
        let y = ObjectId::from([2; 20]);
        q.push(x, 42);
        q.push(y, 42);
        assert_eq!(q.pop().map(|(o, _)| o), Some(x));
        assert_eq!(q.pop().map(|(o, _)| o), Some(y));
    }

    #[test]
    fn non_common_revs_never_underflows() {
        let mut store = MemoryStore::new();
        let oids = chain(&mut store, 3);
        let mut walker = Walker::new(&store);

        walker.push(oids[2], WalkFlags::SEEN);
        while walker.next_rev().is_some() {}
        walker.mark_common(oids[2], false, true);
        walker.mark_common(oids[0], false, true);
        assert_eq!(walker.non_common_revs(), 0);
    }
}
