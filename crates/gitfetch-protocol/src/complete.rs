//! Completeness oracle: classify which advertised objects the local store
//! already has in full.
//!
//! A ref whose advertised tip is a locally `COMPLETE` commit needs no
//! fetching; complete tips that the server advertised become `COMMON_REF`
//! seeds for the negotiation walk. Completeness is only expanded for
//! commits recent enough (by committer date) to possibly be common, which
//! bounds the sweep on large histories.

use gitfetch_hash::ObjectId;
use gitfetch_object::Object;
use gitfetch_store::{deref_tag, ObjectStore};

use crate::refs::{filter_refs, Ref};
use crate::walk::{DateQueue, WalkFlags, Walker};
use crate::FetchError;

/// Outcome of the oracle pass.
pub(crate) struct LocalState {
    /// Refs surviving the user-pattern filter, completeness recorded.
    pub refs: Vec<Ref>,
    /// Patterns that matched no advertised ref.
    pub unmatched: Vec<String>,
    /// True iff every surviving ref is locally complete.
    pub everything_local: bool,
}

/// Run the oracle over the advertised refs.
pub(crate) fn everything_local<S: ObjectStore + ?Sized>(
    walker: &mut Walker<S>,
    refs: Vec<Ref>,
    patterns: &[String],
    fetch_all: bool,
    depth: u32,
    verbose: bool,
) -> Result<LocalState, FetchError> {
    // Newest committer date among advertised tips we can parse locally.
    // Anything at least this recent may be common with the server.
    let mut cutoff = 0i64;
    for r in &refs {
        if let Some(info) = walker.commit_info(r.old_oid) {
            cutoff = cutoff.max(info.date);
        }
    }

    // A deepened fetch must not assume local completeness at all.
    if depth == 0 {
        let mut complete = DateQueue::new();
        for (_name, oid) in walker.store().each_ref()? {
            mark_complete(walker, &mut complete, oid);
        }
        if cutoff > 0 {
            mark_recent_complete_commits(walker, &mut complete, cutoff, verbose);
        }
    }

    // Complete advertised tips seed the walk: announce them first, their
    // ancestors are implied. The server is not told yet; that is what the
    // `have` exchange is for.
    for r in &refs {
        let Some((oid, Object::Commit(_))) = deref_tag(walker.store(), r.old_oid).ok().flatten()
        else {
            continue;
        };
        let flags = walker.flags(&oid);
        if flags.contains(WalkFlags::COMPLETE) && !flags.contains(WalkFlags::SEEN) {
            walker.push(oid, WalkFlags::COMMON_REF | WalkFlags::SEEN);
            walker.mark_common(oid, true, true);
        }
    }

    let (mut kept, unmatched) = filter_refs(refs, patterns, fetch_all, depth);

    let mut everything = true;
    for r in &mut kept {
        if walker.flags(&r.old_oid).contains(WalkFlags::COMPLETE) {
            r.new_oid = Some(r.old_oid);
            if verbose {
                eprintln!("already have {} ({})", r.old_oid, r.name);
            }
        } else {
            everything = false;
            if verbose {
                eprintln!("want {} ({})", r.old_oid, r.name);
            }
        }
    }

    Ok(LocalState {
        refs: kept,
        unmatched,
        everything_local: everything,
    })
}

/// Follow a local ref through its tag chain, marking every tag and the
/// final commit `COMPLETE`; queue the commit for the recency sweep.
fn mark_complete<S: ObjectStore + ?Sized>(
    walker: &mut Walker<S>,
    complete: &mut DateQueue,
    mut oid: ObjectId,
) {
    loop {
        let Some(obj) = walker.store().read(&oid).ok().flatten() else {
            return;
        };
        match obj {
            Object::Tag(tag) => {
                walker.add_flags(oid, WalkFlags::COMPLETE);
                oid = tag.target;
            }
            Object::Commit(_) => {
                walker.add_flags(oid, WalkFlags::COMPLETE);
                if let Some(info) = walker.commit_info(oid) {
                    complete.push(oid, info.date);
                }
                return;
            }
            _ => return,
        }
    }
}

/// Pop queued complete commits while they are recent enough to matter,
/// propagating `COMPLETE` to their parents.
fn mark_recent_complete_commits<S: ObjectStore + ?Sized>(
    walker: &mut Walker<S>,
    complete: &mut DateQueue,
    cutoff: i64,
    verbose: bool,
) {
    while complete.peek_date().is_some_and(|date| date >= cutoff) {
        let Some((oid, _)) = complete.pop() else {
            return;
        };
        if verbose {
            eprintln!("Marking {oid} as complete");
        }
        let Some(info) = walker.commit_info(oid) else {
            continue;
        };
        for parent in info.parents {
            if walker.flags(&parent).contains(WalkFlags::COMPLETE) {
                continue;
            }
            walker.add_flags(parent, WalkFlags::COMPLETE);
            if let Some(parent_info) = walker.commit_info(parent) {
                complete.push(parent, parent_info.date);
            }
        }
    }
}
