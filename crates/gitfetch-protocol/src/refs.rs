//! Advertised refs and the user-pattern filter.

use bstr::{BStr, BString, ByteSlice};
use gitfetch_hash::ObjectId;

/// One advertised reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ref {
    /// Full ref name (`refs/heads/main`, `HEAD`, ...).
    pub name: BString,
    /// The value the server advertised.
    pub old_oid: ObjectId,
    /// Set on success: the value the caller should store under `name`.
    pub new_oid: Option<ObjectId>,
}

impl Ref {
    pub fn new(name: impl Into<BString>, old_oid: ObjectId) -> Self {
        Self {
            name: name.into(),
            old_oid,
            new_oid: None,
        }
    }
}

/// Characters forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[u8] = b" ~^:?*[\\";

/// Validate the part of a ref name after `refs/`, per git-check-ref-format:
/// no empty or `.`-leading components, no `..`, no control characters or
/// forbidden punctuation, no `@{`, no component ending in `.lock`, no
/// trailing `/` or `.`.
fn check_ref_format(rest: &BStr) -> bool {
    if rest.is_empty() || rest.ends_with(b"/") || rest.ends_with(b".") {
        return false;
    }
    for (i, &b) in rest.iter().enumerate() {
        if b < 0x20 || b == 0x7f || FORBIDDEN_CHARS.contains(&b) {
            return false;
        }
        if b == b'@' && rest.get(i + 1) == Some(&b'{') {
            return false;
        }
    }
    for component in rest.split(|&b| b == b'/') {
        if component.is_empty() || component[0] == b'.' || component.ends_with(b".lock") {
            return false;
        }
        if component.windows(2).any(|w| w == b"..") {
            return false;
        }
    }
    true
}

/// A `refs/...` name with a malformed remainder is trash from a broken
/// server; names outside `refs/` (e.g. `HEAD`) are taken as-is.
fn name_is_trash(name: &BStr) -> bool {
    match name.strip_prefix(b"refs/") {
        Some(rest) => !check_ref_format(rest.as_bstr()),
        None => false,
    }
}

/// Path-suffix match: `main` and `heads/main` both match
/// `refs/heads/main`; the match must start on a `/` boundary.
/// Returns the index of the first matching pattern.
fn path_match(name: &BStr, patterns: &[String]) -> Option<usize> {
    patterns.iter().position(|pattern| {
        let pat = pattern.as_bytes();
        if !name.ends_with(pat) {
            return false;
        }
        let prefix_len = name.len() - pat.len();
        prefix_len == 0 || name[prefix_len - 1] == b'/'
    })
}

/// Intersect advertised refs with the user's patterns. In order:
/// discard malformed `refs/` names; with `fetch_all`, keep refs in
/// advertised order, except tags when a depth is set; otherwise keep
/// pattern matches slotted at their pattern's position, last match winning.
///
/// Returns the surviving refs and the patterns that matched nothing.
pub fn filter_refs(
    refs: Vec<Ref>,
    patterns: &[String],
    fetch_all: bool,
    depth: u32,
) -> (Vec<Ref>, Vec<String>) {
    let mut kept: Vec<Ref> = Vec::new();
    let mut matched: Vec<Option<Ref>> = vec![None; patterns.len()];

    for r in refs {
        if name_is_trash(r.name.as_bstr()) {
            continue;
        }
        if fetch_all && (depth == 0 || !r.name.starts_with(b"refs/tags/")) {
            kept.push(r);
        } else if !fetch_all {
            if let Some(i) = path_match(r.name.as_bstr(), patterns) {
                // A later advertised match replaces an earlier one.
                matched[i] = Some(r);
            }
        }
    }

    let mut unmatched = Vec::new();
    if !fetch_all {
        for (slot, pattern) in matched.into_iter().zip(patterns) {
            match slot {
                Some(r) => kept.push(r),
                None => unmatched.push(pattern.clone()),
            }
        }
    }

    (kept, unmatched)
}

/// Deduplicate user-supplied heads, preserving first occurrence.
pub fn remove_duplicates(heads: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(heads.len());
    for head in heads {
        if !out.contains(head) {
            out.push(head.clone());
        }
    }
    out
}
