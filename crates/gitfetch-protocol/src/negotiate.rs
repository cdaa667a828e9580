//! The want/have/ACK/done negotiation engine.
//!
//! Haves are emitted in the walker's date-descending order, flushed in
//! windows of 32, and the client stays exactly one flush window ahead of
//! the acks it has consumed: polling eagerly would stall the exchange,
//! producing unboundedly would overflow the server's receive buffer.

use std::io::{Read, Write};

use gitfetch_hash::ObjectId;
use gitfetch_object::Object;
use gitfetch_store::{deref_tag, ObjectStore};

use crate::capability::Negotiated;
use crate::pktline::{PktLineReader, PktLineWriter};
use crate::refs::Ref;
use crate::walk::{WalkFlags, Walker};
use crate::FetchError;

/// After this many haves without a new ack, give up traversing history
/// (once at least one continuing ack has arrived).
const MAX_IN_VAIN: usize = 256;

/// Flush window size, in haves.
const HAVE_WINDOW: usize = 32;

/// Result of the negotiation exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FindCommon {
    /// Every surviving ref was complete; no pack will follow.
    NoWants,
    /// Negotiation ran; `agreed` is false when no common base was found
    /// (the server will send everything — normal when cloning).
    Done { agreed: bool },
}

/// One ack-section response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ack {
    Nak,
    /// `ACK <oid>` with no keyword: negotiation is over.
    Final(ObjectId),
    /// `ACK <oid> continue`: common, keep going.
    Continue(ObjectId),
    /// `ACK <oid> common`: common, but no progress credit.
    Common(ObjectId),
    /// `ACK <oid> ready`: common, and the pack is already computable.
    Ready(ObjectId),
}

fn read_ack<R: Read>(reader: &mut PktLineReader<R>) -> Result<Ack, FetchError> {
    let Some(line) = reader.read_text_line()? else {
        return Err(FetchError::Protocol("expected ACK/NAK, got flush".into()));
    };
    if line == "NAK" {
        return Ok(Ack::Nak);
    }
    if let Some(rest) = line.strip_prefix("ACK ") {
        let mut fields = rest.split(' ');
        let oid = fields
            .next()
            .and_then(|hex| ObjectId::from_hex(hex).ok())
            .ok_or_else(|| FetchError::Protocol(format!("invalid ACK line: {line}")))?;
        return match fields.next() {
            None => Ok(Ack::Final(oid)),
            Some("continue") => Ok(Ack::Continue(oid)),
            Some("common") => Ok(Ack::Common(oid)),
            Some("ready") => Ok(Ack::Ready(oid)),
            Some(other) => Err(FetchError::Protocol(format!(
                "unknown ACK keyword '{other}' in: {line}"
            ))),
        };
    }
    Err(FetchError::Protocol(format!("expected ACK/NAK, got '{line}'")))
}

/// Drive the full negotiation over an established stream.
///
/// `shallow` is the registered shallow set; the deepen response phase
/// updates it in place.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_common<S, R, W>(
    walker: &mut Walker<S>,
    reader: &mut PktLineReader<R>,
    writer: &mut PktLineWriter<W>,
    negotiated: &mut Negotiated,
    refs: &[Ref],
    shallow: &mut Vec<ObjectId>,
    depth: u32,
    verbose: bool,
) -> Result<FindCommon, FetchError>
where
    S: ObjectStore + ?Sized,
    R: Read,
    W: Write,
{
    // Seed the walk with every local ref tip. Tips already seeded as
    // COMMON_REF by the completeness pass are left alone.
    for (_name, oid) in walker.store().each_ref()? {
        if let Some((commit_oid, Object::Commit(_))) =
            deref_tag(walker.store(), oid).ok().flatten()
        {
            walker.push(commit_oid, WalkFlags::SEEN);
        }
    }

    // Phase 1: wants. The first want carries the capability choices.
    let mut fetching = 0usize;
    for r in refs {
        if walker.flags(&r.old_oid).contains(WalkFlags::COMPLETE) {
            // An ancestor of a local ref; announced via haves instead.
            continue;
        }
        if fetching == 0 {
            writer.write_text(&format!("want {}{}", r.old_oid, negotiated.want_suffix()))?;
        } else {
            writer.write_text(&format!("want {}", r.old_oid))?;
        }
        fetching += 1;
    }
    for oid in shallow.iter() {
        writer.write_text(&format!("shallow {oid}"))?;
    }
    if depth > 0 {
        writer.write_text(&format!("deepen {depth}"))?;
    }
    writer.write_flush()?;
    writer.flush()?;

    if fetching == 0 {
        return Ok(FindCommon::NoWants);
    }

    // Phase 2: the server's shallow boundary, only when we deepened.
    if depth > 0 {
        while let Some(line) = reader.read_text_line()? {
            if let Some(hex) = line.strip_prefix("shallow ") {
                let oid = ObjectId::from_hex(hex.trim()).map_err(|_| {
                    FetchError::Protocol(format!("invalid shallow line: {line}"))
                })?;
                if !shallow.contains(&oid) {
                    shallow.push(oid);
                }
                continue;
            }
            if let Some(hex) = line.strip_prefix("unshallow ") {
                let oid = ObjectId::from_hex(hex.trim()).map_err(|_| {
                    FetchError::Protocol(format!("invalid unshallow line: {line}"))
                })?;
                if walker.store().read(&oid)?.is_none() {
                    return Err(FetchError::Protocol(format!("object not found: {line}")));
                }
                let pos = shallow
                    .iter()
                    .position(|s| *s == oid)
                    .ok_or_else(|| FetchError::Protocol(format!("no shallow found: {line}")))?;
                shallow.remove(pos);
                continue;
            }
            return Err(FetchError::Protocol(format!(
                "expected shallow/unshallow, got {line}"
            )));
        }
    }

    // Phase 3: the have loop.
    let mut count = 0usize;
    let mut flushes = 0usize;
    let mut in_vain = 0usize;
    let mut got_continue = false;
    let mut got_ready = false;
    let mut agreed = false;

    'have_loop: while let Some(oid) = walker.next_rev() {
        writer.write_text(&format!("have {oid}"))?;
        if verbose {
            eprintln!("have {oid}");
        }
        count += 1;
        in_vain += 1;

        if count % HAVE_WINDOW != 0 {
            continue;
        }
        writer.write_flush()?;
        writer.flush()?;
        flushes += 1;

        // Stay one window ahead: the first flush is not polled for.
        if count == HAVE_WINDOW {
            continue;
        }

        let mut got_final = false;
        loop {
            let ack = read_ack(reader)?;
            if verbose && ack != Ack::Nak {
                eprintln!("got ack {ack:?}");
            }
            match ack {
                Ack::Nak => break,
                Ack::Final(_) => {
                    flushes = 0;
                    negotiated.multi_ack = false;
                    agreed = true;
                    got_final = true;
                    break;
                }
                Ack::Continue(oid) => {
                    walker.mark_common(oid, false, true);
                    agreed = true;
                    got_continue = true;
                    in_vain = 0;
                }
                Ack::Common(oid) => {
                    // Reported common, but no credit against the in-vain
                    // budget.
                    walker.mark_common(oid, false, true);
                    agreed = true;
                    got_continue = true;
                }
                Ack::Ready(oid) => {
                    walker.mark_common(oid, false, true);
                    agreed = true;
                    got_continue = true;
                    got_ready = true;
                    in_vain = 0;
                }
            }
        }
        if got_final {
            break 'have_loop;
        }
        flushes -= 1;

        if got_continue && in_vain > MAX_IN_VAIN {
            if verbose {
                eprintln!("giving up");
            }
            break;
        }
        if got_ready {
            // The server can already build the pack; more haves are waste.
            break;
        }
    }

    // Phase 4: done, then drain the remaining ack traffic.
    writer.write_text("done")?;
    writer.flush()?;
    if verbose {
        eprintln!("done");
    }
    if !agreed {
        negotiated.multi_ack = false;
        flushes += 1;
    }

    let mut multi_ack = negotiated.multi_ack;
    while flushes > 0 || multi_ack {
        let ack = read_ack(reader)?;
        if verbose && ack != Ack::Nak {
            eprintln!("got ack {ack:?}");
        }
        match ack {
            Ack::Nak => flushes = flushes.saturating_sub(1),
            Ack::Final(_) => return Ok(FindCommon::Done { agreed: true }),
            Ack::Continue(_) | Ack::Common(_) | Ack::Ready(_) => multi_ack = true,
        }
    }

    // Fetching into an empty repository finds nothing common; that is
    // success, not failure.
    Ok(FindCommon::Done {
        agreed: agreed || count == 0,
    })
}
