//! Fetch orchestration.
//!
//! `fetch_pack` ties the pieces together: capability handshake,
//! completeness oracle, negotiation, pack handoff, and shallow-state
//! finalization. All negotiation state lives in values owned by one call;
//! two back-to-back fetches share nothing but the store.

use std::io::{Read, Write};
use std::path::PathBuf;

use gitfetch_store::shallow::{ShallowFile, ShallowUpdateError};
use gitfetch_store::ObjectStore;

use crate::capability::{self, Capabilities};
use crate::complete;
use crate::config::FetchConfig;
use crate::negotiate::{self, FindCommon};
use crate::pack;
use crate::pktline::{PktLineReader, PktLineWriter};
use crate::refs::{remove_duplicates, Ref};
use crate::walk::Walker;
use crate::FetchError;

/// Caller-selected fetch behavior.
#[derive(Debug, Clone)]
pub struct FetchArgs {
    /// Shallow fetch depth; 0 means a full fetch.
    pub depth: u32,
    /// Fetch every advertised ref instead of matching heads.
    pub fetch_all: bool,
    /// Always keep the pack on disk instead of exploding it.
    pub keep_pack: bool,
    /// Keep the pack and hold a lock file on it.
    pub lock_pack: bool,
    /// Request thin-pack transfer.
    pub use_thin_pack: bool,
    /// Ask the server to include annotated tags of fetched objects.
    pub include_tag: bool,
    /// Suppress server progress output.
    pub no_progress: bool,
    /// Quiet mode for the ingester.
    pub quiet: bool,
    /// Trace negotiation on stderr.
    pub verbose: bool,
    /// Location of the repository's shallow file.
    pub shallow_file: PathBuf,
}

impl Default for FetchArgs {
    fn default() -> Self {
        Self {
            depth: 0,
            fetch_all: false,
            keep_pack: false,
            lock_pack: false,
            use_thin_pack: false,
            include_tag: false,
            no_progress: false,
            quiet: false,
            verbose: false,
            shallow_file: PathBuf::from("shallow"),
        }
    }
}

/// What a completed fetch produced.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Surviving refs; `new_oid` is set on every ref that is now local.
    pub refs: Vec<Ref>,
    /// Lock file held on the kept pack, when one was requested.
    pub pack_lockfile: Option<PathBuf>,
    /// User heads that matched no advertised ref.
    pub unmatched_heads: Vec<String>,
}

/// Run a complete fetch over an established duplex stream.
///
/// `advertised` and `server_caps` come from the already-parsed server
/// greeting (see [`crate::advert::parse_ref_advertisement`]). The local
/// store is only borrowed; the single piece of repository state written
/// here is the shallow file, and only when `depth > 0`.
#[allow(clippy::too_many_arguments)]
pub fn fetch_pack<R, W, S>(
    reader: &mut R,
    writer: &mut W,
    advertised: Vec<Ref>,
    server_caps: &Capabilities,
    heads: &[String],
    args: &FetchArgs,
    config: &FetchConfig,
    store: &S,
) -> Result<FetchOutcome, FetchError>
where
    R: Read + Send,
    W: Write,
    S: ObjectStore + ?Sized,
{
    if advertised.is_empty() {
        return Err(FetchError::NoMatchingRemoteHead);
    }
    let heads = remove_duplicates(heads);

    let shallow_file = ShallowFile::new(&args.shallow_file);
    let stamp = (args.depth > 0).then(|| shallow_file.stamp());
    let mut shallow = shallow_file.load().map_err(FetchError::Store)?;

    let outcome = do_fetch_pack(
        reader,
        writer,
        advertised,
        server_caps,
        &heads,
        args,
        config,
        store,
        &mut shallow,
    )?;

    if let Some(stamp) = stamp {
        shallow_file
            .commit_update(&shallow, stamp)
            .map_err(|e| match e {
                ShallowUpdateError::Changed => FetchError::ShallowFileChanged,
                ShallowUpdateError::Removed => FetchError::ShallowFileRemoved,
                ShallowUpdateError::Store(e) => FetchError::Store(e),
            })?;
    }

    for head in &outcome.unmatched_heads {
        eprintln!("error: no such remote ref {head}");
    }

    Ok(outcome)
}

/// One negotiation session: oracle, have exchange, pack reception.
#[allow(clippy::too_many_arguments)]
fn do_fetch_pack<R, W, S>(
    reader: &mut R,
    writer: &mut W,
    advertised: Vec<Ref>,
    server_caps: &Capabilities,
    heads: &[String],
    args: &FetchArgs,
    config: &FetchConfig,
    store: &S,
    shallow: &mut Vec<gitfetch_hash::ObjectId>,
) -> Result<FetchOutcome, FetchError>
where
    R: Read + Send,
    W: Write,
    S: ObjectStore + ?Sized,
{
    let repo_is_shallow = !shallow.is_empty();
    let mut negotiated = capability::negotiate(
        server_caps,
        config.prefer_ofs_delta(),
        repo_is_shallow,
        args.use_thin_pack,
        args.no_progress,
        args.include_tag,
        args.verbose,
    )?;

    let mut walker = Walker::new(store);
    let state = complete::everything_local(
        &mut walker,
        advertised,
        heads,
        args.fetch_all,
        args.depth,
        args.verbose,
    )?;

    let mut pkt_writer = PktLineWriter::new(&mut *writer);

    if state.everything_local {
        pkt_writer.write_flush()?;
        pkt_writer.flush()?;
        return Ok(FetchOutcome {
            refs: state.refs,
            pack_lockfile: None,
            unmatched_heads: state.unmatched,
        });
    }

    let mut refs = state.refs;
    let result = {
        let mut pkt_reader = PktLineReader::new(&mut *reader);
        negotiate::find_common(
            &mut walker,
            &mut pkt_reader,
            &mut pkt_writer,
            &mut negotiated,
            &refs,
            shallow,
            args.depth,
            args.verbose,
        )?
    };
    drop(pkt_writer);

    let pack_lockfile = match result {
        FindCommon::NoWants => None,
        FindCommon::Done { agreed } => {
            if !agreed && !args.keep_pack {
                // Normal when cloning: there is no history to share yet.
                eprintln!("warning: no common commits");
            }
            let lockfile =
                pack::receive_pack(reader, negotiated.sideband, args, config.unpack_limit())?;
            for r in &mut refs {
                r.new_oid = Some(r.old_oid);
            }
            lockfile
        }
    };

    Ok(FetchOutcome {
        refs,
        pack_lockfile,
        unmatched_heads: state.unmatched,
    })
}
