//! Pack reception dispatch.
//!
//! Once negotiation ends the stream carries a pack. The dispatcher peeks
//! the 12-byte header to choose an ingester — `index-pack --stdin` keeps
//! large packs on disk, `unpack-objects` explodes small ones into loose
//! objects — and feeds it the (possibly demultiplexed) stream. With
//! side-band, a separate demux task relays band-1 through a channel while
//! progress and server errors are handled in-line.

use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::mpsc;

use gitfetch_utils::subprocess::{GitCommand, StdioMode};

use crate::capability::SidebandMode;
use crate::fetch::FetchArgs;
use crate::pktline::PktLineReader;
use crate::sideband::SidebandReader;
use crate::FetchError;

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_HEADER_SIZE: usize = 12;

/// The fixed pack stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    pub version: u32,
    pub entries: u32,
}

impl PackHeader {
    /// Parse the 12-byte header: signature, version, entry count.
    pub fn parse(bytes: &[u8; PACK_HEADER_SIZE]) -> Result<Self, FetchError> {
        if &bytes[..4] != PACK_SIGNATURE {
            return Err(FetchError::Protocol("bad pack header".into()));
        }
        Ok(Self {
            version: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            entries: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// The chosen ingester invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IngestPlan {
    pub subcommand: &'static str,
    pub args: Vec<String>,
    /// Read the keep lock-file line from the child's stdout.
    pub capture_lockfile: bool,
}

/// Decide how to ingest: keep the pack when asked to, or
/// when it is at least `unpack_limit` entries; explode it otherwise.
/// `header` is present exactly when it was peeked off the stream, in which
/// case its values are forwarded via `--pack_header=` instead of replayed.
pub(crate) fn ingest_plan(
    args: &FetchArgs,
    unpack_limit: u32,
    header: Option<&PackHeader>,
) -> IngestPlan {
    let do_keep = match header {
        Some(h) => h.entries >= unpack_limit,
        None => args.keep_pack,
    };

    let mut plan = if do_keep {
        let mut cmd_args = vec!["--stdin".to_string()];
        if !args.quiet && !args.no_progress {
            cmd_args.push("-v".to_string());
        }
        if args.use_thin_pack {
            cmd_args.push("--fix-thin".to_string());
        }
        if args.lock_pack || unpack_limit > 0 {
            let host =
                std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
            cmd_args.push(format!(
                "--keep=fetch-pack {} on {}",
                std::process::id(),
                host
            ));
        }
        IngestPlan {
            subcommand: "index-pack",
            args: cmd_args,
            capture_lockfile: args.lock_pack,
        }
    } else {
        let mut cmd_args = Vec::new();
        if args.quiet {
            cmd_args.push("-q".to_string());
        }
        IngestPlan {
            subcommand: "unpack-objects",
            args: cmd_args,
            capture_lockfile: false,
        }
    };

    if let Some(h) = header {
        plan.args
            .push(format!("--pack_header={},{}", h.version, h.entries));
    }
    plan
}

/// Receive the pack from the wire and run it through the chosen ingester.
///
/// Returns the pack lock-file path when one was requested and produced.
pub(crate) fn receive_pack<R: Read + Send>(
    reader: &mut R,
    sideband: SidebandMode,
    args: &FetchArgs,
    unpack_limit: u32,
) -> Result<Option<PathBuf>, FetchError> {
    if !sideband.enabled() {
        return ingest_stream(reader, args, unpack_limit);
    }

    // One demux task relays band-1 in order; the ingester feed runs here.
    let quiet = args.quiet || args.no_progress;
    std::thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<io::Result<Vec<u8>>>();
        let demux = scope.spawn(move || -> Result<(), FetchError> {
            let mut sb = SidebandReader::new(PktLineReader::new(reader)).quiet(quiet);
            loop {
                match sb.read_data() {
                    Ok(Some(chunk)) => {
                        if tx.send(Ok(chunk)).is_err() {
                            // Ingester side hung up; drain no further.
                            return Ok(());
                        }
                    }
                    Ok(None) => return Ok(()),
                    Err(e) => {
                        let _ = tx.send(Err(io::Error::other(e.to_string())));
                        return Err(e);
                    }
                }
            }
        });

        let result = ingest_stream(&mut ChannelReader::new(rx), args, unpack_limit);
        let demux_result = demux
            .join()
            .map_err(|_| FetchError::Protocol("side-band demultiplexer panicked".into()))?;
        // A server-reported error explains any downstream failure.
        demux_result?;
        result
    })
}

/// Peek the header if the policy needs it, then spawn and feed the child.
fn ingest_stream<R: Read>(
    mut input: R,
    args: &FetchArgs,
    unpack_limit: u32,
) -> Result<Option<PathBuf>, FetchError> {
    let header = if !args.keep_pack && unpack_limit > 0 {
        let mut bytes = [0u8; PACK_HEADER_SIZE];
        input
            .read_exact(&mut bytes)
            .map_err(|_| FetchError::Protocol("bad pack header".into()))?;
        Some(PackHeader::parse(&bytes)?)
    } else {
        None
    };

    let plan = ingest_plan(args, unpack_limit, header.as_ref());
    run_ingest(input, &plan)
}

fn run_ingest<R: Read>(mut input: R, plan: &IngestPlan) -> Result<Option<PathBuf>, FetchError> {
    let mut cmd = GitCommand::new(plan.subcommand).stdin(StdioMode::Pipe);
    for arg in &plan.args {
        cmd = cmd.arg(arg);
    }
    if plan.capture_lockfile {
        cmd = cmd.stdout(StdioMode::Pipe);
    }

    let mut child = cmd.spawn()?;
    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("ingester stdin not piped"))?;
        match io::copy(&mut input, &mut stdin) {
            Ok(_) => {}
            // The child decides when it has seen enough; its exit status
            // is the authority on failure.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => return Err(e.into()),
        }
    }

    let lockfile = if plan.capture_lockfile {
        child.stdout.take().and_then(|out| {
            let mut line = String::new();
            BufReader::new(out).read_line(&mut line).ok()?;
            let token = line.strip_prefix("keep\t")?.trim();
            Some(PathBuf::from(format!("pack-{token}.keep")))
        })
    } else {
        None
    };

    let status = child.wait()?;
    cmd.check_status(status)?;
    Ok(lockfile)
}

/// `Read` adapter over the demux channel: band-1 bytes in arrival order,
/// EOF when the demux task finishes, error when it aborted.
struct ChannelReader {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    buf: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    fn new(rx: mpsc::Receiver<io::Result<Vec<u8>>>) -> Self {
        Self {
            rx,
            buf: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.buf.len() {
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => return Ok(0),
            }
        }
        let n = (self.buf.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
