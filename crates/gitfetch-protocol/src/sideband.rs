//! Side-band demultiplexing.
//!
//! After negotiation the pack arrives multiplexed: each packet's first byte
//! names a band — 1 carries pack data, 2 carries progress text for the
//! user's stderr, 3 carries a fatal error message from the server.

use std::io::Read;

use crate::pktline::{PktLine, PktLineReader};
use crate::FetchError;

/// Band identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Pack data (band 1).
    Data = 1,
    /// Progress messages (band 2).
    Progress = 2,
    /// Fatal error (band 3).
    Error = 3,
}

/// Demultiplexer over a pkt-line stream.
///
/// `read_data` yields band-1 payloads in arrival order; progress is
/// streamed to stderr as it passes by, and a band-3 packet aborts with the
/// server's message.
pub struct SidebandReader<R> {
    reader: PktLineReader<R>,
    /// Suppress band-2 output (the `no-progress` capability was sent).
    quiet: bool,
}

impl<R: Read> SidebandReader<R> {
    pub fn new(reader: PktLineReader<R>) -> Self {
        Self {
            reader,
            quiet: false,
        }
    }

    /// Drop progress messages instead of copying them to stderr.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Read the next band-1 payload. Returns `None` once the flush packet
    /// ends the multiplexed stream.
    pub fn read_data(&mut self) -> Result<Option<Vec<u8>>, FetchError> {
        loop {
            match self.reader.read_pkt()? {
                PktLine::Flush => return Ok(None),
                PktLine::Data(data) => {
                    let Some((&band, payload)) = data.split_first() else {
                        return Err(FetchError::Protocol(
                            "empty side-band packet".into(),
                        ));
                    };
                    match band {
                        1 => return Ok(Some(payload.to_vec())),
                        2 => {
                            if !self.quiet {
                                eprint!("remote: {}", String::from_utf8_lossy(payload));
                            }
                        }
                        3 => {
                            return Err(FetchError::ServerError(
                                String::from_utf8_lossy(payload).trim_end().to_string(),
                            ));
                        }
                        other => {
                            return Err(FetchError::Protocol(format!(
                                "invalid side-band channel {other}"
                            )));
                        }
                    }
                }
            }
        }
    }
}
