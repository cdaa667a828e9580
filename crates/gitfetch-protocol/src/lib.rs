//! Client-side fetch negotiation for the git wire protocol.
//!
//! Given an open duplex byte stream to a server that has already advertised
//! its refs, this crate determines which objects are missing locally,
//! negotiates the common history boundary over the pkt-line protocol
//! (`want`/`have`/`ACK`/`done`), and hands the resulting pack stream to an
//! object-ingesting subprocess, optionally through a side-band
//! demultiplexer.
//!
//! The entry point is [`fetch::fetch_pack`].

pub mod advert;
pub mod capability;
pub mod config;
pub mod fetch;
pub mod pack;
pub mod pktline;
pub mod refs;
pub mod sideband;
pub mod walk;

mod complete;
mod negotiate;

pub use capability::{Capabilities, SidebandMode};
pub use config::FetchConfig;
pub use fetch::{fetch_pack, FetchArgs, FetchOutcome};
pub use refs::Ref;

use gitfetch_store::StoreError;

/// Errors surfaced by the fetch negotiation core.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("remote error: {0}")]
    ServerError(String),

    #[error("server does not support shallow clients")]
    ShallowNotSupported,

    #[error("shallow file was changed during fetch")]
    ShallowFileChanged,

    #[error("shallow file was removed during fetch")]
    ShallowFileRemoved,

    #[error("no matching remote head")]
    NoMatchingRemoteHead,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Util(#[from] gitfetch_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
