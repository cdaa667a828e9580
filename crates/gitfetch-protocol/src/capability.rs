//! Capability handshake.
//!
//! The server lists its capabilities after a NUL byte on the first line of
//! the ref advertisement. The client picks the subset it will use and sends
//! that choice as a suffix on the first `want` line.

use crate::FetchError;

/// The set of capabilities a server advertised.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    entries: Vec<String>,
}

impl Capabilities {
    /// Parse a space-separated capability list
    /// (e.g. `multi_ack side-band-64k ofs-delta agent=git/2.39.0`).
    pub fn parse(caps: &str) -> Self {
        Self {
            entries: caps.split_whitespace().map(str::to_owned).collect(),
        }
    }

    /// Whether a capability was advertised. Valued capabilities
    /// (`agent=...`) match on the name alone.
    pub fn supports(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e == name || e.strip_prefix(name).is_some_and(|r| r.starts_with('=')))
    }

    /// Value of a `name=value` capability.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find_map(|e| e.strip_prefix(name)?.strip_prefix('='))
    }
}

/// Side-band multiplexing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SidebandMode {
    /// No side-band; raw pack bytes follow the ack section.
    #[default]
    None,
    /// `side-band`: packets capped at 1000 bytes.
    Basic,
    /// `side-band-64k`: packets capped at 65520 bytes.
    Band64k,
}

impl SidebandMode {
    pub fn enabled(&self) -> bool {
        !matches!(self, SidebandMode::None)
    }

    /// Largest packet the server may send in this mode, including the
    /// 4-byte length and the band byte.
    pub fn max_packet(&self) -> usize {
        match self {
            SidebandMode::Band64k => crate::pktline::LARGE_PACKET_MAX,
            _ => crate::pktline::SMALL_PACKET_MAX,
        }
    }
}

/// The capability choices in force for one fetch session.
#[derive(Debug, Clone, Default)]
pub struct Negotiated {
    pub multi_ack: bool,
    pub sideband: SidebandMode,
    pub ofs_delta: bool,
    pub thin_pack: bool,
    pub no_progress: bool,
    pub include_tag: bool,
}

impl Negotiated {
    /// Capability suffix for the first `want` line, with a leading space
    /// per entry (empty when nothing was enabled).
    pub fn want_suffix(&self) -> String {
        let mut suffix = String::new();
        if self.multi_ack {
            suffix.push_str(" multi_ack");
        }
        match self.sideband {
            SidebandMode::Band64k => suffix.push_str(" side-band-64k"),
            SidebandMode::Basic => suffix.push_str(" side-band"),
            SidebandMode::None => {}
        }
        if self.thin_pack {
            suffix.push_str(" thin-pack");
        }
        if self.no_progress {
            suffix.push_str(" no-progress");
        }
        if self.include_tag {
            suffix.push_str(" include-tag");
        }
        if self.ofs_delta {
            suffix.push_str(" ofs-delta");
        }
        suffix
    }
}

/// Apply the client capability policy against a server's advertisement.
///
/// - `multi_ack`: enabled whenever offered.
/// - side-band: prefer `side-band-64k`, fall back to `side-band`.
/// - `ofs-delta`: the local preference is dropped if the server lacks it.
/// - `shallow`: required when the local repository is shallow.
pub fn negotiate(
    server: &Capabilities,
    prefer_ofs_delta: bool,
    repo_is_shallow: bool,
    thin_pack: bool,
    no_progress: bool,
    include_tag: bool,
    verbose: bool,
) -> Result<Negotiated, FetchError> {
    if repo_is_shallow && !server.supports("shallow") {
        return Err(FetchError::ShallowNotSupported);
    }

    let multi_ack = server.supports("multi_ack");
    if multi_ack && verbose {
        eprintln!("Server supports multi_ack");
    }

    let sideband = if server.supports("side-band-64k") {
        if verbose {
            eprintln!("Server supports side-band-64k");
        }
        SidebandMode::Band64k
    } else if server.supports("side-band") {
        if verbose {
            eprintln!("Server supports side-band");
        }
        SidebandMode::Basic
    } else {
        SidebandMode::None
    };

    let ofs_delta = prefer_ofs_delta && server.supports("ofs-delta");
    if ofs_delta && verbose {
        eprintln!("Server supports ofs-delta");
    }

    Ok(Negotiated {
        multi_ack,
        sideband,
        ofs_delta,
        thin_pack,
        no_progress,
        include_tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiate_plain(server: &Capabilities) -> Negotiated {
        negotiate(server, true, false, false, false, false, false).unwrap()
    }

    #[test]
    fn parse_and_membership() {
        let caps = Capabilities::parse(
            "multi_ack thin-pack side-band side-band-64k ofs-delta shallow agent=git/2.39.0",
        );
        assert!(caps.supports("multi_ack"));
        assert!(caps.supports("side-band-64k"));
        assert!(caps.supports("shallow"));
        assert!(caps.supports("agent"));
        assert_eq!(caps.value("agent"), Some("git/2.39.0"));
        assert!(!caps.supports("no-done"));
        // `side-band` must not match as a prefix of `side-band-64k` only.
        assert!(caps.supports("side-band"));
    }

    #[test]
    fn prefers_64k_sideband() {
        let n = negotiate_plain(&Capabilities::parse("side-band side-band-64k"));
        assert_eq!(n.sideband, SidebandMode::Band64k);
    }

    #[test]
    fn falls_back_to_basic_sideband() {
        let n = negotiate_plain(&Capabilities::parse("side-band"));
        assert_eq!(n.sideband, SidebandMode::Basic);
    }

    #[test]
    fn ofs_delta_requires_server_support() {
        let n = negotiate_plain(&Capabilities::parse("multi_ack"));
        assert!(!n.ofs_delta);
        let n = negotiate_plain(&Capabilities::parse("multi_ack ofs-delta"));
        assert!(n.ofs_delta);
    }

    #[test]
    fn ofs_delta_respects_local_preference() {
        let server = Capabilities::parse("ofs-delta");
        let n = negotiate(&server, false, false, false, false, false, false).unwrap();
        assert!(!n.ofs_delta);
    }

    #[test]
    fn shallow_repo_requires_shallow_capability() {
        let server = Capabilities::parse("multi_ack ofs-delta");
        let err = negotiate(&server, true, true, false, false, false, false).unwrap_err();
        assert!(matches!(err, FetchError::ShallowNotSupported));

        let server = Capabilities::parse("multi_ack shallow");
        assert!(negotiate(&server, true, true, false, false, false, false).is_ok());
    }

    #[test]
    fn want_suffix_ordering() {
        let n = Negotiated {
            multi_ack: true,
            sideband: SidebandMode::Band64k,
            ofs_delta: true,
            thin_pack: true,
            no_progress: false,
            include_tag: true,
        };
        assert_eq!(
            n.want_suffix(),
            " multi_ack side-band-64k thin-pack include-tag ofs-delta"
        );
    }

    #[test]
    fn empty_suffix_when_nothing_enabled() {
        assert_eq!(Negotiated::default().want_suffix(), "");
    }

    #[test]
    fn sideband_packet_ceilings() {
        assert_eq!(SidebandMode::Band64k.max_packet(), 65520);
        assert_eq!(SidebandMode::Basic.max_packet(), 1000);
        assert!(!SidebandMode::None.enabled());
        assert!(SidebandMode::Basic.enabled());
    }
}
