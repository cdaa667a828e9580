//! Recognized configuration values.
//!
//! Config file parsing belongs to the caller; this module only interprets
//! the keys the fetch core reacts to, from pre-parsed key/value pairs.

/// Packs below this many entries are exploded into loose objects.
pub const DEFAULT_UNPACK_LIMIT: u32 = 100;

/// Typed view of the fetch-relevant configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    fetch_unpack_limit: Option<u32>,
    transfer_unpack_limit: Option<u32>,
    prefer_ofs_delta: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fetch_unpack_limit: None,
            transfer_unpack_limit: None,
            prefer_ofs_delta: true,
        }
    }
}

impl FetchConfig {
    /// Consume `(key, value)` pairs, taking the last occurrence of each
    /// recognized key and ignoring everything else.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut config = Self::default();
        for (key, value) in pairs {
            match key {
                "fetch.unpacklimit" => config.fetch_unpack_limit = value.parse().ok(),
                "transfer.unpacklimit" => config.transfer_unpack_limit = value.parse().ok(),
                "repack.usedeltabaseoffset" => {
                    if let Some(b) = parse_bool(value) {
                        config.prefer_ofs_delta = b;
                    }
                }
                _ => {}
            }
        }
        config
    }

    /// The effective unpack limit; `transfer.unpacklimit` wins when both
    /// are set.
    pub fn unpack_limit(&self) -> u32 {
        self.transfer_unpack_limit
            .or(self.fetch_unpack_limit)
            .unwrap_or(DEFAULT_UNPACK_LIMIT)
    }

    /// Whether to ask for ofs-delta encoding when the server offers it.
    pub fn prefer_ofs_delta(&self) -> bool {
        self.prefer_ofs_delta
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
