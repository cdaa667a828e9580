use std::fmt;
use std::str::FromStr;

use crate::hex::{hex_decode, hex_to_string};
use crate::HashError;

/// Digest length in bytes.
pub const OID_RAW_LEN: usize = 20;

/// Hex representation length (40 characters).
pub const OID_HEX_LEN: usize = OID_RAW_LEN * 2;

/// A 20-byte object identifier.
///
/// The canonical textual form is 40 lowercase hex characters; that is the
/// only form that appears on the wire (`want`/`have`/`ACK`/`shallow` lines
/// and the ref advertisement).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OID_RAW_LEN]);

impl ObjectId {
    /// The null OID (all zeros), advertised for unborn refs.
    pub const NULL: Self = Self([0u8; OID_RAW_LEN]);

    /// Create an ObjectId from exactly 20 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != OID_RAW_LEN {
            return Err(HashError::InvalidHexLength {
                expected: OID_HEX_LEN,
                actual: bytes.len() * 2,
            });
        }
        let mut raw = [0u8; OID_RAW_LEN];
        raw.copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// Parse the canonical 40-character hex form.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let mut raw = [0u8; OID_RAW_LEN];
        hex_decode(hex, &mut raw)?;
        Ok(Self(raw))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; OID_RAW_LEN] {
        &self.0
    }

    /// Whether this is the all-zeros OID.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// The canonical lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }
}

impl From<[u8; OID_RAW_LEN]> for ObjectId {
    fn from(raw: [u8; OID_RAW_LEN]) -> Self {
        Self(raw)
    }
}

impl FromStr for ObjectId {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}
