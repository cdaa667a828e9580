use bstr::{BStr, BString, ByteSlice};

use crate::ObjectError;

/// A timestamp as stored in commit and tag headers.
///
/// Only the raw epoch seconds matter to negotiation (the walk orders by
/// committer date); the timezone offset is preserved for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitDate {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Timezone in git's decimal form (`-0500` stored as -500).
    pub tz_offset: i32,
}

/// An author/committer/tagger identity line: `Name <email> timestamp tz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub date: GitDate,
}

impl Signature {
    /// Parse git's signature format, e.g.
    /// `Jane Doe <jane@example.com> 1234567890 +0100`.
    pub fn parse(input: &BStr) -> Result<Self, ObjectError> {
        let bytes = input.as_bytes();

        let gt = bytes
            .iter()
            .rposition(|&b| b == b'>')
            .ok_or_else(|| ObjectError::InvalidSignature("missing '>'".into()))?;
        let lt = bytes[..gt]
            .iter()
            .rposition(|&b| b == b'<')
            .ok_or_else(|| ObjectError::InvalidSignature("missing '<'".into()))?;

        let name = bytes[..lt].trim();
        let email = &bytes[lt + 1..gt];

        let rest = bytes[gt + 1..].trim();
        let mut fields = rest.split(|&b| b == b' ').filter(|f| !f.is_empty());

        let seconds = fields
            .next()
            .and_then(|f| std::str::from_utf8(f).ok())
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(|| ObjectError::InvalidSignature("bad timestamp".into()))?;

        // Some historical tools wrote signatures without a timezone.
        let tz_offset = fields
            .next()
            .and_then(|f| std::str::from_utf8(f).ok())
            .and_then(|f| f.parse::<i32>().ok())
            .unwrap_or(0);

        Ok(Self {
            name: BString::from(name),
            email: BString::from(email),
            date: GitDate { seconds, tz_offset },
        })
    }

    /// Serialize back to git's signature format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(self.date.seconds.to_string().as_bytes());
        out.push(b' ');
        let tz = self.date.tz_offset;
        out.extend_from_slice(format!("{}{:04}", if tz < 0 { "-" } else { "+" }, tz.abs()).as_bytes());
        out
    }
}
