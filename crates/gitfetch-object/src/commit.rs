use bstr::{BString, ByteSlice};
use gitfetch_hash::ObjectId;

use crate::{ObjectError, Signature};

/// A git commit object.
///
/// Headers negotiation does not consume (encoding, gpgsig, mergetag, ...)
/// are skipped on parse; serialization is only used for objects this
/// workspace creates itself, which never carry them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// OID of the root tree.
    pub tree: ObjectId,
    /// Parent commit OIDs, in order (empty for a root commit).
    pub parents: Vec<ObjectId>,
    /// Author identity and timestamp.
    pub author: Signature,
    /// Committer identity and timestamp; the walk orders by this date.
    pub committer: Signature,
    /// Commit message (everything after the blank separator line).
    pub message: BString,
}

impl Commit {
    /// Parse commit content from raw bytes (no object header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut parents = Vec::new();
        let mut author: Option<Signature> = None;
        let mut committer: Option<Signature> = None;

        let mut pos = 0;
        while pos < content.len() {
            if content[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = content[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| p + pos)
                .unwrap_or(content.len());
            let line = &content[pos..line_end];
            pos = line_end + 1;

            let Some(space) = line.iter().position(|&b| b == b' ') else {
                continue;
            };
            let (key, value) = (&line[..space], &line[space + 1..]);

            match key {
                b"tree" => {
                    let hex = std::str::from_utf8(value)
                        .map_err(|_| ObjectError::MissingCommitField { field: "tree" })?;
                    tree = Some(ObjectId::from_hex(hex)?);
                }
                b"parent" => {
                    let hex = std::str::from_utf8(value)
                        .map_err(|_| ObjectError::MissingCommitField { field: "parent" })?;
                    parents.push(ObjectId::from_hex(hex)?);
                }
                b"author" => author = Some(Signature::parse(value.as_bstr())?),
                b"committer" => committer = Some(Signature::parse(value.as_bstr())?),
                _ => {
                    // Unknown header; swallow its continuation lines too.
                    while pos < content.len() && content[pos] == b' ' {
                        pos = content[pos..]
                            .iter()
                            .position(|&b| b == b'\n')
                            .map(|p| p + pos + 1)
                            .unwrap_or(content.len());
                    }
                }
            }
        }

        Ok(Self {
            tree: tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?,
            parents,
            author: author.ok_or(ObjectError::MissingCommitField { field: "author" })?,
            committer: committer.ok_or(ObjectError::MissingCommitField { field: "committer" })?,
            message: BString::from(&content[pos.min(content.len())..]),
        })
    }

    /// Serialize commit content to bytes (no object header).
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');
        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// Committer timestamp in seconds since epoch.
    pub fn commit_date(&self) -> i64 {
        self.committer.date.seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
    const PARENT: &str = "95d09f2b10159347eece71399a7e2e907ea3df4f";

    fn sample(parents: &[&str]) -> Vec<u8> {
        let mut s = format!("tree {TREE}\n");
        for p in parents {
            s.push_str(&format!("parent {p}\n"));
        }
        s.push_str("author A U Thor <author@example.com> 1700000000 +0000\n");
        s.push_str("committer C O Mitter <committer@example.com> 1700000100 +0200\n");
        s.push_str("\nsubject line\n\nbody\n");
        s.into_bytes()
    }

    #[test]
    fn parse_root_commit() {
        let commit = Commit::parse(&sample(&[])).unwrap();
        assert_eq!(commit.tree.to_hex(), TREE);
        assert!(commit.parents.is_empty());
        assert_eq!(commit.commit_date(), 1700000100);
        assert_eq!(commit.message, "subject line\n\nbody\n");
    }

    #[test]
    fn parse_with_parents() {
        let commit = Commit::parse(&sample(&[PARENT, TREE])).unwrap();
        assert_eq!(commit.parents.len(), 2);
        assert_eq!(commit.parents[0].to_hex(), PARENT);
    }

    #[test]
    fn parse_skips_unknown_headers() {
        let mut raw = format!("tree {TREE}\n");
        raw.push_str("gpgsig -----BEGIN PGP SIGNATURE-----\n line2\n -----END PGP SIGNATURE-----\n");
        raw.push_str("author A <a@b> 1 +0000\n");
        raw.push_str("committer C <c@d> 2 +0000\n");
        raw.push_str("\nmsg");
        let commit = Commit::parse(raw.as_bytes()).unwrap();
        assert_eq!(commit.message, "msg");
        assert_eq!(commit.commit_date(), 2);
    }

    #[test]
    fn missing_committer_is_an_error() {
        let raw = format!("tree {TREE}\nauthor A <a@b> 1 +0000\n\nmsg");
        assert!(matches!(
            Commit::parse(raw.as_bytes()),
            Err(ObjectError::MissingCommitField { field: "committer" })
        ));
    }

    #[test]
    fn serialize_roundtrip() {
        let raw = sample(&[PARENT]);
        let commit = Commit::parse(&raw).unwrap();
        assert_eq!(commit.serialize_content(), raw);
    }
}
