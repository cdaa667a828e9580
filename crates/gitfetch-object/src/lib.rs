//! Object model for the gitfetch fetch-pack client.
//!
//! Negotiation reads exactly two object kinds: commits (committer date and
//! parents drive the walk) and annotated tags (dereferenced to the objects
//! they point at). Trees and blobs are carried as raw bytes; nothing here
//! looks inside them.

pub mod cache;
mod commit;
mod signature;
mod tag;

pub use cache::CommitCache;
pub use commit::Commit;
pub use signature::{GitDate, Signature};
pub use tag::Tag;

use bstr::BString;
use gitfetch_hash::HashError;

/// Errors produced by object parsing.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object type: {0}")]
    InvalidType(BString),

    #[error("invalid commit: missing '{field}' header")]
    MissingCommitField { field: &'static str },

    #[error("invalid tag: missing '{field}' header")]
    MissingTagField { field: &'static str },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The four kinds of git objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    /// The type name as it appears in object headers and tag `type` lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
            ObjectType::Tag => "tag",
        }
    }

    /// Parse a type name.
    pub fn from_bytes(name: &[u8]) -> Result<Self, ObjectError> {
        match name {
            b"blob" => Ok(ObjectType::Blob),
            b"tree" => Ok(ObjectType::Tree),
            b"commit" => Ok(ObjectType::Commit),
            b"tag" => Ok(ObjectType::Tag),
            other => Err(ObjectError::InvalidType(BString::from(other))),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Commit(Commit),
    Tag(Tag),
    /// Raw tree bytes; never inspected by negotiation.
    Tree(Vec<u8>),
    /// Raw blob bytes; never inspected by negotiation.
    Blob(Vec<u8>),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Commit(_) => ObjectType::Commit,
            Object::Tag(_) => ObjectType::Tag,
            Object::Tree(_) => ObjectType::Tree,
            Object::Blob(_) => ObjectType::Blob,
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Object::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Object::Tag(t) => Some(t),
            _ => None,
        }
    }

    /// Serialize the content bytes (no object header).
    pub fn serialize_content(&self) -> Vec<u8> {
        match self {
            Object::Commit(c) => c.serialize_content(),
            Object::Tag(t) => t.serialize_content(),
            Object::Tree(raw) => raw.clone(),
            Object::Blob(raw) => raw.clone(),
        }
    }
}
