//! Content hashing for object stores.

use sha1::{Digest, Sha1};

use crate::ObjectId;

/// Streaming SHA-1 computation producing an [`ObjectId`].
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize into an ObjectId.
    pub fn finalize(self) -> ObjectId {
        let digest = self.inner.finalize();
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&digest);
        ObjectId::from(raw)
    }

    /// Hash a git object: `"{type} {len}\0{content}"`.
    pub fn hash_object(obj_type: &str, data: &[u8]) -> ObjectId {
        let mut h = Self::new();
        h.update(format!("{} {}\0", obj_type, data.len()).as_bytes());
        h.update(data);
        h.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_oid() {
        // Well-known address of the empty blob.
        let oid = Hasher::hash_object("blob", b"");
        assert_eq!(oid.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn hello_blob_oid() {
        // `echo 'hello world' | git hash-object --stdin`
        let oid = Hasher::hash_object("blob", b"hello world\n");
        assert_eq!(oid.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut h = Hasher::new();
        h.update(b"blob 4\0");
        h.update(b"abcd");
        let incremental = h.finalize();
        assert_eq!(incremental, Hasher::hash_object("blob", b"abcd"));
    }
}
