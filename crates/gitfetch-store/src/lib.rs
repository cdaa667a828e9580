//! Local object store interface for the gitfetch fetch-pack client.
//!
//! Negotiation borrows objects from whatever store the caller owns; this
//! crate defines the narrow interface it consumes — object lookup and ref
//! enumeration — plus an in-memory implementation and the shallow-state
//! file, the one piece of repository state the fetch core writes itself.

mod memory;
pub mod shallow;

pub use memory::MemoryStore;
pub use shallow::ShallowFile;

use bstr::BString;
use gitfetch_hash::ObjectId;
use gitfetch_object::{Object, ObjectError, ObjectType};

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("corrupt object {oid}: {reason}")]
    Corrupt { oid: ObjectId, reason: String },

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Util(#[from] gitfetch_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The object store seam negotiation reads through.
///
/// Implementations own the objects; the fetch core only borrows parsed
/// copies for the duration of one `do_fetch_pack` call.
pub trait ObjectStore {
    /// Read and parse an object. `Ok(None)` means the object is absent,
    /// which is an ordinary condition during negotiation.
    fn read(&self, oid: &ObjectId) -> Result<Option<Object>, StoreError>;

    /// Whether the object exists locally, without parsing it.
    fn contains(&self, oid: &ObjectId) -> bool;

    /// Enumerate all local refs as `(name, target)` pairs.
    fn each_ref(&self) -> Result<Vec<(BString, ObjectId)>, StoreError>;

    /// Object kind without a full parse. The default implementation reads
    /// the object; real stores can answer from their header index.
    fn kind_of(&self, oid: &ObjectId) -> Result<Option<ObjectType>, StoreError> {
        Ok(self.read(oid)?.map(|o| o.object_type()))
    }
}

/// Follow a tag chain to the object it ultimately points at.
///
/// Returns the final `(oid, object)` or `None` when the chain leaves the
/// store (a broken repository is not fatal to negotiation).
pub fn deref_tag<S: ObjectStore + ?Sized>(
    store: &S,
    mut oid: ObjectId,
) -> Result<Option<(ObjectId, Object)>, StoreError> {
    loop {
        let Some(obj) = store.read(&oid)? else {
            return Ok(None);
        };
        match obj {
            Object::Tag(tag) => oid = tag.target,
            other => return Ok(Some((oid, other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deref_tag_follows_chains() {
        let mut store = MemoryStore::new();
        let commit = store.insert_commit(&[], 100, "tip");
        let tag = store.insert_tag(commit, ObjectType::Commit, "v1");
        let nested = store.insert_tag(tag, ObjectType::Tag, "v1-signed");

        let (oid, obj) = deref_tag(&store, nested).unwrap().unwrap();
        assert_eq!(oid, commit);
        assert_eq!(obj.object_type(), ObjectType::Commit);
    }

    #[test]
    fn deref_tag_of_missing_target() {
        let mut store = MemoryStore::new();
        let dangling = ObjectId::from([0x42; 20]);
        let tag = store.insert_tag(dangling, ObjectType::Commit, "broken");
        assert!(deref_tag(&store, tag).unwrap().is_none());
    }

    #[test]
    fn deref_non_tag_is_identity() {
        let mut store = MemoryStore::new();
        let commit = store.insert_commit(&[], 100, "tip");
        let (oid, _) = deref_tag(&store, commit).unwrap().unwrap();
        assert_eq!(oid, commit);
    }
}
