use std::collections::{BTreeMap, HashMap};

use bstr::BString;
use gitfetch_hash::hasher::Hasher;
use gitfetch_hash::ObjectId;
use gitfetch_object::{Commit, GitDate, Object, ObjectType, Signature, Tag};

use crate::{ObjectStore, StoreError};

/// An in-memory object store with real content addresses.
///
/// Objects are keyed by the SHA-1 of their canonical serialization, so OIDs
/// produced here are indistinguishable from ones a disk store would compute.
/// Serves as the workspace's test double and as the simplest real store.
#[derive(Default)]
pub struct MemoryStore {
    objects: HashMap<ObjectId, Object>,
    refs: BTreeMap<BString, ObjectId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object, returning its computed address.
    pub fn insert(&mut self, object: Object) -> ObjectId {
        let content = object.serialize_content();
        let oid = Hasher::hash_object(object.object_type().as_str(), &content);
        self.objects.insert(oid, object);
        oid
    }

    /// Build and insert a commit with the given parents and committer date.
    pub fn insert_commit(&mut self, parents: &[ObjectId], date: i64, message: &str) -> ObjectId {
        let sig = |seconds| Signature {
            name: BString::from("A U Thor"),
            email: BString::from("author@example.com"),
            date: GitDate { seconds, tz_offset: 0 },
        };
        self.insert(Object::Commit(Commit {
            tree: ObjectId::NULL,
            parents: parents.to_vec(),
            author: sig(date),
            committer: sig(date),
            message: BString::from(message),
        }))
    }

    /// Build and insert an annotated tag pointing at `target`.
    pub fn insert_tag(
        &mut self,
        target: ObjectId,
        target_type: ObjectType,
        name: &str,
    ) -> ObjectId {
        self.insert(Object::Tag(Tag {
            target,
            target_type,
            tag_name: BString::from(name),
            tagger: None,
            message: BString::from(""),
        }))
    }

    /// Point a ref at an object.
    pub fn set_ref(&mut self, name: &str, oid: ObjectId) {
        self.refs.insert(BString::from(name), oid);
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for MemoryStore {
    fn read(&self, oid: &ObjectId) -> Result<Option<Object>, StoreError> {
        Ok(self.objects.get(oid).cloned())
    }

    fn contains(&self, oid: &ObjectId) -> bool {
        self.objects.contains_key(oid)
    }

    fn each_ref(&self) -> Result<Vec<(BString, ObjectId)>, StoreError> {
        Ok(self
            .refs
            .iter()
            .map(|(name, oid)| (name.clone(), *oid))
            .collect())
    }

    fn kind_of(&self, oid: &ObjectId) -> Result<Option<ObjectType>, StoreError> {
        Ok(self.objects.get(oid).map(|o| o.object_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_addresses_are_content_derived() {
        let mut a = MemoryStore::new();
        let mut b = MemoryStore::new();
        let oid_a = a.insert_commit(&[], 1700000000, "same");
        let oid_b = b.insert_commit(&[], 1700000000, "same");
        assert_eq!(oid_a, oid_b);

        let oid_c = b.insert_commit(&[], 1700000001, "same");
        assert_ne!(oid_a, oid_c);
    }

    #[test]
    fn read_parses_back() {
        let mut store = MemoryStore::new();
        let parent = store.insert_commit(&[], 100, "root");
        let tip = store.insert_commit(&[parent], 200, "tip");

        let obj = store.read(&tip).unwrap().unwrap();
        let commit = obj.as_commit().unwrap();
        assert_eq!(commit.parents, vec![parent]);
        assert_eq!(commit.commit_date(), 200);
    }

    #[test]
    fn refs_enumerate_in_name_order() {
        let mut store = MemoryStore::new();
        let c = store.insert_commit(&[], 100, "c");
        store.set_ref("refs/tags/v1", c);
        store.set_ref("refs/heads/main", c);

        let refs = store.each_ref().unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].0, "refs/heads/main");
        assert_eq!(refs[1].0, "refs/tags/v1");
    }

    #[test]
    fn missing_object_reads_none() {
        let store = MemoryStore::new();
        assert!(store.read(&ObjectId::from([9; 20])).unwrap().is_none());
        assert!(!store.contains(&ObjectId::from([9; 20])));
    }
}
