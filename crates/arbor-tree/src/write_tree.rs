//! Per-node child table, header serialization and hash aggregation.
//!
//! # Invariants
//!
//! - `hashes.len() == 2 * headers.len()` and `reported.len() == headers.len()`;
//!   all three grow together under the same lock.
//! - Child names are unique; a name once used stays used even after the
//!   child's handle is gone.
//! - Headers are never removed.
//! - Once the header blob is stored the table is frozen: no new children,
//!   no new hash reports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use arbor_crypto::{Hash128, HashAccumulator};
use arbor_store::BackingGroup;
use arbor_types::{MetaData, MetaDataDictionary, NodeHeader, PATH_SEPARATOR};
use tracing::debug;

use crate::codec::{hash_tail, write_node_header};
use crate::error::{WriteError, WriteResult};
use crate::handle::NodeHandle;
use crate::properties::{Properties, PropertyBundle, SELF_PROPERTIES_NAME};

/// How far [`NodeWriteTree::write_headers`] got. Each step is stored at
/// most once, so a failed write resumes where it stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
enum WriteStage {
    #[default]
    Open,
    HeadersStored,
    PropertiesStored,
    Done,
}

#[derive(Default)]
struct ChildTable {
    headers: Vec<Arc<NodeHeader>>,
    hashes: Vec<u64>,
    reported: Vec<bool>,
    live: HashMap<String, Weak<NodeHandle>>,
    stage: WriteStage,
}

/// Write-side state of one node.
///
/// Owned by exactly one [`NodeHandle`].
pub struct NodeWriteTree {
    group: Mutex<Option<Arc<dyn BackingGroup>>>,
    bundle: Arc<Mutex<PropertyBundle>>,
    properties: Mutex<Weak<Properties>>,
    children: Mutex<ChildTable>,
}

impl NodeWriteTree {
    /// Create the node's backing group under `parent_group` and an empty
    /// property bundle inside it. Nothing is written yet.
    pub fn new(
        parent_group: Option<&Arc<dyn BackingGroup>>,
        name: &str,
        metadata: &MetaData,
    ) -> WriteResult<Self> {
        let parent_group = parent_group.ok_or_else(|| {
            WriteError::InvalidArgument(format!("no parent group for node {name:?}"))
        })?;
        let group = parent_group.add_group(name)?;
        debug!(parent = %parent_group.full_path(), group = %group.full_path(), "node group created");

        let bundle = PropertyBundle::new(SELF_PROPERTIES_NAME, metadata.clone(), Arc::clone(&group));
        Ok(Self {
            group: Mutex::new(Some(group)),
            bundle: Arc::new(Mutex::new(bundle)),
            properties: Mutex::new(Weak::new()),
            children: Mutex::new(ChildTable::default()),
        })
    }

    fn group(&self) -> WriteResult<Arc<dyn BackingGroup>> {
        self.group
            .lock()
            .expect("group mutex poisoned")
            .clone()
            .ok_or_else(|| WriteError::InvalidState("node has no backing group".into()))
    }

    /// Path of the backing group, if the node still has one.
    pub fn group_path(&self) -> Option<String> {
        self.group
            .lock()
            .expect("group mutex poisoned")
            .as_ref()
            .map(|g| g.full_path().to_string())
    }

    /// Detach the backing group; later flushes fail with `InvalidState`.
    pub(crate) fn release_group(&self) -> Option<Arc<dyn BackingGroup>> {
        self.group.lock().expect("group mutex poisoned").take()
    }

    /// The node's property handle, shared with any caller still holding it.
    pub fn properties(&self, owner: &Arc<NodeHandle>) -> Arc<Properties> {
        let mut cached = self.properties.lock().expect("properties mutex poisoned");
        if let Some(live) = cached.upgrade() {
            return live;
        }
        let fresh = Arc::new(Properties::new(Arc::clone(owner), Arc::clone(&self.bundle)));
        *cached = Arc::downgrade(&fresh);
        fresh
    }

    pub fn child_count(&self) -> usize {
        self.children.lock().expect("children mutex poisoned").headers.len()
    }

    pub fn child_header_at(&self, index: usize) -> WriteResult<Arc<NodeHeader>> {
        let table = self.children.lock().expect("children mutex poisoned");
        table
            .headers
            .get(index)
            .cloned()
            .ok_or(WriteError::IndexOutOfRange {
                index,
                count: table.headers.len(),
            })
    }

    /// Linear scan; fan-out per node is expected to be small.
    pub fn child_header_by_name(&self, name: &str) -> Option<Arc<NodeHeader>> {
        let table = self.children.lock().expect("children mutex poisoned");
        table.headers.iter().find(|h| h.name() == name).cloned()
    }

    /// The child's handle if it was created here and is still alive.
    pub fn child(&self, name: &str) -> Option<Arc<NodeHandle>> {
        let table = self.children.lock().expect("children mutex poisoned");
        table.live.get(name).and_then(Weak::upgrade)
    }

    /// Validate `candidate`, create its backing group and handle, and
    /// register it.
    ///
    /// A node whose header blob is stored takes no more children. Name
    /// checks then run in a fixed order: duplicate name, empty name, path
    /// separator. The table is only touched after the backing group has
    /// been created, so a failure anywhere leaves it unchanged.
    pub fn create_child(
        &self,
        owner: &Arc<NodeHandle>,
        owner_full_path: &str,
        candidate: &NodeHeader,
    ) -> WriteResult<Arc<NodeHandle>> {
        let name = candidate.name();
        let mut table = self.children.lock().expect("children mutex poisoned");

        if table.stage != WriteStage::Open {
            return Err(WriteError::AlreadyFinalized(owner_full_path.to_string()));
        }
        if table.live.contains_key(name) {
            return Err(WriteError::DuplicateName {
                parent: owner_full_path.to_string(),
                name: name.to_string(),
            });
        }
        if name.is_empty() {
            return Err(WriteError::InvalidName {
                parent: owner_full_path.to_string(),
                name: String::new(),
                reason: "node name is empty",
            });
        }
        if name.contains(PATH_SEPARATOR) {
            return Err(WriteError::InvalidName {
                parent: owner_full_path.to_string(),
                name: name.to_string(),
                reason: "node name contains '/'",
            });
        }

        let header = Arc::new(NodeHeader::new(
            name,
            NodeHeader::child_path(owner_full_path, name),
            candidate.metadata().clone(),
        ));
        let group = self.group()?;
        let index = table.headers.len();
        let child = NodeHandle::new_child(Arc::clone(owner), &group, Arc::clone(&header), index)?;

        table.headers.push(header);
        table.hashes.extend_from_slice(&[0, 0]);
        table.reported.push(false);
        table.live.insert(name.to_string(), Arc::downgrade(&child));

        debug!(path = %child.full_path(), index, "child created");
        Ok(child)
    }

    /// Record the hash reported by the child at `index`.
    pub fn fill_hash(&self, index: usize, h0: u64, h1: u64) -> WriteResult<()> {
        let mut table = self.children.lock().expect("children mutex poisoned");
        let count = table.headers.len();
        if index >= count || index * 2 + 1 >= table.hashes.len() {
            return Err(WriteError::IndexOutOfRange { index, count });
        }
        if table.stage != WriteStage::Open {
            return Err(WriteError::AlreadyFinalized(self.group_path().unwrap_or_default()));
        }
        table.hashes[index * 2] = h0;
        table.hashes[index * 2 + 1] = h1;
        table.reported[index] = true;
        Ok(())
    }

    /// Serialize child headers, aggregate the node hash into `acc`, write
    /// the header blob, then the property headers.
    ///
    /// `acc` is reset first. On return it holds the node's aggregate hash:
    /// the child hash vector (if any) followed by the 32-byte tail of data
    /// hash and children hash.
    ///
    /// If a store write fails the call can be repeated; blobs already
    /// stored are not written again and the hash comes out the same.
    pub fn write_headers(
        &self,
        dictionary: &mut MetaDataDictionary,
        acc: &mut HashAccumulator,
    ) -> WriteResult<()> {
        self.write_blobs(dictionary, acc, false)
    }

    /// [`write_headers`](Self::write_headers) for the root of a tree: also
    /// stores the metadata dictionary, which every header below refers to,
    /// as the last blob of the root's group. An empty dictionary is not
    /// written.
    pub fn write_root_headers(
        &self,
        dictionary: &mut MetaDataDictionary,
        acc: &mut HashAccumulator,
    ) -> WriteResult<()> {
        self.write_blobs(dictionary, acc, true)
    }

    fn write_blobs(
        &self,
        dictionary: &mut MetaDataDictionary,
        acc: &mut HashAccumulator,
        with_dictionary: bool,
    ) -> WriteResult<()> {
        let group = self.group()?;
        // Bundle before table; held until the end so the stored data hash
        // matches what gets sealed.
        let mut bundle = self.bundle.lock().expect("bundle mutex poisoned");
        let mut table = self.children.lock().expect("children mutex poisoned");

        if table.stage == WriteStage::Done {
            return Err(WriteError::AlreadyFinalized(group.full_path().to_string()));
        }
        if table.hashes.len() != table.headers.len() * 2 {
            return Err(WriteError::IndexOutOfRange {
                index: table.hashes.len() / 2,
                count: table.headers.len(),
            });
        }
        if let Some(index) = table.reported.iter().position(|r| !r) {
            return Err(WriteError::PendingChildHash {
                parent: group.full_path().to_string(),
                index,
                name: table.headers[index].name().to_string(),
            });
        }
        let stage = table.stage;

        let mut data = Vec::new();
        for header in &table.headers {
            write_node_header(&mut data, header, dictionary);
        }

        let data_hash = {
            let mut bundle_acc = HashAccumulator::new();
            bundle.compute_hash(&mut bundle_acc);
            bundle_acc.finish()
        };

        acc.reset();
        let children_hash = if table.hashes.is_empty() {
            Hash128::ZERO
        } else {
            acc.update_words(&table.hashes);
            acc.finish()
        };

        let tail = hash_tail(data_hash, children_hash);
        data.extend_from_slice(&tail);
        acc.update(&tail);

        // The table stays locked until the header blob is stored, so no
        // child can slip in after its hash was taken.
        if stage < WriteStage::HeadersStored {
            let blob = group.add_data(&data)?;
            bundle.seal();
            table.stage = WriteStage::HeadersStored;
            debug!(group = %group.full_path(), blob = %blob.short_hex(), len = data.len(), "node headers written");
        }
        drop(table);

        if stage < WriteStage::PropertiesStored {
            bundle.write_property_headers(dictionary)?;
            self.set_stage(WriteStage::PropertiesStored);
        }
        if with_dictionary && !dictionary.is_empty() {
            let blob = group.add_data(&dictionary.serialize())?;
            debug!(group = %group.full_path(), blob = %blob.short_hex(), entries = dictionary.len(), "metadata dictionary written");
        }
        self.set_stage(WriteStage::Done);
        Ok(())
    }

    fn set_stage(&self, stage: WriteStage) {
        self.children.lock().expect("children mutex poisoned").stage = stage;
    }

    /// Whether every blob of [`write_headers`](Self::write_headers) has been
    /// stored.
    pub fn headers_written(&self) -> bool {
        self.children.lock().expect("children mutex poisoned").stage == WriteStage::Done
    }

    /// Flush the backing group. Safe to repeat.
    pub fn write_to_disk(&self) -> WriteResult<()> {
        let group = self.group()?;
        group.write_to_disk()?;
        debug!(group = %group.full_path(), "node flushed");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn hash_words(&self) -> Vec<u64> {
        self.children.lock().expect("children mutex poisoned").hashes.clone()
    }
}

impl std::fmt::Debug for NodeWriteTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeWriteTree")
            .field("group", &self.group_path())
            .field("children", &self.child_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use arbor_store::{InMemoryObjectStore, StoreError, StoreGroup, StoreResult};
    use arbor_types::ObjectId;
    use proptest::prelude::*;

    use crate::codec::HASH_TAIL_LEN;

    const ROOT_NAME: &str = "ABC";

    fn root() -> (Arc<StoreGroup>, Arc<NodeHandle>) {
        let store_root = StoreGroup::root(Arc::new(InMemoryObjectStore::new()));
        let group: Arc<dyn BackingGroup> = store_root.clone();
        let node = NodeHandle::root(Some(group), ROOT_NAME, MetaData::new()).unwrap();
        (store_root, node)
    }

    fn node_group(store_root: &StoreGroup) -> Arc<StoreGroup> {
        store_root.child_group(ROOT_NAME).expect("root node group")
    }

    /// Fails the `fail_on`-th `add_data` (counted across all sub-groups)
    /// once with `ReadOnly`.
    #[derive(Debug)]
    struct FlakyGroup {
        inner: Arc<dyn BackingGroup>,
        calls: Arc<AtomicUsize>,
        fail_on: usize,
    }

    impl BackingGroup for FlakyGroup {
        fn full_path(&self) -> &str {
            self.inner.full_path()
        }

        fn add_group(&self, name: &str) -> StoreResult<Arc<dyn BackingGroup>> {
            Ok(Arc::new(FlakyGroup {
                inner: self.inner.add_group(name)?,
                calls: Arc::clone(&self.calls),
                fail_on: self.fail_on,
            }))
        }

        fn add_data(&self, data: &[u8]) -> StoreResult<ObjectId> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
                return Err(StoreError::ReadOnly);
            }
            self.inner.add_data(data)
        }

        fn write_to_disk(&self) -> StoreResult<()> {
            self.inner.write_to_disk()
        }
    }

    fn flaky_root(fail_on: usize) -> (Arc<StoreGroup>, Arc<NodeHandle>) {
        let store_root = StoreGroup::root(Arc::new(InMemoryObjectStore::new()));
        let flaky: Arc<dyn BackingGroup> = Arc::new(FlakyGroup {
            inner: store_root.clone(),
            calls: Arc::new(AtomicUsize::new(0)),
            fail_on,
        });
        let node = NodeHandle::root(Some(flaky), ROOT_NAME, MetaData::new()).unwrap();
        (store_root, node)
    }

    #[test]
    fn construction_requires_parent_group() {
        let err = NodeWriteTree::new(None, "orphan", &MetaData::new()).unwrap_err();
        assert!(matches!(err, WriteError::InvalidArgument(_)));
    }

    #[test]
    fn construction_surfaces_store_errors() {
        let read_only: Arc<dyn BackingGroup> =
            StoreGroup::root(Arc::new(InMemoryObjectStore::read_only()));
        let err = NodeWriteTree::new(Some(&read_only), "geo", &MetaData::new()).unwrap_err();
        assert!(matches!(err, WriteError::Store(_)));
    }

    #[test]
    fn create_child_under_root() {
        let (_store, root) = root();
        let _geo = root.create_child("geo", MetaData::new()).unwrap();
        assert_eq!(root.child_count(), 1);
        assert_eq!(root.child_header_at(0).unwrap().full_path(), "/geo");
        assert_eq!(root.tree().hash_words(), vec![0, 0]);
    }

    #[test]
    fn grandchild_path() {
        let (_store, root) = root();
        let geo = root.create_child("geo", MetaData::new()).unwrap();
        let mesh = geo.create_child("mesh", MetaData::new()).unwrap();
        assert_eq!(mesh.full_path(), "/geo/mesh");
    }

    #[test]
    fn duplicate_name_leaves_table_unchanged() {
        let (_store, root) = root();
        let _geo = root.create_child("geo", MetaData::new()).unwrap();
        let err = root.create_child("geo", MetaData::new()).unwrap_err();
        assert!(matches!(err, WriteError::DuplicateName { .. }));
        assert_eq!(root.child_count(), 1);
        assert_eq!(root.tree().hash_words().len(), 2);
    }

    #[test]
    fn duplicate_is_checked_after_child_is_gone() {
        let (_store, root) = root();
        drop(root.create_child("geo", MetaData::new()).unwrap());
        assert!(matches!(
            root.create_child("geo", MetaData::new()),
            Err(WriteError::DuplicateName { .. })
        ));
    }

    #[test]
    fn invalid_names() {
        let (_store, root) = root();
        for bad in ["", "a/b", "/"] {
            let err = root.create_child(bad, MetaData::new()).unwrap_err();
            assert!(matches!(err, WriteError::InvalidName { .. }), "{bad:?}");
        }
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn header_index_out_of_range() {
        let (_store, root) = root();
        assert!(matches!(
            root.child_header_at(0),
            Err(WriteError::IndexOutOfRange { index: 0, count: 0 })
        ));
    }

    #[test]
    fn metadata_is_copied_into_header() {
        let (_store, root) = root();
        let md = MetaData::new().with("schema", "Xform").unwrap();
        let _xf = root.create_child("xf", md.clone()).unwrap();
        let header = root.child_header_by_name("xf").unwrap();
        assert_eq!(header.metadata(), &md);
        assert!(root.child_header_by_name("missing").is_none());
    }

    #[test]
    fn live_child_lookup_is_independent_of_header() {
        let (_store, root) = root();
        assert!(root.child("geo").is_none());

        let geo = root.create_child("geo", MetaData::new()).unwrap();
        assert!(Arc::ptr_eq(&root.child("geo").unwrap(), &geo));

        drop(geo);
        assert!(root.child("geo").is_none());
        assert!(root.child_header_by_name("geo").is_some());
    }

    #[test]
    fn properties_handle_is_shared_while_alive() {
        let (_store, root) = root();
        let first = root.properties();
        let second = root.properties();
        assert!(Arc::ptr_eq(&first, &second));

        first.set("visible", crate::PropertyValue::Bool(true)).unwrap();
        drop(first);
        drop(second);

        let third = root.properties();
        assert_eq!(third.get("visible"), Some(crate::PropertyValue::Bool(true)));
        assert_eq!(third.owner_path(), "/");
    }

    #[test]
    fn fill_hash_bounds() {
        let (_store, root) = root();
        let _a = root.create_child("a", MetaData::new()).unwrap();
        assert!(matches!(
            root.tree().fill_hash(1, 0, 0),
            Err(WriteError::IndexOutOfRange { index: 1, count: 1 })
        ));
        root.tree().fill_hash(0, 7, 8).unwrap();
        assert_eq!(root.tree().hash_words(), vec![7, 8]);
    }

    #[test]
    fn children_hash_covers_reported_words() {
        let (store_root, root) = root();
        let _a = root.create_child("a", MetaData::new()).unwrap();
        let _b = root.create_child("b", MetaData::new()).unwrap();
        root.tree().fill_hash(0, 1, 2).unwrap();
        root.tree().fill_hash(1, 3, 4).unwrap();

        let mut dict = MetaDataDictionary::new();
        let mut acc = HashAccumulator::new();
        root.tree().write_headers(&mut dict, &mut acc).unwrap();

        let blobs = node_group(&store_root).blobs().unwrap();
        assert_eq!(blobs.len(), 1);
        let blob = &blobs[0];
        let headers = [1, 0, 0, 0, b'a', 0, 1, 0, 0, 0, b'b', 0];
        assert_eq!(&blob[..headers.len()], &headers);
        assert_eq!(blob.len(), headers.len() + HASH_TAIL_LEN);

        let tail = &blob[headers.len()..];
        let children_hash = HashAccumulator::hash_words(&[1, 2, 3, 4]);
        assert_eq!(&tail[16..], &children_hash.to_bytes());

        let mut expected = HashAccumulator::new();
        expected.update_words(&[1, 2, 3, 4]);
        expected.update(tail);
        assert_eq!(acc.finish(), expected.finish());
    }

    #[test]
    fn leaf_writes_only_the_hash_tail() {
        let (store_root, root) = root();
        let mut acc = HashAccumulator::new();
        root.tree()
            .write_headers(&mut MetaDataDictionary::new(), &mut acc)
            .unwrap();

        let blobs = node_group(&store_root).blobs().unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].len(), HASH_TAIL_LEN);
        assert_eq!(&blobs[0][16..], &[0u8; 16]);
        assert_eq!(&blobs[0][..16], &HashAccumulator::new().finish().to_bytes());
        assert_eq!(acc.bytes_fed(), HASH_TAIL_LEN as u64);
    }

    #[test]
    fn write_headers_refuses_unreported_children() {
        let (store_root, root) = root();
        let _a = root.create_child("a", MetaData::new()).unwrap();
        let _b = root.create_child("b", MetaData::new()).unwrap();
        root.tree().fill_hash(0, 1, 2).unwrap();

        let err = root
            .tree()
            .write_headers(&mut MetaDataDictionary::new(), &mut HashAccumulator::new())
            .unwrap_err();
        assert!(matches!(err, WriteError::PendingChildHash { index: 1, .. }));
        assert!(node_group(&store_root).blob_ids().is_empty());
    }

    #[test]
    fn write_headers_runs_once() {
        let (store_root, root) = root();
        let mut dict = MetaDataDictionary::new();
        root.tree()
            .write_headers(&mut dict, &mut HashAccumulator::new())
            .unwrap();
        assert!(root.tree().headers_written());
        assert!(matches!(
            root.tree().write_headers(&mut dict, &mut HashAccumulator::new()),
            Err(WriteError::AlreadyFinalized(_))
        ));
        assert_eq!(node_group(&store_root).blob_ids().len(), 1);
    }

    #[test]
    fn write_headers_is_deterministic() {
        let run = || {
            let (store_root, root) = root();
            let md = MetaData::new().with("kind", "dir").unwrap();
            let _a = root.create_child("a", md.clone()).unwrap();
            let _b = root.create_child("b", md).unwrap();
            root.properties().set("n", crate::PropertyValue::Int(3)).unwrap();
            root.tree().fill_hash(0, 10, 11).unwrap();
            root.tree().fill_hash(1, 12, 13).unwrap();
            let mut acc = HashAccumulator::new();
            root.tree()
                .write_headers(&mut MetaDataDictionary::new(), &mut acc)
                .unwrap();
            (node_group(&store_root).blobs().unwrap(), acc.finish())
        };
        let (blobs1, hash1) = run();
        let (blobs2, hash2) = run();
        assert_eq!(blobs1, blobs2);
        assert_eq!(hash1, hash2);
        assert_eq!(blobs1.len(), 2);
    }

    #[test]
    fn create_child_after_finalize_is_rejected() {
        let (store_root, root) = root();
        let hash = root.finalize().unwrap();
        assert!(matches!(
            root.create_child("late", MetaData::new()),
            Err(WriteError::AlreadyFinalized(_))
        ));
        assert_eq!(root.child_count(), 0);
        assert!(node_group(&store_root).child_group("late").is_none());
        assert_eq!(root.hash(), Some(hash));
    }

    #[test]
    fn fill_hash_after_headers_is_rejected() {
        let (_store, root) = root();
        drop(root.create_child("a", MetaData::new()).unwrap());
        let words = root.tree().hash_words();
        root.finalize().unwrap();
        assert!(matches!(
            root.tree().fill_hash(0, 1, 2),
            Err(WriteError::AlreadyFinalized(_))
        ));
        assert_eq!(root.tree().hash_words(), words);
    }

    #[test]
    fn failed_property_write_can_be_retried() {
        let expected = {
            let (_store, root) = root();
            root.properties().set("n", crate::PropertyValue::Int(3)).unwrap();
            root.finalize().unwrap()
        };

        // call 0 stores the header blob, call 1 (properties) fails
        let (store_root, root) = flaky_root(1);
        root.properties().set("n", crate::PropertyValue::Int(3)).unwrap();
        assert!(matches!(
            root.finalize(),
            Err(WriteError::Store(StoreError::ReadOnly))
        ));
        assert!(root.hash().is_none());
        assert!(!root.is_finalized());
        assert!(matches!(
            root.create_child("late", MetaData::new()),
            Err(WriteError::AlreadyFinalized(_))
        ));
        assert!(matches!(
            root.properties().set("late", crate::PropertyValue::Int(4)),
            Err(WriteError::AlreadyFinalized(_))
        ));

        let hash = root.finalize().unwrap();
        assert_eq!(hash, expected);
        assert!(root.is_finalized());
        assert_eq!(node_group(&store_root).blob_ids().len(), 2);
    }

    #[test]
    fn failed_header_write_can_be_retried() {
        let (store_root, root) = flaky_root(0);
        assert!(matches!(root.finalize(), Err(WriteError::Store(_))));
        assert!(node_group(&store_root).blob_ids().is_empty());

        // nothing was stored, so the node is still open
        root.properties().set("n", crate::PropertyValue::Int(3)).unwrap();
        root.finalize().unwrap();
        assert_eq!(node_group(&store_root).blob_ids().len(), 2);
    }

    #[test]
    fn child_reports_after_its_own_retry() {
        // call 0 is the child's header blob
        let (_store, root) = flaky_root(0);
        let child = root.create_child("geo", MetaData::new()).unwrap();
        assert!(child.finalize().is_err());
        assert!(matches!(
            root.finalize(),
            Err(WriteError::PendingChildHash { index: 0, .. })
        ));
        child.finalize().unwrap();
        root.finalize().unwrap();
    }

    #[test]
    fn write_to_disk_is_idempotent() {
        let (store_root, root) = root();
        root.write_to_disk().unwrap();
        let first = node_group(&store_root).last_flush();
        root.write_to_disk().unwrap();
        assert!(first.is_some());
        assert_eq!(node_group(&store_root).last_flush(), first);
    }

    #[test]
    fn write_to_disk_after_release_is_invalid_state() {
        let (_store, root) = root();
        assert!(root.tree().release_group().is_some());
        assert!(matches!(
            root.write_to_disk(),
            Err(WriteError::InvalidState(_))
        ));
        assert!(matches!(
            root.create_child("late", MetaData::new()),
            Err(WriteError::InvalidState(_))
        ));
    }

    proptest! {
        #[test]
        fn tables_stay_in_step(names in proptest::collection::vec("[a-c/]{0,2}", 0..24)) {
            let (_store, root) = root();
            let mut seen = std::collections::HashSet::new();
            let mut alive = Vec::new();
            for name in &names {
                let before = root.child_count();
                match root.create_child(name, MetaData::new()) {
                    Ok(child) => {
                        prop_assert!(!name.is_empty() && !name.contains('/'));
                        prop_assert!(seen.insert(name.clone()));
                        prop_assert_eq!(root.child_count(), before + 1);
                        alive.push(child);
                    }
                    Err(WriteError::DuplicateName { .. }) => {
                        prop_assert!(seen.contains(name));
                        prop_assert_eq!(root.child_count(), before);
                    }
                    Err(WriteError::InvalidName { .. }) => {
                        prop_assert!(name.is_empty() || name.contains('/'));
                        prop_assert_eq!(root.child_count(), before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                }
                prop_assert_eq!(root.tree().hash_words().len(), 2 * root.child_count());
            }
        }
    }
}
