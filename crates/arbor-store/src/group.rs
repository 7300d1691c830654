//! Hierarchical groups of blobs layered over an [`ObjectStore`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arbor_types::{NodeHeader, ObjectId, PATH_SEPARATOR, ROOT_PATH};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, EntryKind, Tree, TreeEntry};
use crate::traits::ObjectStore;

/// An append-only container of named sub-groups and binary blobs.
///
/// This is the only view of the backing store that node writers get.
pub trait BackingGroup: Send + Sync + fmt::Debug {
    /// Human-readable path of this group, for diagnostics.
    fn full_path(&self) -> &str;

    /// Create a named sub-group.
    fn add_group(&self, name: &str) -> StoreResult<Arc<dyn BackingGroup>>;

    /// Append a blob and return its id.
    fn add_data(&self, data: &[u8]) -> StoreResult<ObjectId>;

    /// Commit this group and everything below it. Idempotent.
    fn write_to_disk(&self) -> StoreResult<()>;
}

enum GroupChild {
    Data(ObjectId),
    Group(Arc<StoreGroup>),
}

#[derive(Default)]
struct GroupState {
    children: Vec<GroupChild>,
    last_flush: Option<ObjectId>,
    /// Revision the last flush was taken at.
    flushed_at: u64,
}

/// Change counter of one group, linked to its ancestors'. A change anywhere
/// in a subtree bumps every group on the path to the top.
#[derive(Default)]
struct Revision {
    count: AtomicU64,
    parent: Option<Arc<Revision>>,
}

impl Revision {
    fn bump(&self) {
        let mut next = Some(self);
        while let Some(rev) = next {
            rev.count.fetch_add(1, Ordering::SeqCst);
            next = rev.parent.as_deref();
        }
    }

    fn current(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

/// [`BackingGroup`] that stores blobs and flushed listings in an
/// [`ObjectStore`].
///
/// Flushing writes every sub-group's tree before the group's own tree, so
/// the tree id returned for the top group transitively pins everything
/// appended below it. A group with no changes in its subtree since its last
/// flush returns the previous tree id without touching the store.
pub struct StoreGroup {
    store: Arc<dyn ObjectStore>,
    full_path: String,
    revision: Arc<Revision>,
    state: Mutex<GroupState>,
}

impl StoreGroup {
    /// The top-level group of `store`.
    pub fn root(store: Arc<dyn ObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            full_path: ROOT_PATH.to_string(),
            revision: Arc::new(Revision::default()),
            state: Mutex::new(GroupState::default()),
        })
    }

    /// Typed variant of [`BackingGroup::add_group`].
    pub fn add_store_group(&self, name: &str) -> StoreResult<Arc<StoreGroup>> {
        if name.is_empty() || name.contains(PATH_SEPARATOR) {
            return Err(StoreError::InvalidName {
                parent: self.full_path.clone(),
                name: name.to_string(),
            });
        }
        if !self.store.is_writable() {
            return Err(StoreError::ReadOnly);
        }
        let mut state = self.state.lock().expect("group mutex poisoned");
        if state
            .children
            .iter()
            .any(|c| matches!(c, GroupChild::Group(g) if g.name() == name))
        {
            return Err(StoreError::DuplicateGroup {
                parent: self.full_path.clone(),
                name: name.to_string(),
            });
        }
        let group = Arc::new(Self {
            store: Arc::clone(&self.store),
            full_path: NodeHeader::child_path(&self.full_path, name),
            revision: Arc::new(Revision {
                count: AtomicU64::new(0),
                parent: Some(Arc::clone(&self.revision)),
            }),
            state: Mutex::new(GroupState::default()),
        });
        state.children.push(GroupChild::Group(Arc::clone(&group)));
        drop(state);
        self.revision.bump();
        debug!(path = %group.full_path, "group created");
        Ok(group)
    }

    /// Last path component (empty for the root).
    pub fn name(&self) -> &str {
        self.full_path
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or_default()
    }

    /// Sub-group by name.
    pub fn child_group(&self, name: &str) -> Option<Arc<StoreGroup>> {
        let state = self.state.lock().expect("group mutex poisoned");
        state.children.iter().find_map(|c| match c {
            GroupChild::Group(g) if g.name() == name => Some(Arc::clone(g)),
            _ => None,
        })
    }

    /// Ids of the blobs appended to this group, in append order.
    pub fn blob_ids(&self) -> Vec<ObjectId> {
        let state = self.state.lock().expect("group mutex poisoned");
        state
            .children
            .iter()
            .filter_map(|c| match c {
                GroupChild::Data(id) => Some(*id),
                GroupChild::Group(_) => None,
            })
            .collect()
    }

    /// Contents of the blobs appended to this group, in append order.
    pub fn blobs(&self) -> StoreResult<Vec<Vec<u8>>> {
        self.blob_ids()
            .iter()
            .map(|id| -> StoreResult<Vec<u8>> {
                Ok(Blob::from_stored_object(&self.store.read_required(id)?)?.data)
            })
            .collect()
    }

    /// Tree id written by the most recent flush.
    pub fn last_flush(&self) -> Option<ObjectId> {
        self.state.lock().expect("group mutex poisoned").last_flush
    }

    /// Flush sub-groups, then write this group's tree and return its id.
    pub fn flush(&self) -> StoreResult<ObjectId> {
        let revision = self.revision.current();
        let snapshot: Vec<(EntryKind, String, Option<Arc<StoreGroup>>, ObjectId)> = {
            let state = self.state.lock().expect("group mutex poisoned");
            if let Some(id) = state.last_flush.filter(|_| state.flushed_at == revision) {
                return Ok(id);
            }
            let mut blob_index = 0usize;
            state
                .children
                .iter()
                .map(|c| match c {
                    GroupChild::Data(id) => {
                        let name = format!("data-{blob_index:04}");
                        blob_index += 1;
                        (EntryKind::Data, name, None, *id)
                    }
                    GroupChild::Group(g) => (
                        EntryKind::Group,
                        g.name().to_string(),
                        Some(Arc::clone(g)),
                        ObjectId::null(),
                    ),
                })
                .collect()
        };

        let mut entries = Vec::with_capacity(snapshot.len());
        for (kind, name, group, id) in snapshot {
            let object_id = match group {
                Some(g) => g.flush()?,
                None => id,
            };
            entries.push(TreeEntry::new(kind, name, object_id));
        }

        let tree_id = self.store.write(&Tree::new(entries).to_stored_object()?)?;
        {
            let mut state = self.state.lock().expect("group mutex poisoned");
            state.last_flush = Some(tree_id);
            state.flushed_at = revision;
        }
        debug!(path = %self.full_path, tree = %tree_id.short_hex(), "group flushed");
        Ok(tree_id)
    }
}

impl BackingGroup for StoreGroup {
    fn full_path(&self) -> &str {
        &self.full_path
    }

    fn add_group(&self, name: &str) -> StoreResult<Arc<dyn BackingGroup>> {
        let group: Arc<dyn BackingGroup> = self.add_store_group(name)?;
        Ok(group)
    }

    fn add_data(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let id = self.store.write(&Blob::new(data.to_vec()).to_stored_object())?;
        self.state
            .lock()
            .expect("group mutex poisoned")
            .children
            .push(GroupChild::Data(id));
        self.revision.bump();
        debug!(path = %self.full_path, blob = %id.short_hex(), len = data.len(), "blob appended");
        Ok(id)
    }

    fn write_to_disk(&self) -> StoreResult<()> {
        self.flush().map(|_| ())
    }
}

impl fmt::Debug for StoreGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().expect("group mutex poisoned");
        f.debug_struct("StoreGroup")
            .field("full_path", &self.full_path)
            .field("children", &state.children.len())
            .field("last_flush", &state.last_flush)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::memory::InMemoryObjectStore;
    use crate::object::{ObjectKind, StoredObject};

    fn root() -> (Arc<InMemoryObjectStore>, Arc<StoreGroup>) {
        let store = Arc::new(InMemoryObjectStore::new());
        let group = StoreGroup::root(store.clone());
        (store, group)
    }

    #[test]
    fn sub_group_paths() {
        let (_store, root) = root();
        let geo = root.add_store_group("geo").unwrap();
        let mesh = geo.add_group("mesh").unwrap();
        assert_eq!(root.full_path(), "/");
        assert_eq!(geo.full_path(), "/geo");
        assert_eq!(mesh.full_path(), "/geo/mesh");
        assert_eq!(geo.name(), "geo");
        assert!(root.child_group("geo").is_some());
        assert!(root.child_group("mesh").is_none());
    }

    #[test]
    fn rejects_bad_and_duplicate_names() {
        let (_store, root) = root();
        assert!(matches!(
            root.add_group(""),
            Err(StoreError::InvalidName { .. })
        ));
        assert!(matches!(
            root.add_group("a/b"),
            Err(StoreError::InvalidName { .. })
        ));
        root.add_group("geo").unwrap();
        assert!(matches!(
            root.add_group("geo"),
            Err(StoreError::DuplicateGroup { .. })
        ));
    }

    #[test]
    fn read_only_store_rejects_groups_and_blobs() {
        let root = StoreGroup::root(Arc::new(InMemoryObjectStore::read_only()));
        assert!(matches!(root.add_group("geo"), Err(StoreError::ReadOnly)));
        assert!(matches!(root.add_data(b"x"), Err(StoreError::ReadOnly)));
        assert!(root.blob_ids().is_empty());
    }

    #[test]
    fn blobs_keep_append_order() {
        let (_store, root) = root();
        root.add_data(b"first").unwrap();
        root.add_data(b"second").unwrap();
        assert_eq!(root.blobs().unwrap(), vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn flush_writes_children_first() {
        let (store, root) = root();
        let geo = root.add_store_group("geo").unwrap();
        geo.add_data(b"payload").unwrap();
        let root_tree = root.flush().unwrap();

        let geo_tree = geo.last_flush().expect("child flushed");
        let tree = Tree::from_stored_object(&store.read_required(&root_tree).unwrap()).unwrap();
        assert_eq!(tree.group("geo").unwrap().object_id, geo_tree);
        let geo_listing =
            Tree::from_stored_object(&store.read_required(&geo_tree).unwrap()).unwrap();
        assert_eq!(geo_listing.blobs().next().unwrap().name, "data-0000");
    }

    /// Counts writes reaching the underlying store.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryObjectStore,
        writes: AtomicUsize,
    }

    impl ObjectStore for CountingStore {
        fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
            self.inner.read(id)
        }

        fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.write(object)
        }

        fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
            self.inner.exists(id)
        }
    }

    #[test]
    fn flush_skips_unchanged_subtrees() {
        let store = Arc::new(CountingStore::default());
        let root = StoreGroup::root(store.clone());
        let a = root.add_store_group("a").unwrap();
        let b = root.add_store_group("b").unwrap();
        a.add_data(b"one").unwrap();
        b.add_data(b"two").unwrap();
        root.flush().unwrap();
        let b_tree = b.last_flush();

        store.writes.store(0, Ordering::SeqCst);
        root.flush().unwrap();
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);

        a.add_data(b"three").unwrap();
        root.flush().unwrap();
        // the new blob, a's tree and the root's tree; b is left alone
        assert_eq!(store.writes.load(Ordering::SeqCst), 3);
        assert_eq!(b.last_flush(), b_tree);
    }

    #[test]
    fn new_sub_group_marks_ancestors_changed() {
        let (store, root) = root();
        let geo = root.add_store_group("geo").unwrap();
        let before = root.flush().unwrap();
        geo.add_store_group("mesh").unwrap();
        let after = root.flush().unwrap();
        assert_ne!(before, after);
        let listing = Tree::from_stored_object(&store.read_required(&after).unwrap()).unwrap();
        assert_eq!(listing.group("geo").unwrap().object_id, geo.last_flush().unwrap());
    }

    #[test]
    fn repeated_flush_is_idempotent() {
        let (store, root) = root();
        root.add_store_group("geo").unwrap().add_data(b"x").unwrap();
        root.write_to_disk().unwrap();
        let objects = store.len();
        let first = root.last_flush();
        root.write_to_disk().unwrap();
        assert_eq!(store.len(), objects);
        assert_eq!(root.last_flush(), first);
        assert_eq!(store.count(ObjectKind::Blob), 1);
    }
}
