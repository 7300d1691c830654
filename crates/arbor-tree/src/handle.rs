use std::sync::{Arc, Mutex};

use arbor_crypto::{Hash128, HashAccumulator};
use arbor_store::BackingGroup;
use arbor_types::{MetaData, MetaDataDictionary, NodeHeader};
use tracing::{debug, warn};

use crate::error::{WriteError, WriteResult};
use crate::properties::Properties;
use crate::write_tree::NodeWriteTree;

/// Writer for one node of the tree.
///
/// Handles are shared as `Arc<NodeHandle>`. A child holds a strong
/// reference to its parent, and its parent only a weak one back, so the
/// last handle to go away is always the root.
///
/// Dropping a handle that was never [`finalize`](Self::finalize)d
/// finalizes it, then flushes its backing group. Errors at that point can
/// only be logged.
pub struct NodeHandle {
    header: Arc<NodeHeader>,
    parent: Option<Arc<NodeHandle>>,
    index: usize,
    tree: NodeWriteTree,
    dictionary: Arc<Mutex<MetaDataDictionary>>,
    hash: Mutex<Option<Hash128>>,
}

impl NodeHandle {
    /// Create the root node of a new tree inside `parent_group`.
    ///
    /// The root's full path is `/` whatever its name.
    pub fn root(
        parent_group: Option<Arc<dyn BackingGroup>>,
        name: &str,
        metadata: MetaData,
    ) -> WriteResult<Arc<Self>> {
        let tree = NodeWriteTree::new(parent_group.as_ref(), name, &metadata)?;
        Ok(Arc::new(Self {
            header: Arc::new(NodeHeader::root(name, metadata)),
            parent: None,
            index: 0,
            tree,
            dictionary: Arc::new(Mutex::new(MetaDataDictionary::new())),
            hash: Mutex::new(None),
        }))
    }

    pub(crate) fn new_child(
        parent: Arc<NodeHandle>,
        parent_group: &Arc<dyn BackingGroup>,
        header: Arc<NodeHeader>,
        index: usize,
    ) -> WriteResult<Arc<Self>> {
        let tree = NodeWriteTree::new(Some(parent_group), header.name(), header.metadata())?;
        let dictionary = Arc::clone(&parent.dictionary);
        Ok(Arc::new(Self {
            header,
            parent: Some(parent),
            index,
            tree,
            dictionary,
            hash: Mutex::new(None),
        }))
    }

    pub fn header(&self) -> &NodeHeader {
        &self.header
    }

    pub fn name(&self) -> &str {
        self.header.name()
    }

    pub fn full_path(&self) -> &str {
        self.header.full_path()
    }

    pub fn metadata(&self) -> &MetaData {
        self.header.metadata()
    }

    pub fn parent(&self) -> Option<&Arc<NodeHandle>> {
        self.parent.as_ref()
    }

    /// Position among the parent's children; `None` for the root.
    pub fn index(&self) -> Option<usize> {
        self.parent.as_ref().map(|_| self.index)
    }

    /// The node's write tree, for callers driving the hash protocol by hand.
    pub fn tree(&self) -> &NodeWriteTree {
        &self.tree
    }

    pub fn create_child(self: &Arc<Self>, name: &str, metadata: MetaData) -> WriteResult<Arc<NodeHandle>> {
        self.tree
            .create_child(self, self.full_path(), &NodeHeader::candidate(name, metadata))
    }

    pub fn child(&self, name: &str) -> Option<Arc<NodeHandle>> {
        self.tree.child(name)
    }

    pub fn child_count(&self) -> usize {
        self.tree.child_count()
    }

    pub fn child_header_at(&self, index: usize) -> WriteResult<Arc<NodeHeader>> {
        self.tree.child_header_at(index)
    }

    pub fn child_header_by_name(&self, name: &str) -> Option<Arc<NodeHeader>> {
        self.tree.child_header_by_name(name)
    }

    pub fn properties(self: &Arc<Self>) -> Arc<Properties> {
        self.tree.properties(self)
    }

    /// Copy of the metadata dictionary shared by every node of this tree.
    pub fn dictionary(&self) -> MetaDataDictionary {
        self.dictionary.lock().expect("dictionary mutex poisoned").clone()
    }

    /// Write this node's headers, compute its hash, report it to the
    /// parent and flush the node's group. The root also stores the metadata
    /// dictionary shared by the whole tree.
    ///
    /// Every child must already be finalized. After a store error the call
    /// can be repeated.
    pub fn finalize(&self) -> WriteResult<Hash128> {
        let mut slot = self.hash.lock().expect("hash mutex poisoned");
        if slot.is_some() || self.tree.headers_written() {
            return Err(WriteError::AlreadyFinalized(self.full_path().to_string()));
        }

        let mut acc = HashAccumulator::new();
        {
            let mut dictionary = self.dictionary.lock().expect("dictionary mutex poisoned");
            match self.parent {
                Some(_) => self.tree.write_headers(&mut dictionary, &mut acc)?,
                None => self.tree.write_root_headers(&mut dictionary, &mut acc)?,
            }
        }
        let hash = acc.finish();

        if let Some(parent) = &self.parent {
            let (h0, h1) = hash.words();
            parent.tree.fill_hash(self.index, h0, h1)?;
        }
        *slot = Some(hash);
        drop(slot);
        debug!(path = %self.full_path(), %hash, "node finalized");

        self.tree.write_to_disk()?;
        Ok(hash)
    }

    /// The hash computed by [`finalize`](Self::finalize), if it has run.
    pub fn hash(&self) -> Option<Hash128> {
        *self.hash.lock().expect("hash mutex poisoned")
    }

    pub fn is_finalized(&self) -> bool {
        self.hash().is_some() || self.tree.headers_written()
    }

    /// Flush this node's backing group.
    pub fn write_to_disk(&self) -> WriteResult<()> {
        self.tree.write_to_disk()
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        if !self.is_finalized() {
            if let Err(e) = self.finalize() {
                warn!(path = %self.full_path(), error = %e, "failed to finalize node on drop");
            }
        }
        if let Err(e) = self.tree.write_to_disk() {
            warn!(path = %self.full_path(), error = %e, "failed to flush node on drop");
        }
        self.tree.release_group();
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("full_path", &self.full_path())
            .field("index", &self.index())
            .field("children", &self.child_count())
            .field("hash", &self.hash())
            .finish()
    }
}
