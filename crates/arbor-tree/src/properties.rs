//! Typed properties attached to a node.

use std::sync::{Arc, Mutex};

use arbor_crypto::HashAccumulator;
use arbor_store::BackingGroup;
use arbor_types::{MetaData, MetaDataDictionary, PATH_SEPARATOR};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{write_metadata, write_str};
use crate::error::{WriteError, WriteResult};
use crate::handle::NodeHandle;

/// Reserved name of the bundle holding a node's own properties.
pub const SELF_PROPERTIES_NAME: &str = ".prop";

/// A single property value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl PropertyValue {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int(_) => 1,
            Self::Float(_) => 2,
            Self::Text(_) => 3,
            Self::Bytes(_) => 4,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Bool(b) => buf.push(u8::from(*b)),
            Self::Int(i) => buf.extend_from_slice(&i.to_le_bytes()),
            Self::Float(f) => buf.extend_from_slice(&f.to_bits().to_le_bytes()),
            Self::Text(s) => write_str(buf, s),
            Self::Bytes(b) => {
                buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
                buf.extend_from_slice(b);
            }
        }
    }
}

struct PropertyEntry {
    name: String,
    value: PropertyValue,
    metadata: MetaData,
}

/// Flat, ordered set of named properties belonging to one node.
///
/// The bundle is owned by the node's write tree; [`Properties`] handles
/// share it. Once the node's hash has been stored the bundle is sealed and
/// rejects further changes.
pub struct PropertyBundle {
    name: String,
    metadata: MetaData,
    group: Arc<dyn BackingGroup>,
    entries: Vec<PropertyEntry>,
    sealed: bool,
    written: bool,
}

impl PropertyBundle {
    pub fn new(name: impl Into<String>, metadata: MetaData, group: Arc<dyn BackingGroup>) -> Self {
        Self {
            name: name.into(),
            metadata,
            group,
            entries: Vec::new(),
            sealed: false,
            written: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Reject further [`add`](Self::add)s.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn add(&mut self, name: &str, value: PropertyValue, metadata: MetaData) -> WriteResult<()> {
        let parent = self.group.full_path().to_string();
        if self.sealed {
            return Err(WriteError::AlreadyFinalized(parent));
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(WriteError::DuplicateName {
                parent,
                name: name.to_string(),
            });
        }
        if name.is_empty() {
            return Err(WriteError::InvalidName {
                parent,
                name: name.to_string(),
                reason: "property name is empty",
            });
        }
        if name.contains(PATH_SEPARATOR) {
            return Err(WriteError::InvalidName {
                parent,
                name: name.to_string(),
                reason: "property name contains '/'",
            });
        }
        self.entries.push(PropertyEntry {
            name: name.to_string(),
            value,
            metadata,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.value)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Feed every property, in insertion order, into `acc`.
    pub fn compute_hash(&self, acc: &mut HashAccumulator) {
        let mut buf = Vec::new();
        for entry in &self.entries {
            buf.clear();
            write_str(&mut buf, &entry.name);
            buf.push(entry.value.type_tag());
            entry.value.encode(&mut buf);
            acc.update(&buf);
        }
    }

    /// Write the bundle as one blob into its group and seal it.
    ///
    /// An empty bundle writes nothing. On a store error the bundle is left
    /// as it was and the write can be retried.
    pub fn write_property_headers(&mut self, dictionary: &mut MetaDataDictionary) -> WriteResult<()> {
        if self.written {
            return Err(WriteError::AlreadyFinalized(self.group.full_path().to_string()));
        }
        if !self.entries.is_empty() {
            self.store_entries(dictionary)?;
        }
        self.sealed = true;
        self.written = true;
        Ok(())
    }

    fn store_entries(&self, dictionary: &mut MetaDataDictionary) -> WriteResult<()> {
        let mut buf = Vec::new();
        write_str(&mut buf, &self.name);
        write_metadata(&mut buf, &self.metadata, dictionary);
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            write_str(&mut buf, &entry.name);
            buf.push(entry.value.type_tag());
            write_metadata(&mut buf, &entry.metadata, dictionary);
            entry.value.encode(&mut buf);
        }
        self.group.add_data(&buf)?;
        debug!(group = %self.group.full_path(), count = self.entries.len(), "property headers written");
        Ok(())
    }
}

/// Shared handle onto a node's properties.
///
/// A node hands out at most one live `Properties` at a time; asking again
/// while one is alive returns the same handle. The handle keeps its owning
/// node alive.
pub struct Properties {
    owner: Arc<NodeHandle>,
    bundle: Arc<Mutex<PropertyBundle>>,
}

impl Properties {
    pub(crate) fn new(owner: Arc<NodeHandle>, bundle: Arc<Mutex<PropertyBundle>>) -> Self {
        Self { owner, bundle }
    }

    pub fn owner(&self) -> &Arc<NodeHandle> {
        &self.owner
    }

    pub fn owner_path(&self) -> &str {
        self.owner.full_path()
    }

    pub fn set(&self, name: &str, value: PropertyValue) -> WriteResult<()> {
        self.set_with_metadata(name, value, MetaData::new())
    }

    pub fn set_with_metadata(&self, name: &str, value: PropertyValue, metadata: MetaData) -> WriteResult<()> {
        self.bundle
            .lock()
            .expect("bundle mutex poisoned")
            .add(name, value, metadata)
    }

    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.bundle
            .lock()
            .expect("bundle mutex poisoned")
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.bundle.lock().expect("bundle mutex poisoned").names()
    }

    pub fn len(&self) -> usize {
        self.bundle.lock().expect("bundle mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both handles write into the same underlying bundle.
    pub fn shares_bundle_with(&self, other: &Properties) -> bool {
        Arc::ptr_eq(&self.bundle, &other.bundle)
    }
}

impl std::fmt::Debug for Properties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Properties")
            .field("owner", &self.owner_path())
            .field("names", &self.names())
            .finish()
    }
}
