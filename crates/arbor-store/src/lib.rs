//! Append-only backing store for Arbor.
//!
//! Storage is modelled after git's object database: every blob and every
//! group listing is an immutable object filed under its content hash.
//! On top of the object store sits [`StoreGroup`], the hierarchical
//! "directory of blobs" that node writers append into.
//!
//! # Object Types
//!
//! - [`Blob`] -- raw bytes appended to a group
//! - [`Tree`] -- a flushed group: ordered data blobs and named sub-groups
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- loose object files under `objects/ab/cdef...`
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; writing the same content twice is a no-op.
//! 2. Groups only grow: sub-groups and blobs are appended, never removed.
//! 3. Flushing a group writes its sub-groups first, then its own tree, so a
//!    tree never references an unwritten object.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod error;
pub mod fs;
pub mod group;
pub mod memory;
pub mod object;
pub mod traits;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use group::{BackingGroup, StoreGroup};
pub use memory::InMemoryObjectStore;
pub use object::{Blob, EntryKind, ObjectKind, StoredObject, Tree, TreeEntry};
pub use traits::ObjectStore;
