//! Foundation types for Arbor.
//!
//! This crate provides the identity and descriptor types shared by every
//! other Arbor crate.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-addressed identifier (BLAKE3 hash)
//! - [`MetaData`] -- Ordered `key=value` annotations attached to a node
//! - [`MetaDataDictionary`] -- Interning table for serialized metadata
//! - [`NodeHeader`] -- Immutable name / full path / metadata of one node

pub mod error;
pub mod header;
pub mod metadata;
pub mod object;

pub use error::TypeError;
pub use header::{NodeHeader, PATH_SEPARATOR, ROOT_PATH};
pub use metadata::{MetaData, MetaDataDictionary, INLINE_METADATA_INDEX};
pub use object::ObjectId;
