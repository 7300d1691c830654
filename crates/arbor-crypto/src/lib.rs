//! Hashing primitives for Arbor.
//!
//! Two hash shapes are in play:
//!
//! - [`ContentHasher`] produces the 32-byte, domain-separated [`ObjectId`]
//!   under which the backing store files blobs and trees.
//! - [`HashAccumulator`] is the 128-bit mixing primitive behind the
//!   bottom-up node hash: every node folds its property hash and its
//!   children's hashes into one [`Hash128`] and reports it to its parent.
//!
//! Both wrap BLAKE3 -- no custom cryptography. The node hash is an integrity
//! check, not a security boundary.
//!
//! [`ObjectId`]: arbor_types::ObjectId

pub mod accumulator;
pub mod hasher;

pub use accumulator::{Hash128, HashAccumulator};
pub use hasher::ContentHasher;
