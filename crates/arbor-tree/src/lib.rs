//! Write side of the Arbor node tree.
//!
//! A client builds a tree of named nodes through [`NodeHandle`]s. Each
//! handle owns one [`NodeWriteTree`], which
//!
//! 1. creates uniquely named children, each with its own backing group,
//! 2. remembers live child handles without keeping them alive,
//! 3. serializes the headers of its children into one blob, and
//! 4. folds its property hash and its children's reported hashes into the
//!    node's 128-bit hash, which it reports to its own parent.
//!
//! # Hash protocol
//!
//! Hashes flow strictly bottom-up. A node may only aggregate once every
//! child has reported through [`NodeWriteTree::fill_hash`]; aggregating
//! early fails with [`WriteError::PendingChildHash`]. Child handles hold a
//! strong reference to their parent, so dropping handles naturally
//! finalizes leaves before their ancestors.

pub mod codec;
pub mod error;
pub mod handle;
pub mod properties;
pub mod write_tree;

pub use error::{WriteError, WriteResult};
pub use handle::NodeHandle;
pub use properties::{Properties, PropertyBundle, PropertyValue, SELF_PROPERTIES_NAME};
pub use write_tree::NodeWriteTree;
