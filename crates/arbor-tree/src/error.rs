use arbor_store::StoreError;

/// Errors from node write-tree operations.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// A required input was missing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Empty name, or a name containing the path separator.
    #[error("invalid name {name:?} under {parent}: {reason}")]
    InvalidName {
        parent: String,
        name: String,
        reason: &'static str,
    },

    /// A sibling with this name already exists.
    #[error("{parent} already has a child named {name:?}")]
    DuplicateName { parent: String, name: String },

    /// Child index past the current count, or a hash table out of step
    /// with the header table.
    #[error("index {index} out of range for {count} children")]
    IndexOutOfRange { index: usize, count: usize },

    /// The backing store refused a group or blob operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The node has no backing group (it has been torn down).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A child has not reported its hash yet.
    #[error("child {index} ({name:?}) of {parent} has not reported its hash")]
    PendingChildHash {
        parent: String,
        index: usize,
        name: String,
    },

    /// Headers and hash were already written for this node.
    #[error("node {0} is already finalized")]
    AlreadyFinalized(String),
}

/// Result alias for write-tree operations.
pub type WriteResult<T> = Result<T, WriteError>;
