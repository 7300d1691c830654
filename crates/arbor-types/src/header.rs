use serde::{Deserialize, Serialize};

use crate::metadata::MetaData;

/// Separator between node names in a full path.
pub const PATH_SEPARATOR: char = '/';

/// Full path of the root node.
pub const ROOT_PATH: &str = "/";

/// Immutable identity record for one node.
///
/// A header is created once, when its node is created, and never changes.
/// It outlives the node's live handle: the parent keeps every header it has
/// ever issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHeader {
    name: String,
    full_path: String,
    metadata: MetaData,
}

impl NodeHeader {
    pub fn new(name: impl Into<String>, full_path: impl Into<String>, metadata: MetaData) -> Self {
        Self {
            name: name.into(),
            full_path: full_path.into(),
            metadata,
        }
    }

    /// A header that only names a prospective child; the full path is
    /// assigned by the parent when the child is created.
    pub fn candidate(name: impl Into<String>, metadata: MetaData) -> Self {
        Self::new(name, String::new(), metadata)
    }

    /// Header of the root node, whose full path is always `/`.
    pub fn root(name: impl Into<String>, metadata: MetaData) -> Self {
        Self::new(name, ROOT_PATH, metadata)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// Full path of a child called `name` under `parent_path`.
    pub fn child_path(parent_path: &str, name: &str) -> String {
        if parent_path == ROOT_PATH {
            format!("{ROOT_PATH}{name}")
        } else {
            format!("{parent_path}{PATH_SEPARATOR}{name}")
        }
    }
}
