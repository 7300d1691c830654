use arbor_types::ObjectId;

use crate::error::StoreResult;
use crate::object::StoredObject;

/// Content-addressed object store.
///
/// Implementations must satisfy:
/// - Objects are immutable once written; the same kind and data always
///   produce the same ID, so a repeated write is a no-op.
/// - Concurrent reads are always safe.
/// - The store never interprets object contents.
pub trait ObjectStore: Send + Sync {
    /// Read an object by ID. `Ok(None)` if it does not exist.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its ID. Idempotent.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Whether writes are accepted. Groups check this before appending so a
    /// read-only store is rejected up front rather than at flush time.
    fn is_writable(&self) -> bool {
        true
    }

    /// Read an object that must exist.
    fn read_required(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.read(id)?
            .ok_or(crate::error::StoreError::NotFound(*id))
    }
}
