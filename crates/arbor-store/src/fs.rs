use std::fs;
use std::io::Write;
use std::path::PathBuf;

use arbor_types::ObjectId;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// Frame header: 1 byte kind + 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 9;

/// Loose-object store on the local filesystem.
///
/// Each object is one file at `objects/<2 hex>/<62 hex>`, framed as:
///
/// ```text
/// [1 byte:  kind tag]
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload]
/// ```
///
/// Files are written to a temporary file in the objects directory and
/// renamed into place, so a crash never leaves a half-written object under
/// its final name.
pub struct FsObjectStore {
    objects_dir: PathBuf,
    config: StoreConfig,
}

impl FsObjectStore {
    /// Open the store described by `config`, creating the objects directory
    /// unless the store is read-only.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let objects_dir = config.objects_dir();
        if !config.read_only {
            fs::create_dir_all(&objects_dir)?;
        }
        debug!(path = %objects_dir.display(), read_only = config.read_only, "opened object store");
        Ok(Self {
            objects_dir,
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    fn encode(object: &StoredObject) -> StoreResult<Vec<u8>> {
        let len = u32::try_from(object.data.len())
            .map_err(|_| StoreError::Serialization("object exceeds 4 GiB".into()))?;
        let mut framed = Vec::with_capacity(HEADER_SIZE + object.data.len());
        framed.push(object.kind.tag());
        framed.extend_from_slice(&len.to_le_bytes());
        framed.extend_from_slice(&crc32fast::hash(&object.data).to_le_bytes());
        framed.extend_from_slice(&object.data);
        Ok(framed)
    }

    fn decode(id: &ObjectId, framed: &[u8]) -> StoreResult<StoredObject> {
        let corrupt = |reason: &str| StoreError::CorruptObject {
            id: *id,
            reason: reason.to_string(),
        };
        if framed.len() < HEADER_SIZE {
            return Err(corrupt("truncated header"));
        }
        let kind = ObjectKind::from_tag(framed[0]).ok_or_else(|| corrupt("unknown kind tag"))?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&framed[1..5]);
        let len = u32::from_le_bytes(word) as usize;
        word.copy_from_slice(&framed[5..9]);
        let crc = u32::from_le_bytes(word);
        let payload = &framed[HEADER_SIZE..];
        if payload.len() != len {
            return Err(corrupt("length mismatch"));
        }
        if crc32fast::hash(payload) != crc {
            return Err(corrupt("CRC mismatch"));
        }
        let object = StoredObject::new(kind, payload.to_vec());
        let computed = object.compute_id();
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(object)
    }
}

impl ObjectStore for FsObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let path = self.object_path(id);
        match fs::read(&path) {
            Ok(framed) => Self::decode(id, &framed).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        let id = object.compute_id();
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }
        let framed = Self::encode(object)?;
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Serialization("object path has no parent".into()))?;
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&framed)?;
        if self.config.fsync {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(id = %id.short_hex(), kind = %object.kind, len = object.data.len(), "object written");
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).exists())
    }

    fn is_writable(&self) -> bool {
        !self.config.read_only
    }
}

impl std::fmt::Debug for FsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObjectStore")
            .field("objects_dir", &self.objects_dir)
            .field("read_only", &self.config.read_only)
            .finish()
    }
}
