//! Node metadata and the interning dictionary used when serializing it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Metadata index meaning "not interned; the serialized string follows inline".
pub const INLINE_METADATA_INDEX: u8 = 0xff;

/// Interned strings must be shorter than this to receive an index.
const MAX_INTERNED_LEN: usize = 256;

/// Indices 1..=254 are available; 0 is the empty string, 255 is inline.
const MAX_INTERNED_ENTRIES: usize = 254;

/// Ordered `key=value` annotations.
///
/// Keys are unique; setting an existing key replaces its value in place so
/// the serialized form stays stable across edits.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaData {
    entries: Vec<(String, String)>,
}

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`.
    ///
    /// Keys may not be empty or contain `=` or `;`; values may not contain `;`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), TypeError> {
        let key = key.into();
        let value = value.into();
        if key.is_empty() || key.contains(['=', ';']) {
            return Err(TypeError::InvalidMetaData(format!("bad key {key:?}")));
        }
        if value.contains(';') {
            return Err(TypeError::InvalidMetaData(format!("bad value {value:?}")));
        }
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self, TypeError> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialized `k=v;k=v` form.
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Parse the `k=v;k=v` form produced by [`serialize`](Self::serialize).
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let mut md = Self::new();
        for pair in s.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| TypeError::InvalidMetaData(format!("missing '=' in {pair:?}")))?;
            md.set(key, value)?;
        }
        Ok(md)
    }
}

impl fmt::Display for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// Interning table mapping serialized metadata strings to one-byte indices.
///
/// Headers refer to metadata by index so that the many nodes sharing the
/// same annotations store it once. Strings that are too long, or arrive
/// after the table is full, are written inline instead.
#[derive(Clone, Debug, Default)]
pub struct MetaDataDictionary {
    entries: Vec<String>,
    lookup: HashMap<String, u8>,
}

impl MetaDataDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `metadata`, interning it if there is room.
    ///
    /// Returns 0 for empty metadata and [`INLINE_METADATA_INDEX`] when the
    /// caller must write the serialized string inline.
    pub fn index_of(&mut self, metadata: &MetaData) -> u8 {
        let serialized = metadata.serialize();
        if serialized.is_empty() {
            return 0;
        }
        if let Some(&idx) = self.lookup.get(&serialized) {
            return idx;
        }
        if serialized.len() >= MAX_INTERNED_LEN || self.entries.len() >= MAX_INTERNED_ENTRIES {
            return INLINE_METADATA_INDEX;
        }
        self.entries.push(serialized.clone());
        let idx = self.entries.len() as u8;
        self.lookup.insert(serialized, idx);
        idx
    }

    /// Interned string at `index` (1-based; 0 is the empty string).
    pub fn get(&self, index: u8) -> Option<&str> {
        match index {
            0 => Some(""),
            INLINE_METADATA_INDEX => None,
            i => self.entries.get(i as usize - 1).map(String::as_str),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the table as consecutive `u8` length + bytes records.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.push(entry.len() as u8);
            out.extend_from_slice(entry.as_bytes());
        }
        out
    }

    /// Rebuild a table from the output of [`serialize`](Self::serialize).
    pub fn parse(bytes: &[u8]) -> Result<Self, TypeError> {
        let mut dict = Self::new();
        let mut rest = bytes;
        while let Some((&len, tail)) = rest.split_first() {
            let len = len as usize;
            if tail.len() < len {
                return Err(TypeError::InvalidMetaData(format!(
                    "dictionary entry {} truncated",
                    dict.entries.len() + 1
                )));
            }
            let (entry, tail) = tail.split_at(len);
            let entry = std::str::from_utf8(entry)
                .map_err(|e| TypeError::InvalidMetaData(e.to_string()))?;
            if dict.entries.len() >= MAX_INTERNED_ENTRIES {
                return Err(TypeError::InvalidMetaData("too many dictionary entries".into()));
            }
            dict.entries.push(entry.to_string());
            dict.lookup.insert(entry.to_string(), dict.entries.len() as u8);
            rest = tail;
        }
        Ok(dict)
    }
}
