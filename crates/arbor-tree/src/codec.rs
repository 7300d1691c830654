//! Byte layouts written by the node writer.
//!
//! Node header blob, per child in creation order:
//!
//! ```text
//! [4 bytes: name length (little-endian u32)]
//! [N bytes: name, UTF-8]
//! [1 byte:  metadata index]
//! if index == 0xFF:
//!   [4 bytes: metadata length (little-endian u32)]
//!   [M bytes: serialized metadata]
//! ```
//!
//! followed by the 32-byte hash tail:
//!
//! ```text
//! [8 bytes: data hash word 0][8 bytes: data hash word 1]
//! [8 bytes: children hash word 0][8 bytes: children hash word 1]
//! ```
//!
//! All words are little-endian.
//!
//! The root's group ends with the metadata dictionary shared by the whole
//! tree: one `[1 byte: length][N bytes: key=value;...]` record per interned
//! entry, entry `i` answering metadata index `i + 1`.

use arbor_crypto::Hash128;
use arbor_types::{MetaData, MetaDataDictionary, NodeHeader, INLINE_METADATA_INDEX};

/// Length of the hash tail that ends every node header blob.
pub const HASH_TAIL_LEN: usize = 32;

pub fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Metadata as a dictionary index, or inline after the `0xFF` marker.
pub fn write_metadata(buf: &mut Vec<u8>, metadata: &MetaData, dictionary: &mut MetaDataDictionary) {
    let index = dictionary.index_of(metadata);
    buf.push(index);
    if index == INLINE_METADATA_INDEX {
        write_str(buf, &metadata.serialize());
    }
}

/// One child header. The full path is not written: readers rebuild it from
/// the parent's path.
pub fn write_node_header(buf: &mut Vec<u8>, header: &NodeHeader, dictionary: &mut MetaDataDictionary) {
    write_str(buf, header.name());
    write_metadata(buf, header.metadata(), dictionary);
}

pub fn hash_tail(data: Hash128, children: Hash128) -> [u8; HASH_TAIL_LEN] {
    let mut tail = [0u8; HASH_TAIL_LEN];
    tail[..16].copy_from_slice(&data.to_bytes());
    tail[16..].copy_from_slice(&children.to_bytes());
    tail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_with_empty_metadata() {
        let mut dict = MetaDataDictionary::new();
        let mut buf = Vec::new();
        write_node_header(&mut buf, &NodeHeader::new("geo", "/geo", MetaData::new()), &mut dict);
        assert_eq!(buf, vec![3, 0, 0, 0, b'g', b'e', b'o', 0]);
    }

    #[test]
    fn repeated_metadata_shares_an_index() {
        let mut dict = MetaDataDictionary::new();
        let md = MetaData::new().with("schema", "Xform").unwrap();
        let mut buf = Vec::new();
        write_node_header(&mut buf, &NodeHeader::new("a", "/a", md.clone()), &mut dict);
        write_node_header(&mut buf, &NodeHeader::new("b", "/b", md), &mut dict);
        assert_eq!(buf, vec![1, 0, 0, 0, b'a', 1, 1, 0, 0, 0, b'b', 1]);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn oversized_metadata_is_inline() {
        let mut dict = MetaDataDictionary::new();
        let md = MetaData::new().with("k", "v".repeat(300)).unwrap();
        let mut buf = Vec::new();
        write_metadata(&mut buf, &md, &mut dict);
        assert_eq!(buf[0], INLINE_METADATA_INDEX);
        assert_eq!(&buf[1..5], &(302u32).to_le_bytes());
        assert_eq!(buf.len(), 1 + 4 + 302);
    }

    #[test]
    fn tail_layout() {
        let tail = hash_tail(Hash128::new(1, 2), Hash128::new(3, 4));
        let words: Vec<u64> = tail
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(words, vec![1, 2, 3, 4]);
    }
}
