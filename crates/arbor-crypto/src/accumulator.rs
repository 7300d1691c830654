use std::fmt;

use serde::{Deserialize, Serialize};

/// A 128-bit node hash, stored as two 64-bit words.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash128([u64; 2]);

impl Hash128 {
    pub const ZERO: Self = Self([0, 0]);

    pub const fn new(h0: u64, h1: u64) -> Self {
        Self([h0, h1])
    }

    pub fn words(&self) -> (u64, u64) {
        (self.0[0], self.0[1])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0, 0]
    }

    /// Little-endian byte form: word 0 first.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.0[0].to_le_bytes());
        out[8..].copy_from_slice(&self.0[1].to_le_bytes());
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl fmt::Debug for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash128({:016x}, {:016x})", self.0[0], self.0[1])
    }
}

impl fmt::Display for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental 128-bit mixing primitive.
///
/// `finish` does not consume or reset the state, so a caller can take an
/// intermediate value and keep feeding bytes; node hashing relies on this
/// to fold the data hash in after finishing the child-hash vector.
#[derive(Clone, Default)]
pub struct HashAccumulator {
    inner: blake3::Hasher,
    fed: u64,
}

impl HashAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return to the freshly constructed state.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.fed = 0;
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
        self.fed += bytes.len() as u64;
    }

    /// Feed each word as 8 little-endian bytes.
    pub fn update_words(&mut self, words: &[u64]) {
        for word in words {
            self.update(&word.to_le_bytes());
        }
    }

    /// Total number of bytes fed since construction or the last reset.
    pub fn bytes_fed(&self) -> u64 {
        self.fed
    }

    /// Current 128-bit value: the first 16 output bytes as two LE words.
    pub fn finish(&self) -> Hash128 {
        let out = self.inner.finalize();
        let bytes = out.as_bytes();
        let mut w0 = [0u8; 8];
        let mut w1 = [0u8; 8];
        w0.copy_from_slice(&bytes[..8]);
        w1.copy_from_slice(&bytes[8..16]);
        Hash128::new(u64::from_le_bytes(w0), u64::from_le_bytes(w1))
    }

    /// One-shot hash of a word slice.
    pub fn hash_words(words: &[u64]) -> Hash128 {
        let mut acc = Self::new();
        acc.update_words(words);
        acc.finish()
    }
}

impl fmt::Debug for HashAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashAccumulator")
            .field("bytes_fed", &self.fed)
            .field("current", &self.finish())
            .finish()
    }
}
