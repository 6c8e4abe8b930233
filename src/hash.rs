//! Content hashing
//!
//! Deterministic digests over byte content and over chains of child digests.
//! Every `update` call is framed with its length, so the position and the
//! boundaries of each chunk are part of the digest: `update(a); update(b)`
//! differs from `update(b); update(a)` and from `update(ab)`.

use crate::types::ContentHash;

/// Incremental hasher producing a [`ContentHash`].
#[derive(Clone)]
pub struct ContentHasher {
    inner: blake3::Hasher,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        ContentHasher {
            inner: blake3::Hasher::new(),
        }
    }

    /// Append one chunk.
    pub fn update(&mut self, chunk: impl AsRef<[u8]>) -> &mut Self {
        let chunk = chunk.as_ref();
        self.inner.update(&(chunk.len() as u64).to_le_bytes());
        self.inner.update(chunk);
        self
    }

    /// Fold a child digest into this one.
    pub fn fold(&mut self, child: &ContentHash) -> &mut Self {
        self.update(child.as_str().as_bytes())
    }

    /// Finish and encode as lowercase hex.
    pub fn digest(&self) -> ContentHash {
        ContentHash::from_hex(self.inner.finalize().to_hex().to_string())
    }
}

/// Hash a single chunk.
pub fn hash_bytes(bytes: impl AsRef<[u8]>) -> ContentHash {
    let mut hasher = ContentHasher::new();
    hasher.update(bytes);
    hasher.digest()
}

/// Fold an ordered sequence of digests, seeded with `seed`.
pub fn fold_hashes<'a>(
    seed: &ContentHash,
    children: impl IntoIterator<Item = &'a ContentHash>,
) -> ContentHash {
    let mut hasher = ContentHasher::new();
    hasher.fold(seed);
    for child in children {
        hasher.fold(child);
    }
    hasher.digest()
}
