//! Content hashing helpers.

use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_string(&hasher.finalize())
}

/// Incremental SHA-256 over delimited fields.
///
/// Fields are separated by a NUL byte so that concatenation ambiguity
/// cannot produce colliding inputs.
pub struct FieldHasher {
    inner: Sha256,
}

impl FieldHasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    pub fn field(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        self.inner.update(value.as_ref());
        self.inner.update([0u8]);
        self
    }

    pub fn finish(self) -> String {
        hex_string(&self.inner.finalize())
    }
}

impl Default for FieldHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_stable_hex() {
        let d = sha256_hex(b"hello");
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(d, sha256_hex(b"hello"));
        assert_ne!(d, sha256_hex(b"hello "));
    }

    #[test]
    fn field_separation_prevents_concatenation_collisions() {
        let mut a = FieldHasher::new();
        a.field("ab").field("c");
        let mut b = FieldHasher::new();
        b.field("a").field("bc");
        assert_ne!(a.finish(), b.finish());
    }
}
