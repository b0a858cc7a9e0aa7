//! Canonical hashing for transactions and blocks.
//!
//! Both hashes are computed over a `serde_json` value built from the
//! hashed fields with keys sorted, mirroring the source's
//! `json.dumps(..., sort_keys=True)` canonicalization so that two
//! independently-constructed nodes derive identical digests.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of `data` and returns it as a hex string.
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hashes a canonical JSON value: keys are sorted via `serde_json::Map`
/// (a `BTreeMap` under the hood when the `preserve_order` feature is off),
/// so two equal values always serialize identically.
pub fn digest_canonical(value: &serde_json::Value) -> String {
    digest(value.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest(b"hello"), digest(b"hello"));
        assert_ne!(digest(b"hello"), digest(b"world"));
    }

    #[test]
    fn canonical_digest_ignores_key_order() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(digest_canonical(&a), digest_canonical(&b));
    }
}
