//! Content hashing helpers
//!
//! All identifiers in the system (offer hashes, address hashes, share ids)
//! are URL-safe unpadded base64 over SHA-256. Keeping the encoding in one
//! place guarantees ids stay stable across components and restarts.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// SHA-256 over raw bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256, encoded as URL-safe base64 without padding.
///
/// The alphabet is `[A-Za-z0-9_-]`, so the result is safe to use in URLs
/// and as a document id.
pub fn hash_url_encoded(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(sha256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_stable() {
        // Well-known vector: SHA-256 of the empty string.
        let digest = sha256(b"");
        assert_eq!(
            digest[..4],
            [0xe3, 0xb0, 0xc4, 0x42],
            "unexpected SHA-256 prefix for empty input"
        );
    }

    #[test]
    fn url_encoding_has_no_padding() {
        let encoded = hash_url_encoded(b"Teststrasse1Berlin10115");
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(encoded.len(), 43);
    }

    #[test]
    fn same_input_same_hash() {
        assert_eq!(hash_url_encoded(b"abc"), hash_url_encoded(b"abc"));
        assert_ne!(hash_url_encoded(b"abc"), hash_url_encoded(b"abd"));
    }
}
