//! Content-addressed record identity.
//!
//! The identity is the key used for upserts, so re-crawling a page whose
//! fragments did not change overwrites documents instead of duplicating them.

use sha2::{Digest, Sha256};

/// SHA-256 as 64 lowercase hex characters.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Identity of a fragment: the hash of its exact bytes.
pub fn identify(fragment_html: &str) -> String {
    sha256_hex(fragment_html.as_bytes())
}
