//! Short content hashes: query ids and relevance-cache keys.

use sha2::{Digest, Sha256};

/// First `len` hex chars of SHA-256 over the input.
pub fn short_hash(input: &str, len: usize) -> String {
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..len.min(digest.len())].to_string()
}

/// Query namespace id: 8-hex content hash of the query text.
pub fn query_id(query: &str) -> String {
    short_hash(query, 8)
}
