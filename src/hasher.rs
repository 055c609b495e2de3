//! Content and aggregate hashing
//!
//! File hashes are the BLAKE3 digest of the file bytes. Directory hashes are
//! aggregates over their direct children, so a change anywhere in a subtree
//! changes the hash of every ancestor directory.

use crate::types::Hash;
use blake3::Hasher;
use std::io::Read;

/// Compute content hash for file bytes
pub fn compute_content_hash(content: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(content);
    *hasher.finalize().as_bytes()
}

/// Compute content hash from a reader without buffering the whole file
pub fn compute_stream_hash(reader: &mut dyn Read) -> std::io::Result<Hash> {
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(*hasher.finalize().as_bytes())
}

/// Compute the aggregate hash of a directory
///
/// `children` are (name, hash) pairs of the direct children. They are sorted
/// by name here, so callers may pass them in any order. A directory without
/// children hashes to the digest of the empty string.
pub fn compute_directory_hash(children: &[(String, Hash)]) -> Hash {
    let mut sorted: Vec<&(String, Hash)> = children.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Hasher::new();
    for (name, hash) in sorted {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(hex::encode(hash).as_bytes());
        hasher.update(b"\n");
    }
    *hasher.finalize().as_bytes()
}

/// Digest of the empty string (empty files and empty directories).
pub fn empty_hash() -> Hash {
    compute_content_hash(b"")
}
