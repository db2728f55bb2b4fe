/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Derive a short opaque token (16 hex chars) from arbitrary seed parts.
///
/// Used for render keys and cache-busting markers, where uniqueness per seed
/// matters and readability does not.
#[must_use]
pub fn short_token(parts: &[&[u8]]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..16].to_string()
}
