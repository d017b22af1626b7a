use span_types::primitives::Hash;

/// Compute the BLAKE3 hash of the given data.
pub fn blake3_hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Compute a BLAKE3 hash under a derive-key context, so digests taken for
/// different purposes never coincide.
pub fn blake3_hash_domain(context: &str, data: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Hash several byte strings under one context. Each part is length-prefixed
/// so `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn blake3_hash_parts(context: &str, parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_hash_deterministic() {
        let data = b"hello span";
        assert_eq!(blake3_hash(data), blake3_hash(data));
        assert_ne!(blake3_hash(b"hello"), blake3_hash(b"world"));
    }

    #[test]
    fn test_blake3_domain_separation() {
        let data = b"same data";
        let h1 = blake3_hash_domain("context-a", data);
        let h2 = blake3_hash_domain("context-b", data);
        assert_ne!(h1, h2);
        assert_ne!(h1, blake3_hash(data));
    }

    #[test]
    fn test_parts_are_length_prefixed() {
        let h1 = blake3_hash_parts("ctx", &[b"ab", b"c"]);
        let h2 = blake3_hash_parts("ctx", &[b"a", b"bc"]);
        assert_ne!(h1, h2);
    }
}
