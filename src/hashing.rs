//! Deterministic string hashing. The standard library hashers are randomly seeded per
//! process, which would make rng stream offsets differ between runs. `hash_str` is used by
//! `crate::random` to derive a per-stream seed offset from an `RngId` name.

use xxhash_rust::xxh3::xxh3_64;

/// A convenience method to compute the hash of a `&str`.
#[must_use]
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_strings() {
        let a = hash_str("hello");
        let b = hash_str("hello");
        let c = hash_str("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
