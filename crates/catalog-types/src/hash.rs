//! Stable name hashing for ordered-set tie breaking.

/// FNV-1a 64-bit hash.
///
/// Used to order records that share a sort key. The value is identical across
/// processes, restarts and platforms, so page boundaries stay reproducible.
/// Not suitable for anything security sensitive.
#[must_use]
#[allow(clippy::unreadable_literal)]
pub const fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    let mut i = 0;

    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x100000001b3);
        i += 1;
    }

    hash
}
