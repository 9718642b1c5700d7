//! Key encoding and decoding for the ordered set.
//!
//! Ordered-set key format: `{sort_key}\0{name_hash:u64 BE}{id}`
//! - sort_key: trimmed, lowercased, NUL-free sort key
//! - name_hash: FNV-1a of the normalized display name, orders records that
//!   share a sort key the same way on every run
//! - id: record id, makes the key unique
//!
//! Lexicographic byte order of encoded keys is the navigation order.

use catalog_types::{fnv1a_64, PrimaryRecord};

use crate::error::StorageError;

const SEPARATOR: u8 = 0x00;
const HASH_LEN: usize = 8;

/// Position of a record in the ordered set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey {
    /// Normalized sort key
    pub sort_key: String,
    /// Stable hash of the normalized display name
    pub name_hash: u64,
    /// Record id
    pub id: String,
}

impl OrderKey {
    /// Derive the ordered-set key of a record.
    pub fn for_record(record: &PrimaryRecord) -> Self {
        Self::new(&record.sort_key, &record.display_name, &record.id)
    }

    /// Build a key from its parts.
    pub fn new(sort_key: &str, display_name: &str, id: impl Into<String>) -> Self {
        Self {
            sort_key: normalize(sort_key),
            name_hash: fnv1a_64(normalize(display_name).as_bytes()),
            id: id.into(),
        }
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.sort_key.len() + 1 + HASH_LEN + self.id.len());
        out.extend_from_slice(self.sort_key.as_bytes());
        out.push(SEPARATOR);
        out.extend_from_slice(&self.name_hash.to_be_bytes());
        out.extend_from_slice(self.id.as_bytes());
        out
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let sep = bytes
            .iter()
            .position(|b| *b == SEPARATOR)
            .ok_or_else(|| StorageError::Key("order key missing separator".to_string()))?;

        let hash_start = sep + 1;
        let id_start = hash_start + HASH_LEN;
        if bytes.len() < id_start {
            return Err(StorageError::Key("order key truncated".to_string()));
        }

        let sort_key = std::str::from_utf8(&bytes[..sep])
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?
            .to_string();

        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&bytes[hash_start..id_start]);

        let id = std::str::from_utf8(&bytes[id_start..])
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?
            .to_string();

        Ok(Self {
            sort_key,
            name_hash: u64::from_be_bytes(hash),
            id,
        })
    }
}

/// Normalize a sort key or display name for ordering.
pub fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| *c != '\0')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Key of the run metadata record
pub const LAST_RUN_KEY: &[u8] = b"last_run";

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_order_key_roundtrip() {
        let key = OrderKey::new("Summer 2021", "Beach Trip", "c-42");
        let decoded = OrderKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(key, decoded);
        assert_eq!(decoded.sort_key, "summer 2021");
    }

    #[test]
    fn test_prefix_sorts_first() {
        let short = OrderKey::new("a", "x", "1").to_bytes();
        let long = OrderKey::new("ab", "x", "1").to_bytes();
        assert!(short < long);
    }

    #[test]
    fn test_sort_key_dominates_name_and_id() {
        let a = OrderKey::new("apple", "zzz", "9").to_bytes();
        let b = OrderKey::new("banana", "aaa", "1").to_bytes();
        assert!(a < b);
    }

    #[test]
    fn test_case_insensitive_ordering() {
        let upper = OrderKey::new("Apple", "n", "1");
        let lower = OrderKey::new("apple", "n", "1");
        assert_eq!(upper.to_bytes(), lower.to_bytes());
    }

    #[test]
    fn test_name_hash_is_stable() {
        let a = OrderKey::new("k", "Display Name", "1");
        let b = OrderKey::new("k", "  display name ", "2");
        assert_eq!(a.name_hash, b.name_hash);
        assert_eq!(a.name_hash, fnv1a_64(b"display name"));
    }

    #[test]
    fn test_nul_is_stripped() {
        let key = OrderKey::new("a\0b", "n", "1");
        assert_eq!(key.sort_key, "ab");
        assert!(OrderKey::from_bytes(&key.to_bytes()).is_ok());
    }

    #[test]
    fn test_for_record() {
        let record = PrimaryRecord::new("c-1", "Name", "Key", Utc::now());
        let key = OrderKey::for_record(&record);
        assert_eq!(key.id, "c-1");
        assert_eq!(key.sort_key, "key");
    }

    #[test]
    fn test_invalid_bytes() {
        assert!(OrderKey::from_bytes(b"no-separator").is_err());
        assert!(OrderKey::from_bytes(b"key\0abc").is_err());
    }
}
