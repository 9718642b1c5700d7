//! Opaque pagination cursors.
//!
//! A cursor is the lowercase hex encoding of an ordered-set key. It names a
//! position rather than an offset, so pages stay stable while records are
//! added or removed elsewhere in the set.

use std::fmt;
use std::str::FromStr;

use catalog_storage::OrderKey;

use crate::error::NavigationError;

/// Position in the ordered set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(OrderKey);

impl Cursor {
    pub fn new(key: OrderKey) -> Self {
        Self(key)
    }

    pub fn key(&self) -> &OrderKey {
        &self.0
    }

    /// Record id at the cursor position.
    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// Encode for handing to a client.
    pub fn encode(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Decode a client-supplied cursor.
    pub fn decode(s: &str) -> Result<Self, NavigationError> {
        if s.is_empty() {
            return Err(NavigationError::InvalidCursor("empty cursor".to_string()));
        }
        let bytes =
            hex::decode(s).map_err(|e| NavigationError::InvalidCursor(e.to_string()))?;
        let key = OrderKey::from_bytes(&bytes)
            .map_err(|e| NavigationError::InvalidCursor(e.to_string()))?;
        Ok(Self(key))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Cursor {
    type Err = NavigationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
