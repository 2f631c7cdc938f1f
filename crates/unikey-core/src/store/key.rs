//! Store key encoding.

use std::fmt;

/// A key built from an entity kind and an identity value.
///
/// Key format: `kind\0identity`
///
/// Kinds may not contain a NUL byte, so the first NUL always separates the two
/// parts and identities are free to contain anything.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    kind: String,
    identity: String,
}

impl StoreKey {
    /// Create a key for `identity` within `kind`.
    pub fn new(kind: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            identity: identity.into(),
        }
    }

    /// The kind (namespace) part.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The identity part.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Encode the key to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.kind.len() + 1 + self.identity.len());
        key.extend_from_slice(self.kind.as_bytes());
        key.push(0);
        key.extend_from_slice(self.identity.as_bytes());
        key
    }

    /// Decode a key from bytes.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let split = bytes.iter().position(|b| *b == 0)?;
        let kind = std::str::from_utf8(&bytes[..split]).ok()?;
        let identity = std::str::from_utf8(&bytes[split + 1..]).ok()?;
        Some(Self::new(kind, identity))
    }

    /// Prefix shared by every key of `kind`.
    pub fn kind_prefix(kind: &str) -> Vec<u8> {
        let mut prefix = kind.as_bytes().to_vec();
        prefix.push(0);
        prefix
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({}:{})", self.kind, self.identity)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.identity)
    }
}
