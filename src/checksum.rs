//! Snapshot fingerprints for schema integrity verification

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::SchemaTree;

/// SHA256 fingerprint of a schema snapshot
///
/// Codec snapshots and caching codecs carry this value; a caching codec
/// refuses to serve a snapshot other than the one it was created against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute a fingerprint of a schema tree (canonical JSON form)
    pub fn of_tree(tree: &SchemaTree) -> Self {
        let canonical = serde_json::to_string(tree).unwrap_or_default();
        Self::from_bytes(canonical.as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that a schema tree matches this fingerprint
    pub fn verify(&self, tree: &SchemaTree) -> bool {
        Self::of_tree(tree) == *self
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Module, SchemaTree};

    #[test]
    fn test_fingerprint_consistency() {
        let tree = SchemaTree::default();
        assert_eq!(Fingerprint::of_tree(&tree), Fingerprint::of_tree(&tree));
        assert!(Fingerprint::of_tree(&tree).verify(&tree));
    }

    #[test]
    fn test_fingerprint_differs() {
        let empty = SchemaTree::default();
        let named = SchemaTree {
            modules: vec![Module {
                name: "demo".to_string(),
                namespace: None,
                revision: None,
            }],
            ..Default::default()
        };
        assert_ne!(Fingerprint::of_tree(&empty), Fingerprint::of_tree(&named));
    }
}
