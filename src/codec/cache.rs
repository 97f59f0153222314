//! Identity-preserving serialization cache
//!
//! Wraps one codec subtree and memoizes the normalized representation of
//! every data object whose type is in the caller-chosen cached set. Two
//! serializations of structurally equal values return reference-identical
//! subtrees for every memoized position, so callers further up the
//! pipeline can detect "no change" with a pointer comparison. Positions
//! outside the cached set are recomputed on every call.
//!
//! A caching codec is scoped to one logical caller and one schema
//! snapshot; it records the snapshot fingerprint it was created against
//! and refuses use with any other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::checksum::Fingerprint;
use crate::error::{CodecError, Result};
use crate::node::NormalizedNode;
use crate::typed::{TypeName, TypedObject};

use super::{EncodeCtx, NodeCodec, SerializeCache};

/// Memoizing wrapper around a codec subtree
pub struct CachingCodec {
    fingerprint: Fingerprint,
    subtree: Arc<NodeCodec>,
    cache: SerializeCache,
}

impl CachingCodec {
    pub(crate) fn new(
        fingerprint: Fingerprint,
        subtree: Arc<NodeCodec>,
        cached_types: HashSet<TypeName>,
    ) -> Self {
        Self {
            fingerprint,
            subtree,
            cache: SerializeCache {
                types: cached_types,
                entries: HashMap::new(),
            },
        }
    }

    /// Serialize a value, reusing memoized subtrees for every cached type.
    ///
    /// A cache miss is never an error; the subtree is computed, stored and
    /// returned.
    pub fn serialize(&mut self, value: &TypedObject) -> Result<Arc<NormalizedNode>> {
        let mut ctx = EncodeCtx {
            cache: Some(&mut self.cache),
        };
        self.subtree.encode_object_in(value, &mut ctx)
    }

    /// Fingerprint of the snapshot this codec was created against
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Number of memoized entries currently held
    pub fn len(&self) -> usize {
        self.cache.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.entries.is_empty()
    }

    pub(crate) fn verify_snapshot(&self, fingerprint: &Fingerprint) -> Result<()> {
        if &self.fingerprint != fingerprint {
            return Err(CodecError::SnapshotMismatch {
                expected: self.fingerprint.to_string(),
                actual: fingerprint.to_string(),
            });
        }
        Ok(())
    }
}
