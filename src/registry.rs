//! Codec registry: snapshot lifecycle and the public codec operations
//!
//! A `CodecSnapshot` bundles everything built from one schema tree: the
//! schema index, the compiled codec tree and the path codec. The registry
//! holds the current snapshot behind an atomic swap; readers always see a
//! complete snapshot, and in-flight operations keep the previous one alive
//! until they drop it.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::checksum::Fingerprint;
use crate::codec::cache::CachingCodec;
use crate::codec::{CodecTree, NodeCodec};
use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::index::SchemaIndex;
use crate::node::NormalizedNode;
use crate::path::{InstancePath, PathCodec, TypedPath};
use crate::schema::SchemaTree;
use crate::typed::{TypeLoader, TypeName, TypedObject};

/// Metadata of an adopted snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub fingerprint: Fingerprint,
    pub adopted_at: DateTime<Utc>,
}

/// Everything built for one schema snapshot; immutable once constructed
pub struct CodecSnapshot {
    info: SnapshotInfo,
    tree: Arc<SchemaTree>,
    index: Arc<SchemaIndex>,
    codecs: CodecTree,
    paths: PathCodec,
}

impl CodecSnapshot {
    /// Build a complete snapshot.
    ///
    /// Fails fast: validation, index or codec-tree errors abort the whole
    /// build and nothing is published.
    pub fn build(
        tree: SchemaTree,
        loader: &dyn TypeLoader,
        config: &CodecConfig,
    ) -> Result<Self> {
        let index = Arc::new(SchemaIndex::build(&tree, config)?);
        let codecs = CodecTree::build(&tree, &index, loader, config)?;
        let tree = Arc::new(tree);
        let paths = PathCodec::new(tree.clone(), index.clone());
        Ok(Self {
            info: SnapshotInfo {
                fingerprint: index.fingerprint().clone(),
                adopted_at: Utc::now(),
            },
            tree,
            index,
            codecs,
            paths,
        })
    }

    pub fn info(&self) -> &SnapshotInfo {
        &self.info
    }

    pub fn schema(&self) -> &Arc<SchemaTree> {
        &self.tree
    }

    pub fn index(&self) -> &Arc<SchemaIndex> {
        &self.index
    }

    /// Typed path → schema-level instance path
    pub fn to_instance_path(&self, typed: &TypedPath) -> Result<InstancePath> {
        self.paths.to_instance_path(typed)
    }

    /// Schema-level instance path → typed path
    pub fn to_typed_path(&self, instance: &InstancePath) -> Result<TypedPath> {
        self.paths.to_typed_path(instance)
    }

    /// Codec entry addressed by an instance path
    pub fn codec_at(&self, instance: &InstancePath) -> Result<Arc<NodeCodec>> {
        self.codecs.codec_at(instance)
    }

    /// Encode a typed object addressed by a typed path
    pub fn encode(
        &self,
        path: &TypedPath,
        value: &TypedObject,
    ) -> Result<(InstancePath, Arc<NormalizedNode>)> {
        let instance = self.paths.to_instance_path(path)?;
        let codec = self.codecs.codec_at(&instance)?;
        let node = codec.encode_object(value)?;
        Ok((instance, node))
    }

    /// Decode a normalized node addressed by an instance path
    pub fn decode(
        &self,
        instance: &InstancePath,
        node: &NormalizedNode,
    ) -> Result<(TypedPath, TypedObject)> {
        let typed = self.paths.to_typed_path(instance)?;
        let codec = self.codecs.codec_at(instance)?;
        let value = codec.decode_object(node)?;
        Ok((typed, value))
    }

    /// Create a caching codec over the subtree addressed by `path`,
    /// memoizing the given set of types
    pub fn caching_codec(
        &self,
        path: &TypedPath,
        cached_types: impl IntoIterator<Item = TypeName>,
    ) -> Result<CachingCodec> {
        let instance = self.paths.to_instance_path(path)?;
        let codec = self.codecs.codec_at(&instance)?;
        let types: HashSet<TypeName> = cached_types.into_iter().collect();
        Ok(CachingCodec::new(
            self.info.fingerprint.clone(),
            codec,
            types,
        ))
    }
}

/// Registry holding the currently adopted snapshot
#[derive(Default)]
pub struct CodecRegistry {
    current: ArcSwapOption<CodecSnapshot>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and atomically publish a new snapshot.
    ///
    /// Readers either see the previous complete snapshot or the new one,
    /// never an intermediate state. On failure the previous snapshot stays
    /// in place untouched.
    pub fn adopt(
        &self,
        tree: SchemaTree,
        loader: &dyn TypeLoader,
        config: &CodecConfig,
    ) -> Result<SnapshotInfo> {
        let snapshot = CodecSnapshot::build(tree, loader, config)?;
        let info = snapshot.info.clone();
        self.current.store(Some(Arc::new(snapshot)));
        info!(fingerprint = %info.fingerprint, "schema snapshot adopted");
        Ok(info)
    }

    /// The current snapshot; operations running against it stay valid
    /// across later swaps
    pub fn snapshot(&self) -> Result<Arc<CodecSnapshot>> {
        self.current.load_full().ok_or(CodecError::NoSchema)
    }

    pub fn encode(
        &self,
        path: &TypedPath,
        value: &TypedObject,
    ) -> Result<(InstancePath, Arc<NormalizedNode>)> {
        self.snapshot()?.encode(path, value)
    }

    pub fn decode(
        &self,
        instance: &InstancePath,
        node: &NormalizedNode,
    ) -> Result<(TypedPath, TypedObject)> {
        self.snapshot()?.decode(instance, node)
    }

    pub fn to_instance_path(&self, typed: &TypedPath) -> Result<InstancePath> {
        self.snapshot()?.to_instance_path(typed)
    }

    pub fn to_typed_path(&self, instance: &InstancePath) -> Result<TypedPath> {
        self.snapshot()?.to_typed_path(instance)
    }

    pub fn caching_codec(
        &self,
        path: &TypedPath,
        cached_types: impl IntoIterator<Item = TypeName>,
    ) -> Result<CachingCodec> {
        self.snapshot()?.caching_codec(path, cached_types)
    }

    /// Serialize through a caching codec, verifying it belongs to the
    /// current snapshot
    pub fn encode_cached(
        &self,
        path: &TypedPath,
        value: &TypedObject,
        cache: &mut CachingCodec,
    ) -> Result<(InstancePath, Arc<NormalizedNode>)> {
        let snapshot = self.snapshot()?;
        cache.verify_snapshot(&snapshot.info.fingerprint)?;
        let instance = snapshot.to_instance_path(path)?;
        let node = cache.serialize(value)?;
        Ok((instance, node))
    }
}
