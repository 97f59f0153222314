//! Binding Codec
//!
//! A schema-driven bidirectional codec between typed object graphs and the
//! generic normalized node trees understood by storage and transport
//! layers.
//!
//! ## Features
//!
//! - **Schema Index**: immutable bijection between schema positions and
//!   generated type descriptors, including multiply-instantiated grouping
//!   content and cross-module augmentations
//! - **Codec Tree**: recursive per-node codecs compiled once per schema
//!   snapshot, dispatching choices on runtime case types and merging
//!   augmentations back into their owning objects
//! - **Path Codec**: typed path ↔ schema path conversion with wildcard
//!   decomposition and case re-attachment
//! - **Caching Codec**: identity-preserving memoization so repeated
//!   serializations of equal values share one normalized subtree
//! - **Atomic Snapshots**: schema reloads swap a complete snapshot; readers
//!   never observe a partial build
//!
//! ## Architecture
//!
//! ```text
//! SchemaTree ──► SchemaIndex ──► CodecTree ──► CodecSnapshot
//!                    │               │              │
//!              AugmentationResolver  │         CodecRegistry (arc-swap)
//!                                PathCodec
//! ```

pub mod augment;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod node;
pub mod path;
pub mod registry;
pub mod schema;
pub mod typed;

pub use augment::AugmentationResolver;
pub use checksum::Fingerprint;
pub use codec::cache::CachingCodec;
pub use codec::{CodecTree, NodeCodec};
pub use config::CodecConfig;
pub use error::{CodecError, Result};
pub use index::SchemaIndex;
pub use node::{AugmentationIdentifier, NodeBody, NodeId, NormalizedNode, ScalarValue};
pub use path::{InstancePath, PathCodec, PathStep, TypedPath, TypedStep};
pub use registry::{CodecRegistry, CodecSnapshot, SnapshotInfo};
pub use schema::{LeafType, QName, SchemaKind, SchemaNode, SchemaPath, SchemaTree};
pub use typed::{
    GeneratedTypes, TypeDescriptor, TypeKind, TypeLoader, TypeName, TypedObject, TypedValue,
};
