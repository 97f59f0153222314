//! Normalized node tree: the generic, schema-described data representation
//!
//! Normalized nodes are produced and consumed only by the codec layer; the
//! storage/transport layers underneath understand nothing else. Children are
//! held behind `Arc` so the caching codec can reuse whole subtrees across
//! serializations; equality is structural throughout.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schema::QName;

/// A scalar value as it appears in leaves, leaf-list entries and list keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    /// Fixed-point decimal: unscaled value plus fraction digits
    Decimal64 { value: i64, fraction_digits: u8 },
    String(String),
    Binary(Vec<u8>),
    /// Presence-only value carried by `empty`-typed leaves
    Empty,
    /// An enumeration constant, in its schema-side spelling
    Enum(String),
    Bits(BTreeSet<String>),
    IdentityRef(QName),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Int8(v) => write!(f, "{v}"),
            ScalarValue::Int16(v) => write!(f, "{v}"),
            ScalarValue::Int32(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Uint8(v) => write!(f, "{v}"),
            ScalarValue::Uint16(v) => write!(f, "{v}"),
            ScalarValue::Uint32(v) => write!(f, "{v}"),
            ScalarValue::Uint64(v) => write!(f, "{v}"),
            ScalarValue::Decimal64 { value, fraction_digits } => {
                write!(f, "{value}e-{fraction_digits}")
            }
            ScalarValue::String(v) => write!(f, "{v}"),
            ScalarValue::Binary(v) => write!(f, "binary[{}]", v.len()),
            ScalarValue::Empty => write!(f, "(empty)"),
            ScalarValue::Enum(v) => write!(f, "{v}"),
            ScalarValue::Bits(v) => {
                let joined: Vec<&str> = v.iter().map(String::as_str).collect();
                write!(f, "{}", joined.join(" "))
            }
            ScalarValue::IdentityRef(q) => write!(f, "{q}"),
        }
    }
}

/// Canonical identifier of a concrete sibling-augmentation child set
///
/// Backed by an ordered set, so two augmentations with the same child names
/// produce the same identifier no matter the order the names were collected
/// in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AugmentationIdentifier(BTreeSet<QName>);

impl AugmentationIdentifier {
    pub fn new(child_names: impl IntoIterator<Item = QName>) -> Self {
        Self(child_names.into_iter().collect())
    }

    pub fn child_names(&self) -> &BTreeSet<QName> {
        &self.0
    }

    pub fn contains(&self, qname: &QName) -> bool {
        self.0.contains(qname)
    }
}

impl fmt::Display for AugmentationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "augment{{")?;
        for (i, q) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{q}")?;
        }
        write!(f, "}}")
    }
}

/// Identifier of one normalized node within its parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    /// Plain node: containers, leaves, choices, unkeyed list entries
    Node(QName),
    /// Keyed list entry, identified by its key leaf values
    ListEntry {
        qname: QName,
        keys: BTreeMap<QName, ScalarValue>,
    },
    /// Leaf-list entry, identified by its own value
    LeafListEntry { qname: QName, value: ScalarValue },
    /// Augmentation wrapper, identified by its child-name set
    Augmentation(AugmentationIdentifier),
}

impl NodeId {
    /// The qualified name of the identified node, if it has one
    pub fn qname(&self) -> Option<&QName> {
        match self {
            NodeId::Node(q) => Some(q),
            NodeId::ListEntry { qname, .. } => Some(qname),
            NodeId::LeafListEntry { qname, .. } => Some(qname),
            NodeId::Augmentation(_) => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Node(q) => write!(f, "{q}"),
            NodeId::ListEntry { qname, keys } => {
                write!(f, "{qname}[")?;
                for (i, (k, v)) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "]")
            }
            NodeId::LeafListEntry { qname, value } => write!(f, "{qname}[.={value}]"),
            NodeId::Augmentation(id) => write!(f, "{id}"),
        }
    }
}

/// Body of a normalized node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeBody {
    Leaf(ScalarValue),
    /// Unordered child set; insertion order is preserved for display only
    Container(Vec<Arc<NormalizedNode>>),
    /// Keyed list; `ordered` mirrors the schema's user-ordering flag
    Map {
        ordered: bool,
        entries: Vec<Arc<NormalizedNode>>,
    },
    UnkeyedList(Vec<Arc<NormalizedNode>>),
    LeafList {
        ordered: bool,
        entries: Vec<Arc<NormalizedNode>>,
    },
    /// Choice wrapper; holds the selected case's wrapper node
    Choice(Vec<Arc<NormalizedNode>>),
    /// Opaque payload passed through without schema-aware interpretation
    Anyxml(serde_json::Value),
}

/// One node of the normalized tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedNode {
    pub id: NodeId,
    pub body: NodeBody,
}

impl NormalizedNode {
    pub fn new(id: NodeId, body: NodeBody) -> Self {
        Self { id, body }
    }

    /// Leaf constructor
    pub fn leaf(qname: QName, value: ScalarValue) -> Self {
        Self::new(NodeId::Node(qname), NodeBody::Leaf(value))
    }

    /// Container constructor
    pub fn container(qname: QName, children: Vec<Arc<NormalizedNode>>) -> Self {
        Self::new(NodeId::Node(qname), NodeBody::Container(children))
    }

    /// Children of any container-shaped body, empty for leaves and anyxml
    pub fn children(&self) -> &[Arc<NormalizedNode>] {
        match &self.body {
            NodeBody::Container(c) => c,
            NodeBody::Map { entries, .. } => entries,
            NodeBody::UnkeyedList(c) => c,
            NodeBody::LeafList { entries, .. } => entries,
            NodeBody::Choice(c) => c,
            NodeBody::Leaf(_) | NodeBody::Anyxml(_) => &[],
        }
    }

    /// Find a direct child by qualified name
    pub fn child(&self, qname: &QName) -> Option<&Arc<NormalizedNode>> {
        self.children()
            .iter()
            .find(|c| c.id.qname() == Some(qname))
    }

    /// Find a direct augmentation wrapper child by identifier
    pub fn augmentation_child(
        &self,
        identifier: &AugmentationIdentifier,
    ) -> Option<&Arc<NormalizedNode>> {
        self.children()
            .iter()
            .find(|c| matches!(&c.id, NodeId::Augmentation(id) if id == identifier))
    }

    /// The leaf scalar, if this is a leaf node
    pub fn scalar(&self) -> Option<&ScalarValue> {
        match &self.body {
            NodeBody::Leaf(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_augmentation_identifier_order_independent() {
        let a = AugmentationIdentifier::new(vec![
            QName::new("aug", "simple-value"),
            QName::new("aug", "simple-type"),
        ]);
        let b = AugmentationIdentifier::new(vec![
            QName::new("aug", "simple-type"),
            QName::new("aug", "simple-value"),
        ]);
        assert_eq!(a, b);

        let c = AugmentationIdentifier::new(vec![QName::new("aug", "simple-type")]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_child_lookup() {
        let name = QName::new("demo", "name");
        let top = NormalizedNode::container(
            QName::new("demo", "top"),
            vec![Arc::new(NormalizedNode::leaf(
                name.clone(),
                ScalarValue::String("test".to_string()),
            ))],
        );
        assert!(top.child(&name).is_some());
        assert!(top.child(&QName::new("demo", "other")).is_none());
    }

    #[test]
    fn test_structural_equality() {
        let make = || {
            NormalizedNode::container(
                QName::new("demo", "top"),
                vec![Arc::new(NormalizedNode::leaf(
                    QName::new("demo", "name"),
                    ScalarValue::String("x".to_string()),
                ))],
            )
        };
        assert_eq!(make(), make());
    }
}
