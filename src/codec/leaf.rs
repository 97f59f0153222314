//! Scalar-level codecs: leaves, leaf-lists, typedefs, unions, leafrefs
//!
//! A leaf codec is compiled once per leaf schema node. Typedef-wrapped
//! values are unwrapped to their base representation on encode and
//! rewrapped on decode; enumeration constants translate between their
//! schema-side spelling and the generated variant name; a leafref delegates
//! to the codec of its target leaf so strong typing survives end to end.

use std::sync::Arc;

use crate::error::{CodecError, Result};
use crate::index::{EnumMapping, SchemaIndex};
use crate::index::names;
use crate::node::{NodeBody, NodeId, NormalizedNode, ScalarValue};
use crate::schema::{LeafType, QName, SchemaKind, SchemaTree};
use crate::typed::{TypeName, TypedValue};

// Leafref chains and typedef indirection are short in practice; this bound
// only exists to turn a definition cycle into an error.
const MAX_REF_DEPTH: usize = 8;

/// Compiled codec for one leaf schema node
pub struct LeafCodec {
    qname: QName,
    /// Wrapper type when the declared type is a typedef
    typedef_ty: Option<TypeName>,
    shape: LeafShape,
}

enum LeafShape {
    Scalar(LeafType),
    Enum(EnumMapping),
    IdentityRef(Arc<SchemaIndex>),
    Union(Vec<LeafCodec>),
    LeafRef(Box<LeafCodec>),
}

impl LeafCodec {
    pub fn build(
        qname: QName,
        decl: &LeafType,
        tree: &SchemaTree,
        index: &Arc<SchemaIndex>,
    ) -> Result<Self> {
        Self::build_at(qname, decl, tree, index, 0)
    }

    fn build_at(
        qname: QName,
        decl: &LeafType,
        tree: &SchemaTree,
        index: &Arc<SchemaIndex>,
        depth: usize,
    ) -> Result<Self> {
        if depth > MAX_REF_DEPTH {
            return Err(CodecError::Validation(format!(
                "reference chain too deep at leaf {qname}"
            )));
        }

        let typedef_ty = match decl {
            LeafType::Typedef(name) => {
                Some(names::module_type_name(&name.module, name.local_name()))
            }
            _ => None,
        };
        let base = tree.base_leaf_type(decl)?;

        let shape = match base {
            LeafType::Enumeration(values) => LeafShape::Enum(EnumMapping::for_values(values)),
            LeafType::IdentityRef => LeafShape::IdentityRef(index.clone()),
            LeafType::Union(members) => {
                let codecs = members
                    .iter()
                    .map(|m| Self::build_at(qname.clone(), m, tree, index, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                LeafShape::Union(codecs)
            }
            LeafType::LeafRef(target) => {
                let target_node =
                    tree.resolve(target)
                        .ok_or_else(|| CodecError::SchemaNodeNotFound {
                            path: target.clone(),
                        })?;
                let target_ty = match &target_node.kind {
                    SchemaKind::Leaf { ty } => ty,
                    _ => {
                        return Err(CodecError::Validation(format!(
                            "leafref at {qname} targets non-leaf {target}"
                        )))
                    }
                };
                let inner = Self::build_at(
                    target_node.qname.clone(),
                    target_ty,
                    tree,
                    index,
                    depth + 1,
                )?;
                LeafShape::LeafRef(Box::new(inner))
            }
            other => LeafShape::Scalar(other.clone()),
        };

        Ok(Self {
            qname,
            typedef_ty,
            shape,
        })
    }

    pub fn qname(&self) -> &QName {
        &self.qname
    }

    /// Whether this codec accepts the supplied typed value; the union
    /// encode path uses this as its member guard
    pub fn accepts(&self, value: &TypedValue) -> bool {
        self.encode(value).is_ok()
    }

    /// Typed value → normalized scalar
    pub fn encode(&self, value: &TypedValue) -> Result<ScalarValue> {
        let scalar = match value {
            TypedValue::Scalar(s) => s,
            TypedValue::Typedef { ty, value } => {
                match &self.typedef_ty {
                    Some(expected) if expected == ty => value,
                    _ => {
                        return Err(CodecError::ScalarMismatch {
                            leaf: self.qname.clone(),
                            value: format!("{ty} wrapper"),
                        })
                    }
                }
            }
            other => {
                return Err(CodecError::ScalarMismatch {
                    leaf: self.qname.clone(),
                    value: format!("{other:?}"),
                })
            }
        };
        self.encode_scalar(scalar)
    }

    fn encode_scalar(&self, scalar: &ScalarValue) -> Result<ScalarValue> {
        match &self.shape {
            LeafShape::Scalar(base) => {
                if scalar_matches(base, scalar) {
                    Ok(scalar.clone())
                } else {
                    Err(self.mismatch(scalar))
                }
            }
            LeafShape::Enum(mapping) => match scalar {
                ScalarValue::Enum(variant) => mapping
                    .constant_for(variant)
                    .map(|c| ScalarValue::Enum(c.to_string()))
                    .ok_or_else(|| self.mismatch(scalar)),
                _ => Err(self.mismatch(scalar)),
            },
            LeafShape::IdentityRef(index) => match scalar {
                ScalarValue::IdentityRef(qname) => {
                    if index.identity_type(qname).is_some() {
                        Ok(scalar.clone())
                    } else {
                        Err(CodecError::UnknownIdentity {
                            qname: qname.clone(),
                        })
                    }
                }
                _ => Err(self.mismatch(scalar)),
            },
            LeafShape::Union(members) => {
                // First member whose guard accepts the runtime value wins.
                for member in members {
                    if let Ok(encoded) = member.encode_scalar(scalar) {
                        return Ok(encoded);
                    }
                }
                Err(self.mismatch(scalar))
            }
            LeafShape::LeafRef(target) => target.encode_scalar(scalar),
        }
    }

    /// Normalized scalar → typed value, rewrapping typedef instances
    pub fn decode(&self, scalar: &ScalarValue) -> Result<TypedValue> {
        let decoded = self.decode_scalar(scalar)?;
        Ok(match &self.typedef_ty {
            Some(ty) => match decoded {
                TypedValue::Scalar(value) => TypedValue::Typedef {
                    ty: ty.clone(),
                    value,
                },
                wrapped => wrapped,
            },
            None => decoded,
        })
    }

    fn decode_scalar(&self, scalar: &ScalarValue) -> Result<TypedValue> {
        match &self.shape {
            LeafShape::Scalar(base) => {
                if scalar_matches(base, scalar) {
                    Ok(TypedValue::Scalar(scalar.clone()))
                } else {
                    Err(self.mismatch(scalar))
                }
            }
            LeafShape::Enum(mapping) => match scalar {
                ScalarValue::Enum(constant) => mapping
                    .variant_for(constant)
                    .map(|v| TypedValue::Scalar(ScalarValue::Enum(v.to_string())))
                    .ok_or_else(|| self.mismatch(scalar)),
                _ => Err(self.mismatch(scalar)),
            },
            LeafShape::IdentityRef(index) => match scalar {
                ScalarValue::IdentityRef(qname) => {
                    if index.identity_type(qname).is_some() {
                        Ok(TypedValue::Scalar(scalar.clone()))
                    } else {
                        Err(CodecError::UnknownIdentity {
                            qname: qname.clone(),
                        })
                    }
                }
                _ => Err(self.mismatch(scalar)),
            },
            LeafShape::Union(members) => {
                for member in members {
                    if let Ok(decoded) = member.decode(scalar) {
                        return Ok(decoded);
                    }
                }
                Err(self.mismatch(scalar))
            }
            // The reference target's codec interprets the value; the raw
            // string is never re-parsed independently.
            LeafShape::LeafRef(target) => target.decode(scalar),
        }
    }

    fn mismatch(&self, scalar: &ScalarValue) -> CodecError {
        CodecError::ScalarMismatch {
            leaf: self.qname.clone(),
            value: scalar.to_string(),
        }
    }
}

/// Compiled codec for a leaf-list schema node
pub struct LeafListCodec {
    qname: QName,
    ordered: bool,
    leaf: LeafCodec,
}

impl LeafListCodec {
    pub fn build(
        qname: QName,
        decl: &LeafType,
        ordered: bool,
        tree: &SchemaTree,
        index: &Arc<SchemaIndex>,
    ) -> Result<Self> {
        Ok(Self {
            qname: qname.clone(),
            ordered,
            leaf: LeafCodec::build(qname, decl, tree, index)?,
        })
    }

    pub fn encode(&self, values: &[ScalarValue]) -> Result<NormalizedNode> {
        let mut entries = Vec::with_capacity(values.len());
        for value in values {
            let encoded = self.leaf.encode_scalar(value)?;
            entries.push(Arc::new(NormalizedNode::new(
                NodeId::LeafListEntry {
                    qname: self.qname.clone(),
                    value: encoded.clone(),
                },
                NodeBody::Leaf(encoded),
            )));
        }
        Ok(NormalizedNode::new(
            NodeId::Node(self.qname.clone()),
            NodeBody::LeafList {
                ordered: self.ordered,
                entries,
            },
        ))
    }

    pub fn decode(&self, node: &NormalizedNode) -> Result<Vec<ScalarValue>> {
        let entries = match &node.body {
            NodeBody::LeafList { entries, .. } => entries,
            _ => {
                return Err(CodecError::ScalarMismatch {
                    leaf: self.qname.clone(),
                    value: format!("{}", node.id),
                })
            }
        };
        let mut values = Vec::with_capacity(entries.len());
        for entry in entries {
            let scalar = entry.scalar().ok_or_else(|| CodecError::ScalarMismatch {
                leaf: self.qname.clone(),
                value: format!("{}", entry.id),
            })?;
            match self.leaf.decode_scalar(scalar)? {
                TypedValue::Scalar(v) => values.push(v),
                TypedValue::Typedef { value, .. } => values.push(value),
                _ => unreachable!("scalar decode yields scalar shapes"),
            }
        }
        Ok(values)
    }
}

fn scalar_matches(base: &LeafType, value: &ScalarValue) -> bool {
    match (base, value) {
        (LeafType::Bool, ScalarValue::Bool(_)) => true,
        (LeafType::Int8, ScalarValue::Int8(_)) => true,
        (LeafType::Int16, ScalarValue::Int16(_)) => true,
        (LeafType::Int32, ScalarValue::Int32(_)) => true,
        (LeafType::Int64, ScalarValue::Int64(_)) => true,
        (LeafType::Uint8, ScalarValue::Uint8(_)) => true,
        (LeafType::Uint16, ScalarValue::Uint16(_)) => true,
        (LeafType::Uint32, ScalarValue::Uint32(_)) => true,
        (LeafType::Uint64, ScalarValue::Uint64(_)) => true,
        (
            LeafType::Decimal64 { fraction_digits },
            ScalarValue::Decimal64 {
                fraction_digits: actual,
                ..
            },
        ) => fraction_digits == actual,
        (LeafType::String, ScalarValue::String(_)) => true,
        (LeafType::Binary, ScalarValue::Binary(_)) => true,
        (LeafType::Empty, ScalarValue::Empty) => true,
        (LeafType::Bits(declared), ScalarValue::Bits(set)) => {
            set.iter().all(|b| declared.contains(b))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodecConfig;
    use crate::schema::{SchemaNode, SchemaPath, TypedefDef};

    fn tree_with_typedef() -> SchemaTree {
        SchemaTree {
            roots: vec![SchemaNode {
                qname: QName::new("demo", "top"),
                kind: SchemaKind::Container,
                children: vec![
                    SchemaNode {
                        qname: QName::new("demo", "name"),
                        kind: SchemaKind::Leaf {
                            ty: LeafType::String,
                        },
                        children: vec![],
                        original: None,
                        augments: vec![],
                    },
                    SchemaNode {
                        qname: QName::new("demo", "flag"),
                        kind: SchemaKind::Leaf {
                            ty: LeafType::Typedef(QName::new("demo", "my-empty")),
                        },
                        children: vec![],
                        original: None,
                        augments: vec![],
                    },
                ],
                original: None,
                augments: vec![],
            }],
            typedefs: vec![TypedefDef {
                qname: QName::new("demo", "my-empty"),
                base: LeafType::Empty,
            }],
            ..Default::default()
        }
    }

    fn build_index(tree: &SchemaTree) -> Arc<SchemaIndex> {
        Arc::new(SchemaIndex::build(tree, &CodecConfig::default()).unwrap())
    }

    #[test]
    fn test_typedef_unwrap_rewrap() {
        let tree = tree_with_typedef();
        let index = build_index(&tree);
        let codec = LeafCodec::build(
            QName::new("demo", "flag"),
            &LeafType::Typedef(QName::new("demo", "my-empty")),
            &tree,
            &index,
        )
        .unwrap();

        let wrapped = TypedValue::Typedef {
            ty: TypeName::new("demo.MyEmpty"),
            value: ScalarValue::Empty,
        };
        // Encodes to the same scalar representation as the built-in type
        let encoded = codec.encode(&wrapped).unwrap();
        assert_eq!(encoded, ScalarValue::Empty);

        // Decodes back to the typedef-wrapped instance, not the raw scalar
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, wrapped);
    }

    #[test]
    fn test_enum_translation() {
        let tree = tree_with_typedef();
        let index = build_index(&tree);
        let codec = LeafCodec::build(
            QName::new("demo", "kind"),
            &LeafType::Enumeration(vec!["my-value".to_string(), "other".to_string()]),
            &tree,
            &index,
        )
        .unwrap();

        let typed = TypedValue::Scalar(ScalarValue::Enum("MyValue".to_string()));
        let encoded = codec.encode(&typed).unwrap();
        assert_eq!(encoded, ScalarValue::Enum("my-value".to_string()));
        assert_eq!(codec.decode(&encoded).unwrap(), typed);

        let unknown = TypedValue::Scalar(ScalarValue::Enum("Missing".to_string()));
        assert!(codec.encode(&unknown).is_err());
    }

    #[test]
    fn test_union_first_accepting_member() {
        let tree = tree_with_typedef();
        let index = build_index(&tree);
        let codec = LeafCodec::build(
            QName::new("demo", "id"),
            &LeafType::Union(vec![LeafType::Uint32, LeafType::String]),
            &tree,
            &index,
        )
        .unwrap();

        let numeric = codec
            .encode(&TypedValue::Scalar(ScalarValue::Uint32(16)))
            .unwrap();
        assert_eq!(numeric, ScalarValue::Uint32(16));

        let text = codec
            .encode(&TypedValue::Scalar(ScalarValue::String("x".to_string())))
            .unwrap();
        assert_eq!(text, ScalarValue::String("x".to_string()));

        assert!(codec.encode(&TypedValue::Scalar(ScalarValue::Bool(true))).is_err());
    }

    #[test]
    fn test_leafref_resolves_through_target() {
        let tree = tree_with_typedef();
        let index = build_index(&tree);
        let target = SchemaPath::of(QName::new("demo", "top")).child(QName::new("demo", "name"));
        let codec = LeafCodec::build(
            QName::new("demo", "name-ref"),
            &LeafType::LeafRef(target),
            &tree,
            &index,
        )
        .unwrap();

        let value = TypedValue::Scalar(ScalarValue::String("test".to_string()));
        let encoded = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), value);
        assert!(codec.encode(&TypedValue::Scalar(ScalarValue::Uint8(1))).is_err());
    }

    #[test]
    fn test_leaf_list_round_trip() {
        let tree = tree_with_typedef();
        let index = build_index(&tree);
        let codec = LeafListCodec::build(
            QName::new("demo", "tags"),
            &LeafType::String,
            true,
            &tree,
            &index,
        )
        .unwrap();

        let values = vec![
            ScalarValue::String("a".to_string()),
            ScalarValue::String("b".to_string()),
        ];
        let node = codec.encode(&values).unwrap();
        match &node.body {
            NodeBody::LeafList { ordered, entries } => {
                assert!(*ordered);
                assert_eq!(entries.len(), 2);
            }
            other => panic!("expected leaf-list body, got {other:?}"),
        }
        assert_eq!(codec.decode(&node).unwrap(), values);
    }
}
