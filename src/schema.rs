//! Resolved schema model consumed by the codec
//!
//! This is the input contract from the schema-model provider: a fully
//! resolved tree (node kinds, qualified names, key definitions, augmentation
//! targets, `uses` indirection already flattened into the effective tree).
//! The model is serde-deserializable so schema universes can be loaded from
//! JSON produced by the external parser pipeline.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// A qualified name: module name plus local name
///
/// Serialized as `"module:local-name"`. Ordering is lexicographic on
/// (module, name) so name sets are deterministic regardless of construction
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct QName {
    pub module: String,
    pub name: String,
}

impl QName {
    /// Create a new qualified name
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// The local (module-unqualified) name
    pub fn local_name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

impl From<QName> for String {
    fn from(q: QName) -> Self {
        q.to_string()
    }
}

impl TryFrom<String> for QName {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.split_once(':') {
            Some((module, name)) if !module.is_empty() && !name.is_empty() => {
                Ok(QName::new(module, name))
            }
            _ => Err(format!("invalid qualified name {s:?}, expected module:name")),
        }
    }
}

/// A position in the schema tree: the qualified names from a root down
///
/// Paths rooted at a grouping declaration start with the grouping's QName;
/// such paths identify the *defining* site of types instantiated through
/// `uses`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct SchemaPath(pub Vec<QName>);

impl SchemaPath {
    /// The empty (root) path
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// A single-step path
    pub fn of(qname: QName) -> Self {
        Self(vec![qname])
    }

    /// Extend this path by one step
    pub fn child(&self, qname: QName) -> Self {
        let mut segments = self.0.clone();
        segments.push(qname);
        Self(segments)
    }

    /// The last step, if any
    pub fn last(&self) -> Option<&QName> {
        self.0.last()
    }

    /// The path with its last step removed
    pub fn parent(&self) -> Self {
        let mut segments = self.0.clone();
        segments.pop();
        Self(segments)
    }

    pub fn segments(&self) -> &[QName] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for q in &self.0 {
            write!(f, "/{q}")?;
        }
        Ok(())
    }
}

/// Scalar leaf type, after `uses`/refine resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Decimal64 { fraction_digits: u8 },
    String,
    Binary,
    Empty,
    Enumeration(Vec<String>),
    Bits(Vec<String>),
    IdentityRef,
    Union(Vec<LeafType>),
    /// Reference to another leaf; the value space is the target leaf's
    LeafRef(SchemaPath),
    /// Named wrapper around a base type, defined at module level
    Typedef(QName),
}

/// Kind of a schema tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SchemaKind {
    Container,
    List {
        #[serde(default)]
        keys: Vec<QName>,
        #[serde(default)]
        ordered: bool,
    },
    Leaf {
        ty: LeafType,
    },
    LeafList {
        ty: LeafType,
        #[serde(default)]
        ordered: bool,
    },
    Choice,
    Case,
    /// Opaque content with no schema-aware interpretation
    AnyXml,
}

/// An augmentation applied to a node in the effective tree
///
/// The children named here are already merged into the target node's child
/// list; this block records which of them the augmentation contributed and
/// where the augmentation was originally declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentBlock {
    /// Module that declared the augmentation
    pub module: String,
    /// Child names as declared at the original declaration site
    pub children: Vec<QName>,
    /// Explicit disambiguation tag carried by the augmentation, used
    /// verbatim as the generated type's local name when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_override: Option<String>,
    /// Original declaration site when the augmentation is nested inside a
    /// reused grouping; the generated type binds there, not at this use site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<SchemaPath>,
}

/// One node of the resolved schema tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaNode {
    pub qname: QName,
    #[serde(flatten)]
    pub kind: SchemaKind,
    #[serde(default)]
    pub children: Vec<SchemaNode>,
    /// Original declaration site when this node was added by `uses`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<SchemaPath>,
    /// Augmentations whose children are merged into this node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub augments: Vec<AugmentBlock>,
}

impl SchemaNode {
    /// Direct child by qualified name
    pub fn child(&self, qname: &QName) -> Option<&SchemaNode> {
        self.children.iter().find(|c| &c.qname == qname)
    }

    /// Direct child by local name only, used as a fallback when a
    /// cross-module copy/rebuild renamed the module of augmentation children
    pub fn child_by_local_name(&self, local: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|c| c.qname.local_name() == local)
    }

    /// Whether this node kind may carry augmentations
    pub fn is_augmentable(&self) -> bool {
        matches!(
            self.kind,
            SchemaKind::Container | SchemaKind::List { .. } | SchemaKind::Case | SchemaKind::Choice
        )
    }

    /// List keys, empty for unkeyed lists and non-lists
    pub fn list_keys(&self) -> &[QName] {
        match &self.kind {
            SchemaKind::List { keys, .. } => keys,
            _ => &[],
        }
    }
}

/// Module-level named wrapper around a base leaf type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedefDef {
    pub qname: QName,
    pub base: LeafType,
}

/// Module-level identity definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDef {
    pub qname: QName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<QName>,
}

/// Reusable schema fragment; instantiated nodes point back here through
/// their `original` path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingDef {
    pub qname: QName,
    #[serde(default)]
    pub children: Vec<SchemaNode>,
}

/// A schema module's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<NaiveDate>,
}

/// The complete resolved schema for one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchemaTree {
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub roots: Vec<SchemaNode>,
    #[serde(default)]
    pub typedefs: Vec<TypedefDef>,
    #[serde(default)]
    pub identities: Vec<IdentityDef>,
    #[serde(default)]
    pub groupings: Vec<GroupingDef>,
}

impl SchemaTree {
    /// Resolve a path against the data tree roots
    pub fn node_at(&self, path: &SchemaPath) -> Option<&SchemaNode> {
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        let mut node = self.roots.iter().find(|r| &r.qname == first)?;
        for q in segments {
            node = node.child(q)?;
        }
        Some(node)
    }

    /// Resolve a path whose first segment names a grouping declaration
    pub fn grouping_node_at(&self, path: &SchemaPath) -> Option<&SchemaNode> {
        let segments = path.segments();
        let grouping = self.grouping(segments.first()?)?;
        let first_child = segments.get(1)?;
        let mut node = grouping.children.iter().find(|c| &c.qname == first_child)?;
        for q in &segments[2..] {
            node = node.child(q)?;
        }
        Some(node)
    }

    /// Resolve a path against roots first, then groupings
    pub fn resolve(&self, path: &SchemaPath) -> Option<&SchemaNode> {
        self.node_at(path).or_else(|| self.grouping_node_at(path))
    }

    pub fn typedef(&self, qname: &QName) -> Option<&TypedefDef> {
        self.typedefs.iter().find(|t| &t.qname == qname)
    }

    pub fn identity(&self, qname: &QName) -> Option<&IdentityDef> {
        self.identities.iter().find(|i| &i.qname == qname)
    }

    pub fn grouping(&self, qname: &QName) -> Option<&GroupingDef> {
        self.groupings.iter().find(|g| &g.qname == qname)
    }

    /// Resolve a typedef chain down to its base built-in type
    pub fn base_leaf_type<'a>(&'a self, ty: &'a LeafType) -> Result<&'a LeafType> {
        let mut cur = ty;
        // Typedef chains are short; guard against definition cycles anyway.
        for _ in 0..32 {
            match cur {
                LeafType::Typedef(qname) => {
                    let def = self
                        .typedef(qname)
                        .ok_or_else(|| CodecError::Validation(format!("unknown typedef {qname}")))?;
                    cur = &def.base;
                }
                other => return Ok(other),
            }
        }
        Err(CodecError::Validation("typedef chain too deep".to_string()))
    }

    /// Structural validation, run before any index or codec construction.
    ///
    /// Collects every finding and fails with the full list; a tree that
    /// fails here must never produce a partial snapshot.
    pub fn validate(&self) -> Result<()> {
        let mut findings = Vec::new();
        for root in &self.roots {
            validate_node(self, root, &SchemaPath::root(), &mut findings);
        }
        for grouping in &self.groupings {
            let base = SchemaPath::of(grouping.qname.clone());
            for child in &grouping.children {
                validate_node(self, child, &base, &mut findings);
            }
        }
        for typedef in &self.typedefs {
            validate_leaf_type(self, &typedef.base, &typedef.qname, &mut findings);
        }
        for identity in &self.identities {
            if let Some(base) = &identity.base {
                if self.identity(base).is_none() {
                    findings.push(format!(
                        "identity {} has unknown base {base}",
                        identity.qname
                    ));
                }
            }
        }
        if findings.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Validation(findings.join("; ")))
        }
    }
}

fn validate_node(
    tree: &SchemaTree,
    node: &SchemaNode,
    parent: &SchemaPath,
    findings: &mut Vec<String>,
) {
    let path = parent.child(node.qname.clone());

    let mut seen = std::collections::HashSet::new();
    for child in &node.children {
        if !seen.insert(&child.qname) {
            findings.push(format!("duplicate child {} under {path}", child.qname));
        }
    }

    if let SchemaKind::List { keys, .. } = &node.kind {
        for key in keys {
            match node.child(key) {
                Some(child) if matches!(child.kind, SchemaKind::Leaf { .. }) => {}
                Some(_) => findings.push(format!("list key {key} of {path} is not a leaf")),
                None => findings.push(format!("list key {key} missing from {path}")),
            }
        }
    }

    match &node.kind {
        SchemaKind::Leaf { ty } | SchemaKind::LeafList { ty, .. } => {
            validate_leaf_type(tree, ty, &node.qname, findings);
        }
        _ => {}
    }

    if !node.augments.is_empty() && !node.is_augmentable() {
        findings.push(format!("{path} carries augmentations but is not augmentable"));
    }
    for aug in &node.augments {
        for child in &aug.children {
            if node.child(child).is_none() && node.child_by_local_name(child.local_name()).is_none()
            {
                findings.push(format!(
                    "augmentation child {child} not merged into target {path}"
                ));
            }
        }
        if let Some(original) = &aug.original {
            if tree.resolve(original).is_none() {
                findings.push(format!(
                    "augmentation of {path} has unresolvable original {original}"
                ));
            }
        }
    }

    if let Some(original) = &node.original {
        if tree.resolve(original).is_none() {
            findings.push(format!("{path} has unresolvable uses-original {original}"));
        }
    }

    for child in &node.children {
        validate_node(tree, child, &path, findings);
    }
}

fn validate_leaf_type(tree: &SchemaTree, ty: &LeafType, owner: &QName, findings: &mut Vec<String>) {
    match ty {
        LeafType::Typedef(qname) => {
            if tree.typedef(qname).is_none() {
                findings.push(format!("leaf {owner} references unknown typedef {qname}"));
            }
        }
        LeafType::Union(members) => {
            if members.is_empty() {
                findings.push(format!("leaf {owner} has an empty union"));
            }
            for member in members {
                validate_leaf_type(tree, member, owner, findings);
            }
        }
        LeafType::LeafRef(target) => {
            match tree.resolve(target) {
                Some(node) if matches!(node.kind, SchemaKind::Leaf { .. }) => {}
                Some(_) => findings.push(format!(
                    "leafref in {owner} targets non-leaf {target}"
                )),
                None => findings.push(format!(
                    "leafref in {owner} targets unresolvable {target}"
                )),
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(module: &str, name: &str, ty: LeafType) -> SchemaNode {
        SchemaNode {
            qname: QName::new(module, name),
            kind: SchemaKind::Leaf { ty },
            children: vec![],
            original: None,
            augments: vec![],
        }
    }

    #[test]
    fn test_qname_string_form() {
        let q = QName::new("demo", "top");
        assert_eq!(q.to_string(), "demo:top");
        let parsed = QName::try_from("demo:top".to_string()).unwrap();
        assert_eq!(parsed, q);
        assert!(QName::try_from("no-colon".to_string()).is_err());
    }

    #[test]
    fn test_path_display() {
        let path = SchemaPath::of(QName::new("demo", "top")).child(QName::new("demo", "nested"));
        assert_eq!(path.to_string(), "/demo:top/demo:nested");
    }

    #[test]
    fn test_node_lookup() {
        let tree = SchemaTree {
            roots: vec![SchemaNode {
                qname: QName::new("demo", "top"),
                kind: SchemaKind::Container,
                children: vec![leaf("demo", "name", LeafType::String)],
                original: None,
                augments: vec![],
            }],
            ..Default::default()
        };
        let path = SchemaPath::of(QName::new("demo", "top")).child(QName::new("demo", "name"));
        assert!(tree.node_at(&path).is_some());
        assert!(tree.node_at(&SchemaPath::of(QName::new("demo", "nope"))).is_none());
    }

    #[test]
    fn test_validate_missing_list_key() {
        let tree = SchemaTree {
            roots: vec![SchemaNode {
                qname: QName::new("demo", "items"),
                kind: SchemaKind::List {
                    keys: vec![QName::new("demo", "id")],
                    ordered: false,
                },
                children: vec![],
                original: None,
                augments: vec![],
            }],
            ..Default::default()
        };
        let err = tree.validate().unwrap_err();
        assert!(err.to_string().contains("list key"));
    }

    #[test]
    fn test_validate_typedef_chain() {
        let tree = SchemaTree {
            roots: vec![leaf(
                "demo",
                "flag",
                LeafType::Typedef(QName::new("demo", "my-empty")),
            )],
            typedefs: vec![TypedefDef {
                qname: QName::new("demo", "my-empty"),
                base: LeafType::Empty,
            }],
            ..Default::default()
        };
        tree.validate().unwrap();
        let query = LeafType::Typedef(QName::new("demo", "my-empty"));
        let base = tree
            .base_leaf_type(&query)
            .unwrap();
        assert_eq!(base, &LeafType::Empty);
    }
}
