//! Path codec: typed paths ↔ schema-level instance paths
//!
//! A typed path addresses data through generated types (case steps
//! included, since the object model needs them for disambiguation); an
//! instance path is the schema-level form: qualified-name steps with key
//! predicates on keyed lists. Case steps carry no instance-path step of
//! their own, so the reverse direction re-attaches case context by asking
//! the index which case a child resolves to.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::index::SchemaIndex;
use crate::node::ScalarValue;
use crate::schema::{QName, SchemaKind, SchemaNode, SchemaPath, SchemaTree};
use crate::typed::TypeName;

/// One step of a schema-level instance path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStep {
    /// Container, unkeyed list or leaf step
    Node(QName),
    /// Keyed list entry with a full key
    Entry {
        qname: QName,
        keys: BTreeMap<QName, ScalarValue>,
    },
    /// All entries of a list; only valid as the final step
    Wildcard(QName),
}

impl PathStep {
    pub fn qname(&self) -> &QName {
        match self {
            PathStep::Node(q) => q,
            PathStep::Entry { qname, .. } => qname,
            PathStep::Wildcard(q) => q,
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Node(q) => write!(f, "{q}"),
            PathStep::Entry { qname, keys } => {
                write!(f, "{qname}")?;
                for (k, v) in keys {
                    write!(f, "[{k}={v}]")?;
                }
                Ok(())
            }
            PathStep::Wildcard(q) => write!(f, "{q}[*]"),
        }
    }
}

/// Schema-level path to a data node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InstancePath {
    pub steps: Vec<PathStep>,
}

impl InstancePath {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

/// One step of a typed path: a generated type plus an optional key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedStep {
    pub ty: TypeName,
    pub key: Option<BTreeMap<QName, ScalarValue>>,
}

/// Path through the generated-type universe
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypedPath {
    pub steps: Vec<TypedStep>,
}

impl TypedPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an unkeyed step
    pub fn child(mut self, ty: TypeName) -> Self {
        self.steps.push(TypedStep { ty, key: None });
        self
    }

    /// Append a keyed list-entry step
    pub fn child_keyed(mut self, ty: TypeName, key: BTreeMap<QName, ScalarValue>) -> Self {
        self.steps.push(TypedStep { ty, key: Some(key) });
        self
    }

    /// True when every keyed-list step carries a full key, i.e. the path
    /// needs no wildcard decomposition
    pub fn is_exact(&self, index: &SchemaIndex) -> bool {
        self.steps.iter().all(|s| {
            s.key.is_some()
                || index
                    .descriptor(&s.ty)
                    .map_or(true, |d| d.keys.is_empty())
        })
    }
}

/// Bidirectional typed ↔ instance path conversion for one snapshot
pub struct PathCodec {
    tree: Arc<SchemaTree>,
    index: Arc<SchemaIndex>,
}

impl PathCodec {
    pub fn new(tree: Arc<SchemaTree>, index: Arc<SchemaIndex>) -> Self {
        Self { tree, index }
    }

    /// Typed → instance conversion.
    ///
    /// A keyed-list step without a key decomposes into the exact steps up
    /// to the list followed by a wildcard step; anything after a wildcard
    /// is rejected.
    pub fn to_instance_path(&self, typed: &TypedPath) -> Result<InstancePath> {
        // Fully keyed paths skip the wildcard bookkeeping entirely.
        if typed.is_exact(&self.index) {
            return self.convert_steps(typed, false);
        }
        self.convert_steps(typed, true)
    }

    fn convert_steps(&self, typed: &TypedPath, track_wildcard: bool) -> Result<InstancePath> {
        let mut steps = Vec::with_capacity(typed.steps.len());
        let mut cursor = Cursor::root(&self.tree);
        let mut wildcard: Option<QName> = None;

        for step in &typed.steps {
            if track_wildcard {
                if let Some(qname) = &wildcard {
                    return Err(CodecError::TrailingStepsAfterWildcard {
                        qname: qname.clone(),
                    });
                }
            }
            let found = self.find_typed_child(&cursor, &step.ty)?;
            let node = found.node;
            match &node.kind {
                SchemaKind::List { keys, .. } if !keys.is_empty() => match &step.key {
                    Some(values) => {
                        for key in keys {
                            if !values.contains_key(key) {
                                return Err(CodecError::MissingKey {
                                    list: node.qname.clone(),
                                    key: key.clone(),
                                });
                            }
                        }
                        steps.push(PathStep::Entry {
                            qname: node.qname.clone(),
                            keys: values.clone(),
                        });
                    }
                    None => {
                        steps.push(PathStep::Wildcard(node.qname.clone()));
                        wildcard = Some(node.qname.clone());
                    }
                },
                SchemaKind::Case => {
                    // Case steps disambiguate the typed side only; the
                    // instance path loses them.
                }
                _ => steps.push(PathStep::Node(node.qname.clone())),
            }
            cursor = found.cursor;
        }
        Ok(InstancePath::new(steps))
    }

    /// Instance → typed conversion, re-attaching case context for children
    /// living under a choice.
    pub fn to_typed_path(&self, instance: &InstancePath) -> Result<TypedPath> {
        let mut typed = TypedPath::new();
        let mut cursor = Cursor::root(&self.tree);
        let mut wildcard: Option<QName> = None;

        for step in &instance.steps {
            if let Some(qname) = &wildcard {
                return Err(CodecError::TrailingStepsAfterWildcard {
                    qname: qname.clone(),
                });
            }
            let qname = step.qname();
            let found = self
                .find_data_child(&cursor, qname)
                .ok_or_else(|| CodecError::SchemaNodeNotFound {
                    path: cursor.path.child(qname.clone()),
                })?;

            // Each traversed case contributes a typed step the instance
            // path did not carry.
            for case_ty in &found.cases {
                typed.steps.push(TypedStep {
                    ty: case_ty.clone(),
                    key: None,
                });
            }

            let ty = self
                .index
                .type_for(&found.cursor.path)
                .ok_or_else(|| CodecError::TypeNotFound {
                    path: found.cursor.path.clone(),
                })?
                .name
                .clone();

            match step {
                PathStep::Entry { keys, .. } => {
                    if found.node.list_keys().is_empty() {
                        return Err(CodecError::SchemaMismatch {
                            node: step.to_string(),
                            child: qname.clone(),
                            path: cursor.path.clone(),
                        });
                    }
                    typed.steps.push(TypedStep {
                        ty,
                        key: Some(keys.clone()),
                    });
                }
                PathStep::Wildcard(_) => {
                    typed.steps.push(TypedStep { ty, key: None });
                    wildcard = Some(qname.clone());
                }
                PathStep::Node(_) => {
                    // A bare step on a keyed list addresses the whole list,
                    // which is wildcard semantics.
                    if !found.node.list_keys().is_empty() {
                        wildcard = Some(qname.clone());
                    }
                    typed.steps.push(TypedStep { ty, key: None });
                }
            }
            cursor = found.cursor;
        }
        Ok(typed)
    }

    /// Locate the child (direct, or a case of a direct choice) generated as
    /// `ty` under the cursor
    fn find_typed_child<'t>(&self, cursor: &Cursor<'t>, ty: &TypeName) -> Result<Found<'t>> {
        for child in cursor.children {
            let path = cursor.path.child(child.qname.clone());
            if let Some(descriptor) = self.index.type_for(&path) {
                if &descriptor.name == ty {
                    return Ok(Found {
                        node: child,
                        cases: Vec::new(),
                        cursor: Cursor {
                            path,
                            children: &child.children,
                        },
                    });
                }
            }
            // A case type is addressed through its (transparent) choice.
            if matches!(child.kind, SchemaKind::Choice) {
                for case in &child.children {
                    let case_path = path.child(case.qname.clone());
                    if let Some(descriptor) = self.index.type_for(&case_path) {
                        if &descriptor.name == ty {
                            return Ok(Found {
                                node: case,
                                cases: Vec::new(),
                                cursor: Cursor {
                                    path: case_path,
                                    children: &case.children,
                                },
                            });
                        }
                    }
                }
            }
        }
        Err(CodecError::UnknownType { name: ty.clone() })
    }

    /// Locate a data child by qualified name, descending transparently
    /// through choice/case levels and recording the cases traversed
    fn find_data_child<'t>(&self, cursor: &Cursor<'t>, qname: &QName) -> Option<Found<'t>> {
        if let Some(child) = cursor.children.iter().find(|c| &c.qname == qname) {
            return Some(Found {
                node: child,
                cases: Vec::new(),
                cursor: Cursor {
                    path: cursor.path.child(child.qname.clone()),
                    children: &child.children,
                },
            });
        }
        for child in cursor.children {
            if !matches!(child.kind, SchemaKind::Choice) {
                continue;
            }
            let choice_path = cursor.path.child(child.qname.clone());
            for case in &child.children {
                let case_path = choice_path.child(case.qname.clone());
                let case_cursor = Cursor {
                    path: case_path.clone(),
                    children: &case.children,
                };
                if let Some(mut found) = self.find_data_child(&case_cursor, qname) {
                    let case_ty = self.index.type_for(&case_path)?.name.clone();
                    found.cases.insert(0, case_ty);
                    return Some(found);
                }
            }
        }
        None
    }
}

/// Resolution position while walking a path
struct Cursor<'t> {
    path: SchemaPath,
    children: &'t [SchemaNode],
}

impl<'t> Cursor<'t> {
    fn root(tree: &'t SchemaTree) -> Self {
        Self {
            path: SchemaPath::root(),
            children: &tree.roots,
        }
    }
}

/// A located child plus any case context traversed to reach it
struct Found<'t> {
    node: &'t SchemaNode,
    cases: Vec<TypeName>,
    cursor: Cursor<'t>,
}
