//! Recursive node codec tree
//!
//! One compiled codec entry per schema node, isomorphic to the schema tree
//! and built once per snapshot. Encode walks a typed object graph and
//! produces normalized nodes; decode is the inverse. Choices dispatch on
//! the runtime case type of the supplied value; augmentations encode as
//! sibling wrapper nodes tagged with their identifier and merge back into
//! the owning object on decode.

pub mod cache;
pub mod leaf;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::index::SchemaIndex;
use crate::node::{AugmentationIdentifier, NodeBody, NodeId, NormalizedNode, ScalarValue};
use crate::path::InstancePath;
use crate::schema::{QName, SchemaKind, SchemaNode, SchemaPath, SchemaTree};
use crate::typed::{TypeDescriptor, TypeLoader, TypeName, TypedObject, TypedValue};

use leaf::{LeafCodec, LeafListCodec};

/// Mutable encode-pass state; carries the serialize cache when one is
/// active
#[derive(Default)]
pub(crate) struct EncodeCtx<'a> {
    pub cache: Option<&'a mut SerializeCache>,
}

impl EncodeCtx<'_> {
    fn is_cached_type(&self, ty: &TypeName) -> bool {
        self.cache
            .as_ref()
            .map_or(false, |c| c.types.contains(ty))
    }

    fn lookup(&mut self, obj: &TypedObject) -> Option<Arc<NormalizedNode>> {
        self.cache.as_mut()?.entries.get(obj).cloned()
    }

    fn insert(&mut self, obj: &TypedObject, node: &Arc<NormalizedNode>) {
        if let Some(cache) = self.cache.as_mut() {
            cache.entries.insert(obj.clone(), node.clone());
        }
    }
}

/// Memoization table shared across serializations by one caching codec
pub(crate) struct SerializeCache {
    pub types: HashSet<TypeName>,
    pub entries: HashMap<TypedObject, Arc<NormalizedNode>>,
}

/// The compiled codec tree for one schema snapshot
pub struct CodecTree {
    roots: HashMap<QName, Arc<NodeCodec>>,
}

impl CodecTree {
    /// Compile codecs for every root of the schema tree.
    ///
    /// Construction failures abort the snapshot build; nothing partial is
    /// ever published. The one tolerated failure is a case type that does
    /// not load, which is skipped with a warning when the config allows.
    pub fn build(
        tree: &SchemaTree,
        index: &Arc<SchemaIndex>,
        loader: &dyn TypeLoader,
        config: &CodecConfig,
    ) -> Result<Self> {
        let builder = TreeBuilder {
            tree,
            index,
            loader,
            config,
        };
        let mut roots = HashMap::new();
        for root in &tree.roots {
            let codec = builder.build_node(root, &SchemaPath::root())?;
            roots.insert(root.qname.clone(), codec);
        }
        debug!(roots = roots.len(), "codec tree built");
        Ok(Self { roots })
    }

    pub fn root(&self, qname: &QName) -> Option<&Arc<NodeCodec>> {
        self.roots.get(qname)
    }

    /// Resolve the codec entry addressed by an instance path
    pub fn codec_at(&self, path: &InstancePath) -> Result<Arc<NodeCodec>> {
        let mut steps = path.steps.iter();
        let first = steps.next().ok_or_else(|| CodecError::SchemaNodeNotFound {
            path: SchemaPath::root(),
        })?;
        let mut current = self
            .root(first.qname())
            .ok_or_else(|| CodecError::SchemaNodeNotFound {
                path: SchemaPath::of(first.qname().clone()),
            })?
            .clone();
        for step in steps {
            let next = current.data_child(step.qname()).ok_or_else(|| {
                CodecError::SchemaNodeNotFound {
                    path: current.path.child(step.qname().clone()),
                }
            })?;
            current = next;
        }
        Ok(current)
    }
}

struct TreeBuilder<'a> {
    tree: &'a SchemaTree,
    index: &'a Arc<SchemaIndex>,
    loader: &'a dyn TypeLoader,
    config: &'a CodecConfig,
}

impl TreeBuilder<'_> {
    fn build_node(&self, node: &SchemaNode, parent: &SchemaPath) -> Result<Arc<NodeCodec>> {
        let path = parent.child(node.qname.clone());
        let kind = match &node.kind {
            SchemaKind::Container => CodecKind::Container(self.build_container(node, &path)?),
            SchemaKind::Case => CodecKind::Case(self.build_container(node, &path)?),
            SchemaKind::List { keys, ordered } => {
                let entry = self.build_container(node, &path)?;
                CodecKind::List(ListCodec {
                    keys: keys.clone(),
                    ordered: *ordered,
                    entry,
                })
            }
            SchemaKind::Choice => CodecKind::Choice(self.build_choice(node, &path)?),
            SchemaKind::Leaf { ty } => CodecKind::Leaf(LeafCodec::build(
                node.qname.clone(),
                ty,
                self.tree,
                self.index,
            )?),
            SchemaKind::LeafList { ty, ordered } => CodecKind::LeafList(LeafListCodec::build(
                node.qname.clone(),
                ty,
                *ordered,
                self.tree,
                self.index,
            )?),
            SchemaKind::AnyXml => CodecKind::Anyxml,
        };
        Ok(Arc::new(NodeCodec {
            qname: node.qname.clone(),
            path,
            kind,
        }))
    }

    fn build_container(&self, node: &SchemaNode, path: &SchemaPath) -> Result<ContainerCodec> {
        let ty = self
            .index
            .type_for(path)
            .cloned()
            .ok_or_else(|| CodecError::TypeNotFound { path: path.clone() })?;
        // A container type that cannot be resolved is a snapshot-level
        // inconsistency, not a per-value condition.
        self.loader.load(&ty.name)?;

        let resolved_augments = self.index.augmentations_at(path);
        let aug_owned: HashSet<&QName> = resolved_augments
            .iter()
            .flat_map(|a| a.children.iter())
            .collect();

        let mut children = Vec::new();
        for child in &node.children {
            if aug_owned.contains(&child.qname) {
                continue;
            }
            children.push(self.build_node(child, path)?);
        }

        let mut augments = Vec::new();
        for aug in resolved_augments {
            let aug_ty = match self.index.descriptor(&aug.ty) {
                Some(d) => d.clone(),
                None => {
                    return Err(CodecError::UnknownType {
                        name: aug.ty.clone(),
                    })
                }
            };
            if let Err(e) = self.loader.load(&aug.ty) {
                warn!(augmentation = %aug.ty, error = %e, "augmentation type not loadable, skipping");
                continue;
            }
            let mut aug_children = Vec::new();
            for qname in &aug.children {
                let child = node
                    .child(qname)
                    .ok_or_else(|| CodecError::UnresolvedAugmentTarget { path: path.clone() })?;
                aug_children.push(self.build_node(child, path)?);
            }
            augments.push(AugmentCodec {
                ty: aug_ty,
                identifier: aug.identifier.clone(),
                children: aug_children,
            });
        }

        Ok(ContainerCodec {
            ty,
            children,
            augments,
        })
    }

    fn build_choice(&self, node: &SchemaNode, path: &SchemaPath) -> Result<ChoiceCodec> {
        let ty = self
            .index
            .type_for(path)
            .cloned()
            .ok_or_else(|| CodecError::TypeNotFound { path: path.clone() })?;

        let mut cases = Vec::new();
        let mut by_class = HashMap::new();
        let mut by_qname = HashMap::new();

        for case_node in &node.children {
            let case_path = path.child(case_node.qname.clone());
            let case_ty = self
                .index
                .type_for(&case_path)
                .cloned()
                .ok_or_else(|| CodecError::TypeNotFound { path: case_path.clone() })?;
            match self.loader.load(&case_ty.name) {
                Ok(_) => {}
                Err(e) if self.config.lenient_missing_cases => {
                    // Sibling cases stay valid; this case alone is
                    // unavailable until its type loads.
                    warn!(case = %case_ty.name, error = %e, "case type not loadable, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            }
            let codec = self.build_node(case_node, path)?;
            by_class.insert(case_ty.name.clone(), codec.clone());
            by_qname.insert(case_node.qname.clone(), codec.clone());
            cases.push(codec);
        }

        // Cases generated at other instantiation sites of the same choice
        // substitute for a structurally identical instantiated case; copy
        // builders make such objects appear in practice.
        for known in self.index.cases_of(&ty.name) {
            if by_class.contains_key(known) {
                continue;
            }
            let Some(known_descriptor) = self.index.descriptor(known) else {
                continue;
            };
            let substituted = cases.iter().find(|c| {
                c.type_descriptor()
                    .map_or(false, |d| is_substitution_for(known_descriptor, d))
            });
            if let Some(codec) = substituted {
                by_class.insert(known.clone(), codec.clone());
            }
        }

        Ok(ChoiceCodec {
            ty,
            cases,
            by_class,
            by_qname,
        })
    }
}

/// Case substitution check: same member set by local name
fn is_substitution_for(candidate: &TypeDescriptor, real: &TypeDescriptor) -> bool {
    if candidate.members.len() != real.members.len() {
        return false;
    }
    candidate.members.iter().all(|m| {
        real.members
            .iter()
            .any(|r| r.qname.local_name() == m.qname.local_name())
    })
}

/// One compiled codec entry
pub struct NodeCodec {
    qname: QName,
    path: SchemaPath,
    kind: CodecKind,
}

enum CodecKind {
    Container(ContainerCodec),
    Case(ContainerCodec),
    List(ListCodec),
    Choice(ChoiceCodec),
    Leaf(LeafCodec),
    LeafList(LeafListCodec),
    Anyxml,
}

struct ContainerCodec {
    ty: Arc<TypeDescriptor>,
    children: Vec<Arc<NodeCodec>>,
    augments: Vec<AugmentCodec>,
}

struct AugmentCodec {
    ty: Arc<TypeDescriptor>,
    identifier: AugmentationIdentifier,
    children: Vec<Arc<NodeCodec>>,
}

struct ListCodec {
    keys: Vec<QName>,
    ordered: bool,
    entry: ContainerCodec,
}

struct ChoiceCodec {
    ty: Arc<TypeDescriptor>,
    cases: Vec<Arc<NodeCodec>>,
    by_class: HashMap<TypeName, Arc<NodeCodec>>,
    by_qname: HashMap<QName, Arc<NodeCodec>>,
}

impl NodeCodec {
    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn path(&self) -> &SchemaPath {
        &self.path
    }

    /// Generated type of this codec position, absent for leaves and anyxml
    pub fn type_name(&self) -> Option<&TypeName> {
        self.type_descriptor().map(|d| &d.name)
    }

    fn type_descriptor(&self) -> Option<&Arc<TypeDescriptor>> {
        match &self.kind {
            CodecKind::Container(c) | CodecKind::Case(c) => Some(&c.ty),
            CodecKind::List(l) => Some(&l.entry.ty),
            CodecKind::Choice(c) => Some(&c.ty),
            _ => None,
        }
    }

    /// Find the child codec for a data node, descending transparently
    /// through choice levels and augmentation wrappers
    pub fn data_child(&self, qname: &QName) -> Option<Arc<NodeCodec>> {
        match &self.kind {
            CodecKind::Container(c) | CodecKind::Case(c) => c.find_child(qname),
            CodecKind::List(l) => l.entry.find_child(qname),
            CodecKind::Choice(choice) => choice.find_data_child(qname),
            _ => None,
        }
    }

    /// Encode a data object addressed at this codec position: a container,
    /// a case, or a single entry of a list
    pub fn encode_object(&self, obj: &TypedObject) -> Result<Arc<NormalizedNode>> {
        self.encode_object_in(obj, &mut EncodeCtx::default())
    }

    pub(crate) fn encode_object_in(
        &self,
        obj: &TypedObject,
        ctx: &mut EncodeCtx<'_>,
    ) -> Result<Arc<NormalizedNode>> {
        match &self.kind {
            CodecKind::Container(c) => {
                check_descriptor(&c.ty.name, obj)?;
                self.encode_container(c, obj, ctx, false)
            }
            CodecKind::Case(c) => self.encode_container(c, obj, ctx, true),
            CodecKind::List(l) => self.encode_entry(l, obj, ctx),
            _ => Err(CodecError::SchemaMismatch {
                node: format!("object of {}", obj.descriptor()),
                child: self.qname.clone(),
                path: self.path.clone(),
            }),
        }
    }

    /// Decode the data object addressed at this codec position
    pub fn decode_object(&self, node: &NormalizedNode) -> Result<TypedObject> {
        match &self.kind {
            CodecKind::Container(c) | CodecKind::Case(c) => self.decode_container(c, node),
            CodecKind::List(l) => self.decode_entry(l, node),
            _ => Err(CodecError::SchemaMismatch {
                node: format!("{}", node.id),
                child: self.qname.clone(),
                path: self.path.clone(),
            }),
        }
    }

    /// Encode one field value of a parent object through this codec
    fn encode_child(&self, value: &TypedValue, ctx: &mut EncodeCtx<'_>) -> Result<Arc<NormalizedNode>> {
        match (&self.kind, value) {
            (CodecKind::Leaf(codec), v @ (TypedValue::Scalar(_) | TypedValue::Typedef { .. })) => {
                let scalar = codec.encode(v)?;
                Ok(Arc::new(NormalizedNode::leaf(self.qname.clone(), scalar)))
            }
            (CodecKind::LeafList(codec), TypedValue::LeafList(values)) => {
                Ok(Arc::new(codec.encode(values)?))
            }
            (CodecKind::Container(c), TypedValue::Object(obj)) => {
                check_descriptor(&c.ty.name, obj)?;
                self.encode_container(c, obj, ctx, false)
            }
            (CodecKind::Choice(choice), TypedValue::Object(case_obj)) => {
                self.encode_choice(choice, case_obj, ctx)
            }
            (CodecKind::List(l), TypedValue::List(entries)) => self.encode_list(l, entries, ctx),
            (CodecKind::Anyxml, TypedValue::Opaque(payload)) => Ok(Arc::new(NormalizedNode::new(
                NodeId::Node(self.qname.clone()),
                NodeBody::Anyxml(payload.clone()),
            ))),
            (_, other) => Err(CodecError::SchemaMismatch {
                node: format!("{other:?}"),
                child: self.qname.clone(),
                path: self.path.clone(),
            }),
        }
    }

    /// Decode one child node into a field value; `Ok(None)` means the
    /// field is absent (an empty choice wrapper)
    fn decode_child(&self, node: &NormalizedNode) -> Result<Option<TypedValue>> {
        match &self.kind {
            CodecKind::Leaf(codec) => {
                let scalar = node.scalar().ok_or_else(|| CodecError::SchemaMismatch {
                    node: format!("{}", node.id),
                    child: self.qname.clone(),
                    path: self.path.clone(),
                })?;
                Ok(Some(codec.decode(scalar)?))
            }
            CodecKind::LeafList(codec) => Ok(Some(TypedValue::LeafList(codec.decode(node)?))),
            CodecKind::Container(c) => {
                Ok(Some(TypedValue::Object(self.decode_container(c, node)?)))
            }
            CodecKind::Case(c) => Ok(Some(TypedValue::Object(self.decode_container(c, node)?))),
            CodecKind::Choice(choice) => self.decode_choice(choice, node),
            CodecKind::List(l) => Ok(Some(TypedValue::List(self.decode_list(l, node)?))),
            CodecKind::Anyxml => match &node.body {
                NodeBody::Anyxml(payload) => Ok(Some(TypedValue::Opaque(payload.clone()))),
                _ => Err(CodecError::SchemaMismatch {
                    node: format!("{}", node.id),
                    child: self.qname.clone(),
                    path: self.path.clone(),
                }),
            },
        }
    }

    fn encode_container(
        &self,
        container: &ContainerCodec,
        obj: &TypedObject,
        ctx: &mut EncodeCtx<'_>,
        lenient_names: bool,
    ) -> Result<Arc<NormalizedNode>> {
        if ctx.is_cached_type(&container.ty.name) {
            if let Some(hit) = ctx.lookup(obj) {
                return Ok(hit);
            }
            let node = self.encode_container_raw(container, obj, ctx, lenient_names)?;
            ctx.insert(obj, &node);
            return Ok(node);
        }
        self.encode_container_raw(container, obj, ctx, lenient_names)
    }

    fn encode_container_raw(
        &self,
        container: &ContainerCodec,
        obj: &TypedObject,
        ctx: &mut EncodeCtx<'_>,
        lenient_names: bool,
    ) -> Result<Arc<NormalizedNode>> {
        let mut children = Vec::new();
        for child in &container.children {
            let value = obj.get(child.qname()).or_else(|| {
                // Substituted case objects may carry fields under the
                // module of their declaration site.
                if lenient_names {
                    obj.fields()
                        .find(|(q, _)| q.local_name() == child.qname().local_name())
                        .map(|(_, v)| v)
                } else {
                    None
                }
            });
            if let Some(value) = value {
                children.push(child.encode_child(value, ctx)?);
            }
        }
        for aug in &container.augments {
            if let Some(aug_obj) = obj.augmentation(&aug.ty.name) {
                children.push(aug.encode(aug_obj, ctx)?);
            }
        }
        Ok(Arc::new(NormalizedNode::new(
            NodeId::Node(self.qname.clone()),
            NodeBody::Container(children),
        )))
    }

    fn decode_container(
        &self,
        container: &ContainerCodec,
        node: &NormalizedNode,
    ) -> Result<TypedObject> {
        match &node.body {
            NodeBody::Container(_) => {}
            other => {
                return Err(CodecError::SchemaMismatch {
                    node: format!("{other:?}"),
                    child: self.qname.clone(),
                    path: self.path.clone(),
                })
            }
        }
        let mut builder = TypedObject::builder(container.ty.name.clone());
        for child in &container.children {
            if let Some(child_node) = node.child(child.qname()) {
                if let Some(value) = child.decode_child(child_node)? {
                    builder.set(child.qname().clone(), value);
                }
            }
        }
        for aug in &container.augments {
            if let Some(wrapper) = node.augmentation_child(&aug.identifier) {
                builder.set_augment(aug.decode(wrapper)?);
            }
        }
        Ok(builder.build())
    }

    fn encode_choice(
        &self,
        choice: &ChoiceCodec,
        case_obj: &TypedObject,
        ctx: &mut EncodeCtx<'_>,
    ) -> Result<Arc<NormalizedNode>> {
        let case_codec = choice
            .by_class
            .get(case_obj.descriptor())
            .ok_or_else(|| CodecError::InvalidCase {
                name: case_obj.descriptor().clone(),
                choice: self.qname.clone(),
            })?;
        let case_node = case_codec.encode_object_in(case_obj, ctx)?;
        Ok(Arc::new(NormalizedNode::new(
            NodeId::Node(self.qname.clone()),
            NodeBody::Choice(vec![case_node]),
        )))
    }

    fn decode_choice(
        &self,
        choice: &ChoiceCodec,
        node: &NormalizedNode,
    ) -> Result<Option<TypedValue>> {
        let children = match &node.body {
            NodeBody::Choice(children) => children,
            other => {
                return Err(CodecError::SchemaMismatch {
                    node: format!("{other:?}"),
                    child: self.qname.clone(),
                    path: self.path.clone(),
                })
            }
        };
        match children.len() {
            0 => Ok(None),
            1 => {
                let case_node = &children[0];
                let qname =
                    case_node
                        .id
                        .qname()
                        .ok_or_else(|| CodecError::SchemaMismatch {
                            node: format!("{}", case_node.id),
                            child: self.qname.clone(),
                            path: self.path.clone(),
                        })?;
                let case_codec =
                    choice
                        .by_qname
                        .get(qname)
                        .ok_or_else(|| CodecError::InvalidCase {
                            name: TypeName::new(qname.to_string()),
                            choice: self.qname.clone(),
                        })?;
                let obj = case_codec.decode_object(case_node)?;
                Ok(Some(TypedValue::Object(obj)))
            }
            count => Err(CodecError::AmbiguousChoice {
                choice: self.qname.clone(),
                count,
            }),
        }
    }

    fn encode_list(
        &self,
        list: &ListCodec,
        entries: &[TypedObject],
        ctx: &mut EncodeCtx<'_>,
    ) -> Result<Arc<NormalizedNode>> {
        let mut nodes = Vec::with_capacity(entries.len());
        for entry in entries {
            nodes.push(self.encode_entry(list, entry, ctx)?);
        }
        let body = if list.keys.is_empty() {
            NodeBody::UnkeyedList(nodes)
        } else {
            NodeBody::Map {
                ordered: list.ordered,
                entries: nodes,
            }
        };
        Ok(Arc::new(NormalizedNode::new(
            NodeId::Node(self.qname.clone()),
            body,
        )))
    }

    fn encode_entry(
        &self,
        list: &ListCodec,
        entry: &TypedObject,
        ctx: &mut EncodeCtx<'_>,
    ) -> Result<Arc<NormalizedNode>> {
        check_descriptor(&list.entry.ty.name, entry)?;
        if ctx.is_cached_type(&list.entry.ty.name) {
            if let Some(hit) = ctx.lookup(entry) {
                return Ok(hit);
            }
            let node = self.encode_entry_raw(list, entry, ctx)?;
            ctx.insert(entry, &node);
            return Ok(node);
        }
        self.encode_entry_raw(list, entry, ctx)
    }

    fn encode_entry_raw(
        &self,
        list: &ListCodec,
        entry: &TypedObject,
        ctx: &mut EncodeCtx<'_>,
    ) -> Result<Arc<NormalizedNode>> {
        let body = self.encode_container_raw(&list.entry, entry, ctx, false)?;
        let children = match &body.body {
            NodeBody::Container(children) => children.clone(),
            _ => unreachable!("container encode yields container body"),
        };
        let id = if list.keys.is_empty() {
            NodeId::Node(self.qname.clone())
        } else {
            // Key values come from the encoded children so the entry
            // identifier and the key leaves always agree.
            let mut keys = std::collections::BTreeMap::new();
            for key in &list.keys {
                let leaf = children
                    .iter()
                    .find(|c| c.id.qname() == Some(key))
                    .and_then(|c| c.scalar().cloned())
                    .ok_or_else(|| CodecError::MissingKey {
                        list: self.qname.clone(),
                        key: key.clone(),
                    })?;
                keys.insert(key.clone(), leaf);
            }
            NodeId::ListEntry {
                qname: self.qname.clone(),
                keys,
            }
        };
        Ok(Arc::new(NormalizedNode::new(
            id,
            NodeBody::Container(children),
        )))
    }

    fn decode_list(&self, list: &ListCodec, node: &NormalizedNode) -> Result<Vec<TypedObject>> {
        let entries = match &node.body {
            NodeBody::Map { entries, .. } if !list.keys.is_empty() => entries,
            NodeBody::UnkeyedList(entries) if list.keys.is_empty() => entries,
            other => {
                return Err(CodecError::SchemaMismatch {
                    node: format!("{other:?}"),
                    child: self.qname.clone(),
                    path: self.path.clone(),
                })
            }
        };
        entries
            .iter()
            .map(|entry| self.decode_entry(list, entry))
            .collect()
    }

    fn decode_entry(&self, list: &ListCodec, node: &NormalizedNode) -> Result<TypedObject> {
        let obj = self.decode_container(&list.entry, node)?;
        // Tolerate entries whose key leaves were elided from the child set;
        // the identifier still carries them.
        if let NodeId::ListEntry { keys, .. } = &node.id {
            let mut missing: Vec<(&QName, &ScalarValue)> = Vec::new();
            for (key, value) in keys {
                if obj.get(key).is_none() {
                    missing.push((key, value));
                }
            }
            if !missing.is_empty() {
                let mut builder = TypedObject::builder(obj.descriptor().clone());
                for (qname, value) in obj.fields() {
                    builder.set(qname.clone(), value.clone());
                }
                for (_, aug) in obj.augmentations() {
                    builder.set_augment(aug.clone());
                }
                for (key, value) in missing {
                    let decoded = list
                        .entry
                        .children
                        .iter()
                        .find(|c| c.qname() == key)
                        .and_then(|codec| match &codec.kind {
                            CodecKind::Leaf(leaf_codec) => leaf_codec.decode(value).ok(),
                            _ => None,
                        })
                        .unwrap_or_else(|| TypedValue::Scalar(value.clone()));
                    builder.set(key.clone(), decoded);
                }
                return Ok(builder.build());
            }
        }
        Ok(obj)
    }
}

impl ContainerCodec {
    fn find_child(&self, qname: &QName) -> Option<Arc<NodeCodec>> {
        if let Some(child) = self.children.iter().find(|c| c.qname() == qname) {
            return Some(child.clone());
        }
        // Descend transparently through choices.
        for child in &self.children {
            if let CodecKind::Choice(choice) = &child.kind {
                if let Some(found) = choice.find_data_child(qname) {
                    return Some(found);
                }
            }
        }
        for aug in &self.augments {
            if let Some(child) = aug.children.iter().find(|c| c.qname() == qname) {
                return Some(child.clone());
            }
        }
        None
    }
}

impl ChoiceCodec {
    fn find_data_child(&self, qname: &QName) -> Option<Arc<NodeCodec>> {
        for case in &self.cases {
            if case.qname() == qname {
                return Some(case.clone());
            }
            if let Some(found) = case.data_child(qname) {
                return Some(found);
            }
        }
        None
    }
}

impl AugmentCodec {
    fn encode(&self, obj: &TypedObject, ctx: &mut EncodeCtx<'_>) -> Result<Arc<NormalizedNode>> {
        if ctx.is_cached_type(&self.ty.name) {
            if let Some(hit) = ctx.lookup(obj) {
                return Ok(hit);
            }
            let node = self.encode_raw(obj, ctx)?;
            ctx.insert(obj, &node);
            return Ok(node);
        }
        self.encode_raw(obj, ctx)
    }

    fn encode_raw(&self, obj: &TypedObject, ctx: &mut EncodeCtx<'_>) -> Result<Arc<NormalizedNode>> {
        check_descriptor(&self.ty.name, obj)?;
        let mut children = Vec::new();
        for child in &self.children {
            if let Some(value) = obj.get(child.qname()) {
                children.push(child.encode_child(value, ctx)?);
            }
        }
        Ok(Arc::new(NormalizedNode::new(
            NodeId::Augmentation(self.identifier.clone()),
            NodeBody::Container(children),
        )))
    }

    fn decode(&self, node: &NormalizedNode) -> Result<TypedObject> {
        let mut builder = TypedObject::builder(self.ty.name.clone());
        for child in &self.children {
            if let Some(child_node) = node.child(child.qname()) {
                if let Some(value) = child.decode_child(child_node)? {
                    builder.set(child.qname().clone(), value);
                }
            }
        }
        Ok(builder.build())
    }
}

fn check_descriptor(expected: &TypeName, obj: &TypedObject) -> Result<()> {
    if obj.descriptor() != expected {
        return Err(CodecError::TypeMismatch {
            expected: expected.clone(),
            actual: obj.descriptor().clone(),
        });
    }
    Ok(())
}
