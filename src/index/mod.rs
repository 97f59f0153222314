//! Schema index: the bijection between schema positions and generated types
//!
//! Built once per schema snapshot, immutable afterwards. Lookups are total:
//! a schema node with no generated representation (leaves, anyxml) resolves
//! to `None`, never to an error or a panic. The one piece of interior
//! mutability is the identity descriptor cache, a bounded LRU that loads
//! identity types lazily with at-most-one load per missing key.

pub mod names;

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::debug;

use crate::augment::{AugmentDef, AugmentationResolver, ResolvedAugment, ResolvedAugmentations};
use crate::checksum::Fingerprint;
use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::schema::{QName, SchemaKind, SchemaNode, SchemaPath, SchemaTree};
use crate::typed::{GeneratedTypes, Member, TypeDescriptor, TypeKind, TypeLoader, TypeName};

/// Bidirectional mapping between enumeration constants and generated
/// variant names
#[derive(Debug, Clone, Default)]
pub struct EnumMapping {
    to_variant: HashMap<String, String>,
    to_constant: HashMap<String, String>,
}

impl EnumMapping {
    /// Build the mapping for a set of schema-side constants
    pub fn for_values(values: &[String]) -> Self {
        let mut mapping = Self::default();
        for constant in values {
            let variant = names::to_pascal_case(constant);
            mapping
                .to_variant
                .insert(constant.clone(), variant.clone());
            mapping.to_constant.insert(variant, constant.clone());
        }
        mapping
    }

    pub fn variant_for(&self, constant: &str) -> Option<&str> {
        self.to_variant.get(constant).map(String::as_str)
    }

    pub fn constant_for(&self, variant: &str) -> Option<&str> {
        self.to_constant.get(variant).map(String::as_str)
    }
}

/// Immutable schema ↔ type index for one schema snapshot
pub struct SchemaIndex {
    fingerprint: Fingerprint,
    schema_to_type: HashMap<SchemaPath, Arc<TypeDescriptor>>,
    type_to_schema: HashMap<TypeName, SchemaPath>,
    instantiations: HashMap<TypeName, Vec<SchemaPath>>,
    choice_cases: HashMap<TypeName, Vec<TypeName>>,
    case_choice: HashMap<TypeName, TypeName>,
    identities: HashMap<QName, TypeName>,
    augmentations: ResolvedAugmentations,
    descriptors: HashMap<TypeName, Arc<TypeDescriptor>>,
    identity_cache: Mutex<LruCache<QName, Arc<TypeDescriptor>>>,
}

impl SchemaIndex {
    /// Build the index for a schema tree.
    ///
    /// Fails fast: any node that claims a type which cannot be named
    /// consistently aborts the build. A partial index is never returned.
    pub fn build(tree: &SchemaTree, config: &CodecConfig) -> Result<Self> {
        tree.validate()?;
        let augmentations = AugmentationResolver::new(tree).resolve()?;

        let capacity = NonZeroUsize::new(config.identity_cache_capacity.max(1))
            .expect("capacity clamped to at least 1");
        let mut index = Self {
            fingerprint: Fingerprint::of_tree(tree),
            schema_to_type: HashMap::new(),
            type_to_schema: HashMap::new(),
            instantiations: HashMap::new(),
            choice_cases: HashMap::new(),
            case_choice: HashMap::new(),
            identities: HashMap::new(),
            augmentations,
            descriptors: HashMap::new(),
            identity_cache: Mutex::new(LruCache::new(capacity)),
        };

        for root in &tree.roots {
            index.index_node(root, &SchemaPath::root(), &SchemaPath::root(), None)?;
        }
        index.index_typedefs(tree)?;
        index.index_identities(tree)?;
        index.index_augment_defs()?;
        index.link_cases_to_choices();

        debug!(
            types = index.descriptors.len(),
            choices = index.choice_cases.len(),
            identities = index.identities.len(),
            fingerprint = %index.fingerprint,
            "schema index built"
        );
        Ok(index)
    }

    fn index_node(
        &mut self,
        node: &SchemaNode,
        parent_concrete: &SchemaPath,
        parent_defining: &SchemaPath,
        parent_kind: Option<&SchemaKind>,
    ) -> Result<()> {
        let concrete = parent_concrete.child(node.qname.clone());
        let defining = node
            .original
            .clone()
            .unwrap_or_else(|| parent_defining.child(node.qname.clone()));

        let kind = match node.kind {
            SchemaKind::Container => Some(TypeKind::Container),
            SchemaKind::List { .. } => Some(TypeKind::ListEntry),
            SchemaKind::Choice => Some(TypeKind::Choice),
            SchemaKind::Case => Some(TypeKind::Case),
            // Leaves and anyxml have no generated representation; lookups
            // at their positions stay total by returning absent.
            SchemaKind::Leaf { .. } | SchemaKind::LeafList { .. } | SchemaKind::AnyXml => None,
        };

        if let Some(kind) = kind {
            let ty_name = names::type_name_for_path(&defining);

            match self.type_to_schema.get(&ty_name) {
                Some(existing) if existing != &defining => {
                    return Err(CodecError::Validation(format!(
                        "generated type name {ty_name} claimed by both {existing} and {defining}"
                    )));
                }
                _ => {}
            }

            let descriptor = match self.descriptors.get(&ty_name).cloned() {
                Some(existing) => existing,
                None => {
                    let descriptor =
                        Arc::new(self.build_descriptor(node, &concrete, &defining, kind, parent_kind));
                    self.descriptors.insert(ty_name.clone(), descriptor.clone());
                    self.type_to_schema.insert(ty_name.clone(), defining.clone());
                    if defining != concrete {
                        self.schema_to_type
                            .insert(defining.clone(), descriptor.clone());
                    }
                    descriptor
                }
            };

            self.schema_to_type.insert(concrete.clone(), descriptor);
            self.instantiations
                .entry(ty_name.clone())
                .or_default()
                .push(concrete.clone());

            if matches!(parent_kind, Some(SchemaKind::Choice)) {
                let choice_ty = names::type_name_for_path(&defining.parent());
                let cases = self.choice_cases.entry(choice_ty).or_default();
                if !cases.contains(&ty_name) {
                    cases.push(ty_name.clone());
                }
            }
        }

        for child in &node.children {
            self.index_node(child, &concrete, &defining, Some(&node.kind))?;
        }
        Ok(())
    }

    fn build_descriptor(
        &self,
        node: &SchemaNode,
        concrete: &SchemaPath,
        defining: &SchemaPath,
        kind: TypeKind,
        parent_kind: Option<&SchemaKind>,
    ) -> TypeDescriptor {
        // Children contributed by augmentations belong to the augmentation
        // type, not to the target's own descriptor.
        let aug_owned: HashSet<&QName> = self
            .augmentations
            .at(concrete)
            .iter()
            .flat_map(|a| a.children.iter())
            .collect();

        let members = if matches!(kind, TypeKind::Choice) {
            // A choice type exposes no members of its own; its value is
            // always one of its case types.
            Vec::new()
        } else {
            node.children
                .iter()
                .filter(|c| !aug_owned.contains(&c.qname))
                .map(|c| Member {
                    qname: c.qname.clone(),
                    name: names::to_snake_case(c.qname.local_name()),
                })
                .collect()
        };

        let implements = if matches!(parent_kind, Some(SchemaKind::Choice)) {
            vec![names::type_name_for_path(&defining.parent())]
        } else {
            Vec::new()
        };

        TypeDescriptor {
            name: names::type_name_for_path(defining),
            kind,
            members,
            implements,
            keys: node.list_keys().to_vec(),
        }
    }

    fn index_typedefs(&mut self, tree: &SchemaTree) -> Result<()> {
        for typedef in &tree.typedefs {
            let name = names::module_type_name(&typedef.qname.module, typedef.qname.local_name());
            let path = SchemaPath::of(typedef.qname.clone());
            self.register_definition(
                TypeDescriptor {
                    name: name.clone(),
                    kind: TypeKind::Typedef,
                    members: Vec::new(),
                    implements: Vec::new(),
                    keys: Vec::new(),
                },
                path,
            )?;
        }
        Ok(())
    }

    fn index_identities(&mut self, tree: &SchemaTree) -> Result<()> {
        for identity in &tree.identities {
            let name =
                names::module_type_name(&identity.qname.module, identity.qname.local_name());
            let implements = identity
                .base
                .as_ref()
                .map(|b| vec![names::module_type_name(&b.module, b.local_name())])
                .unwrap_or_default();
            let path = SchemaPath::of(identity.qname.clone());
            self.register_definition(
                TypeDescriptor {
                    name: name.clone(),
                    kind: TypeKind::Identity,
                    members: Vec::new(),
                    implements,
                    keys: Vec::new(),
                },
                path,
            )?;
            self.identities.insert(identity.qname.clone(), name);
        }
        Ok(())
    }

    fn index_augment_defs(&mut self) -> Result<()> {
        let defs: Vec<AugmentDef> = self.augmentations.defs.clone();
        for def in defs {
            let members = def
                .block
                .children
                .iter()
                .map(|q| Member {
                    qname: q.clone(),
                    name: names::to_snake_case(q.local_name()),
                })
                .collect();
            let target_ty = names::type_name_for_path(&def.target);
            self.register_definition(
                TypeDescriptor {
                    name: def.ty.clone(),
                    kind: TypeKind::Augmentation,
                    members,
                    implements: vec![target_ty],
                    keys: Vec::new(),
                },
                def.target.clone(),
            )?;
        }
        Ok(())
    }

    fn register_definition(&mut self, descriptor: TypeDescriptor, path: SchemaPath) -> Result<()> {
        let name = descriptor.name.clone();
        if let Some(existing) = self.type_to_schema.get(&name) {
            if existing != &path {
                return Err(CodecError::Validation(format!(
                    "generated type name {name} claimed by both {existing} and {path}"
                )));
            }
        }
        self.descriptors.insert(name.clone(), Arc::new(descriptor));
        self.type_to_schema.insert(name, path);
        Ok(())
    }

    /// Resolve each case type to its owning choice by walking the case's
    /// declared supertypes until one matches a known choice type. Linear in
    /// the number of choices, which is fine once at build time.
    fn link_cases_to_choices(&mut self) {
        let case_names: Vec<TypeName> = self
            .descriptors
            .values()
            .filter(|d| d.kind == TypeKind::Case)
            .map(|d| d.name.clone())
            .collect();
        for case in case_names {
            let descriptor = &self.descriptors[&case];
            for supertype in &descriptor.implements {
                if self.choice_cases.contains_key(supertype) {
                    self.case_choice.insert(case.clone(), supertype.clone());
                    break;
                }
            }
        }
    }

    /// Fingerprint of the schema snapshot this index was built from
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Type descriptor generated for a schema position, absent for nodes
    /// with no generated representation
    pub fn type_for(&self, path: &SchemaPath) -> Option<&Arc<TypeDescriptor>> {
        self.schema_to_type.get(path)
    }

    /// Defining schema position of a generated type
    pub fn schema_for(&self, name: &TypeName) -> Option<&SchemaPath> {
        self.type_to_schema.get(name)
    }

    /// Descriptor by name
    pub fn descriptor(&self, name: &TypeName) -> Option<&Arc<TypeDescriptor>> {
        self.descriptors.get(name)
    }

    /// Every concrete position where a (possibly grouping-defined) type is
    /// reachable
    pub fn instantiations(&self, name: &TypeName) -> &[SchemaPath] {
        self.instantiations
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Case types of a choice type, aggregated over every instantiation
    pub fn cases_of(&self, choice: &TypeName) -> &[TypeName] {
        self.choice_cases
            .get(choice)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Owning choice of a case type
    pub fn choice_of_case(&self, case: &TypeName) -> Option<&TypeName> {
        self.case_choice.get(case)
    }

    /// Which case of `choice` declares a child named `child`
    pub fn case_for_child(&self, choice: &TypeName, child: &QName) -> Option<&TypeName> {
        self.cases_of(choice).iter().find(|case| {
            self.descriptors
                .get(*case)
                .is_some_and(|d| d.member(child).is_some())
        })
    }

    /// Generated type name of an identity
    pub fn identity_type(&self, qname: &QName) -> Option<&TypeName> {
        self.identities.get(qname)
    }

    /// Load an identity descriptor through the bounded cache.
    ///
    /// At most one load runs per missing key; eviction only ever costs a
    /// reload.
    pub fn load_identity(
        &self,
        qname: &QName,
        loader: &dyn TypeLoader,
    ) -> Result<Arc<TypeDescriptor>> {
        let ty = self
            .identities
            .get(qname)
            .ok_or_else(|| CodecError::UnknownIdentity {
                qname: qname.clone(),
            })?;
        let mut cache = self
            .identity_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(hit) = cache.get(qname) {
            return Ok(hit.clone());
        }
        let loaded = loader.load(ty)?;
        cache.put(qname.clone(), loaded.clone());
        Ok(loaded)
    }

    /// Augmentations applying at a concrete target position
    pub fn augmentations_at(&self, path: &SchemaPath) -> &[ResolvedAugment] {
        self.augmentations.at(path)
    }

    /// Unique augmentation declarations of this snapshot
    pub fn augment_defs(&self) -> &[AugmentDef] {
        &self.augmentations.defs
    }

    /// Registry of every descriptor generated for this snapshot; the
    /// default production `TypeLoader`
    pub fn generated_types(&self) -> GeneratedTypes {
        let mut registry = GeneratedTypes::new();
        for descriptor in self.descriptors.values() {
            registry.register(descriptor.as_ref().clone());
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IdentityDef, LeafType, TypedefDef};

    fn leaf(module: &str, name: &str, ty: LeafType) -> SchemaNode {
        SchemaNode {
            qname: QName::new(module, name),
            kind: SchemaKind::Leaf { ty },
            children: vec![],
            original: None,
            augments: vec![],
        }
    }

    fn demo_tree() -> SchemaTree {
        SchemaTree {
            roots: vec![SchemaNode {
                qname: QName::new("demo", "top"),
                kind: SchemaKind::Container,
                children: vec![
                    SchemaNode {
                        qname: QName::new("demo", "top-level-list"),
                        kind: SchemaKind::List {
                            keys: vec![QName::new("demo", "name")],
                            ordered: false,
                        },
                        children: vec![leaf("demo", "name", LeafType::String)],
                        original: None,
                        augments: vec![],
                    },
                    SchemaNode {
                        qname: QName::new("demo", "identifier"),
                        kind: SchemaKind::Choice,
                        children: vec![
                            SchemaNode {
                                qname: QName::new("demo", "simple-id"),
                                kind: SchemaKind::Case,
                                children: vec![leaf("demo", "id", LeafType::String)],
                                original: None,
                                augments: vec![],
                            },
                            SchemaNode {
                                qname: QName::new("demo", "extended-id"),
                                kind: SchemaKind::Case,
                                children: vec![leaf("demo", "id-value", LeafType::String)],
                                original: None,
                                augments: vec![],
                            },
                        ],
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
            identities: vec![IdentityDef {
                qname: QName::new("demo", "base-kind"),
                base: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_bijection() {
        let index = SchemaIndex::build(&demo_tree(), &CodecConfig::default()).unwrap();

        let top = SchemaPath::of(QName::new("demo", "top"));
        let descriptor = index.type_for(&top).unwrap();
        assert_eq!(descriptor.name.as_str(), "demo.Top");
        assert_eq!(index.schema_for(&descriptor.name), Some(&top));

        let list = top.child(QName::new("demo", "top-level-list"));
        let list_ty = index.type_for(&list).unwrap();
        assert_eq!(list_ty.kind, TypeKind::ListEntry);
        assert_eq!(list_ty.keys, vec![QName::new("demo", "name")]);

        // Leaves have no generated representation
        let name_leaf = list.child(QName::new("demo", "name"));
        assert!(index.type_for(&name_leaf).is_none());
    }

    #[test]
    fn test_choice_case_links() {
        let index = SchemaIndex::build(&demo_tree(), &CodecConfig::default()).unwrap();

        let choice_ty = TypeName::new("demo.Top.Identifier");
        let cases = index.cases_of(&choice_ty);
        assert_eq!(cases.len(), 2);

        let simple = TypeName::new("demo.Top.Identifier.SimpleId");
        assert_eq!(index.choice_of_case(&simple), Some(&choice_ty));
        assert_eq!(
            index.case_for_child(&choice_ty, &QName::new("demo", "id")),
            Some(&simple)
        );
    }

    #[test]
    fn test_identity_cache_loads_once_per_key() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingLoader {
            inner: GeneratedTypes,
            loads: AtomicUsize,
        }
        impl TypeLoader for CountingLoader {
            fn load(&self, name: &TypeName) -> Result<Arc<TypeDescriptor>> {
                self.loads.fetch_add(1, Ordering::SeqCst);
                self.inner.load(name)
            }
        }

        let index = SchemaIndex::build(&demo_tree(), &CodecConfig::default()).unwrap();
        let loader = CountingLoader {
            inner: index.generated_types(),
            loads: AtomicUsize::new(0),
        };

        let qname = QName::new("demo", "base-kind");
        let first = index.load_identity(&qname, &loader).unwrap();
        let second = index.load_identity(&qname, &loader).unwrap();
        assert_eq!(first.name, second.name);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        let missing = index.load_identity(&QName::new("demo", "nope"), &loader);
        assert!(matches!(missing, Err(CodecError::UnknownIdentity { .. })));
    }

    #[test]
    fn test_grouping_instantiation_vectors() {
        let grouping_child = SchemaNode {
            qname: QName::new("grp", "shared"),
            kind: SchemaKind::Container,
            children: vec![leaf("grp", "value", LeafType::String)],
            original: Some(SchemaPath::of(QName::new("grp", "g")).child(QName::new("grp", "shared"))),
            augments: vec![],
        };
        let site = |root: &str| SchemaNode {
            qname: QName::new("demo", root),
            kind: SchemaKind::Container,
            children: vec![grouping_child.clone()],
            original: None,
            augments: vec![],
        };
        let tree = SchemaTree {
            roots: vec![site("one"), site("two")],
            groupings: vec![crate::schema::GroupingDef {
                qname: QName::new("grp", "g"),
                children: vec![SchemaNode {
                    qname: QName::new("grp", "shared"),
                    kind: SchemaKind::Container,
                    children: vec![leaf("grp", "value", LeafType::String)],
                    original: None,
                    augments: vec![],
                }],
            }],
            ..Default::default()
        };
        let index = SchemaIndex::build(&tree, &CodecConfig::default()).unwrap();

        let shared_ty = TypeName::new("grp.G.Shared");
        let sites = index.instantiations(&shared_ty);
        assert_eq!(sites.len(), 2);

        // Both concrete positions resolve to the one shared descriptor
        let one = SchemaPath::of(QName::new("demo", "one")).child(QName::new("grp", "shared"));
        let two = SchemaPath::of(QName::new("demo", "two")).child(QName::new("grp", "shared"));
        assert!(Arc::ptr_eq(
            index.type_for(&one).unwrap(),
            index.type_for(&two).unwrap()
        ));
        // The defining site maps back to the grouping declaration
        assert_eq!(
            index.schema_for(&shared_ty).unwrap().to_string(),
            "/grp:g/grp:shared"
        );
    }

    #[test]
    fn test_enum_mapping() {
        let mapping = EnumMapping::for_values(&["my-value".to_string(), "other".to_string()]);
        assert_eq!(mapping.variant_for("my-value"), Some("MyValue"));
        assert_eq!(mapping.constant_for("MyValue"), Some("my-value"));
        assert_eq!(mapping.variant_for("missing"), None);
    }
}
