//! Typed object model and the generated-type registry
//!
//! Stands in for the generated-class universe: a `TypeDescriptor` is the
//! identifier of a generated type, `TypedObject` is an immutable value
//! object exposing schema children through getter-style access, and
//! `TypeLoader` is the injected capability that resolves a descriptor name
//! to its loadable representation. The default loader is `GeneratedTypes`,
//! a mapping table built ahead of time alongside the generated types, so no
//! runtime reflection is involved anywhere.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::node::ScalarValue;
use crate::schema::QName;

/// Fully-qualified name of a generated type, e.g. `demo.Top.TopLevelList`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The unqualified (last) segment
    pub fn local(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// A nested type name under this one
    pub fn nested(&self, segment: &str) -> Self {
        Self(format!("{}.{}", self.0, segment))
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a generated type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Container,
    ListEntry,
    Choice,
    Case,
    Augmentation,
    Typedef,
    Identity,
}

/// One declared member of a generated type: a schema child and the name of
/// the accessor exposing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub qname: QName,
    pub name: String,
}

/// Identifier of a generated, loadable type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: TypeName,
    pub kind: TypeKind,
    /// Declared members in schema order
    pub members: Vec<Member>,
    /// Supertypes; a case type implements its owning choice's type
    pub implements: Vec<TypeName>,
    /// Key members for keyed-list entry types
    pub keys: Vec<QName>,
}

impl TypeDescriptor {
    pub fn member(&self, qname: &QName) -> Option<&Member> {
        self.members.iter().find(|m| &m.qname == qname)
    }

    pub fn implements(&self, name: &TypeName) -> bool {
        self.implements.contains(name)
    }

    /// Member qnames, in schema order
    pub fn member_names(&self) -> impl Iterator<Item = &QName> {
        self.members.iter().map(|m| &m.qname)
    }
}

/// A field value inside a typed object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedValue {
    Scalar(ScalarValue),
    /// Single-field wrapper instance of a derived (typedef) leaf type; the
    /// codec unwraps it to the base scalar representation and rewraps on
    /// decode
    Typedef { ty: TypeName, value: ScalarValue },
    /// Container, case or choice child (the choice field holds the concrete
    /// case object; dispatch happens on its descriptor at encode time)
    Object(TypedObject),
    /// Keyed or unkeyed list entries, in declared order
    List(Vec<TypedObject>),
    LeafList(Vec<ScalarValue>),
    /// Opaque anyxml payload, handed through unchanged
    Opaque(serde_json::Value),
}

impl Hash for TypedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            TypedValue::Scalar(v) => v.hash(state),
            TypedValue::Typedef { ty, value } => {
                ty.hash(state);
                value.hash(state);
            }
            TypedValue::Object(o) => o.hash(state),
            TypedValue::List(v) => v.hash(state),
            TypedValue::LeafList(v) => v.hash(state),
            // Canonical JSON text; the default map representation is ordered
            TypedValue::Opaque(v) => v.to_string().hash(state),
        }
    }
}

impl From<ScalarValue> for TypedValue {
    fn from(v: ScalarValue) -> Self {
        TypedValue::Scalar(v)
    }
}

/// An instance of a generated type
///
/// Immutable value object; equality and hashing are structural, which is
/// what the caching codec keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedObject {
    descriptor: TypeName,
    fields: BTreeMap<QName, TypedValue>,
    augmentations: BTreeMap<TypeName, TypedObject>,
}

impl TypedObject {
    /// Start building an instance of the named type
    pub fn builder(descriptor: TypeName) -> TypedObjectBuilder {
        TypedObjectBuilder {
            descriptor,
            fields: BTreeMap::new(),
            augmentations: BTreeMap::new(),
        }
    }

    /// The descriptor name this object instantiates
    pub fn descriptor(&self) -> &TypeName {
        &self.descriptor
    }

    /// Getter-style field access by schema child name
    pub fn get(&self, qname: &QName) -> Option<&TypedValue> {
        self.fields.get(qname)
    }

    /// Scalar field access shortcut
    pub fn scalar(&self, qname: &QName) -> Option<&ScalarValue> {
        match self.fields.get(qname) {
            Some(TypedValue::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&QName, &TypedValue)> {
        self.fields.iter()
    }

    /// Retrieve an augmentation extension by its generated type
    pub fn augmentation(&self, ty: &TypeName) -> Option<&TypedObject> {
        self.augmentations.get(ty)
    }

    pub fn augmentations(&self) -> impl Iterator<Item = (&TypeName, &TypedObject)> {
        self.augmentations.iter()
    }
}

/// Builder for `TypedObject`
#[derive(Debug, Clone)]
pub struct TypedObjectBuilder {
    descriptor: TypeName,
    fields: BTreeMap<QName, TypedValue>,
    augmentations: BTreeMap<TypeName, TypedObject>,
}

impl TypedObjectBuilder {
    /// Set a field to any typed value
    pub fn field(mut self, qname: QName, value: TypedValue) -> Self {
        self.fields.insert(qname, value);
        self
    }

    /// Set a scalar leaf field
    pub fn scalar(self, qname: QName, value: ScalarValue) -> Self {
        self.field(qname, TypedValue::Scalar(value))
    }

    /// Set a child object field (container, case or choice)
    pub fn object(self, qname: QName, value: TypedObject) -> Self {
        self.field(qname, TypedValue::Object(value))
    }

    /// Set a list field from entry objects
    pub fn list(self, qname: QName, entries: Vec<TypedObject>) -> Self {
        self.field(qname, TypedValue::List(entries))
    }

    /// Set a leaf-list field
    pub fn leaf_list(self, qname: QName, values: Vec<ScalarValue>) -> Self {
        self.field(qname, TypedValue::LeafList(values))
    }

    /// Attach an augmentation extension, keyed by its own descriptor
    pub fn augment(mut self, value: TypedObject) -> Self {
        self.augmentations.insert(value.descriptor.clone(), value);
        self
    }

    /// Non-consuming field set, for loop-driven construction
    pub fn set(&mut self, qname: QName, value: TypedValue) -> &mut Self {
        self.fields.insert(qname, value);
        self
    }

    /// Non-consuming augmentation attach
    pub fn set_augment(&mut self, value: TypedObject) -> &mut Self {
        self.augmentations.insert(value.descriptor.clone(), value);
        self
    }

    pub fn build(self) -> TypedObject {
        TypedObject {
            descriptor: self.descriptor,
            fields: self.fields,
            augmentations: self.augmentations,
        }
    }
}

/// Capability for resolving a type descriptor by name
///
/// Injected into codec-tree construction; the production implementation is
/// the compile-time-generated `GeneratedTypes` table. Loading may be
/// invoked concurrently and must be cheap after first use; callers cache
/// results where repeated lookups matter.
pub trait TypeLoader: Send + Sync {
    fn load(&self, name: &TypeName) -> Result<Arc<TypeDescriptor>>;
}

/// Registry of generated type descriptors, the default `TypeLoader`
#[derive(Debug, Clone, Default)]
pub struct GeneratedTypes {
    types: HashMap<TypeName, Arc<TypeDescriptor>>,
}

impl GeneratedTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one descriptor, replacing any previous entry of that name
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    pub fn get(&self, name: &TypeName) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Copy of this registry with one name removed; simulates a generated
    /// type that is present in the schema but not loadable
    pub fn without(&self, name: &TypeName) -> Self {
        let mut types = self.types.clone();
        types.remove(name);
        Self { types }
    }
}

impl TypeLoader for GeneratedTypes {
    fn load(&self, name: &TypeName) -> Result<Arc<TypeDescriptor>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| CodecError::TypeLoad {
                name: name.clone(),
                reason: "not registered".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> TypeDescriptor {
        TypeDescriptor {
            name: TypeName::new(name),
            kind: TypeKind::Container,
            members: vec![],
            implements: vec![],
            keys: vec![],
        }
    }

    #[test]
    fn test_structural_equality_and_hash() {
        use std::collections::HashMap;

        let make = || {
            TypedObject::builder(TypeName::new("demo.Top"))
                .scalar(QName::new("demo", "name"), ScalarValue::String("x".into()))
                .build()
        };
        assert_eq!(make(), make());

        let mut map = HashMap::new();
        map.insert(make(), 1);
        assert_eq!(map.get(&make()), Some(&1));
    }

    #[test]
    fn test_augmentation_retrieval() {
        let aug = TypedObject::builder(TypeName::new("aug.Top1"))
            .scalar(QName::new("aug", "simple-value"), ScalarValue::String("x".into()))
            .build();
        let obj = TypedObject::builder(TypeName::new("demo.Top"))
            .augment(aug.clone())
            .build();
        assert_eq!(obj.augmentation(&TypeName::new("aug.Top1")), Some(&aug));
        assert!(obj.augmentation(&TypeName::new("aug.Top2")).is_none());
    }

    #[test]
    fn test_registry_load() {
        let mut registry = GeneratedTypes::new();
        registry.register(descriptor("demo.Top"));

        let loaded = registry.load(&TypeName::new("demo.Top")).unwrap();
        assert_eq!(loaded.name.as_str(), "demo.Top");

        let missing = registry.load(&TypeName::new("demo.Nope"));
        assert!(matches!(missing, Err(CodecError::TypeLoad { .. })));

        let without = registry.without(&TypeName::new("demo.Top"));
        assert!(without.load(&TypeName::new("demo.Top")).is_err());
    }

    #[test]
    fn test_type_name_segments() {
        let name = TypeName::new("demo.Top").nested("TopLevelList");
        assert_eq!(name.as_str(), "demo.Top.TopLevelList");
        assert_eq!(name.local(), "TopLevelList");
    }
}
