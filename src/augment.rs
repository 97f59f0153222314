//! Augmentation resolution
//!
//! Computes canonical identifiers for sibling-augmentation child sets and
//! assigns each augmentation declaration its generated type name. Naming is
//! deterministic: augmentations of one target are processed in lexicographic
//! (module, smallest child name) order, never in map-iteration order, and an
//! augmentation carrying an explicit identifier override uses that name
//! verbatim instead of a numeric suffix.
//!
//! Augmentations declared inside a reused grouping bind to their original
//! declaration site: every use site shares the one type assigned for the
//! original, which keeps copy-built data interoperable across sites.

use std::collections::HashMap;

use crate::error::{CodecError, Result};
use crate::index::names::{augment_sort_key, AugmentNamer};
use crate::node::AugmentationIdentifier;
use crate::schema::{AugmentBlock, QName, SchemaKind, SchemaNode, SchemaPath, SchemaTree};
use crate::typed::TypeName;

/// One augmentation declaration with its assigned type name
#[derive(Debug, Clone)]
pub struct AugmentDef {
    pub ty: TypeName,
    /// Defining target position (the original site for grouping-declared
    /// augmentations)
    pub target: SchemaPath,
    pub block: AugmentBlock,
}

/// An augmentation as it applies to one concrete target position
#[derive(Debug, Clone)]
pub struct ResolvedAugment {
    pub ty: TypeName,
    /// Identifier resolved against the concrete instance's children
    pub identifier: AugmentationIdentifier,
    /// Concrete child names owned by this augmentation at this position
    pub children: Vec<QName>,
    pub block: AugmentBlock,
}

/// Output of a full-tree resolution pass
#[derive(Debug, Default)]
pub struct ResolvedAugmentations {
    /// Concrete target position -> applicable augmentations
    pub by_target: HashMap<SchemaPath, Vec<ResolvedAugment>>,
    /// Unique declarations in assignment order
    pub defs: Vec<AugmentDef>,
}

impl ResolvedAugmentations {
    pub fn at(&self, target: &SchemaPath) -> &[ResolvedAugment] {
        self.by_target.get(target).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Resolves every augmentation in a schema tree
pub struct AugmentationResolver<'a> {
    tree: &'a SchemaTree,
}

impl<'a> AugmentationResolver<'a> {
    pub fn new(tree: &'a SchemaTree) -> Self {
        Self { tree }
    }

    /// Identifier of an augmentation as declared, independent of any
    /// concrete instantiation
    pub fn declared_identifier(block: &AugmentBlock) -> AugmentationIdentifier {
        AugmentationIdentifier::new(block.children.iter().cloned())
    }

    /// Resolve an augmentation's child set against a concrete target
    /// instance.
    ///
    /// Children are matched by qualified name first; a child absent by
    /// QName falls back to a local-name match among the instance's own
    /// children, tolerating cross-module renaming introduced by
    /// copy/rebuild operations.
    pub fn resolve_against(
        block: &AugmentBlock,
        target: &SchemaNode,
    ) -> (AugmentationIdentifier, Vec<QName>) {
        let mut matched = Vec::new();
        for child in &block.children {
            if target.child(child).is_some() {
                matched.push(child.clone());
            } else if let Some(found) = target.child_by_local_name(child.local_name()) {
                matched.push(found.qname.clone());
            }
        }
        (
            AugmentationIdentifier::new(matched.iter().cloned()),
            matched,
        )
    }

    /// Walk the tree and assign every augmentation declaration its type
    /// name, mapping each concrete target position to its resolved set.
    pub fn resolve(&self) -> Result<ResolvedAugmentations> {
        let mut out = ResolvedAugmentations::default();
        let mut namer = AugmentNamer::new();
        let mut assigned: HashMap<(SchemaPath, AugmentationIdentifier), TypeName> = HashMap::new();

        for root in &self.tree.roots {
            self.resolve_node(
                root,
                &SchemaPath::root(),
                &mut namer,
                &mut assigned,
                &mut out,
            )?;
        }
        Ok(out)
    }

    fn resolve_node(
        &self,
        node: &SchemaNode,
        parent: &SchemaPath,
        namer: &mut AugmentNamer,
        assigned: &mut HashMap<(SchemaPath, AugmentationIdentifier), TypeName>,
        out: &mut ResolvedAugmentations,
    ) -> Result<()> {
        let path = parent.child(node.qname.clone());

        // An augmentation whose target is a choice contributes case children
        // directly to the choice; no augmentation type exists for it.
        if !node.augments.is_empty() && !matches!(node.kind, SchemaKind::Choice) {
            let mut blocks: Vec<&AugmentBlock> = node.augments.iter().collect();
            blocks.sort_by_key(|b| augment_sort_key(&b.module, &b.children));

            let mut resolved = Vec::with_capacity(blocks.len());
            for block in blocks {
                let defining_target = block.original.clone().unwrap_or_else(|| path.clone());
                let key = (defining_target.clone(), Self::declared_identifier(block));

                let ty = match assigned.get(&key).cloned() {
                    Some(ty) => ty,
                    None => {
                        let ty = self.assign_name(block, &defining_target, namer)?;
                        assigned.insert(key, ty.clone());
                        out.defs.push(AugmentDef {
                            ty: ty.clone(),
                            target: defining_target,
                            block: block.clone(),
                        });
                        ty
                    }
                };

                let (identifier, children) = Self::resolve_against(block, node);
                resolved.push(ResolvedAugment {
                    ty,
                    identifier,
                    children,
                    block: block.clone(),
                });
            }
            out.by_target.insert(path.clone(), resolved);
        }

        for child in &node.children {
            self.resolve_node(child, &path, namer, assigned, out)?;
        }
        Ok(())
    }

    fn assign_name(
        &self,
        block: &AugmentBlock,
        defining_target: &SchemaPath,
        namer: &mut AugmentNamer,
    ) -> Result<TypeName> {
        let target_local = defining_target
            .last()
            .ok_or_else(|| CodecError::UnresolvedAugmentTarget {
                path: defining_target.clone(),
            })?
            .local_name()
            .to_string();

        match &block.identifier_override {
            Some(name) => {
                namer
                    .claim(&block.module, name)
                    .ok_or_else(|| CodecError::DuplicateAugmentOverride {
                        name: name.clone(),
                        path: defining_target.clone(),
                    })
            }
            None => Ok(namer.assign(&block.module, &target_local)),
        }
    }
}
