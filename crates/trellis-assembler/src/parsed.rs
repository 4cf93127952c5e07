//! Parsed model files: the input records consumed by the assembler.
//!
//! A [`ParsedFile`] is what a front-end parser produces from one source
//! file: a declared namespace, a metadata map, shape declarations, and
//! external trait applications. Shape references inside declarations are
//! *raw* strings — possibly relative to the file's namespace — and are only
//! resolved once every contributing file is known.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use trellis_core::prelude::PRELUDE_NAMESPACE;
use trellis_core::{Model, ShapeKind, SimpleType, SourceLocation};

/// A trait written inline on a shape or member declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitDecl {
    /// Raw reference to the trait shape, possibly relative.
    pub trait_ref: String,
    pub value: Value,
    #[serde(default)]
    pub location: SourceLocation,
}

impl TraitDecl {
    pub fn new(trait_ref: &str, value: Value) -> Self {
        Self {
            trait_ref: trait_ref.to_string(),
            value,
            location: SourceLocation::none(),
        }
    }
}

/// A member declaration with a raw target reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDecl {
    pub name: String,
    /// Raw reference, possibly relative.
    pub target: String,
    #[serde(default)]
    pub traits: Vec<TraitDecl>,
    #[serde(default)]
    pub location: SourceLocation,
}

impl MemberDecl {
    pub fn new(name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            traits: Vec::new(),
            location: SourceLocation::none(),
        }
    }

    pub fn with_trait(mut self, trait_ref: &str, value: Value) -> Self {
        self.traits.push(TraitDecl::new(trait_ref, value));
        self
    }
}

/// The kind-specific payload of a shape declaration.
///
/// List/set/map member arity is fixed by the variants themselves; only the
/// union minimum-member rule needs an assembly-time check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclKind {
    Simple(SimpleType),
    List {
        member: MemberDecl,
        unique: bool,
    },
    Map {
        key: MemberDecl,
        value: MemberDecl,
    },
    Structure {
        members: Vec<MemberDecl>,
    },
    Union {
        members: Vec<MemberDecl>,
    },
    Service {
        version: String,
        operations: Vec<String>,
        resources: Vec<String>,
        errors: Vec<String>,
        rename: BTreeMap<String, String>,
    },
    Operation {
        /// Defaults to the prelude unit shape when absent.
        input: Option<String>,
        output: Option<String>,
        errors: Vec<String>,
    },
    Resource {
        identifiers: BTreeMap<String, String>,
        create: Option<String>,
        put: Option<String>,
        read: Option<String>,
        update: Option<String>,
        delete: Option<String>,
        list: Option<String>,
        operations: Vec<String>,
        collection_operations: Vec<String>,
        resources: Vec<String>,
    },
}

/// One shape declared by a file, named within the file's namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDecl {
    pub name: String,
    pub kind: DeclKind,
    #[serde(default)]
    pub traits: Vec<TraitDecl>,
    #[serde(default)]
    pub location: SourceLocation,
}

impl ShapeDecl {
    pub fn new(name: &str, kind: DeclKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            traits: Vec::new(),
            location: SourceLocation::none(),
        }
    }

    pub fn with_trait(mut self, trait_ref: &str, value: Value) -> Self {
        self.traits.push(TraitDecl::new(trait_ref, value));
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// An external apply-to statement: semantically identical to declaring the
/// trait inline on the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitApplication {
    /// Raw reference to a shape or member, possibly relative.
    pub target: String,
    pub trait_ref: String,
    pub value: Value,
    #[serde(default)]
    pub location: SourceLocation,
}

impl TraitApplication {
    pub fn new(target: &str, trait_ref: &str, value: Value) -> Self {
        Self {
            target: target.to_string(),
            trait_ref: trait_ref.to_string(),
            value,
            location: SourceLocation::none(),
        }
    }
}

/// Everything one source file contributes to assembly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedFile {
    /// Path used for deterministic file ordering and source locations.
    pub path: String,
    /// The namespace relative references resolve against first.
    pub namespace: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub shapes: Vec<ShapeDecl>,
    #[serde(default)]
    pub applies: Vec<TraitApplication>,
}

impl ParsedFile {
    pub fn new(path: &str, namespace: &str) -> Self {
        Self {
            path: path.to_string(),
            namespace: namespace.to_string(),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_shape(mut self, shape: ShapeDecl) -> Self {
        self.shapes.push(shape);
        self
    }

    pub fn with_apply(mut self, apply: TraitApplication) -> Self {
        self.applies.push(apply);
        self
    }

    /// Reconstruct parsed files from an assembled model, one per non-prelude
    /// namespace, with all references absolute. Re-assembling the result
    /// reproduces the model (the idempotent re-merge property).
    pub fn files_from_model(model: &Model) -> Vec<ParsedFile> {
        let mut by_namespace: BTreeMap<String, ParsedFile> = BTreeMap::new();

        for shape in model.shapes() {
            let namespace = shape.id.namespace();
            if namespace == PRELUDE_NAMESPACE {
                continue;
            }
            let file = by_namespace.entry(namespace.to_string()).or_insert_with(|| {
                ParsedFile::new(&format!("{namespace}.generated"), namespace)
            });
            file.shapes.push(decl_from_shape(shape));

            // Shape and member traits become external applications with
            // absolute targets.
            for applied in model.traits_of(&shape.id) {
                file.applies.push(TraitApplication::new(
                    &shape.id.to_string(),
                    &applied.trait_id.to_string(),
                    applied.value.clone(),
                ));
            }
            for member in shape.members() {
                let member_id = member.shape_id(&shape.id);
                for applied in model.traits_of(&member_id) {
                    file.applies.push(TraitApplication::new(
                        &member_id.to_string(),
                        &applied.trait_id.to_string(),
                        applied.value.clone(),
                    ));
                }
            }
        }

        // Traits applied to prelude shapes from user files would be lost
        // above; reattach them to the first file.
        let mut files: Vec<ParsedFile> = by_namespace.into_values().collect();
        if let Some(first) = files.first_mut() {
            for shape in model.shapes() {
                if shape.id.namespace() != PRELUDE_NAMESPACE {
                    continue;
                }
                for applied in model.traits_of(&shape.id) {
                    if applied.trait_id == trellis_core::Prelude::trait_id()
                        && trellis_core::Prelude::standard()
                            .traits()
                            .has(&shape.id, &applied.trait_id)
                    {
                        continue;
                    }
                    first.applies.push(TraitApplication::new(
                        &shape.id.to_string(),
                        &applied.trait_id.to_string(),
                        applied.value.clone(),
                    ));
                }
            }
            first.metadata = model.metadata().clone();
        }

        files
    }
}

fn member_decl(member: &trellis_core::Member) -> MemberDecl {
    MemberDecl::new(&member.name, &member.target.to_string())
}

fn decl_from_shape(shape: &trellis_core::Shape) -> ShapeDecl {
    let kind = match &shape.kind {
        ShapeKind::Simple(simple) => DeclKind::Simple(*simple),
        ShapeKind::List(list) => DeclKind::List {
            member: member_decl(&list.member),
            unique: list.unique,
        },
        ShapeKind::Map(map) => DeclKind::Map {
            key: member_decl(&map.key),
            value: member_decl(&map.value),
        },
        ShapeKind::Structure(s) => DeclKind::Structure {
            members: s.members.iter().map(member_decl).collect(),
        },
        ShapeKind::Union(u) => DeclKind::Union {
            members: u.members.iter().map(member_decl).collect(),
        },
        ShapeKind::Service(service) => DeclKind::Service {
            version: service.version.clone(),
            operations: service.operations.iter().map(|id| id.to_string()).collect(),
            resources: service.resources.iter().map(|id| id.to_string()).collect(),
            errors: service.errors.iter().map(|id| id.to_string()).collect(),
            rename: service
                .rename
                .iter()
                .map(|(id, name)| (id.to_string(), name.clone()))
                .collect(),
        },
        ShapeKind::Operation(op) => DeclKind::Operation {
            input: Some(op.input.to_string()),
            output: Some(op.output.to_string()),
            errors: op.errors.iter().map(|id| id.to_string()).collect(),
        },
        ShapeKind::Resource(resource) => DeclKind::Resource {
            identifiers: resource
                .identifiers
                .iter()
                .map(|(name, id)| (name.clone(), id.to_string()))
                .collect(),
            create: resource.create.as_ref().map(|id| id.to_string()),
            put: resource.put.as_ref().map(|id| id.to_string()),
            read: resource.read.as_ref().map(|id| id.to_string()),
            update: resource.update.as_ref().map(|id| id.to_string()),
            delete: resource.delete.as_ref().map(|id| id.to_string()),
            list: resource.list.as_ref().map(|id| id.to_string()),
            operations: resource.operations.iter().map(|id| id.to_string()).collect(),
            collection_operations: resource
                .collection_operations
                .iter()
                .map(|id| id.to_string())
                .collect(),
            resources: resource.resources.iter().map(|id| id.to_string()).collect(),
        },
    };

    ShapeDecl::new(shape.id.name(), kind)
}
