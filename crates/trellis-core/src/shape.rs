//! Shapes: the nodes of the semantic model graph.
//!
//! Every shape kind is a variant of the closed [`ShapeKind`] enum, so each
//! validator handles every kind exhaustively — adding a kind is a compile
//! error everywhere until it is handled.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shape_id::ShapeId;
use crate::source::SourceLocation;

/// The simple (leaf) types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimpleType {
    Boolean,
    String,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    BigInteger,
    BigDecimal,
    Blob,
    Document,
    Timestamp,
}

impl fmt::Display for SimpleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimpleType::Boolean => "boolean",
            SimpleType::String => "string",
            SimpleType::Byte => "byte",
            SimpleType::Short => "short",
            SimpleType::Integer => "integer",
            SimpleType::Long => "long",
            SimpleType::Float => "float",
            SimpleType::Double => "double",
            SimpleType::BigInteger => "bigInteger",
            SimpleType::BigDecimal => "bigDecimal",
            SimpleType::Blob => "blob",
            SimpleType::Document => "document",
            SimpleType::Timestamp => "timestamp",
        };
        write!(f, "{name}")
    }
}

/// A named member of an aggregate shape, targeting another shape.
///
/// A member's own shape ID is `parent$name`; members carry their applied
/// traits in the model's trait table, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub target: ShapeId,
    #[serde(default)]
    pub location: SourceLocation,
}

impl Member {
    pub fn new(name: &str, target: ShapeId) -> Self {
        Self {
            name: name.to_string(),
            target,
            location: SourceLocation::none(),
        }
    }

    /// The member's own shape ID given its parent.
    pub fn shape_id(&self, parent: &ShapeId) -> ShapeId {
        parent.with_member(&self.name)
    }
}

/// A homogeneous sequence. `unique` marks the deprecated set sub-kind,
/// which is a list carrying an implicit uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListShape {
    pub member: Member,
    #[serde(default)]
    pub unique: bool,
}

/// A key/value aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapShape {
    pub key: Member,
    pub value: Member,
}

/// A named-field product type with ordered members.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructureShape {
    pub members: Vec<Member>,
}

/// A tagged union. Must declare at least one member.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnionShape {
    pub members: Vec<Member>,
}

/// A service: the entry point of a model, binding operations and resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceShape {
    pub version: String,
    pub operations: Vec<ShapeId>,
    pub resources: Vec<ShapeId>,
    /// Common errors applied to every operation of the service.
    pub errors: Vec<ShapeId>,
    /// Disambiguating renames for closure-level name collisions.
    pub rename: BTreeMap<ShapeId, String>,
}

/// An operation with input/output structures and declared error shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationShape {
    pub input: ShapeId,
    pub output: ShapeId,
    pub errors: Vec<ShapeId>,
}

/// A resource: an entity with identifiers, lifecycle operations, and
/// child resources.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceShape {
    /// Identifier name to the simple shape supplying its value.
    pub identifiers: BTreeMap<String, ShapeId>,
    pub create: Option<ShapeId>,
    pub put: Option<ShapeId>,
    pub read: Option<ShapeId>,
    pub update: Option<ShapeId>,
    pub delete: Option<ShapeId>,
    pub list: Option<ShapeId>,
    pub operations: Vec<ShapeId>,
    pub collection_operations: Vec<ShapeId>,
    pub resources: Vec<ShapeId>,
}

impl ResourceShape {
    /// Every bound operation: lifecycle slots first, then `operations`,
    /// then `collection_operations`.
    pub fn all_operations(&self) -> Vec<ShapeId> {
        let mut ops = Vec::new();
        for op in [
            &self.create,
            &self.put,
            &self.read,
            &self.update,
            &self.delete,
            &self.list,
        ]
        .into_iter()
        .flatten()
        {
            ops.push(op.clone());
        }
        ops.extend(self.operations.iter().cloned());
        ops.extend(self.collection_operations.iter().cloned());
        ops
    }
}

/// The closed set of shape kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    Simple(SimpleType),
    List(ListShape),
    Map(MapShape),
    Structure(StructureShape),
    Union(UnionShape),
    Service(ServiceShape),
    Operation(OperationShape),
    Resource(ResourceShape),
}

impl ShapeKind {
    /// Human-readable kind name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Simple(simple) => match simple {
                SimpleType::Boolean => "boolean",
                SimpleType::String => "string",
                SimpleType::Byte => "byte",
                SimpleType::Short => "short",
                SimpleType::Integer => "integer",
                SimpleType::Long => "long",
                SimpleType::Float => "float",
                SimpleType::Double => "double",
                SimpleType::BigInteger => "bigInteger",
                SimpleType::BigDecimal => "bigDecimal",
                SimpleType::Blob => "blob",
                SimpleType::Document => "document",
                SimpleType::Timestamp => "timestamp",
            },
            ShapeKind::List(list) if list.unique => "set",
            ShapeKind::List(_) => "list",
            ShapeKind::Map(_) => "map",
            ShapeKind::Structure(_) => "structure",
            ShapeKind::Union(_) => "union",
            ShapeKind::Service(_) => "service",
            ShapeKind::Operation(_) => "operation",
            ShapeKind::Resource(_) => "resource",
        }
    }
}

/// A node of the shape graph: an ID, a kind, and where it was declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub kind: ShapeKind,
    #[serde(default)]
    pub location: SourceLocation,
}

impl Shape {
    pub fn new(id: ShapeId, kind: ShapeKind) -> Self {
        Self {
            id,
            kind,
            location: SourceLocation::none(),
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn is_simple(&self) -> bool {
        matches!(self.kind, ShapeKind::Simple(_))
    }

    /// List, set, or map: the kinds that can terminate via an empty value.
    pub fn is_collection(&self) -> bool {
        matches!(self.kind, ShapeKind::List(_) | ShapeKind::Map(_))
    }

    pub fn is_service_kind(&self) -> bool {
        matches!(
            self.kind,
            ShapeKind::Service(_) | ShapeKind::Operation(_) | ShapeKind::Resource(_)
        )
    }

    /// The members owned by this shape, in declaration order.
    pub fn members(&self) -> Vec<&Member> {
        match &self.kind {
            ShapeKind::List(list) => vec![&list.member],
            ShapeKind::Map(map) => vec![&map.key, &map.value],
            ShapeKind::Structure(s) => s.members.iter().collect(),
            ShapeKind::Union(u) => u.members.iter().collect(),
            ShapeKind::Simple(_)
            | ShapeKind::Service(_)
            | ShapeKind::Operation(_)
            | ShapeKind::Resource(_) => Vec::new(),
        }
    }

    /// Look up a member by name.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members().into_iter().find(|m| m.name == name)
    }

    /// Direct neighbors in the shape graph: member targets plus, for
    /// service kinds, every operation/resource/error/identifier reference.
    pub fn neighbors(&self) -> Vec<ShapeId> {
        let mut out: Vec<ShapeId> = self.members().iter().map(|m| m.target.clone()).collect();
        match &self.kind {
            ShapeKind::Service(service) => {
                out.extend(service.operations.iter().cloned());
                out.extend(service.resources.iter().cloned());
                out.extend(service.errors.iter().cloned());
            }
            ShapeKind::Operation(op) => {
                out.push(op.input.clone());
                out.push(op.output.clone());
                out.extend(op.errors.iter().cloned());
            }
            ShapeKind::Resource(resource) => {
                out.extend(resource.identifiers.values().cloned());
                out.extend(resource.all_operations());
                out.extend(resource.resources.iter().cloned());
            }
            _ => {}
        }
        out
    }
}
