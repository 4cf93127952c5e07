//! The built-in prelude namespace.
//!
//! The prelude is an explicit value injected into assembly rather than
//! process-wide state, so concurrent assemblies never share anything
//! mutable. It provides the `trellis.api` namespace: the simple shapes every
//! model may reference without declaring, the synthetic `Unit` structure
//! used as the default operation input/output, and the built-in
//! trait-defining shapes.

use std::collections::BTreeMap;

use serde_json::json;

use crate::shape::{ListShape, Member, Shape, ShapeKind, SimpleType, StructureShape};
use crate::shape_id::ShapeId;
use crate::traits::{AppliedTrait, TraitTable};

/// The namespace relative references fall back to.
pub const PRELUDE_NAMESPACE: &str = "trellis.api";

/// The built-in shapes available to every model.
#[derive(Debug, Clone)]
pub struct Prelude {
    shapes: BTreeMap<ShapeId, Shape>,
    traits: TraitTable,
}

impl Prelude {
    /// A prelude with no shapes at all. Useful for tests that must control
    /// every shape in the model.
    pub fn empty() -> Self {
        Self {
            shapes: BTreeMap::new(),
            traits: TraitTable::new(),
        }
    }

    /// The standard prelude: simple shapes, `Unit`, and the built-in traits.
    pub fn standard() -> Self {
        let mut prelude = Self::empty();

        for (name, simple) in [
            ("Boolean", SimpleType::Boolean),
            ("String", SimpleType::String),
            ("Byte", SimpleType::Byte),
            ("Short", SimpleType::Short),
            ("Integer", SimpleType::Integer),
            ("Long", SimpleType::Long),
            ("Float", SimpleType::Float),
            ("Double", SimpleType::Double),
            ("BigInteger", SimpleType::BigInteger),
            ("BigDecimal", SimpleType::BigDecimal),
            ("Blob", SimpleType::Blob),
            ("Document", SimpleType::Document),
            ("Timestamp", SimpleType::Timestamp),
        ] {
            prelude.insert(Shape::new(Self::id(name), ShapeKind::Simple(simple)));
        }

        // The synthetic unit type: default operation input/output.
        prelude.insert(Shape::new(
            Self::id("Unit"),
            ShapeKind::Structure(StructureShape { members: vec![] }),
        ));

        // The meta-trait marking a shape as a trait definition.
        prelude.insert_trait_shape(
            Shape::new(
                Self::trait_id(),
                ShapeKind::Structure(StructureShape { members: vec![] }),
            ),
            json!({ "selector": "*" }),
        );

        // Annotation traits backed by empty structures.
        for (name, selector) in [
            ("required", "structure > member"),
            ("uniqueItems", "list"),
            ("idempotent", "operation"),
            ("readonly", "operation"),
        ] {
            prelude.insert_trait_shape(
                Shape::new(
                    Self::id(name),
                    ShapeKind::Structure(StructureShape { members: vec![] }),
                ),
                json!({ "selector": selector }),
            );
        }

        // String-valued traits.
        for (name, selector) in [
            ("pattern", "string"),
            ("error", "structure"),
            ("resourceIdentifier", "structure > member"),
        ] {
            prelude.insert_trait_shape(
                Shape::new(Self::id(name), ShapeKind::Simple(SimpleType::String)),
                json!({ "selector": selector }),
            );
        }

        // List-valued traits: contributions from multiple files concatenate.
        for name in ["tags", "references"] {
            prelude.insert_trait_shape(
                Shape::new(
                    Self::id(name),
                    ShapeKind::List(ListShape {
                        member: Member::new("member", Self::id("String")),
                        unique: false,
                    }),
                ),
                json!({ "selector": "*" }),
            );
        }

        // Structure-valued traits.
        for (name, selector) in [("length", "list, map, string, blob"), ("deprecated", "*")] {
            prelude.insert_trait_shape(
                Shape::new(
                    Self::id(name),
                    ShapeKind::Structure(StructureShape { members: vec![] }),
                ),
                json!({ "selector": selector }),
            );
        }

        prelude
    }

    fn insert(&mut self, shape: Shape) {
        self.shapes.insert(shape.id.clone(), shape);
    }

    fn insert_trait_shape(&mut self, shape: Shape, definition: serde_json::Value) {
        let id = shape.id.clone();
        self.insert(shape);
        self.traits
            .insert(id, AppliedTrait::new(Self::trait_id(), definition));
    }

    /// A shape ID in the prelude namespace.
    pub fn id(name: &str) -> ShapeId {
        ShapeId::new(PRELUDE_NAMESPACE, name)
    }

    /// `trellis.api#trait`, the meta-trait.
    pub fn trait_id() -> ShapeId {
        Self::id("trait")
    }

    /// `trellis.api#Unit`, the synthetic unit structure.
    pub fn unit_id() -> ShapeId {
        Self::id("Unit")
    }

    /// `trellis.api#required`.
    pub fn required_id() -> ShapeId {
        Self::id("required")
    }

    /// `trellis.api#resourceIdentifier`, the explicit identifier binding.
    pub fn resource_identifier_id() -> ShapeId {
        Self::id("resourceIdentifier")
    }

    /// `trellis.api#error`.
    pub fn error_id() -> ShapeId {
        Self::id("error")
    }

    pub fn contains(&self, id: &ShapeId) -> bool {
        self.shapes.contains_key(&id.without_member())
    }

    pub fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }

    pub fn traits(&self) -> &TraitTable {
        &self.traits
    }
}

impl Default for Prelude {
    fn default() -> Self {
        Self::standard()
    }
}
