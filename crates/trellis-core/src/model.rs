//! The completed, immutable semantic model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shape::{Member, Shape};
use crate::shape_id::ShapeId;
use crate::traits::{AppliedTrait, TraitDefinition, TraitTable};

/// A fully assembled model: the shape graph, the trait table, and the
/// model-wide metadata map.
///
/// Models are only constructed by the assembler. Every query takes `&self`;
/// validators may share one model by reference concurrently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    shapes: BTreeMap<ShapeId, Shape>,
    traits: TraitTable,
    metadata: BTreeMap<String, Value>,
}

impl Model {
    pub fn new(
        shapes: BTreeMap<ShapeId, Shape>,
        traits: TraitTable,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            shapes,
            traits,
            metadata,
        }
    }

    /// Look up a root shape by ID.
    pub fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    /// Look up a shape that must exist.
    ///
    /// Panics when absent: querying an ID that assembly never produced is a
    /// programming-contract violation, not a model defect.
    pub fn expect_shape(&self, id: &ShapeId) -> &Shape {
        self.shapes
            .get(id)
            .unwrap_or_else(|| panic!("shape not found in assembled model: {id}"))
    }

    /// Resolve a member ID to its member declaration.
    pub fn member(&self, id: &ShapeId) -> Option<&Member> {
        let name = id.member()?;
        self.shapes.get(&id.without_member())?.member(name)
    }

    pub fn contains(&self, id: &ShapeId) -> bool {
        if id.is_member() {
            self.member(id).is_some()
        } else {
            self.shapes.contains_key(id)
        }
    }

    /// All root shapes in ID order.
    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }

    pub fn shape_ids(&self) -> impl Iterator<Item = &ShapeId> {
        self.shapes.keys()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// All traits applied to a shape or member.
    pub fn traits_of(&self, id: &ShapeId) -> impl Iterator<Item = &AppliedTrait> {
        self.traits.of(id)
    }

    /// The value of a trait applied to a shape, if present.
    pub fn trait_value(&self, id: &ShapeId, trait_id: &ShapeId) -> Option<&Value> {
        self.traits.get(id, trait_id).map(|t| &t.value)
    }

    pub fn has_trait(&self, id: &ShapeId, trait_id: &ShapeId) -> bool {
        self.traits.has(id, trait_id)
    }

    pub fn trait_table(&self) -> &TraitTable {
        &self.traits
    }

    /// The definition governing a trait, read from the meta-trait applied
    /// to the trait's own shape. `None` when `trait_id` is not a trait.
    pub fn trait_definition(&self, trait_id: &ShapeId) -> Option<TraitDefinition> {
        let meta = crate::prelude::Prelude::trait_id();
        self.trait_value(trait_id, &meta)
            .map(TraitDefinition::from_value)
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Direct neighbors of a root shape: member targets and service-kind
    /// references. Empty for unknown IDs.
    pub fn neighbors(&self, id: &ShapeId) -> Vec<ShapeId> {
        self.shapes.get(id).map(Shape::neighbors).unwrap_or_default()
    }
}
