//! Applied traits, the per-shape trait table, and trait definitions.
//!
//! A trait is itself defined by a shape carrying the `trellis.api#trait`
//! meta-trait; [`TraitDefinition`] is the parsed form of that meta-trait's
//! value and governs where and how the trait may be applied.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shape_id::ShapeId;
use crate::source::SourceLocation;

/// A trait applied to exactly one shape. After assembly there is at most
/// one instance per `(shape, trait)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedTrait {
    pub trait_id: ShapeId,
    pub value: Value,
    #[serde(default)]
    pub location: SourceLocation,
}

impl AppliedTrait {
    pub fn new(trait_id: ShapeId, value: Value) -> Self {
        Self {
            trait_id,
            value,
            location: SourceLocation::none(),
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// Structural exclusivity mode of a trait definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StructuralExclusion {
    /// No exclusivity constraint.
    #[default]
    None,
    /// At most one member of a structure may carry the trait.
    Member,
    /// At most one member of a structure may target a shape carrying the trait.
    Target,
}

/// The parsed value of the `trellis.api#trait` meta-trait.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraitDefinition {
    /// Where the trait may be applied. Carried as an opaque selector
    /// expression; selector evaluation belongs to downstream tooling.
    pub selector: String,
    /// Traits that may not be applied together with this one.
    pub conflicts: Vec<ShapeId>,
    pub structurally_exclusive: StructuralExclusion,
    /// Which changes to this trait are breaking, as opaque rule strings.
    pub breaking_changes: Vec<String>,
}

impl TraitDefinition {
    /// Parse from a meta-trait value. Absent or non-object values (e.g. the
    /// empty annotation form `{}`) yield the permissive default.
    pub fn from_value(value: &Value) -> Self {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => return Self::default(),
        };

        let selector = obj
            .get("selector")
            .and_then(Value::as_str)
            .unwrap_or("*")
            .to_string();

        let conflicts = obj
            .get("conflicts")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        let structurally_exclusive = match obj.get("structurallyExclusive").and_then(Value::as_str)
        {
            Some("member") => StructuralExclusion::Member,
            Some("target") => StructuralExclusion::Target,
            _ => StructuralExclusion::None,
        };

        let breaking_changes = obj
            .get("breakingChanges")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            selector,
            conflicts,
            structurally_exclusive,
            breaking_changes,
        }
    }
}

/// All applied traits of a model, keyed by target shape then trait ID.
///
/// Built once by the assembler's trait reduction; read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitTable {
    traits: BTreeMap<ShapeId, BTreeMap<ShapeId, AppliedTrait>>,
}

impl TraitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the applied trait for `(target, trait)`.
    pub fn insert(&mut self, target: ShapeId, applied: AppliedTrait) {
        self.traits
            .entry(target)
            .or_default()
            .insert(applied.trait_id.clone(), applied);
    }

    /// All traits applied to a shape, in trait-ID order.
    pub fn of(&self, target: &ShapeId) -> impl Iterator<Item = &AppliedTrait> {
        self.traits.get(target).into_iter().flatten().map(|(_, t)| t)
    }

    /// The applied trait for `(target, trait)`, if any.
    pub fn get(&self, target: &ShapeId, trait_id: &ShapeId) -> Option<&AppliedTrait> {
        self.traits.get(target).and_then(|m| m.get(trait_id))
    }

    pub fn has(&self, target: &ShapeId, trait_id: &ShapeId) -> bool {
        self.get(target, trait_id).is_some()
    }

    /// Every shape that carries at least one trait.
    pub fn targets(&self) -> impl Iterator<Item = &ShapeId> {
        self.traits.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }
}
