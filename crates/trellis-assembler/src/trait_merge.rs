//! Trait contribution reduction.
//!
//! All trait applications for one (target, trait) pair reduce to a single
//! value: equal values collapse, values of list-kind traits concatenate in
//! file order, anything else is a fatal `TraitConflict`. Traits whose
//! definitions declare `conflicts` or `structurallyExclusive` get their
//! exclusion rules enforced after reduction.

use std::collections::BTreeMap;

use serde_json::Value;

use trellis_core::diagnostic::ids;
use trellis_core::{
    AppliedTrait, Diagnostic, Prelude, Shape, ShapeId, ShapeKind, StructuralExclusion,
    TraitDefinition, TraitTable,
};

use crate::merge::TraitContribution;

/// Index of trait definitions in scope, extracted from meta-trait
/// applications before reduction.
pub struct TraitIndex {
    definitions: BTreeMap<ShapeId, TraitDefinition>,
}

impl TraitIndex {
    /// A trait is known when its shape carries the meta-trait.
    pub fn from_contributions(contributions: &[TraitContribution]) -> Self {
        let meta = Prelude::trait_id();
        let mut definitions = BTreeMap::new();
        for c in contributions {
            if c.trait_id == meta {
                definitions.insert(c.target.clone(), TraitDefinition::from_value(&c.value));
            }
        }
        Self { definitions }
    }

    pub fn is_known(&self, trait_id: &ShapeId) -> bool {
        self.definitions.contains_key(trait_id)
    }

    pub fn definition(&self, trait_id: &ShapeId) -> Option<&TraitDefinition> {
        self.definitions.get(trait_id)
    }
}

/// Reduce contributions into the final trait table.
pub fn reduce_traits(
    contributions: Vec<TraitContribution>,
    shapes: &BTreeMap<ShapeId, Shape>,
    index: &TraitIndex,
    allow_unknown_traits: bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> TraitTable {
    // Group per (target, trait); BTreeMap keys give deterministic diagnostic
    // order, the Vec preserves file order within a group.
    let mut groups: BTreeMap<(ShapeId, ShapeId), Vec<TraitContribution>> = BTreeMap::new();
    for c in contributions {
        groups
            .entry((c.target.clone(), c.trait_id.clone()))
            .or_default()
            .push(c);
    }

    let mut table = TraitTable::new();
    for ((target, trait_id), group) in groups {
        if !target_exists(&target, shapes) {
            diagnostics.push(
                Diagnostic::error(
                    ids::UNRESOLVED_REFERENCE,
                    format!("trait `{trait_id}` applied to unknown shape `{target}`"),
                )
                .with_shape(target.clone())
                .at(group[0].location.clone()),
            );
            continue;
        }
        if !index.is_known(&trait_id) {
            let message = format!("`{trait_id}` is applied to `{target}` but is not a known trait");
            diagnostics.push(if allow_unknown_traits {
                Diagnostic::warning(ids::UNRESOLVED_REFERENCE, message)
            } else {
                Diagnostic::error(ids::UNRESOLVED_REFERENCE, message)
            }
            .with_shape(target.clone())
            .at(group[0].location.clone()));
            if !allow_unknown_traits {
                continue;
            }
        }

        let applied = reduce_group(&target, &trait_id, group, shapes, diagnostics);
        table.insert(target, applied);
    }

    enforce_declared_conflicts(&table, index, diagnostics);
    enforce_structural_exclusion(&table, index, shapes, diagnostics);
    table
}

fn target_exists(target: &ShapeId, shapes: &BTreeMap<ShapeId, Shape>) -> bool {
    match target.member() {
        None => shapes.contains_key(target),
        Some(name) => shapes
            .get(&target.without_member())
            .and_then(|shape| shape.member(name))
            .is_some(),
    }
}

/// Values of a trait whose shape is a list or set concatenate in file order.
fn is_list_kind(trait_id: &ShapeId, shapes: &BTreeMap<ShapeId, Shape>) -> bool {
    matches!(shapes.get(trait_id).map(|s| &s.kind), Some(ShapeKind::List(_)))
}

fn reduce_group(
    target: &ShapeId,
    trait_id: &ShapeId,
    group: Vec<TraitContribution>,
    shapes: &BTreeMap<ShapeId, Shape>,
    diagnostics: &mut Vec<Diagnostic>,
) -> AppliedTrait {
    let concat = is_list_kind(trait_id, shapes);
    let mut iter = group.into_iter();
    let first = iter.next().expect("group is never empty");
    let location = first.location.clone();
    let mut value = first.value;

    // Concatenation comes before the equality short-circuit: two identical
    // array contributions to a list-kind trait still stack.
    for next in iter {
        if concat && value.is_array() && next.value.is_array() {
            if let (Value::Array(merged), Value::Array(more)) = (&mut value, next.value) {
                merged.extend(more);
            }
        } else if next.value == value {
            continue;
        } else {
            diagnostics.push(
                Diagnostic::error(
                    ids::TRAIT_CONFLICT,
                    format!(
                        "conflicting values for trait `{trait_id}` on `{target}`: \
                         `{value}` ({location}) vs `{}` ({})",
                        next.value, next.location
                    ),
                )
                .with_shape(target.clone())
                .at(next.location),
            );
        }
    }

    AppliedTrait::new(trait_id.clone(), value).at(location)
}

/// Traits listed in a definition's `conflicts` can never coexist with it on
/// one shape, even with equal values.
fn enforce_declared_conflicts(
    table: &TraitTable,
    index: &TraitIndex,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for target in table.targets() {
        for applied in table.of(target) {
            let Some(definition) = index.definition(&applied.trait_id) else {
                continue;
            };
            for other in &definition.conflicts {
                if table.has(target, other) {
                    diagnostics.push(
                        Diagnostic::error(
                            ids::TRAIT_CONFLICT,
                            format!(
                                "trait `{}` conflicts with `{other}` on `{target}`",
                                applied.trait_id
                            ),
                        )
                        .with_shape(target.clone())
                        .at(applied.location.clone()),
                    );
                }
            }
        }
    }
}

/// `structurallyExclusive: member` limits a trait to one member per
/// structure; `target` limits one member per structure to targeting a shape
/// carrying the trait.
fn enforce_structural_exclusion(
    table: &TraitTable,
    index: &TraitIndex,
    shapes: &BTreeMap<ShapeId, Shape>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for shape in shapes.values() {
        let members = match &shape.kind {
            ShapeKind::Structure(s) => &s.members,
            _ => continue,
        };
        let mut marked_members: BTreeMap<ShapeId, Vec<String>> = BTreeMap::new();
        let mut marked_targets: BTreeMap<ShapeId, Vec<String>> = BTreeMap::new();
        for member in members {
            let member_id = member.shape_id(&shape.id);
            for applied in table.of(&member_id) {
                marked_members
                    .entry(applied.trait_id.clone())
                    .or_default()
                    .push(member.name.clone());
            }
            for applied in table.of(&member.target) {
                marked_targets
                    .entry(applied.trait_id.clone())
                    .or_default()
                    .push(member.name.clone());
            }
        }
        report_exclusion(
            &shape.id,
            &marked_members,
            index,
            StructuralExclusion::Member,
            "carry",
            diagnostics,
        );
        report_exclusion(
            &shape.id,
            &marked_targets,
            index,
            StructuralExclusion::Target,
            "target shapes carrying",
            diagnostics,
        );
    }
}

fn report_exclusion(
    shape_id: &ShapeId,
    marked: &BTreeMap<ShapeId, Vec<String>>,
    index: &TraitIndex,
    mode: StructuralExclusion,
    verb: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (trait_id, members) in marked {
        let exclusive = index
            .definition(trait_id)
            .map(|d| d.structurally_exclusive == mode)
            .unwrap_or(false);
        if exclusive && members.len() > 1 {
            diagnostics.push(
                Diagnostic::error(
                    ids::TRAIT_CONFLICT,
                    format!(
                        "members [{}] of `{shape_id}` all {verb} the structurally \
                         exclusive trait `{trait_id}`",
                        members.join(", ")
                    ),
                )
                .with_shape(shape_id.clone()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::{SourceLocation, StructureShape};

    fn id(s: &str) -> ShapeId {
        s.parse().unwrap()
    }

    fn contribution(target: &str, trait_id: &str, value: Value, file: &str) -> TraitContribution {
        TraitContribution {
            target: id(target),
            trait_id: id(trait_id),
            value,
            location: SourceLocation::file(file),
        }
    }

    fn prelude_setup() -> (BTreeMap<ShapeId, Shape>, Vec<TraitContribution>) {
        let prelude = Prelude::standard();
        let mut shapes = BTreeMap::new();
        for shape in prelude.shapes() {
            shapes.insert(shape.id.clone(), shape.clone());
        }
        let mut contributions = Vec::new();
        for target in prelude.traits().targets() {
            for applied in prelude.traits().of(target) {
                contributions.push(TraitContribution {
                    target: target.clone(),
                    trait_id: applied.trait_id.clone(),
                    value: applied.value.clone(),
                    location: applied.location.clone(),
                });
            }
        }
        (shapes, contributions)
    }

    fn reduce(
        shapes: &BTreeMap<ShapeId, Shape>,
        contributions: Vec<TraitContribution>,
        allow_unknown: bool,
    ) -> (TraitTable, Vec<Diagnostic>) {
        let index = TraitIndex::from_contributions(&contributions);
        let mut diagnostics = Vec::new();
        let table = reduce_traits(contributions, shapes, &index, allow_unknown, &mut diagnostics);
        (table, diagnostics)
    }

    #[test]
    fn equal_values_collapse() {
        let (mut shapes, mut contributions) = prelude_setup();
        let target = id("ns#Thing");
        shapes.insert(
            target.clone(),
            Shape::new(target.clone(), ShapeKind::Structure(StructureShape::default())),
        );
        contributions.push(contribution(
            "ns#Thing",
            "trellis.api#deprecated",
            json!({"message": "gone"}),
            "a.trellis",
        ));
        contributions.push(contribution(
            "ns#Thing",
            "trellis.api#deprecated",
            json!({"message": "gone"}),
            "b.trellis",
        ));
        let (table, diagnostics) = reduce(&shapes, contributions, false);
        assert!(diagnostics.iter().all(|d| !d.is_fatal()), "{diagnostics:?}");
        let applied = table.get(&target, &id("trellis.api#deprecated")).unwrap();
        assert_eq!(applied.value, json!({"message": "gone"}));
        // The first contribution's location survives.
        assert_eq!(applied.location, SourceLocation::file("a.trellis"));
    }

    #[test]
    fn list_trait_values_concatenate_in_file_order() {
        let (mut shapes, mut contributions) = prelude_setup();
        let target = id("ns#Thing");
        shapes.insert(
            target.clone(),
            Shape::new(target.clone(), ShapeKind::Structure(StructureShape::default())),
        );
        contributions.push(contribution(
            "ns#Thing",
            "trellis.api#tags",
            json!(["a", "b"]),
            "a.trellis",
        ));
        contributions.push(contribution(
            "ns#Thing",
            "trellis.api#tags",
            json!(["c"]),
            "b.trellis",
        ));
        let (table, diagnostics) = reduce(&shapes, contributions, false);
        assert!(diagnostics.iter().all(|d| !d.is_fatal()), "{diagnostics:?}");
        let applied = table.get(&target, &id("trellis.api#tags")).unwrap();
        assert_eq!(applied.value, json!(["a", "b", "c"]));
    }

    #[test]
    fn identical_list_trait_values_still_concatenate() {
        let (mut shapes, mut contributions) = prelude_setup();
        let target = id("ns#Thing");
        shapes.insert(
            target.clone(),
            Shape::new(target.clone(), ShapeKind::Structure(StructureShape::default())),
        );
        contributions.push(contribution(
            "ns#Thing",
            "trellis.api#tags",
            json!(["a"]),
            "a.trellis",
        ));
        contributions.push(contribution(
            "ns#Thing",
            "trellis.api#tags",
            json!(["a"]),
            "b.trellis",
        ));
        let (table, diagnostics) = reduce(&shapes, contributions, false);
        assert!(diagnostics.iter().all(|d| !d.is_fatal()), "{diagnostics:?}");
        let applied = table.get(&target, &id("trellis.api#tags")).unwrap();
        assert_eq!(applied.value, json!(["a", "a"]));
    }

    #[test]
    fn unequal_scalar_values_conflict() {
        let (mut shapes, mut contributions) = prelude_setup();
        let target = id("ns#Thing");
        shapes.insert(
            target.clone(),
            Shape::new(target.clone(), ShapeKind::Structure(StructureShape::default())),
        );
        contributions.push(contribution(
            "ns#Thing",
            "trellis.api#pattern",
            json!("^a"),
            "a.trellis",
        ));
        contributions.push(contribution(
            "ns#Thing",
            "trellis.api#pattern",
            json!("^b"),
            "b.trellis",
        ));
        let (table, diagnostics) = reduce(&shapes, contributions, false);
        assert!(diagnostics
            .iter()
            .any(|d| d.id == ids::TRAIT_CONFLICT && d.is_fatal()));
        // First value wins in the surviving table.
        let applied = table.get(&target, &id("trellis.api#pattern")).unwrap();
        assert_eq!(applied.value, json!("^a"));
    }

    #[test]
    fn unknown_trait_is_fatal_by_default() {
        let (mut shapes, mut contributions) = prelude_setup();
        let target = id("ns#Thing");
        shapes.insert(
            target.clone(),
            Shape::new(target.clone(), ShapeKind::Structure(StructureShape::default())),
        );
        contributions.push(contribution("ns#Thing", "ns#mystery", json!({}), "a.trellis"));

        let (table, diagnostics) = reduce(&shapes, contributions.clone(), false);
        assert!(diagnostics
            .iter()
            .any(|d| d.id == ids::UNRESOLVED_REFERENCE && d.is_fatal()));
        assert!(!table.has(&target, &id("ns#mystery")));

        // Opt-in keeps the trait opaque with a warning.
        let (table, diagnostics) = reduce(&shapes, contributions, true);
        assert!(diagnostics.iter().all(|d| !d.is_fatal()));
        assert!(table.has(&target, &id("ns#mystery")));
    }

    #[test]
    fn declared_conflicts_are_fatal_even_with_equal_values() {
        let (mut shapes, mut contributions) = prelude_setup();
        for name in ["ns#json", "ns#xml"] {
            let trait_shape = id(name);
            shapes.insert(
                trait_shape.clone(),
                Shape::new(trait_shape, ShapeKind::Structure(StructureShape::default())),
            );
        }
        contributions.push(contribution(
            "ns#json",
            "trellis.api#trait",
            json!({"selector": "*", "conflicts": ["ns#xml"]}),
            "traits.trellis",
        ));
        contributions.push(contribution(
            "ns#xml",
            "trellis.api#trait",
            json!({"selector": "*"}),
            "traits.trellis",
        ));
        let target = id("ns#Payload");
        shapes.insert(
            target.clone(),
            Shape::new(target, ShapeKind::Structure(StructureShape::default())),
        );
        contributions.push(contribution("ns#Payload", "ns#json", json!({}), "a.trellis"));
        contributions.push(contribution("ns#Payload", "ns#xml", json!({}), "a.trellis"));

        let (_, diagnostics) = reduce(&shapes, contributions, false);
        assert!(diagnostics
            .iter()
            .any(|d| d.id == ids::TRAIT_CONFLICT && d.message.contains("conflicts with")));
    }

    #[test]
    fn structurally_exclusive_member_trait_allows_only_one_member() {
        let (mut shapes, mut contributions) = prelude_setup();
        let primary = id("ns#primary");
        shapes.insert(
            primary.clone(),
            Shape::new(primary, ShapeKind::Structure(StructureShape::default())),
        );
        contributions.push(contribution(
            "ns#primary",
            "trellis.api#trait",
            json!({"selector": "structure > member", "structurallyExclusive": "member"}),
            "traits.trellis",
        ));
        let parent = id("ns#Key");
        shapes.insert(
            parent.clone(),
            Shape::new(
                parent,
                ShapeKind::Structure(StructureShape {
                    members: vec![
                        trellis_core::Member::new("x", Prelude::id("String")),
                        trellis_core::Member::new("y", Prelude::id("String")),
                    ],
                }),
            ),
        );
        contributions.push(contribution("ns#Key$x", "ns#primary", json!({}), "a.trellis"));
        contributions.push(contribution("ns#Key$y", "ns#primary", json!({}), "a.trellis"));

        let (_, diagnostics) = reduce(&shapes, contributions, false);
        assert!(diagnostics
            .iter()
            .any(|d| d.id == ids::TRAIT_CONFLICT && d.message.contains("structurally")));
    }

    #[test]
    fn trait_on_unknown_target_is_reported() {
        let (shapes, mut contributions) = prelude_setup();
        contributions.push(contribution(
            "ns#Missing",
            "trellis.api#deprecated",
            json!({}),
            "a.trellis",
        ));
        let (_, diagnostics) = reduce(&shapes, contributions, false);
        assert!(diagnostics
            .iter()
            .any(|d| d.id == ids::UNRESOLVED_REFERENCE && d.message.contains("ns#Missing")));
    }
}
