//! Service closure computation and name-collision resolution.
//!
//! The closure of a service is every shape transitively reachable through
//! operation/resource bindings and member targets. Code generators flatten
//! namespaces away, so two closure shapes may not share a case-insensitive
//! simple name unless they are interchangeable simple shapes or a service
//! `rename` entry disambiguates them.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use trellis_core::diagnostic::ids;
use trellis_core::{Diagnostic, Model, Prelude, ServiceShape, Shape, ShapeId, ShapeKind};

/// All shapes reachable from `service_id`.
///
/// The synthetic unit shape is excluded unless some union member in the
/// closure targets it; a generator only needs a unit type when it appears
/// as a variant payload.
pub fn closure(model: &Model, service_id: &ShapeId) -> BTreeSet<ShapeId> {
    let unit = Prelude::unit_id();
    let mut reachable: BTreeSet<ShapeId> = BTreeSet::new();
    let mut unit_via_union = false;
    let mut queue: VecDeque<ShapeId> = VecDeque::new();
    queue.push_back(service_id.clone());

    while let Some(id) = queue.pop_front() {
        if id == unit || !reachable.insert(id.clone()) {
            continue;
        }
        let Some(shape) = model.shape(&id) else {
            continue;
        };
        if let ShapeKind::Union(union) = &shape.kind {
            if union.members.iter().any(|m| m.target == unit) {
                unit_via_union = true;
            }
        }
        for neighbor in shape.neighbors() {
            if !reachable.contains(&neighbor) {
                queue.push_back(neighbor);
            }
        }
    }

    if unit_via_union && model.contains(&unit) {
        reachable.insert(unit);
    }
    reachable
}

pub fn validate(model: &Model) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for shape in model.shapes() {
        if let ShapeKind::Service(service) = &shape.kind {
            validate_service(model, shape, service, &mut diagnostics);
        }
    }
    diagnostics
}

fn validate_service(
    model: &Model,
    service_shape: &Shape,
    service: &ServiceShape,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let closure = closure(model, &service_shape.id);
    check_renames(model, service_shape, service, &closure, diagnostics);

    // Group by effective (possibly renamed) simple name.
    let mut by_name: BTreeMap<String, Vec<&ShapeId>> = BTreeMap::new();
    for id in &closure {
        let name = service
            .rename
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.name().to_string());
        by_name.entry(name.to_ascii_lowercase()).or_default().push(id);
    }

    for (name, group) in by_name {
        if group.len() < 2 || interchangeable(model, &group) {
            continue;
        }
        diagnostics.push(
            Diagnostic::error(
                ids::CLOSURE_NAME_CONFLICT,
                format!(
                    "shapes [{}] in the closure of `{}` share the name `{name}`; add a \
                     `rename` entry to disambiguate",
                    group
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                    service_shape.id
                ),
            )
            .with_shape(service_shape.id.clone()),
        );
    }
}

/// Colliding shapes are tolerated when every pair is interchangeable: the
/// same simple type, or lists of the same simple type, carrying identical
/// traits.
fn interchangeable(model: &Model, ids: &[&ShapeId]) -> bool {
    let Some(first) = model.shape(ids[0]) else {
        return false;
    };
    ids.iter().all(|id| {
        model
            .shape(id)
            .map(|shape| equivalent(model, first, shape))
            .unwrap_or(false)
    })
}

fn equivalent(model: &Model, a: &Shape, b: &Shape) -> bool {
    let structurally = match (&a.kind, &b.kind) {
        (ShapeKind::Simple(x), ShapeKind::Simple(y)) => x == y,
        (ShapeKind::List(x), ShapeKind::List(y)) => {
            x.unique == y.unique
                && x.member.target == y.member.target
                && model
                    .shape(&x.member.target)
                    .map(Shape::is_simple)
                    .unwrap_or(false)
        }
        _ => false,
    };
    structurally && trait_values(model, &a.id) == trait_values(model, &b.id)
}

fn trait_values(model: &Model, id: &ShapeId) -> BTreeMap<ShapeId, serde_json::Value> {
    model
        .traits_of(id)
        .map(|applied| (applied.trait_id.clone(), applied.value.clone()))
        .collect()
}

fn check_renames(
    model: &Model,
    service_shape: &Shape,
    service: &ServiceShape,
    closure: &BTreeSet<ShapeId>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (target, new_name) in &service.rename {
        let mut reject = |why: String| {
            diagnostics.push(
                Diagnostic::error(
                    ids::CLOSURE_NAME_CONFLICT,
                    format!(
                        "invalid rename of `{target}` to `{new_name}` on `{}`: {why}",
                        service_shape.id
                    ),
                )
                .with_shape(service_shape.id.clone()),
            );
        };

        if !closure.contains(target) {
            reject("the shape is not in the service closure".to_string());
            continue;
        }
        match model.shape(target).map(|s| &s.kind) {
            Some(ShapeKind::Operation(_)) | Some(ShapeKind::Resource(_))
            | Some(ShapeKind::Service(_)) => {
                reject("service kinds cannot be renamed".to_string());
                continue;
            }
            _ => {}
        }
        if target.is_member() {
            reject("members cannot be renamed".to_string());
            continue;
        }
        if new_name == target.name() {
            reject("the new name is identical to the current name".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{
        Member, OperationShape, SimpleType, StructureShape, TraitTable, UnionShape,
    };

    fn id(s: &str) -> ShapeId {
        s.parse().unwrap()
    }

    struct Builder {
        shapes: BTreeMap<ShapeId, Shape>,
    }

    impl Builder {
        fn new() -> Self {
            let mut shapes = BTreeMap::new();
            for shape in Prelude::standard().shapes() {
                shapes.insert(shape.id.clone(), shape.clone());
            }
            Self { shapes }
        }

        fn shape(mut self, shape: Shape) -> Self {
            self.shapes.insert(shape.id.clone(), shape);
            self
        }

        fn simple(self, name: &str) -> Self {
            self.shape(Shape::new(id(name), ShapeKind::Simple(SimpleType::String)))
        }

        fn structure(self, name: &str, members: &[(&str, &str)]) -> Self {
            self.shape(Shape::new(
                id(name),
                ShapeKind::Structure(StructureShape {
                    members: members
                        .iter()
                        .map(|(member, target)| Member::new(member, id(target)))
                        .collect(),
                }),
            ))
        }

        fn operation(self, name: &str, input: &str) -> Self {
            self.shape(Shape::new(
                id(name),
                ShapeKind::Operation(OperationShape {
                    input: id(input),
                    output: Prelude::unit_id(),
                    errors: vec![],
                }),
            ))
        }

        fn service(self, name: &str, operations: &[&str], rename: &[(&str, &str)]) -> Self {
            self.shape(Shape::new(
                id(name),
                ShapeKind::Service(ServiceShape {
                    version: "2026-08-30".to_string(),
                    operations: operations.iter().map(|o| id(o)).collect(),
                    resources: vec![],
                    errors: vec![],
                    rename: rename
                        .iter()
                        .map(|(target, new_name)| (id(target), new_name.to_string()))
                        .collect(),
                }),
            ))
        }

        fn model(self) -> Model {
            Model::new(self.shapes, TraitTable::new(), BTreeMap::new())
        }
    }

    #[test]
    fn closure_reaches_through_bindings_and_members() {
        let model = Builder::new()
            .simple("ns#CityId")
            .structure("ns#GetCityInput", &[("cityId", "ns#CityId")])
            .operation("ns#GetCity", "ns#GetCityInput")
            .service("ns#Weather", &["ns#GetCity"], &[])
            .model();
        let closure = closure(&model, &id("ns#Weather"));
        for name in ["ns#Weather", "ns#GetCity", "ns#GetCityInput", "ns#CityId"] {
            assert!(closure.contains(&id(name)), "{name} missing");
        }
        // Unit is the operation output but is not reached via a union.
        assert!(!closure.contains(&Prelude::unit_id()));
    }

    #[test]
    fn unit_is_included_when_a_union_member_targets_it() {
        let model = Builder::new()
            .shape(Shape::new(
                id("ns#Maybe"),
                ShapeKind::Union(UnionShape {
                    members: vec![
                        Member::new("nothing", Prelude::unit_id()),
                        Member::new("text", Prelude::id("String")),
                    ],
                }),
            ))
            .structure("ns#Input", &[("value", "ns#Maybe")])
            .operation("ns#Put", "ns#Input")
            .service("ns#Svc", &["ns#Put"], &[])
            .model();
        assert!(closure(&model, &id("ns#Svc")).contains(&Prelude::unit_id()));
    }

    #[test]
    fn case_insensitive_name_collision_is_reported() {
        let model = Builder::new()
            .structure("ns.a#Widget", &[])
            .structure("ns.b#widget", &[])
            .structure("ns#Input", &[("x", "ns.a#Widget"), ("y", "ns.b#widget")])
            .operation("ns#Op", "ns#Input")
            .service("ns#Svc", &["ns#Op"], &[])
            .model();
        assert!(validate(&model)
            .iter()
            .any(|d| d.id == ids::CLOSURE_NAME_CONFLICT && d.message.contains("widget")));
    }

    #[test]
    fn identical_simple_shapes_may_share_a_name() {
        let model = Builder::new()
            .simple("ns.a#CityId")
            .simple("ns.b#CityId")
            .structure("ns#Input", &[("x", "ns.a#CityId"), ("y", "ns.b#CityId")])
            .operation("ns#Op", "ns#Input")
            .service("ns#Svc", &["ns#Op"], &[])
            .model();
        assert!(validate(&model).is_empty());
    }

    #[test]
    fn rename_resolves_a_collision() {
        let model = Builder::new()
            .structure("ns.a#Widget", &[])
            .structure("ns.b#Widget", &[])
            .structure("ns#Input", &[("x", "ns.a#Widget"), ("y", "ns.b#Widget")])
            .operation("ns#Op", "ns#Input")
            .service("ns#Svc", &["ns#Op"], &[("ns.b#Widget", "LegacyWidget")])
            .model();
        assert!(validate(&model).is_empty());
    }

    #[test]
    fn rename_of_shape_outside_the_closure_is_rejected() {
        let model = Builder::new()
            .structure("ns#Elsewhere", &[])
            .structure("ns#Input", &[])
            .operation("ns#Op", "ns#Input")
            .service("ns#Svc", &["ns#Op"], &[("ns#Elsewhere", "Other")])
            .model();
        assert!(validate(&model)
            .iter()
            .any(|d| d.message.contains("not in the service closure")));
    }

    #[test]
    fn rename_to_the_same_name_is_rejected() {
        let model = Builder::new()
            .structure("ns#Input", &[])
            .operation("ns#Op", "ns#Input")
            .service("ns#Svc", &["ns#Op"], &[("ns#Input", "Input")])
            .model();
        assert!(validate(&model)
            .iter()
            .any(|d| d.message.contains("identical to the current name")));
    }

    #[test]
    fn rename_of_an_operation_is_rejected() {
        let model = Builder::new()
            .structure("ns#Input", &[])
            .operation("ns#Op", "ns#Input")
            .service("ns#Svc", &["ns#Op"], &[("ns#Op", "Op2")])
            .model();
        assert!(validate(&model)
            .iter()
            .any(|d| d.message.contains("service kinds cannot be renamed")));
    }

    #[test]
    fn rename_that_still_collides_is_reported() {
        let model = Builder::new()
            .structure("ns.a#Widget", &[])
            .structure("ns.b#Widget", &[])
            .structure("ns#Input", &[("x", "ns.a#Widget"), ("y", "ns.b#Widget")])
            .operation("ns#Op", "ns#Input")
            .service("ns#Svc", &["ns#Op"], &[("ns.b#Widget", "WIDGET")])
            .model();
        assert!(validate(&model)
            .iter()
            .any(|d| d.id == ids::CLOSURE_NAME_CONFLICT));
    }
}
