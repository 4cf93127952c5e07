//! Post-merge structural checks: every resolved reference must exist and
//! point at a shape of a compatible kind.

use std::collections::BTreeMap;

use trellis_core::diagnostic::ids;
use trellis_core::{Diagnostic, Prelude, Shape, ShapeId, ShapeKind, TraitTable};

pub fn run_checks(
    shapes: &BTreeMap<ShapeId, Shape>,
    traits: &TraitTable,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for shape in shapes.values() {
        match &shape.kind {
            ShapeKind::Structure(_) | ShapeKind::Union(_) | ShapeKind::List(_)
            | ShapeKind::Map(_) => check_member_targets(shape, shapes, diagnostics),
            ShapeKind::Service(service) => {
                expect_kind(shape, &service.operations, "operation", shapes, is_operation, diagnostics);
                expect_kind(shape, &service.resources, "resource", shapes, is_resource, diagnostics);
                check_errors(shape, &service.errors, shapes, traits, diagnostics);
            }
            ShapeKind::Operation(op) => {
                expect_kind(
                    shape,
                    std::slice::from_ref(&op.input),
                    "structure",
                    shapes,
                    is_structure,
                    diagnostics,
                );
                expect_kind(
                    shape,
                    std::slice::from_ref(&op.output),
                    "structure",
                    shapes,
                    is_structure,
                    diagnostics,
                );
                check_errors(shape, &op.errors, shapes, traits, diagnostics);
            }
            ShapeKind::Resource(resource) => {
                expect_kind(
                    shape,
                    &resource.all_operations(),
                    "operation",
                    shapes,
                    is_operation,
                    diagnostics,
                );
                expect_kind(shape, &resource.resources, "resource", shapes, is_resource, diagnostics);
                let identifier_targets: Vec<ShapeId> =
                    resource.identifiers.values().cloned().collect();
                expect_kind(
                    shape,
                    &identifier_targets,
                    "simple shape",
                    shapes,
                    |s| s.is_simple(),
                    diagnostics,
                );
            }
            ShapeKind::Simple(_) => {}
        }

        if let ShapeKind::Union(union) = &shape.kind {
            if union.members.is_empty() {
                diagnostics.push(
                    Diagnostic::error(
                        ids::MALFORMED_SHAPE,
                        format!("union `{}` must declare at least one member", shape.id),
                    )
                    .with_shape(shape.id.clone())
                    .at(shape.location.clone()),
                );
            }
        }
    }
}

/// Member targets may be any defined non-service-kind shape.
fn check_member_targets(
    shape: &Shape,
    shapes: &BTreeMap<ShapeId, Shape>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for member in shape.members() {
        match shapes.get(&member.target) {
            None => diagnostics.push(
                Diagnostic::error(
                    ids::UNRESOLVED_REFERENCE,
                    format!(
                        "member `{}` of `{}` targets undefined shape `{}`",
                        member.name, shape.id, member.target
                    ),
                )
                .with_shape(member.shape_id(&shape.id))
                .at(member.location.clone()),
            ),
            Some(target) if target.is_service_kind() => diagnostics.push(
                Diagnostic::error(
                    ids::UNRESOLVED_REFERENCE,
                    format!(
                        "member `{}` of `{}` targets `{}`, a {} shape; members cannot \
                         target service kinds",
                        member.name,
                        shape.id,
                        member.target,
                        target.kind.name()
                    ),
                )
                .with_shape(member.shape_id(&shape.id))
                .at(member.location.clone()),
            ),
            Some(_) => {}
        }
    }
}

fn is_operation(shape: &Shape) -> bool {
    matches!(shape.kind, ShapeKind::Operation(_))
}

fn is_resource(shape: &Shape) -> bool {
    matches!(shape.kind, ShapeKind::Resource(_))
}

fn is_structure(shape: &Shape) -> bool {
    matches!(shape.kind, ShapeKind::Structure(_))
}

fn expect_kind(
    shape: &Shape,
    targets: &[ShapeId],
    expected: &str,
    shapes: &BTreeMap<ShapeId, Shape>,
    matches: impl Fn(&Shape) -> bool,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for target in targets {
        match shapes.get(target) {
            None => diagnostics.push(
                Diagnostic::error(
                    ids::UNRESOLVED_REFERENCE,
                    format!("`{}` references undefined shape `{target}`", shape.id),
                )
                .with_shape(shape.id.clone())
                .at(shape.location.clone()),
            ),
            Some(found) if !matches(found) => diagnostics.push(
                Diagnostic::error(
                    ids::UNRESOLVED_REFERENCE,
                    format!(
                        "`{}` references `{target}`, a {} shape, where a {expected} is required",
                        shape.id,
                        found.kind.name()
                    ),
                )
                .with_shape(shape.id.clone())
                .at(shape.location.clone()),
            ),
            Some(_) => {}
        }
    }
}

/// Declared errors must be structures carrying the error trait.
fn check_errors(
    shape: &Shape,
    errors: &[ShapeId],
    shapes: &BTreeMap<ShapeId, Shape>,
    traits: &TraitTable,
    diagnostics: &mut Vec<Diagnostic>,
) {
    expect_kind(shape, errors, "structure", shapes, is_structure, diagnostics);
    for error in errors {
        if shapes.contains_key(error) && !traits.has(error, &Prelude::error_id()) {
            diagnostics.push(
                Diagnostic::error(
                    ids::UNRESOLVED_REFERENCE,
                    format!(
                        "`{}` declares error `{error}`, which does not carry `{}`",
                        shape.id,
                        Prelude::error_id()
                    ),
                )
                .with_shape(shape.id.clone())
                .at(shape.location.clone()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{
        Member, OperationShape, SimpleType, StructureShape, UnionShape,
    };

    fn id(s: &str) -> ShapeId {
        s.parse().unwrap()
    }

    fn base_shapes() -> BTreeMap<ShapeId, Shape> {
        let mut shapes = BTreeMap::new();
        for shape in Prelude::standard().shapes() {
            shapes.insert(shape.id.clone(), shape.clone());
        }
        shapes
    }

    fn insert(shapes: &mut BTreeMap<ShapeId, Shape>, shape: Shape) {
        shapes.insert(shape.id.clone(), shape);
    }

    #[test]
    fn undefined_member_target_is_reported() {
        let mut shapes = base_shapes();
        insert(
            &mut shapes,
            Shape::new(
                id("ns#Input"),
                ShapeKind::Structure(StructureShape {
                    members: vec![Member::new("city", id("ns#Missing"))],
                }),
            ),
        );
        let mut diagnostics = Vec::new();
        run_checks(&shapes, &TraitTable::new(), &mut diagnostics);
        assert!(diagnostics
            .iter()
            .any(|d| d.id == ids::UNRESOLVED_REFERENCE && d.message.contains("ns#Missing")));
    }

    #[test]
    fn member_may_not_target_a_service_kind() {
        let mut shapes = base_shapes();
        insert(
            &mut shapes,
            Shape::new(
                id("ns#Ping"),
                ShapeKind::Operation(OperationShape {
                    input: Prelude::unit_id(),
                    output: Prelude::unit_id(),
                    errors: vec![],
                }),
            ),
        );
        insert(
            &mut shapes,
            Shape::new(
                id("ns#Input"),
                ShapeKind::Structure(StructureShape {
                    members: vec![Member::new("op", id("ns#Ping"))],
                }),
            ),
        );
        let mut diagnostics = Vec::new();
        run_checks(&shapes, &TraitTable::new(), &mut diagnostics);
        assert!(diagnostics
            .iter()
            .any(|d| d.message.contains("cannot target service kinds")));
    }

    #[test]
    fn operation_input_must_be_a_structure() {
        let mut shapes = base_shapes();
        insert(
            &mut shapes,
            Shape::new(id("ns#CityId"), ShapeKind::Simple(SimpleType::String)),
        );
        insert(
            &mut shapes,
            Shape::new(
                id("ns#GetCity"),
                ShapeKind::Operation(OperationShape {
                    input: id("ns#CityId"),
                    output: Prelude::unit_id(),
                    errors: vec![],
                }),
            ),
        );
        let mut diagnostics = Vec::new();
        run_checks(&shapes, &TraitTable::new(), &mut diagnostics);
        assert!(diagnostics
            .iter()
            .any(|d| d.message.contains("where a structure is required")));
    }

    #[test]
    fn empty_union_is_malformed() {
        let mut shapes = base_shapes();
        insert(
            &mut shapes,
            Shape::new(id("ns#Choice"), ShapeKind::Union(UnionShape::default())),
        );
        let mut diagnostics = Vec::new();
        run_checks(&shapes, &TraitTable::new(), &mut diagnostics);
        assert!(diagnostics
            .iter()
            .any(|d| d.id == ids::MALFORMED_SHAPE && d.message.contains("ns#Choice")));
    }

    #[test]
    fn declared_error_must_carry_the_error_trait() {
        let mut shapes = base_shapes();
        insert(
            &mut shapes,
            Shape::new(
                id("ns#NotFound"),
                ShapeKind::Structure(StructureShape::default()),
            ),
        );
        insert(
            &mut shapes,
            Shape::new(
                id("ns#GetCity"),
                ShapeKind::Operation(OperationShape {
                    input: Prelude::unit_id(),
                    output: Prelude::unit_id(),
                    errors: vec![id("ns#NotFound")],
                }),
            ),
        );
        let mut diagnostics = Vec::new();
        run_checks(&shapes, &TraitTable::new(), &mut diagnostics);
        assert!(diagnostics
            .iter()
            .any(|d| d.message.contains("does not carry")));

        // With the trait applied the operation is clean.
        let mut traits = TraitTable::new();
        traits.insert(
            id("ns#NotFound"),
            trellis_core::AppliedTrait::new(Prelude::error_id(), serde_json::json!("client")),
        );
        let mut diagnostics = Vec::new();
        run_checks(&shapes, &traits, &mut diagnostics);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }
}
