//! Illegal-recursion detection over the containment subgraph.
//!
//! Containment edges are member-target edges of aggregate shapes. Two
//! analyses run over them:
//!
//! 1. Collection rule: a cycle passing only through list/set/map shapes is
//!    illegal, since no representation can express unbounded nesting of
//!    bare collections.
//! 2. Finite-value rule: a least-fixpoint "terminable" computation. A
//!    structure is terminable when every required member target is
//!    terminable; a union when some member target is. Shapes left
//!    non-terminable can never be given a finite value, and each cycle
//!    among them is reported once.

use std::collections::{BTreeMap, BTreeSet};

use trellis_core::diagnostic::ids;
use trellis_core::{Diagnostic, Model, Prelude, Shape, ShapeId, ShapeKind};

use crate::scc::{is_cycle, strongly_connected_components};

pub fn validate(model: &Model) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    check_collection_cycles(model, &mut diagnostics);
    check_finite_values(model, &mut diagnostics);
    diagnostics
}

/// Containment edges restricted to collection shapes on both ends.
fn check_collection_cycles(model: &Model, diagnostics: &mut Vec<Diagnostic>) {
    let mut edges: BTreeMap<ShapeId, Vec<ShapeId>> = BTreeMap::new();
    for shape in model.shapes() {
        if !shape.is_collection() {
            continue;
        }
        let successors = shape
            .members()
            .iter()
            .map(|m| m.target.clone())
            .filter(|target| {
                model
                    .shape(target)
                    .map(Shape::is_collection)
                    .unwrap_or(false)
            })
            .collect();
        edges.insert(shape.id.clone(), successors);
    }

    for component in strongly_connected_components(&edges) {
        if is_cycle(&component, &edges) {
            diagnostics.push(
                Diagnostic::error(
                    ids::RECURSION_VIOLATION,
                    format!(
                        "collections [{}] recursively contain each other without an \
                         intervening structure or union",
                        joined(&component)
                    ),
                )
                .with_shape(component[0].clone()),
            );
        }
    }
}

/// Least fixpoint of "this shape admits a finite value".
fn check_finite_values(model: &Model, diagnostics: &mut Vec<Diagnostic>) {
    let required = Prelude::required_id();
    let mut terminable: BTreeSet<ShapeId> = BTreeSet::new();

    // Start from the shapes that terminate on their own: simple shapes,
    // collections (an empty collection is always a value), and service
    // kinds, which are not value types at all.
    for shape in model.shapes() {
        if shape.is_simple() || shape.is_collection() || shape.is_service_kind() {
            terminable.insert(shape.id.clone());
        }
    }

    loop {
        let mut changed = false;
        for shape in model.shapes() {
            if terminable.contains(&shape.id) {
                continue;
            }
            let now_terminable = match &shape.kind {
                ShapeKind::Structure(s) => s.members.iter().all(|m| {
                    let member_id = m.shape_id(&shape.id);
                    !model.has_trait(&member_id, &required) || terminable.contains(&m.target)
                }),
                ShapeKind::Union(u) => u.members.iter().any(|m| terminable.contains(&m.target)),
                _ => true,
            };
            if now_terminable {
                terminable.insert(shape.id.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    // Blocking edges among the non-terminable remainder: required structure
    // members and all union members.
    let mut edges: BTreeMap<ShapeId, Vec<ShapeId>> = BTreeMap::new();
    for shape in model.shapes() {
        if terminable.contains(&shape.id) {
            continue;
        }
        let successors: Vec<ShapeId> = match &shape.kind {
            ShapeKind::Structure(s) => s
                .members
                .iter()
                .filter(|m| model.has_trait(&m.shape_id(&shape.id), &required))
                .map(|m| m.target.clone())
                .filter(|t| !terminable.contains(t))
                .collect(),
            ShapeKind::Union(u) => u
                .members
                .iter()
                .map(|m| m.target.clone())
                .filter(|t| !terminable.contains(t))
                .collect(),
            _ => Vec::new(),
        };
        edges.insert(shape.id.clone(), successors);
    }

    for component in strongly_connected_components(&edges) {
        if !is_cycle(&component, &edges) {
            continue;
        }
        let has_union = component
            .iter()
            .any(|id| matches!(model.shape(id).map(|s| &s.kind), Some(ShapeKind::Union(_))));
        let message = if has_union {
            format!(
                "union cycle [{}] has no productive path; no finite value can \
                 terminate it",
                joined(&component)
            )
        } else {
            format!(
                "structures [{}] require each other through required members; no \
                 finite value satisfies the cycle",
                joined(&component)
            )
        };
        diagnostics.push(
            Diagnostic::error(ids::RECURSION_VIOLATION, message).with_shape(component[0].clone()),
        );
    }
}

fn joined(ids: &[ShapeId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
