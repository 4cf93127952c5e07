//! Resource identifier binding resolution.
//!
//! For every operation bound to a resource, each resource identifier must be
//! located in the operation's input: explicitly, through a member carrying
//! the `resourceIdentifier` trait naming the identifier, or implicitly,
//! through a required member whose name and target match the identifier
//! exactly. Explicit bindings win. The resulting binding set classifies the
//! operation as an instance operation or a collection operation.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use trellis_core::diagnostic::ids;
use trellis_core::{Diagnostic, Model, Prelude, ResourceShape, ShapeId, ShapeKind};

/// How an operation relates to the identifiers of the resource binding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    /// Every identifier of the resource is bound on the input.
    Instance,
    /// All parent identifiers are bound, at least one own identifier is not.
    Collection,
    /// Neither; always accompanied by a fatal diagnostic.
    None,
}

#[derive(Debug, Clone)]
struct ResolvedBinding {
    binding_type: BindingType,
    /// Identifier name to input member name.
    members: BTreeMap<String, String>,
}

/// Precomputed bindings for every `(resource, operation)` pair in a model.
#[derive(Debug, Clone)]
pub struct IdentifierBindingIndex {
    bindings: BTreeMap<(ShapeId, ShapeId), ResolvedBinding>,
}

impl IdentifierBindingIndex {
    pub fn of(model: &Model) -> Self {
        analyze(model).0
    }

    pub fn binding_type(&self, resource: &ShapeId, operation: &ShapeId) -> Option<BindingType> {
        self.bindings
            .get(&(resource.clone(), operation.clone()))
            .map(|b| b.binding_type)
    }

    /// Identifier name to input member name for one bound operation.
    pub fn bindings(
        &self,
        resource: &ShapeId,
        operation: &ShapeId,
    ) -> Option<&BTreeMap<String, String>> {
        self.bindings
            .get(&(resource.clone(), operation.clone()))
            .map(|b| &b.members)
    }
}

pub fn validate(model: &Model) -> Vec<Diagnostic> {
    analyze(model).1
}

fn analyze(model: &Model) -> (IdentifierBindingIndex, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut bindings = BTreeMap::new();

    // Every parent of each child resource; a child may be bound by more
    // than one parent.
    let mut parents: BTreeMap<ShapeId, BTreeSet<ShapeId>> = BTreeMap::new();
    for shape in model.shapes() {
        if let ShapeKind::Resource(resource) = &shape.kind {
            for child in &resource.resources {
                parents
                    .entry(child.clone())
                    .or_default()
                    .insert(shape.id.clone());
            }
        }
    }

    for shape in model.shapes() {
        let ShapeKind::Resource(resource) = &shape.kind else {
            continue;
        };
        let parent_names = check_parent_identifiers(model, &shape.id, resource, &parents, &mut diagnostics);

        for operation_id in resource.all_operations() {
            let resolved = resolve_operation(
                model,
                &shape.id,
                resource,
                &parent_names,
                &operation_id,
                &mut diagnostics,
            );
            bindings.insert((shape.id.clone(), operation_id), resolved);
        }
        check_lifecycle_slots(&shape.id, resource, &parent_names, &bindings, &mut diagnostics);
    }

    (IdentifierBindingIndex { bindings }, diagnostics)
}

/// A child resource re-declares every parent identifier verbatim. Returns
/// the set of identifier names inherited from ancestors.
///
/// The walk covers every ancestor of a multi-bound child and tracks
/// visited resources, so a cyclic hierarchy terminates with a diagnostic
/// instead of looping.
fn check_parent_identifiers(
    model: &Model,
    resource_id: &ShapeId,
    resource: &ResourceShape,
    parents: &BTreeMap<ShapeId, BTreeSet<ShapeId>>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<String> {
    let mut inherited = Vec::new();
    let mut visited: BTreeSet<&ShapeId> = BTreeSet::new();
    let mut queue: Vec<&ShapeId> = parents.get(resource_id).into_iter().flatten().collect();

    while let Some(parent_id) = queue.pop() {
        if parent_id == resource_id {
            diagnostics.push(
                Diagnostic::error(
                    ids::IDENTIFIER_BINDING_VIOLATION,
                    format!(
                        "resource `{resource_id}` is an ancestor of itself; the resource \
                         hierarchy must be acyclic"
                    ),
                )
                .with_shape(resource_id.clone()),
            );
            continue;
        }
        if !visited.insert(parent_id) {
            continue;
        }
        let Some(ShapeKind::Resource(parent)) = model.shape(parent_id).map(|s| &s.kind) else {
            continue;
        };
        for (name, target) in &parent.identifiers {
            match resource.identifiers.get(name) {
                Some(own) if own == target => {}
                Some(own) => diagnostics.push(
                    Diagnostic::error(
                        ids::IDENTIFIER_BINDING_VIOLATION,
                        format!(
                            "resource `{resource_id}` re-declares identifier `{name}` \
                             targeting `{own}`, but parent `{parent_id}` targets `{target}`"
                        ),
                    )
                    .with_shape(resource_id.clone()),
                ),
                None => diagnostics.push(
                    Diagnostic::error(
                        ids::IDENTIFIER_BINDING_VIOLATION,
                        format!(
                            "resource `{resource_id}` omits identifier `{name}` declared \
                             by parent `{parent_id}`"
                        ),
                    )
                    .with_shape(resource_id.clone()),
                ),
            }
            inherited.push(name.clone());
        }
        queue.extend(parents.get(parent_id).into_iter().flatten());
    }
    inherited.sort();
    inherited.dedup();
    inherited
}

fn resolve_operation(
    model: &Model,
    resource_id: &ShapeId,
    resource: &ResourceShape,
    parent_names: &[String],
    operation_id: &ShapeId,
    diagnostics: &mut Vec<Diagnostic>,
) -> ResolvedBinding {
    let required = Prelude::required_id();
    let explicit = Prelude::resource_identifier_id();

    let input_id = match model.shape(operation_id).map(|s| &s.kind) {
        Some(ShapeKind::Operation(op)) => op.input.clone(),
        _ => {
            // Kind mismatches are already reported by the assembler checks.
            return ResolvedBinding {
                binding_type: BindingType::None,
                members: BTreeMap::new(),
            };
        }
    };
    let input = model.shape(&input_id);

    let mut members: BTreeMap<String, String> = BTreeMap::new();
    if let Some(input) = input {
        // Explicit bindings first: the trait value names the identifier.
        for member in input.members() {
            let member_id = member.shape_id(&input.id);
            if let Some(Value::String(identifier)) = model.trait_value(&member_id, &explicit) {
                if resource.identifiers.contains_key(identifier) {
                    members.insert(identifier.clone(), member.name.clone());
                } else {
                    diagnostics.push(
                        Diagnostic::error(
                            ids::IDENTIFIER_BINDING_VIOLATION,
                            format!(
                                "member `{member_id}` binds identifier `{identifier}`, which \
                                 resource `{resource_id}` does not declare"
                            ),
                        )
                        .with_shape(member_id.clone()),
                    );
                }
            }
        }
        // Implicit bindings fill what remains: required members matching an
        // identifier by name and target.
        for member in input.members() {
            if members.contains_key(&member.name) {
                continue;
            }
            let member_id = member.shape_id(&input.id);
            let matches = resource.identifiers.get(&member.name) == Some(&member.target);
            if matches && model.has_trait(&member_id, &required) {
                members.insert(member.name.clone(), member.name.clone());
            }
        }
    }

    let own_unbound: Vec<&String> = resource
        .identifiers
        .keys()
        .filter(|name| !parent_names.contains(name) && !members.contains_key(*name))
        .collect();
    let parent_unbound: Vec<&String> = parent_names
        .iter()
        .filter(|name| resource.identifiers.contains_key(*name) && !members.contains_key(*name))
        .collect();

    let binding_type = if own_unbound.is_empty() && parent_unbound.is_empty() {
        BindingType::Instance
    } else if parent_unbound.is_empty() {
        BindingType::Collection
    } else {
        diagnostics.push(
            Diagnostic::error(
                ids::IDENTIFIER_BINDING_VIOLATION,
                format!(
                    "operation `{operation_id}` bound to `{resource_id}` leaves parent \
                     identifiers [{}] unbound on its input",
                    parent_unbound
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )
            .with_shape(operation_id.clone()),
        );
        BindingType::None
    };

    ResolvedBinding {
        binding_type,
        members,
    }
}

/// Lifecycle slots imply a binding type: read/update/delete/put address one
/// instance; create/list address the collection.
fn check_lifecycle_slots(
    resource_id: &ShapeId,
    resource: &ResourceShape,
    parent_names: &[String],
    bindings: &BTreeMap<(ShapeId, ShapeId), ResolvedBinding>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let has_own_identifiers = resource
        .identifiers
        .keys()
        .any(|name| !parent_names.contains(name));

    let instance_slots = [
        ("read", &resource.read),
        ("update", &resource.update),
        ("delete", &resource.delete),
        ("put", &resource.put),
    ];
    for (slot, operation) in instance_slots {
        let Some(operation_id) = operation else { continue };
        let binding = bindings.get(&(resource_id.clone(), operation_id.clone()));
        if let Some(binding) = binding {
            if binding.binding_type != BindingType::Instance {
                diagnostics.push(
                    Diagnostic::error(
                        ids::IDENTIFIER_BINDING_VIOLATION,
                        format!(
                            "`{slot}` lifecycle operation `{operation_id}` of \
                             `{resource_id}` must bind every resource identifier"
                        ),
                    )
                    .with_shape(operation_id.clone()),
                );
            }
        }
    }

    let collection_slots = [("create", &resource.create), ("list", &resource.list)];
    for (slot, operation) in collection_slots {
        let Some(operation_id) = operation else { continue };
        let binding = bindings.get(&(resource_id.clone(), operation_id.clone()));
        if let Some(binding) = binding {
            if binding.binding_type == BindingType::Instance && has_own_identifiers {
                diagnostics.push(
                    Diagnostic::error(
                        ids::IDENTIFIER_BINDING_VIOLATION,
                        format!(
                            "`{slot}` lifecycle operation `{operation_id}` of \
                             `{resource_id}` must not bind the resource's own identifiers"
                        ),
                    )
                    .with_shape(operation_id.clone()),
                );
            }
        }
    }
}
