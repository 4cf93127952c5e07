//! Multi-file shape merging and conflict resolution.
//!
//! Shapes declared by exactly one file are inserted as-is. Shapes declared
//! by several files must agree on kind and resolved structure; member-level
//! trait differences are merged independently by trait reduction. Any
//! mismatch is a fatal `ShapeConflict` naming both source locations.

use std::collections::BTreeMap;

use serde_json::Value;

use trellis_core::diagnostic::ids;
use trellis_core::{
    Diagnostic, ListShape, MapShape, Member, OperationShape, Prelude, ResourceShape, ServiceShape,
    Shape, ShapeId, ShapeKind, SourceLocation, StructureShape, UnionShape,
};

use crate::parsed::{DeclKind, MemberDecl, ParsedFile, ShapeDecl};
use crate::resolve::{ReferenceResolver, ResolveError};

/// One trait applied to one target by one file, before reduction.
#[derive(Debug, Clone)]
pub struct TraitContribution {
    pub target: ShapeId,
    pub trait_id: ShapeId,
    pub value: Value,
    pub location: SourceLocation,
}

/// Output of the shape-merge step.
pub struct Collected {
    pub shapes: BTreeMap<ShapeId, Shape>,
    pub trait_contributions: Vec<TraitContribution>,
}

/// Resolve a raw reference, reporting only syntactically malformed input.
///
/// Unresolvable relative references fall back to the file namespace; the
/// target-existence checks report them exactly once later.
fn resolve_ref(
    resolver: &ReferenceResolver<'_>,
    raw: &str,
    namespace: &str,
    location: &SourceLocation,
    diagnostics: &mut Vec<Diagnostic>,
) -> ShapeId {
    match resolver.resolve(raw, namespace) {
        Ok(id) => id,
        Err(ResolveError::Unresolved { .. }) => {
            // Well-formed but undefined: resolve into the file namespace so
            // assembly stays total.
            let root = raw.split('$').next().unwrap_or(raw);
            ShapeId::new(namespace, root)
        }
        Err(err @ ResolveError::Malformed(_)) => {
            diagnostics.push(
                Diagnostic::error(ids::UNRESOLVED_REFERENCE, err.to_string())
                    .at(location.clone()),
            );
            ShapeId::new(namespace, "Unresolved")
        }
    }
}

/// Merge all files' shape declarations into one map, seeding the prelude,
/// and collect every trait contribution in file order.
pub fn collect_shapes(
    files: &[ParsedFile],
    resolver: &ReferenceResolver<'_>,
    prelude: &Prelude,
    diagnostics: &mut Vec<Diagnostic>,
) -> Collected {
    let mut shapes: BTreeMap<ShapeId, Shape> = BTreeMap::new();
    let mut contributions: Vec<TraitContribution> = Vec::new();
    let mut collation: BTreeMap<String, ShapeId> = BTreeMap::new();

    // The prelude contributes shapes and trait applications like any file,
    // ahead of all user files.
    for shape in prelude.shapes() {
        collation.insert(shape.id.collation_key(), shape.id.clone());
        shapes.insert(shape.id.clone(), shape.clone());
    }
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

    for file in files {
        for decl in &file.shapes {
            let id = ShapeId::new(&file.namespace, &decl.name);
            let location = if decl.location.is_none() {
                SourceLocation::file(&file.path)
            } else {
                decl.location.clone()
            };

            // Case-insensitive root ID uniqueness.
            match collation.get(&id.collation_key()) {
                Some(existing) if *existing != id => {
                    diagnostics.push(
                        Diagnostic::error(
                            ids::SHAPE_CONFLICT,
                            format!(
                                "shape ID `{id}` collides case-insensitively with `{existing}`"
                            ),
                        )
                        .with_shape(id.clone())
                        .at(location.clone()),
                    );
                    continue;
                }
                _ => {
                    collation.insert(id.collation_key(), id.clone());
                }
            }

            let built = build_shape(&id, decl, file, resolver, diagnostics).with_location(location);
            check_sibling_members(&built, diagnostics);
            collect_decl_traits(&id, decl, file, resolver, diagnostics, &mut contributions);
            merge_into(&mut shapes, built, diagnostics);
        }

        for apply in &file.applies {
            let target = resolve_ref(
                resolver,
                &apply.target,
                &file.namespace,
                &apply.location,
                diagnostics,
            );
            let trait_id = resolve_ref(
                resolver,
                &apply.trait_ref,
                &file.namespace,
                &apply.location,
                diagnostics,
            );
            contributions.push(TraitContribution {
                target,
                trait_id,
                value: apply.value.clone(),
                location: if apply.location.is_none() {
                    SourceLocation::file(&file.path)
                } else {
                    apply.location.clone()
                },
            });
        }
    }

    Collected {
        shapes,
        trait_contributions: contributions,
    }
}

/// Insert a shape, de-conflicting against an existing definition.
fn merge_into(
    shapes: &mut BTreeMap<ShapeId, Shape>,
    shape: Shape,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match shapes.get(&shape.id) {
        None => {
            shapes.insert(shape.id.clone(), shape);
        }
        Some(previous) => {
            if normalized_kind(&previous.kind) == normalized_kind(&shape.kind) {
                if previous.location != shape.location {
                    diagnostics.push(
                        Diagnostic::note(
                            ids::IGNORED_DUPLICATE_DEFINITION,
                            format!(
                                "ignoring duplicate but equivalent definition of `{}` at {} \
                                 (first defined at {})",
                                shape.id, shape.location, previous.location
                            ),
                        )
                        .with_shape(shape.id.clone()),
                    );
                }
            } else {
                diagnostics.push(
                    Diagnostic::error(
                        ids::SHAPE_CONFLICT,
                        format!(
                            "conflicting definitions of `{}`: {} ({}) vs {} ({})",
                            shape.id,
                            describe_kind(&previous.kind),
                            previous.location,
                            describe_kind(&shape.kind),
                            shape.location
                        ),
                    )
                    .with_shape(shape.id.clone())
                    .at(shape.location.clone()),
                );
            }
        }
    }
}

/// Structural form used for duplicate-definition comparison: member source
/// locations are irrelevant to equality.
fn normalized_kind(kind: &ShapeKind) -> ShapeKind {
    fn strip(member: &Member) -> Member {
        Member::new(&member.name, member.target.clone())
    }
    match kind {
        ShapeKind::List(list) => ShapeKind::List(ListShape {
            member: strip(&list.member),
            unique: list.unique,
        }),
        ShapeKind::Map(map) => ShapeKind::Map(MapShape {
            key: strip(&map.key),
            value: strip(&map.value),
        }),
        ShapeKind::Structure(s) => ShapeKind::Structure(StructureShape {
            members: s.members.iter().map(strip).collect(),
        }),
        ShapeKind::Union(u) => ShapeKind::Union(UnionShape {
            members: u.members.iter().map(strip).collect(),
        }),
        other => other.clone(),
    }
}

/// Short structural summary used in conflict messages.
fn describe_kind(kind: &ShapeKind) -> String {
    match kind {
        ShapeKind::Structure(s) => {
            let names: Vec<&str> = s.members.iter().map(|m| m.name.as_str()).collect();
            format!("structure with members [{}]", names.join(", "))
        }
        ShapeKind::Union(u) => {
            let names: Vec<&str> = u.members.iter().map(|m| m.name.as_str()).collect();
            format!("union with members [{}]", names.join(", "))
        }
        ShapeKind::List(list) => format!(
            "{} of {}",
            if list.unique { "set" } else { "list" },
            list.member.target
        ),
        ShapeKind::Map(map) => format!("map of {} to {}", map.key.target, map.value.target),
        other => other.name().to_string(),
    }
}

fn build_member(
    decl: &MemberDecl,
    file: &ParsedFile,
    resolver: &ReferenceResolver<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Member {
    let target = resolve_ref(
        resolver,
        &decl.target,
        &file.namespace,
        &decl.location,
        diagnostics,
    );
    Member {
        name: decl.name.clone(),
        target,
        location: decl.location.clone(),
    }
}

fn resolve_all(
    resolver: &ReferenceResolver<'_>,
    raws: &[String],
    namespace: &str,
    location: &SourceLocation,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ShapeId> {
    raws.iter()
        .map(|raw| resolve_ref(resolver, raw, namespace, location, diagnostics))
        .collect()
}

fn resolve_opt(
    resolver: &ReferenceResolver<'_>,
    raw: Option<&String>,
    namespace: &str,
    location: &SourceLocation,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<ShapeId> {
    raw.map(|raw| resolve_ref(resolver, raw, namespace, location, diagnostics))
}

fn build_shape(
    id: &ShapeId,
    decl: &ShapeDecl,
    file: &ParsedFile,
    resolver: &ReferenceResolver<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Shape {
    let ns = file.namespace.as_str();
    let loc = &decl.location;

    let kind = match &decl.kind {
        DeclKind::Simple(simple) => ShapeKind::Simple(*simple),
        DeclKind::List { member, unique } => {
            let member = build_member(member, file, resolver, diagnostics);
            ShapeKind::List(ListShape {
                member,
                unique: *unique,
            })
        }
        DeclKind::Map { key, value } => {
            let key = build_member(key, file, resolver, diagnostics);
            let value = build_member(value, file, resolver, diagnostics);
            ShapeKind::Map(MapShape { key, value })
        }
        DeclKind::Structure { members } => ShapeKind::Structure(StructureShape {
            members: members
                .iter()
                .map(|m| build_member(m, file, resolver, diagnostics))
                .collect(),
        }),
        DeclKind::Union { members } => ShapeKind::Union(UnionShape {
            members: members
                .iter()
                .map(|m| build_member(m, file, resolver, diagnostics))
                .collect(),
        }),
        DeclKind::Service {
            version,
            operations,
            resources,
            errors,
            rename,
        } => ShapeKind::Service(ServiceShape {
            version: version.clone(),
            operations: resolve_all(resolver, operations, ns, loc, diagnostics),
            resources: resolve_all(resolver, resources, ns, loc, diagnostics),
            errors: resolve_all(resolver, errors, ns, loc, diagnostics),
            rename: rename
                .iter()
                .map(|(raw, name)| {
                    (
                        resolve_ref(resolver, raw, ns, loc, diagnostics),
                        name.clone(),
                    )
                })
                .collect(),
        }),
        DeclKind::Operation {
            input,
            output,
            errors,
        } => ShapeKind::Operation(OperationShape {
            input: resolve_opt(resolver, input.as_ref(), ns, loc, diagnostics)
                .unwrap_or_else(Prelude::unit_id),
            output: resolve_opt(resolver, output.as_ref(), ns, loc, diagnostics)
                .unwrap_or_else(Prelude::unit_id),
            errors: resolve_all(resolver, errors, ns, loc, diagnostics),
        }),
        DeclKind::Resource {
            identifiers,
            create,
            put,
            read,
            update,
            delete,
            list,
            operations,
            collection_operations,
            resources,
        } => ShapeKind::Resource(ResourceShape {
            identifiers: identifiers
                .iter()
                .map(|(name, raw)| {
                    (
                        name.clone(),
                        resolve_ref(resolver, raw, ns, loc, diagnostics),
                    )
                })
                .collect(),
            create: resolve_opt(resolver, create.as_ref(), ns, loc, diagnostics),
            put: resolve_opt(resolver, put.as_ref(), ns, loc, diagnostics),
            read: resolve_opt(resolver, read.as_ref(), ns, loc, diagnostics),
            update: resolve_opt(resolver, update.as_ref(), ns, loc, diagnostics),
            delete: resolve_opt(resolver, delete.as_ref(), ns, loc, diagnostics),
            list: resolve_opt(resolver, list.as_ref(), ns, loc, diagnostics),
            operations: resolve_all(resolver, operations, ns, loc, diagnostics),
            collection_operations: resolve_all(
                resolver,
                collection_operations,
                ns,
                loc,
                diagnostics,
            ),
            resources: resolve_all(resolver, resources, ns, loc, diagnostics),
        }),
    };

    Shape::new(id.clone(), kind)
}

/// Sibling members of one aggregate must have case-insensitively distinct
/// names.
fn check_sibling_members(shape: &Shape, diagnostics: &mut Vec<Diagnostic>) {
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    for member in shape.members() {
        let key = member.name.to_ascii_lowercase();
        match seen.get(key.as_str()) {
            Some(existing) if *existing != member.name => {
                diagnostics.push(
                    Diagnostic::error(
                        ids::SHAPE_CONFLICT,
                        format!(
                            "members `{}` and `{}` of `{}` collide case-insensitively",
                            existing, member.name, shape.id
                        ),
                    )
                    .with_shape(member.shape_id(&shape.id))
                    .at(member.location.clone()),
                );
            }
            Some(_) => {
                diagnostics.push(
                    Diagnostic::error(
                        ids::SHAPE_CONFLICT,
                        format!("duplicate member `{}` on `{}`", member.name, shape.id),
                    )
                    .with_shape(member.shape_id(&shape.id))
                    .at(member.location.clone()),
                );
            }
            None => {
                seen.insert(key, &member.name);
            }
        }
    }
}

/// Extract inline shape and member traits into contributions.
fn collect_decl_traits(
    id: &ShapeId,
    decl: &ShapeDecl,
    file: &ParsedFile,
    resolver: &ReferenceResolver<'_>,
    diagnostics: &mut Vec<Diagnostic>,
    contributions: &mut Vec<TraitContribution>,
) {
    let mut push = |target: ShapeId, traits: &[crate::parsed::TraitDecl]| {
        for t in traits {
            let trait_id = resolve_ref(
                resolver,
                &t.trait_ref,
                &file.namespace,
                &t.location,
                diagnostics,
            );
            contributions.push(TraitContribution {
                target: target.clone(),
                trait_id,
                value: t.value.clone(),
                location: if t.location.is_none() {
                    SourceLocation::file(&file.path)
                } else {
                    t.location.clone()
                },
            });
        }
    };

    push(id.clone(), &decl.traits);

    let member_decls: Vec<&MemberDecl> = match &decl.kind {
        DeclKind::List { member, .. } => vec![member],
        DeclKind::Map { key, value } => vec![key, value],
        DeclKind::Structure { members } | DeclKind::Union { members } => members.iter().collect(),
        _ => Vec::new(),
    };
    for member in member_decls {
        push(id.with_member(&member.name), &member.traits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsed::{DeclKind, ShapeDecl};
    use serde_json::json;
    use trellis_core::SimpleType;

    fn collect(files: Vec<ParsedFile>) -> (Collected, Vec<Diagnostic>) {
        let prelude = Prelude::standard();
        let resolver = ReferenceResolver::new(&files, &prelude);
        let mut diagnostics = Vec::new();
        let collected = collect_shapes(&files, &resolver, &prelude, &mut diagnostics);
        (collected, diagnostics)
    }

    fn id(s: &str) -> ShapeId {
        s.parse().unwrap()
    }

    #[test]
    fn single_file_shapes_inserted() {
        let (collected, diagnostics) = collect(vec![ParsedFile::new("a.trellis", "ns")
            .with_shape(ShapeDecl::new("CityId", DeclKind::Simple(SimpleType::String)))]);
        assert!(diagnostics.iter().all(|d| !d.is_fatal()));
        assert!(collected.shapes.contains_key(&id("ns#CityId")));
        // Prelude seeded too.
        assert!(collected.shapes.contains_key(&Prelude::id("String")));
    }

    #[test]
    fn equivalent_duplicate_is_a_note() {
        let decl = || ShapeDecl::new("CityId", DeclKind::Simple(SimpleType::String));
        let (_, diagnostics) = collect(vec![
            ParsedFile::new("a.trellis", "ns").with_shape(decl()),
            ParsedFile::new("b.trellis", "ns").with_shape(decl()),
        ]);
        assert!(diagnostics.iter().all(|d| !d.is_fatal()));
        assert!(diagnostics
            .iter()
            .any(|d| d.id == ids::IGNORED_DUPLICATE_DEFINITION));
    }

    #[test]
    fn kind_mismatch_is_a_conflict() {
        let (_, diagnostics) = collect(vec![
            ParsedFile::new("a.trellis", "ns")
                .with_shape(ShapeDecl::new("Thing", DeclKind::Simple(SimpleType::String))),
            ParsedFile::new("b.trellis", "ns")
                .with_shape(ShapeDecl::new("Thing", DeclKind::Simple(SimpleType::Integer))),
        ]);
        let conflict = diagnostics
            .iter()
            .find(|d| d.id == ids::SHAPE_CONFLICT)
            .expect("expected a shape conflict");
        assert!(conflict.is_fatal());
        assert!(conflict.message.contains("a.trellis"));
        assert!(conflict.message.contains("b.trellis"));
    }

    #[test]
    fn member_trait_differences_do_not_conflict() {
        let base = |required: bool| {
            let mut member = MemberDecl::new("city", "String");
            if required {
                member = member.with_trait("required", json!({}));
            }
            ShapeDecl::new(
                "Input",
                DeclKind::Structure {
                    members: vec![member],
                },
            )
        };
        let (collected, diagnostics) = collect(vec![
            ParsedFile::new("a.trellis", "ns").with_shape(base(true)),
            ParsedFile::new("b.trellis", "ns").with_shape(base(false)),
        ]);
        assert!(diagnostics.iter().all(|d| !d.is_fatal()), "{diagnostics:?}");
        assert!(collected
            .trait_contributions
            .iter()
            .any(|c| c.target == id("ns#Input$city")));
    }

    #[test]
    fn case_insensitive_root_collision() {
        let (_, diagnostics) = collect(vec![
            ParsedFile::new("a.trellis", "com.Foo")
                .with_shape(ShapeDecl::new("baz", DeclKind::Simple(SimpleType::String))),
            ParsedFile::new("b.trellis", "com.foo")
                .with_shape(ShapeDecl::new("BAZ", DeclKind::Simple(SimpleType::String))),
        ]);
        assert!(diagnostics
            .iter()
            .any(|d| d.id == ids::SHAPE_CONFLICT && d.is_fatal()));
    }

    #[test]
    fn sibling_member_collation_collision() {
        let (_, diagnostics) = collect(vec![ParsedFile::new("a.trellis", "ns").with_shape(
            ShapeDecl::new(
                "Input",
                DeclKind::Structure {
                    members: vec![MemberDecl::new("city", "String"), MemberDecl::new("City", "String")],
                },
            ),
        )]);
        assert!(diagnostics
            .iter()
            .any(|d| d.id == ids::SHAPE_CONFLICT && d.message.contains("case-insensitively")));
    }

    #[test]
    fn operation_defaults_to_unit() {
        let (collected, _) = collect(vec![ParsedFile::new("a.trellis", "ns").with_shape(
            ShapeDecl::new(
                "Ping",
                DeclKind::Operation {
                    input: None,
                    output: None,
                    errors: vec![],
                },
            ),
        )]);
        match &collected.shapes[&id("ns#Ping")].kind {
            ShapeKind::Operation(op) => {
                assert_eq!(op.input, Prelude::unit_id());
                assert_eq!(op.output, Prelude::unit_id());
            }
            other => panic!("expected operation, got {}", other.name()),
        }
    }
}
