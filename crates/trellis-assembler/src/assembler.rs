//! The assembly façade: files in, model plus diagnostics out.

use std::collections::BTreeMap;

use serde_json::Value;

use trellis_core::{Diagnostic, Model, Prelude, Severity};

use crate::merge::collect_shapes;
use crate::metadata::merge_metadata;
use crate::parsed::ParsedFile;
use crate::resolve::ReferenceResolver;
use crate::checks;
use crate::trait_merge::{reduce_traits, TraitIndex};

/// Assembles parsed files into one semantic model.
///
/// Assembly never throws: every problem becomes a [`Diagnostic`] and the
/// result always carries a model, possibly a partial one when fatal
/// diagnostics are present.
pub struct Assembler {
    prelude: Prelude,
    files: Vec<ParsedFile>,
    allow_unknown_traits: bool,
}

/// The result of one assembly run.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub model: Model,
    pub diagnostics: Vec<Diagnostic>,
}

impl Assembly {
    /// True when any diagnostic is fatal and the model must not be consumed
    /// for generation.
    pub fn is_broken(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_fatal)
    }

    pub fn diagnostics_at_least(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.severity >= severity)
    }
}

impl Assembler {
    pub fn new(prelude: Prelude) -> Self {
        Self {
            prelude,
            files: Vec::new(),
            allow_unknown_traits: false,
        }
    }

    /// Unknown applied traits become warnings and their values are kept as
    /// opaque documents.
    pub fn allow_unknown_traits(mut self, allow: bool) -> Self {
        self.allow_unknown_traits = allow;
        self
    }

    pub fn add_file(&mut self, file: ParsedFile) -> &mut Self {
        self.files.push(file);
        self
    }

    pub fn add_files(&mut self, files: impl IntoIterator<Item = ParsedFile>) -> &mut Self {
        self.files.extend(files);
        self
    }

    /// Run every assembly step and the post-assembly validators.
    ///
    /// The outcome is independent of the order files were added: files are
    /// ordered by lexical path before any merge decision is made.
    pub fn assemble(mut self) -> Assembly {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
        let mut diagnostics = Vec::new();

        let resolver = ReferenceResolver::new(&self.files, &self.prelude);

        let metadata_by_file: Vec<(String, &BTreeMap<String, Value>)> = self
            .files
            .iter()
            .map(|f| (f.path.clone(), &f.metadata))
            .collect();
        let metadata = merge_metadata(&metadata_by_file, &mut diagnostics);

        let collected = collect_shapes(&self.files, &resolver, &self.prelude, &mut diagnostics);
        let index = TraitIndex::from_contributions(&collected.trait_contributions);
        let traits = reduce_traits(
            collected.trait_contributions,
            &collected.shapes,
            &index,
            self.allow_unknown_traits,
            &mut diagnostics,
        );

        checks::run_checks(&collected.shapes, &traits, &mut diagnostics);

        let model = Model::new(collected.shapes, traits, metadata);

        // Validators only make sense on a structurally sound model.
        if !diagnostics.iter().any(Diagnostic::is_fatal) {
            diagnostics.extend(trellis_validate::validate(&model));
        }

        Assembly { model, diagnostics }
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(Prelude::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsed::{DeclKind, MemberDecl, ShapeDecl, TraitApplication};
    use serde_json::json;
    use trellis_core::diagnostic::ids;
    use trellis_core::{ShapeId, SimpleType};

    fn id(s: &str) -> ShapeId {
        s.parse().unwrap()
    }

    fn weather_file(path: &str) -> ParsedFile {
        ParsedFile::new(path, "example.weather")
            .with_metadata("authors", json!(["a"]))
            .with_shape(ShapeDecl::new("CityId", DeclKind::Simple(SimpleType::String)))
            .with_shape(ShapeDecl::new(
                "GetCityInput",
                DeclKind::Structure {
                    members: vec![
                        MemberDecl::new("cityId", "CityId").with_trait("required", json!({}))
                    ],
                },
            ))
            .with_shape(ShapeDecl::new(
                "GetCity",
                DeclKind::Operation {
                    input: Some("GetCityInput".to_string()),
                    output: None,
                    errors: vec![],
                },
            ))
    }

    #[test]
    fn assembles_a_clean_model() {
        let mut assembler = Assembler::default();
        assembler.add_file(weather_file("weather.trellis"));
        let assembly = assembler.assemble();
        assert!(!assembly.is_broken(), "{:?}", assembly.diagnostics);
        assert!(assembly.model.contains(&id("example.weather#GetCity")));
        assert!(assembly
            .model
            .has_trait(&id("example.weather#GetCityInput$cityId"), &Prelude::required_id()));
        assert_eq!(assembly.model.metadata().get("authors"), Some(&json!(["a"])));
    }

    #[test]
    fn result_is_independent_of_add_order() {
        let second = ParsedFile::new("extra.trellis", "example.weather")
            .with_metadata("authors", json!(["b"]))
            .with_apply(TraitApplication::new("CityId", "pattern", json!("^[A-Za-z0-9 ]+$")));

        let mut forward = Assembler::default();
        forward.add_file(weather_file("weather.trellis"));
        forward.add_file(second.clone());
        let forward = forward.assemble();

        let mut reverse = Assembler::default();
        reverse.add_file(second);
        reverse.add_file(weather_file("weather.trellis"));
        let reverse = reverse.assemble();

        assert_eq!(forward.model, reverse.model);
        // Metadata arrays concatenate in lexical path order: extra.trellis
        // sorts before weather.trellis.
        assert_eq!(
            forward.model.metadata().get("authors"),
            Some(&json!(["b", "a"]))
        );
    }

    #[test]
    fn forward_references_across_files_resolve() {
        let mut assembler = Assembler::default();
        assembler.add_file(
            ParsedFile::new("a.trellis", "ns").with_shape(ShapeDecl::new(
                "Holder",
                DeclKind::Structure {
                    members: vec![MemberDecl::new("value", "Later")],
                },
            )),
        );
        assembler.add_file(
            ParsedFile::new("b.trellis", "ns")
                .with_shape(ShapeDecl::new("Later", DeclKind::Simple(SimpleType::Integer))),
        );
        let assembly = assembler.assemble();
        assert!(!assembly.is_broken(), "{:?}", assembly.diagnostics);
        let member = assembly.model.member(&id("ns#Holder$value")).unwrap();
        assert_eq!(member.target, id("ns#Later"));
    }

    #[test]
    fn reassembling_a_model_from_its_own_files_is_idempotent() {
        let mut assembler = Assembler::default();
        assembler.add_file(weather_file("weather.trellis"));
        let first = assembler.assemble();
        assert!(!first.is_broken(), "{:?}", first.diagnostics);

        let mut again = Assembler::default();
        again.add_files(ParsedFile::files_from_model(&first.model));
        let second = again.assemble();
        assert!(!second.is_broken(), "{:?}", second.diagnostics);

        // Same shapes, traits, and metadata; only source locations moved to
        // the generated files.
        let first_ids: Vec<_> = first.model.shape_ids().collect();
        let second_ids: Vec<_> = second.model.shape_ids().collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(first.model.metadata(), second.model.metadata());
        assert!(second
            .model
            .has_trait(&id("example.weather#GetCityInput$cityId"), &Prelude::required_id()));

        // A second round trip is an exact fixed point.
        let mut third = Assembler::default();
        third.add_files(ParsedFile::files_from_model(&second.model));
        let third = third.assemble();
        assert!(!third.is_broken(), "{:?}", third.diagnostics);
        assert_eq!(second.model, third.model);
    }

    #[test]
    fn broken_assembly_still_carries_a_model() {
        let mut assembler = Assembler::default();
        assembler.add_file(
            ParsedFile::new("a.trellis", "ns").with_shape(ShapeDecl::new(
                "Holder",
                DeclKind::Structure {
                    members: vec![MemberDecl::new("value", "Nowhere")],
                },
            )),
        );
        let assembly = assembler.assemble();
        assert!(assembly.is_broken());
        assert!(assembly
            .diagnostics
            .iter()
            .any(|d| d.id == ids::UNRESOLVED_REFERENCE));
        assert!(assembly.diagnostics_at_least(Severity::Error).count() >= 1);
        assert_eq!(
            assembly.diagnostics_at_least(Severity::Note).count(),
            assembly.diagnostics.len()
        );
        assert!(assembly.model.contains(&id("ns#Holder")));
    }
}
