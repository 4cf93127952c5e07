//! Model-wide metadata merging.

use std::collections::BTreeMap;

use serde_json::Value;

use trellis_core::diagnostic::ids;
use trellis_core::{Diagnostic, SourceLocation};

/// Merge the metadata maps of all files, in file order.
///
/// Same key with two arrays concatenates them; equal values collapse to
/// one; anything else is a `MetadataConflict` diagnostic, with the earlier
/// value kept so later assembly steps stay total.
pub fn merge_metadata(
    files: &[(String, &BTreeMap<String, Value>)],
    diagnostics: &mut Vec<Diagnostic>,
) -> BTreeMap<String, Value> {
    let mut merged: BTreeMap<String, (Value, String)> = BTreeMap::new();

    for (path, metadata) in files {
        for (key, value) in metadata.iter() {
            match merged.get_mut(key) {
                None => {
                    merged.insert(key.clone(), (value.clone(), path.clone()));
                }
                Some((existing, first_path)) => {
                    if let (Value::Array(a), Value::Array(b)) = (&*existing, value) {
                        let mut combined = a.clone();
                        combined.extend(b.iter().cloned());
                        *existing = Value::Array(combined);
                    } else if existing == value {
                        // Equivalent redefinition.
                    } else {
                        diagnostics.push(
                            Diagnostic::error(
                                ids::METADATA_CONFLICT,
                                format!(
                                    "metadata key `{key}` defined with conflicting values \
                                     in {first_path} and {path}"
                                ),
                            )
                            .at(SourceLocation::file(path)),
                        );
                    }
                }
            }
        }
    }

    merged.into_iter().map(|(k, (v, _))| (k, v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn merge(sets: Vec<(&str, BTreeMap<String, Value>)>) -> (BTreeMap<String, Value>, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let refs: Vec<(String, &BTreeMap<String, Value>)> = sets
            .iter()
            .map(|(path, m)| (path.to_string(), m))
            .collect();
        let merged = merge_metadata(&refs, &mut diagnostics);
        (merged, diagnostics)
    }

    fn map(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn arrays_concatenate_in_file_order() {
        let (merged, diagnostics) = merge(vec![
            ("a.trellis", map(&[("tags", json!(["a"]))])),
            ("b.trellis", map(&[("tags", json!(["b"]))])),
        ]);
        assert!(diagnostics.is_empty());
        assert_eq!(merged["tags"], json!(["a", "b"]));
    }

    #[test]
    fn equal_values_collapse() {
        let (merged, diagnostics) = merge(vec![
            ("a.trellis", map(&[("version", json!("1.0"))])),
            ("b.trellis", map(&[("version", json!("1.0"))])),
        ]);
        assert!(diagnostics.is_empty());
        assert_eq!(merged["version"], json!("1.0"));
    }

    #[test]
    fn unequal_values_conflict() {
        let (merged, diagnostics) = merge(vec![
            ("a.trellis", map(&[("version", json!("1.0"))])),
            ("b.trellis", map(&[("version", json!("2.0"))])),
        ]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].id, "MetadataConflict");
        assert!(diagnostics[0].is_fatal());
        // The earlier value survives in the (broken) model.
        assert_eq!(merged["version"], json!("1.0"));
    }

    #[test]
    fn disjoint_keys_union() {
        let (merged, diagnostics) = merge(vec![
            ("a.trellis", map(&[("a", json!(1))])),
            ("b.trellis", map(&[("b", json!(2))])),
        ]);
        assert!(diagnostics.is_empty());
        assert_eq!(merged.len(), 2);
    }
}
