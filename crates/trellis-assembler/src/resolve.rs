//! Deferred resolution of raw shape references.
//!
//! A raw reference containing `#` is already absolute. Anything else is
//! resolved against the declaring file's namespace when that root ID was
//! declared by any contributing file, and otherwise against the prelude
//! namespace. Resolution runs only after every file's declarations have
//! been collected, which is what makes forward references across files
//! legal.

use std::collections::BTreeSet;

use thiserror::Error;

use trellis_core::prelude::PRELUDE_NAMESPACE;
use trellis_core::{Prelude, ShapeId, ShapeIdError};

use crate::parsed::ParsedFile;

/// Why a raw reference could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("{0}")]
    Malformed(#[from] ShapeIdError),

    #[error(
        "relative reference `{reference}` matches nothing in namespace \
         `{namespace}` or the prelude"
    )]
    Unresolved { reference: String, namespace: String },
}

/// Resolves raw references against the set of declared root IDs.
pub struct ReferenceResolver<'a> {
    declared: BTreeSet<ShapeId>,
    prelude: &'a Prelude,
}

impl<'a> ReferenceResolver<'a> {
    /// Collect every root ID declared by the given files.
    pub fn new(files: &[ParsedFile], prelude: &'a Prelude) -> Self {
        let mut declared = BTreeSet::new();
        for file in files {
            for decl in &file.shapes {
                declared.insert(ShapeId::new(&file.namespace, &decl.name));
            }
        }
        Self { declared, prelude }
    }

    /// Whether a root ID was declared by any file or the prelude.
    pub fn is_defined(&self, id: &ShapeId) -> bool {
        let root = id.without_member();
        self.declared.contains(&root) || self.prelude.contains(&root)
    }

    /// All declared root IDs, in order.
    pub fn declared(&self) -> impl Iterator<Item = &ShapeId> {
        self.declared.iter()
    }

    /// Resolve a raw reference from a file with the given namespace.
    ///
    /// The reference may carry a `$member` suffix; the suffix is preserved
    /// on the resolved ID.
    pub fn resolve(&self, raw: &str, namespace: &str) -> Result<ShapeId, ResolveError> {
        if raw.contains('#') {
            return Ok(raw.parse::<ShapeId>()?);
        }

        let (root, member) = match raw.split_once('$') {
            Some((root, member)) => (root, Some(member)),
            None => (raw, None),
        };

        // Validate the relative form by parsing it inside a namespace.
        let in_file = format!("{namespace}#{root}").parse::<ShapeId>()?;
        let resolved = if self.declared.contains(&in_file) {
            in_file
        } else {
            let in_prelude = ShapeId::new(PRELUDE_NAMESPACE, root);
            if self.prelude.contains(&in_prelude) {
                in_prelude
            } else {
                return Err(ResolveError::Unresolved {
                    reference: raw.to_string(),
                    namespace: namespace.to_string(),
                });
            }
        };

        match member {
            Some(member) => Ok(format!("{resolved}${member}").parse::<ShapeId>()?),
            None => Ok(resolved),
        }
    }
}
