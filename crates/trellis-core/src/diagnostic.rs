//! Diagnostic events produced during assembly and validation.
//!
//! Model defects are collected, never thrown: a single assembly run reports
//! every defect found. The caller decides whether a model containing fatal
//! diagnostics is a build failure.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shape_id::ShapeId;
use crate::source::SourceLocation;

/// Severity of a diagnostic. `Error` and `Danger` make a model unusable
/// by downstream tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Note,
    Warning,
    Danger,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Danger => write!(f, "DANGER"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Note => write!(f, "NOTE"),
        }
    }
}

/// A single diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable identifier naming the class of defect, e.g. `ShapeConflict`.
    pub id: String,
    pub message: String,
    pub shape_id: Option<ShapeId>,
    pub location: SourceLocation,
}

impl Diagnostic {
    pub fn new(severity: Severity, id: &str, message: String) -> Self {
        Self {
            severity,
            id: id.to_string(),
            message,
            shape_id: None,
            location: SourceLocation::none(),
        }
    }

    pub fn error(id: &str, message: String) -> Self {
        Self::new(Severity::Error, id, message)
    }

    pub fn warning(id: &str, message: String) -> Self {
        Self::new(Severity::Warning, id, message)
    }

    pub fn note(id: &str, message: String) -> Self {
        Self::new(Severity::Note, id, message)
    }

    pub fn with_shape(mut self, shape_id: ShapeId) -> Self {
        self.shape_id = Some(shape_id);
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// Whether this diagnostic makes the model unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity, Severity::Error | Severity::Danger)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.id, self.message)?;
        if let Some(id) = &self.shape_id {
            write!(f, " ({id})")?;
        }
        if !self.location.is_none() {
            write!(f, " at {}", self.location)?;
        }
        Ok(())
    }
}

/// Diagnostic class identifiers used by the assembler and validators.
pub mod ids {
    pub const SHAPE_CONFLICT: &str = "ShapeConflict";
    pub const TRAIT_CONFLICT: &str = "TraitConflict";
    pub const METADATA_CONFLICT: &str = "MetadataConflict";
    pub const RECURSION_VIOLATION: &str = "RecursionViolation";
    pub const IDENTIFIER_BINDING_VIOLATION: &str = "IdentifierBindingViolation";
    pub const CLOSURE_NAME_CONFLICT: &str = "ClosureNameConflict";
    pub const UNRESOLVED_REFERENCE: &str = "UnresolvedReference";
    pub const MALFORMED_SHAPE: &str = "MalformedShape";
    pub const IGNORED_DUPLICATE_DEFINITION: &str = "IgnoredDuplicateDefinition";
}
