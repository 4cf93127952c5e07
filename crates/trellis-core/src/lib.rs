//! Core data model for the Trellis modeling language.
//!
//! A Trellis model is a graph of named shapes: simple types, aggregates
//! (lists, maps, structures, unions) owning named members, and service-level
//! concepts (services, operations, resources). Shapes are annotated with
//! traits whose values are JSON-like nodes, and every shape is addressed by
//! a [`ShapeId`] of the form `namespace#Name$member`.
//!
//! This crate holds the immutable data structures shared by the assembler
//! and the post-assembly validators:
//!
//! - [`ShapeId`] and its case-insensitive collation key
//! - [`Shape`] / [`ShapeKind`] — a closed enum over every shape kind
//! - [`TraitTable`] and [`TraitDefinition`]
//! - the standard [`Prelude`]
//! - [`Diagnostic`] events with the `Error`/`Danger`/`Warning`/`Note`
//!   severity ladder
//! - the completed, read-only [`Model`]
//!
//! A `Model` is only ever constructed by the assembler; once built it is
//! immutable and safe to share by reference across concurrent validators.

pub mod diagnostic;
pub mod model;
pub mod prelude;
pub mod shape;
pub mod shape_id;
pub mod source;
pub mod traits;

pub use diagnostic::{Diagnostic, Severity};
pub use model::Model;
pub use prelude::{Prelude, PRELUDE_NAMESPACE};
pub use shape::{
    ListShape, MapShape, Member, OperationShape, ResourceShape, ServiceShape, Shape, ShapeKind,
    SimpleType, StructureShape, UnionShape,
};
pub use shape_id::{ShapeId, ShapeIdError};
pub use source::SourceLocation;
pub use traits::{AppliedTrait, StructuralExclusion, TraitDefinition, TraitTable};
