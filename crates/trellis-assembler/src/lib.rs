//! Multi-file model assembly for the Trellis modeling language.
//!
//! The assembler turns a set of [`ParsedFile`]s into one [`trellis_core::Model`]
//! plus a list of diagnostics. Assembly is deterministic: files are ordered
//! by lexical path before any merge decision, so the result is independent
//! of the order files were added or discovered.

pub mod assembler;
pub mod checks;
pub mod merge;
pub mod metadata;
pub mod parsed;
pub mod resolve;
pub mod trait_merge;

pub use assembler::{Assembler, Assembly};
pub use merge::TraitContribution;
pub use parsed::{DeclKind, MemberDecl, ParsedFile, ShapeDecl, TraitApplication, TraitDecl};
pub use resolve::{ReferenceResolver, ResolveError};
