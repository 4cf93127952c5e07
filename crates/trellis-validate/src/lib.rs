//! Post-assembly validators.
//!
//! Every validator takes a completed, immutable [`Model`] by reference and
//! returns diagnostics; none of them mutate the model, so callers may run
//! them concurrently.

use trellis_core::{Diagnostic, Model};

pub mod closure;
pub mod identifiers;
pub mod recursion;
mod scc;

pub use closure::closure;
pub use identifiers::{BindingType, IdentifierBindingIndex};

/// Run every validator, in a fixed order for deterministic diagnostics.
pub fn validate(model: &Model) -> Vec<Diagnostic> {
    let mut diagnostics = recursion::validate(model);
    diagnostics.extend(identifiers::validate(model));
    diagnostics.extend(closure::validate(model));
    diagnostics
}
