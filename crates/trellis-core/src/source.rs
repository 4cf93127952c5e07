//! Source locations attached to shapes, traits, and diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a declaration came from: file path plus 1-based line and column.
///
/// Synthetic declarations (prelude shapes, programmatically built files)
/// use [`SourceLocation::none`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub filename: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(filename: &str, line: usize, column: usize) -> Self {
        Self {
            filename: filename.to_string(),
            line,
            column,
        }
    }

    /// A location for shapes with no source file (prelude, synthesized).
    pub fn none() -> Self {
        Self {
            filename: String::new(),
            line: 0,
            column: 0,
        }
    }

    /// A location pointing at a file as a whole.
    pub fn file(filename: &str) -> Self {
        Self::new(filename, 1, 1)
    }

    pub fn is_none(&self) -> bool {
        self.filename.is_empty()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "<synthetic>")
        } else {
            write!(f, "{}:{}:{}", self.filename, self.line, self.column)
        }
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(SourceLocation::none().to_string(), "<synthetic>");
        assert_eq!(
            SourceLocation::new("weather.trellis", 12, 3).to_string(),
            "weather.trellis:12:3"
        );
    }
}
