//! Absolute shape identifiers: `namespace#ShapeName$memberName`.
//!
//! Equality, ordering, and hashing are case-sensitive; the global uniqueness
//! invariant of a model is checked against the case-insensitive
//! [`collation_key`](ShapeId::collation_key) instead.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced when parsing a shape ID from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeIdError {
    #[error("shape ID is missing a `#` separating namespace and name: `{0}`")]
    MissingNamespace(String),

    #[error("invalid namespace `{namespace}` in shape ID `{id}`")]
    InvalidNamespace { id: String, namespace: String },

    #[error("invalid shape name `{name}` in shape ID `{id}`")]
    InvalidName { id: String, name: String },

    #[error("invalid member name `{member}` in shape ID `{id}`")]
    InvalidMember { id: String, member: String },
}

/// An absolute identifier for a shape or a member of a shape.
///
/// A root shape is identified by `namespace#Name`; a member of an aggregate
/// shape by `namespace#Name$member`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId {
    namespace: String,
    name: String,
    member: Option<String>,
}

impl ShapeId {
    /// Create a root shape ID from pre-validated parts.
    ///
    /// Intended for namespaces and names that are known-good (e.g. prelude
    /// construction); arbitrary input should go through [`FromStr`].
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            member: None,
        }
    }

    /// The dot-delimited namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The shape name within the namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The member name, if this identifies a member.
    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }

    /// Whether this ID addresses a member rather than a root shape.
    pub fn is_member(&self) -> bool {
        self.member.is_some()
    }

    /// This ID with the given member name appended.
    pub fn with_member(&self, member: &str) -> Self {
        Self {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            member: Some(member.to_string()),
        }
    }

    /// The root shape ID, dropping any member component.
    pub fn without_member(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            member: None,
        }
    }

    /// The lowercased form used for case-insensitive uniqueness checks.
    ///
    /// Two distinct IDs with equal collation keys violate the model-wide
    /// uniqueness invariant.
    pub fn collation_key(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }

    fn validate_identifier(s: &str) -> bool {
        let mut chars = s.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    fn validate_namespace(s: &str) -> bool {
        !s.is_empty() && s.split('.').all(Self::validate_identifier)
    }
}

impl FromStr for ShapeId {
    type Err = ShapeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = s
            .split_once('#')
            .ok_or_else(|| ShapeIdError::MissingNamespace(s.to_string()))?;

        if !Self::validate_namespace(namespace) {
            return Err(ShapeIdError::InvalidNamespace {
                id: s.to_string(),
                namespace: namespace.to_string(),
            });
        }

        let (name, member) = match rest.split_once('$') {
            Some((name, member)) => (name, Some(member)),
            None => (rest, None),
        };

        if !Self::validate_identifier(name) {
            return Err(ShapeIdError::InvalidName {
                id: s.to_string(),
                name: name.to_string(),
            });
        }

        if let Some(member) = member {
            if !Self::validate_identifier(member) {
                return Err(ShapeIdError::InvalidMember {
                    id: s.to_string(),
                    member: member.to_string(),
                });
            }
        }

        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            member: member.map(str::to_string),
        })
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.namespace, self.name)?;
        if let Some(member) = &self.member {
            write!(f, "${member}")?;
        }
        Ok(())
    }
}

impl Serialize for ShapeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ShapeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
