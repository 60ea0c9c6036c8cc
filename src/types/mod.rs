#![forbid(unsafe_code)]

//! Identifiers shared by the type model, the expression grammar and the SQL layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Declaring type used for the built-in identity property.
pub const IDENTITY_TYPE: &str = "Identity";
/// Member name of the built-in identity property.
pub const IDENTITY_MEMBER: &str = "identity";

/// A (declaring type, member) pair naming a property or association.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    type_name: String,
    member: String,
}

impl QualifiedName {
    /// Creates a qualified name from its declaring type and member name.
    pub fn new(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            member: member.into(),
        }
    }

    /// The identity property every entity carries.
    pub fn identity() -> Self {
        Self::new(IDENTITY_TYPE, IDENTITY_MEMBER)
    }

    /// Returns true for the built-in identity property.
    pub fn is_identity(&self) -> bool {
        self.type_name == IDENTITY_TYPE && self.member == IDENTITY_MEMBER
    }

    /// Declaring type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Member name.
    pub fn member(&self) -> &str {
        &self.member
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.member)
    }
}

/// Error returned when a string is not of the form `Type:member`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("qualified name '{0}' must have the form Type:member")]
pub struct ParseQualifiedNameError(pub String);

impl FromStr for QualifiedName {
    type Err = ParseQualifiedNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((ty, member)) if !ty.is_empty() && !member.is_empty() => {
                Ok(QualifiedName::new(ty, member))
            }
            _ => Err(ParseQualifiedNameError(s.to_owned())),
        }
    }
}

impl Serialize for QualifiedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QualifiedName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque identity-bearing handle to an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityReference(String);

impl EntityReference {
    /// Wraps an identity string.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// The identity string.
    pub fn identity(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityReference {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityReference {
    fn from(value: String) -> Self {
        Self(value)
    }
}
