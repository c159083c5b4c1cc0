use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag reserved for objects created or cloned through the registry façade.
pub const FRAMEWORK_TAG: &str = "Framework";

/// Fold a lookup key for comparison: trim surrounding whitespace and
/// lowercase. Tags and object names both go through this before any match.
pub fn fold_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A normalized, non-empty label attachable to zero or more managed objects.
///
/// Construction folds the raw value, so `Tag::new("Door")` and
/// `Tag::new(" door ")` compare equal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub fn new(raw: &str) -> RegistryResult<Self> {
        let folded = fold_key(raw);
        if folded.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "tag must not be empty".to_owned(),
            ));
        }
        Ok(Self(folded))
    }

    /// The reserved tag marking registry-created objects.
    pub fn framework() -> Self {
        Self(fold_key(FRAMEWORK_TAG))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
