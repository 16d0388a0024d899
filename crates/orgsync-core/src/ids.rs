//! Catalog-assigned identifier newtype.

use crate::error::{HierarchyError, HierarchyResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Internal identifier the catalog assigns to an entity.
///
/// Only the canonical lowercase hyphenated form (`8-4-4-4-12`) is accepted,
/// so an id read back from a file or the wire always prints identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternalId(Uuid);

impl InternalId {
    /// Create an id from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse and validate the canonical string form.
    pub fn parse(s: &str) -> HierarchyResult<Self> {
        let uuid =
            Uuid::parse_str(s).map_err(|_| HierarchyError::InvalidInternalId(s.to_string()))?;
        if uuid.hyphenated().to_string() != s {
            return Err(HierarchyError::InvalidInternalId(s.to_string()));
        }
        Ok(Self(uuid))
    }

    /// Whether `s` would be accepted by [`InternalId::parse`].
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }
}

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for InternalId {
    type Err = HierarchyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for InternalId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Serialize for InternalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InternalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_uuid_is_accepted() {
        let raw = "0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d";
        let id = InternalId::parse(raw).unwrap();
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn test_non_canonical_forms_are_rejected() {
        assert!(!InternalId::is_valid(""));
        assert!(!InternalId::is_valid("not-a-uuid"));
        assert!(!InternalId::is_valid("0A1B2C3D-4E5F-4A6B-8C7D-9E0F1A2B3C4D"));
        assert!(!InternalId::is_valid("0a1b2c3d4e5f4a6b8c7d9e0f1a2b3c4d"));
        assert!(!InternalId::is_valid("{0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d}"));
    }

    #[test]
    fn test_serde_uses_string_form() {
        let id = InternalId::from_uuid(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
        let back: InternalId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<InternalId>("\"nope\"").is_err());
    }
}
