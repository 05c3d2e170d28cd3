//! Cross-service identifiers.
//!
//! Server-assigned ids may exceed the range a JSON consumer can represent
//! exactly, so they are kept as canonical decimal strings. The wire format
//! may carry them either as JSON strings or as integers.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Opaque, arbitrary-precision, non-negative decimal id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    /// Parse and canonicalise a decimal id (leading zeros stripped).
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidId(raw.to_string()));
        }
        let canonical = trimmed.trim_start_matches('0');
        if canonical.is_empty() {
            return Ok(Self("0".to_string()));
        }
        Ok(Self(canonical.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Self::parse(s)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

struct EntityIdVisitor;

impl Visitor<'_> for EntityIdVisitor {
    type Value = EntityId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a string of decimal digits")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<EntityId, E> {
        Ok(EntityId::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<EntityId, E> {
        u64::try_from(v)
            .map(EntityId::from)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<EntityId, E> {
        Ok(EntityId(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<EntityId, E> {
        EntityId::parse(v).map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(EntityIdVisitor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn large_integer_keeps_every_digit() {
        let id: EntityId = serde_json::from_str("245241133272138248").unwrap();
        assert_eq!(id.as_str(), "245241133272138248");
    }

    #[test]
    fn string_and_integer_forms_are_equal() {
        let a: EntityId = serde_json::from_str("\"245241133272138248\"").unwrap();
        let b: EntityId = serde_json::from_str("245241133272138248").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn serializes_as_string() {
        let id = EntityId::parse("42").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");
    }

    #[test]
    fn leading_zeros_are_canonicalised() {
        assert_eq!(EntityId::parse("00042").unwrap().as_str(), "42");
        assert_eq!(EntityId::parse("000").unwrap().as_str(), "0");
    }

    #[test]
    fn rejects_non_digits_negatives_and_floats() {
        assert!(EntityId::parse("12a").is_err());
        assert!(EntityId::parse("").is_err());
        assert!(serde_json::from_str::<EntityId>("-5").is_err());
        assert!(serde_json::from_str::<EntityId>("1.5").is_err());
    }
}
