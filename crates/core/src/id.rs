//! Strongly-typed identifiers issued by the inventory backend.
//!
//! The backend hands out opaque strings (UUIDs for real records, `mock-N` for
//! seeded demo data), so identifiers wrap a `String` rather than a `Uuid`.

use core::borrow::Borrow;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

/// Identifier of an activity-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(String);

macro_rules! impl_string_id {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a server-issued identifier as-is.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Create a locally generated identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $t {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id(format!("{}: empty", $name)));
                }
                Ok(Self(trimmed.to_string()))
            }
        }
    };
}

impl_string_id!(ProductId, "ProductId");
impl_string_id!(ActivityId, "ActivityId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_rejects_blank() {
        let id: ProductId = "  p1 ".parse().unwrap();
        assert_eq!(id.as_str(), "p1");

        let err = "   ".parse::<ProductId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ProductId::new("mock-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"mock-7\"");

        let back: ProductId = serde_json::from_str("\"mock-7\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(ActivityId::generate(), ActivityId::generate());
    }

    #[test]
    fn borrows_as_str_for_map_lookups() {
        let mut map = std::collections::HashMap::new();
        map.insert(ProductId::new("p1"), 1);
        assert_eq!(map.get("p1"), Some(&1));
    }
}
