//! Strongly-typed identifiers for conversations, users, and turns.
//!
//! Identifiers are opaque strings supplied by callers (channel adapters own
//! their own id schemes). Locally generated identifiers use a type prefix
//! followed by a ULID, so they sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Generates an opaque string identifier newtype.
///
/// `Default` yields a blank ID so that missing fields in deserialized input
/// can be detected and rejected by validation instead of by serde.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a fresh identifier from a new ULID.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!("{}_{}", $prefix, Ulid::new()))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or whitespace only.
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// Returns the prefix used for generated identifiers.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        id_type: stringify!($name),
                        reason: "identifier is blank".to_string(),
                    });
                }
                Ok(Self(trimmed.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a conversation; the sole key into the context store.
    ConversationId,
    "conv"
);

define_id!(
    /// Unique identifier for a user.
    UserId,
    "usr"
);

define_id!(
    /// Unique identifier for a single turn within a conversation.
    TurnId,
    "turn"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_carries_prefix() {
        let id = ConversationId::generate();
        assert!(id.as_str().starts_with("conv_"));
        assert!(!id.is_blank());
    }

    #[test]
    fn generated_ids_are_unique() {
        use std::collections::HashSet;

        let ids: HashSet<TurnId> = (0..100).map(|_| TurnId::generate()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn default_id_is_blank() {
        assert!(UserId::default().is_blank());
        assert!(ConversationId::new("   ").is_blank());
    }

    #[test]
    fn parse_trims_and_rejects_blank() {
        let id: ConversationId = " abc-123 ".parse().expect("should parse");
        assert_eq!(id.as_str(), "abc-123");

        let err = "  ".parse::<ConversationId>().unwrap_err();
        assert_eq!(err.id_type, "ConversationId");
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id = UserId::new("user-42");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"user-42\"");

        let parsed: UserId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, id);
    }
}
