//! Short opaque identifiers.
//!
//! Every entity id is a 10-character alphanumeric string. Distinct id kinds
//! are nominal types so a `SessionId` can never be passed where an `AgentId`
//! is expected.

use serde::{Deserialize, Serialize};

const ID_LEN: usize = 10;

const ALPHABET: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I',
    'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b',
    'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u',
    'v', 'w', 'x', 'y', 'z',
];

/// Generate a fresh 10-character alphanumeric id.
pub fn gen_id() -> String {
    nanoid::nanoid!(ID_LEN, &ALPHABET)
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a new random id.
            pub fn generate() -> Self {
                Self(gen_id())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

entity_id!(
    /// Identifies a registered user.
    UserId
);
entity_id!(
    /// Identifies an agent definition.
    AgentId
);
entity_id!(
    /// Identifies a session between a user and an agent.
    SessionId
);
entity_id!(
    /// Identifies a single event, persisted or in-flight.
    EventId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_short_alphanumerics() {
        for _ in 0..100 {
            let id = gen_id();
            assert_eq!(id.len(), 10);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: std::collections::HashSet<String> = (0..1000).map(|_| gen_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn id_serde_is_transparent() {
        let id = SessionId::from("fxjwGfAIYV");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"fxjwGfAIYV\"");

        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn id_display_matches_inner() {
        let id = AgentId::from("a1b2c3d4e5");
        assert_eq!(id.to_string(), "a1b2c3d4e5");
        assert_eq!(id.as_str(), "a1b2c3d4e5");
    }
}
