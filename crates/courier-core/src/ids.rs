//! Branded ID newtypes.
//!
//! Each identifier in the relay is a distinct newtype around `String`, so a
//! conversation ID cannot be passed where a website ID is expected. Freshly
//! generated IDs are UUID v7 (time-ordered).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random ID (UUID v7).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id! {
    /// Unique key of one live connection within the hub. Generated at accept
    /// time; never supplied by the connecting party.
    ConnectionId
}

branded_id! {
    /// The connecting party's own identifier (visitor ID or agent ID).
    PeerId
}

branded_id! {
    /// Identifies the website a visitor or agent belongs to.
    WebsiteId
}

branded_id! {
    /// Identifies a single conversation between a visitor and agents.
    ConversationId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn new_ids_are_valid_uuids() {
        let id = ConnectionId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn from_str_preserves_value() {
        let id = WebsiteId::from("site_42");
        assert_eq!(id.as_str(), "site_42");
        assert_eq!(id.to_string(), "site_42");
    }

    #[test]
    fn into_inner_round_trips() {
        let id = ConversationId::from("conv_1".to_owned());
        assert_eq!(id.into_inner(), "conv_1");
    }

    #[test]
    fn serde_is_transparent() {
        let id = PeerId::from("visitor_7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"visitor_7\"");
        let back: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ids_are_hashable_map_keys() {
        let mut map = std::collections::HashMap::new();
        let id = ConnectionId::from("c1");
        let _ = map.insert(id.clone(), 1);
        assert_eq!(map.get(&id), Some(&1));
    }
}
