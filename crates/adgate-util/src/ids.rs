//! Strongly-typed identifiers for adgate

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
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
    };
}

string_id!(
    /// Identifier of an ad slot, also sent to the policy server as `placement`
    PlacementId
);

string_id!(
    /// Partner identifier issued by the ad network
    PartnerId
);

string_id!(
    /// Application identifier issued by the ad network
    AppId
);

string_id!(
    /// Server-side identifier of a single ad request, used for impression tracking
    RequestId
);

impl RequestId {
    /// Generate a local request id when the server did not supply one.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_id_equality() {
        let a = PlacementId::new("interstitial-main");
        let b = PlacementId::from("interstitial-main");
        let c = PlacementId::new("interstitial-level-end");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn generated_request_ids_are_unique() {
        let r1 = RequestId::generate();
        let r2 = RequestId::generate();
        assert_ne!(r1, r2);
        assert!(Uuid::parse_str(r1.as_str()).is_ok());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = PartnerId::new("partner-7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"partner-7\"");

        let parsed: PartnerId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
