//! Opaque identifiers for entities, integrations and connected accounts.
//!
//! All three are supplied by the caller or by the remote service and are never
//! generated locally.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::HandshakeError;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a non-blank identifier; surrounding whitespace is stripped.
            pub fn new<S: Into<String>>(value: S) -> Result<Self, HandshakeError> {
                let raw: String = value.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(HandshakeError::InvalidArgument {
                        field: $field,
                        message: "must not be empty".to_string(),
                    });
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = HandshakeError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// End-user identity on whose behalf a connection is made.
    ///
    /// Must stay stable for the lifetime of the user in the calling application.
    EntityId,
    "entity_id"
);

opaque_id!(
    /// Reference to a pre-configured remote integration (OAuth client credentials + scopes).
    IntegrationId,
    "integration_id"
);

opaque_id!(
    /// Remote-side identifier of a connected account.
    ConnectedAccountId,
    "connected_account_id"
);
