//! Identifier types for platform entities.
//!
//! The chat platform identifies every object with a 64-bit snowflake. The
//! newtypes below keep guild, user, channel and role ids from being mixed up.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw snowflake.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw snowflake.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Parses an id from its decimal string form.
            pub fn parse(s: &str) -> Result<Self, Error> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| Error::InvalidId(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake_id!(
    /// Identifier of a guild (community).
    GuildId
);

snowflake_id!(
    /// Identifier of a user. Equality is by id only.
    UserId
);

snowflake_id!(
    /// Identifier of a text channel.
    ChannelId
);

snowflake_id!(
    /// Identifier of a guild role.
    RoleId
);
