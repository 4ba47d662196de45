//! Byte-string keys: feed keys and clock node ids.
//!
//! Both are opaque byte strings. They display and serialize as lower-case
//! hex so they can be used as JSON object keys.

use crate::Error;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of keys produced by [`FeedKey::random`].
pub const KEY_LENGTH: usize = 32;

macro_rules! byte_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Vec<u8>);

        impl $name {
            /// Wraps raw key bytes.
            #[must_use]
            pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            /// Returns the raw key bytes.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Parses a key from its hex form. The empty string is the
            /// empty key, matching [`to_hex`](Self::to_hex).
            pub fn from_hex(s: &str) -> Result<Self, Error> {
                Ok(Self(hex::decode(s)?))
            }

            /// Returns the lower-case hex form of the key.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

byte_key!(
    /// Identifies a feed: an append-only log of messages from one writer.
    FeedKey
);

byte_key!(
    /// Identifies a node in a causal clock. Usually derived from a [`FeedKey`].
    NodeId
);

impl FeedKey {
    /// Generates a fresh random feed key.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = vec![0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl From<&FeedKey> for NodeId {
    fn from(key: &FeedKey) -> Self {
        Self(key.0.clone())
    }
}

impl From<FeedKey> for NodeId {
    fn from(key: FeedKey) -> Self {
        Self(key.0)
    }
}
