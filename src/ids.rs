//! Identifier types shared by every layer of the runtime
//!
//! Chunk and module ids are emitted by the build step either as integers
//! (`354`) or as short strings (`"a94703ab"`). Both are carried as strings so
//! lookups never depend on how the build chose to spell them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a separately-fetchable chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

/// Stable identifier of a module factory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

macro_rules! string_id {
    ($name:ident) => {
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
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id.to_string())
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id.to_string())
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id.to_string())
            }
        }

        impl From<&$name> for $name {
            fn from(id: &$name) -> Self {
                id.clone()
            }
        }
    };
}

string_id!(ChunkId);
string_id!(ModuleId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_string_ids_agree() {
        assert_eq!(ChunkId::from(354), ChunkId::from("354"));
        assert_eq!(ModuleId::from(7).as_str(), "7");
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&ChunkId::from(869)).unwrap();
        assert_eq!(json, "\"869\"");
        let back: ChunkId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChunkId::from(869));
    }
}
