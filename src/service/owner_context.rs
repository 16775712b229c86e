//! Owner context structure for handling tenant-related information

use serde::{Deserialize, Serialize};

/// Owner context carried through service calls.
///
/// The owner id is an opaque string minted by the session layer; the engine
/// never interprets it beyond using it as a path segment. An absent album id
/// on upload means "allocate a fresh album first".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnerContext {
    /// Opaque owner identifier
    pub owner_id: String,
    /// Target album, when the caller addresses one
    pub album_id: Option<String>,
}

impl OwnerContext {
    /// Create a new OwnerContext with no album selected
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            album_id: None,
        }
    }

    /// Create a new OwnerContext addressing a specific album
    pub fn with_album(owner_id: impl Into<String>, album_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            album_id: Some(album_id.into()),
        }
    }
}
