//! Entity identities.
//!
//! Groups, players and teams are identified by opaque strings handed to us by the
//! surrounding application. Match records get deterministic IDs derived from a SHA256
//! hash of their identifying fields.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// An entity identity.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new EntityId from a raw string.
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Generate an EntityId from input fields.
    /// Uses SHA256 and takes the first 16 characters for brevity.
    pub fn generate(fields: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                hasher.update(b"|");
            }
            hasher.update(field.as_bytes());
        }
        let result = hasher.finalize();
        let hash = hex::encode(result);
        Self(hash[..16].to_string())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this ID can be used as a document key.
    ///
    /// IDs become dotted-path segments in partial document updates, so they must be
    /// non-empty and must not contain `.`.
    pub fn is_valid_key(&self) -> bool {
        let trimmed = self.0.trim();
        !trimmed.is_empty() && trimmed.len() == self.0.len() && !self.0.contains('.')
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Type alias for group IDs
pub type GroupId = EntityId;

/// Type alias for player IDs
pub type PlayerId = EntityId;

/// Type alias for team IDs
pub type TeamId = EntityId;

/// Type alias for match record IDs
pub type MatchId = EntityId;
