//! Domain types stored in the database.
//!
//! These types represent the persisted authorization grants and router
//! settings of a platform instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An authorization entry granting capabilities to a public key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthEntry {
    /// The public key this entry applies to.
    pub credentials: String,
    /// Capabilities granted to the key.
    pub capabilities: BTreeSet<String>,
    /// Identity the grant is recorded under.
    pub user_id: String,
    /// Free-form note about why the entry exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AuthEntry {
    /// Create an entry granting `capabilities` to `credentials`.
    #[must_use]
    pub fn new<I, S>(credentials: &str, user_id: &str, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        Self {
            credentials: credentials.to_string(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            user_id: user_id.to_string(),
            comments: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a comment.
    #[must_use]
    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    /// Whether the entry grants `capability`.
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// A named router setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    /// Setting name.
    pub key: String,
    /// Setting value.
    pub value: serde_json::Value,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Setting {
    /// Create a setting stamped with the current time.
    #[must_use]
    pub fn new(key: &str, value: serde_json::Value) -> Self {
        Self {
            key: key.to_string(),
            value,
            updated_at: Utc::now(),
        }
    }
}
