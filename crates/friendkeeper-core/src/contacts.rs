//! Relationship and interaction types.
//!
//! All records are owned by a single device identity; the storage layer
//! scopes every query by it. Interactions are append-only: once logged they
//! are never edited or deleted, so a friend's history is a faithful log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::health::{Cadence, HealthStatus};

/// Category of relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Friend,
    Family,
    Colleague,
    Acquaintance,
}

impl RelationType {
    /// Parse a relation type from its stored string, defaulting to friend.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "family" => RelationType::Family,
            "colleague" => RelationType::Colleague,
            "acquaintance" => RelationType::Acquaintance,
            _ => RelationType::Friend,
        }
    }

    /// Format a relation type for database storage.
    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::Friend => "friend",
            RelationType::Family => "family",
            RelationType::Colleague => "colleague",
            RelationType::Acquaintance => "acquaintance",
        }
    }
}

/// A tracked relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friend {
    pub id: String,
    #[serde(skip_serializing, default)]
    pub device_id: String,
    pub name: String,
    pub nickname: Option<String>,
    pub relation_type: RelationType,
    pub contact_frequency: Cadence,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One logged contact with a friend. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub friend_id: String,
    pub contacted_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub next_topics: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a friend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFriend {
    pub name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub relation_type: Option<RelationType>,
    #[serde(default)]
    pub contact_frequency: Option<Cadence>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewFriend {
    /// Reject blank names before anything touches storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "name" });
        }
        Ok(())
    }
}

/// Input for logging an interaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewInteraction {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub next_topics: Option<Vec<String>>,
    /// Backdated contact time; defaults to now when absent.
    #[serde(default)]
    pub contacted_at: Option<DateTime<Utc>>,
}

/// A friend as served to the dashboard: base record plus derived health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendSummary {
    pub id: String,
    pub name: String,
    pub nickname: Option<String>,
    pub relation_type: RelationType,
    pub contact_frequency: Cadence,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_interaction: Option<DateTime<Utc>>,
    pub health_status: HealthStatus,
    pub days_since_contact: Option<i64>,
}

/// Friend detail: summary plus ordered interaction history (newest first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendDetail {
    #[serde(flatten)]
    pub friend: FriendSummary,
    pub interactions: Vec<Interaction>,
}
