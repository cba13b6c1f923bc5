//! Relationship health classification.
//!
//! Health is always derived from the contact cadence and the most recent
//! interaction timestamp, never stored: persisting it separately from its
//! inputs would let the two drift apart. Red is the safe default for every
//! unknown condition, including values that arrive corrupted from storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Target contact interval for a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
}

impl Cadence {
    /// Expected interval between contacts, in days.
    pub fn expected_days(self) -> i64 {
        match self {
            Cadence::Weekly => 7,
            Cadence::Biweekly => 14,
            Cadence::Monthly => 30,
            Cadence::Quarterly => 90,
        }
    }

    /// Parse a cadence from its stored string, defaulting to monthly.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "weekly" => Cadence::Weekly,
            "biweekly" => Cadence::Biweekly,
            "quarterly" => Cadence::Quarterly,
            _ => Cadence::Monthly,
        }
    }

    /// Format a cadence for database storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Cadence::Weekly => "weekly",
            Cadence::Biweekly => "biweekly",
            Cadence::Monthly => "monthly",
            Cadence::Quarterly => "quarterly",
        }
    }
}

/// Tri-state urgency signal derived from cadence and recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

impl HealthStatus {
    /// Parse a status arriving as a loosely-typed string.
    ///
    /// Any unrecognized value maps to red here, at the single boundary
    /// point, so consumers never re-check ad hoc.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "green" => HealthStatus::Green,
            "yellow" => HealthStatus::Yellow,
            _ => HealthStatus::Red,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Green => "green",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Red => "red",
        }
    }
}

/// Tunable classification policy.
///
/// The grace multiplier stretches the yellow band: a relationship stays
/// yellow until `expected_days * grace_multiplier` days have passed, then
/// turns red.
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub grace_multiplier: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            grace_multiplier: 1.5,
        }
    }
}

/// Result of classifying one relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: HealthStatus,
    /// Whole days since the last logged contact; `None` when never contacted.
    pub days_since_contact: Option<i64>,
}

/// Classify a relationship's health from its cadence and last contact.
///
/// Never contacted is maximally urgent: red with no day count. Otherwise the
/// status is green within the cadence interval, yellow within the grace
/// window beyond it, and red once overdue past the grace window. Monotonic:
/// more elapsed days never improves the status.
pub fn classify(
    cadence: Cadence,
    last_contacted: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &HealthPolicy,
) -> Classification {
    let Some(last) = last_contacted else {
        return Classification {
            status: HealthStatus::Red,
            days_since_contact: None,
        };
    };

    // Interactions logged in the future (clock skew, aggressive backdating)
    // count as zero days elapsed.
    let days = (now - last).num_days().max(0);
    let expected = cadence.expected_days();
    let grace_limit = expected as f64 * policy.grace_multiplier;

    let status = if days <= expected {
        HealthStatus::Green
    } else if (days as f64) <= grace_limit {
        HealthStatus::Yellow
    } else {
        HealthStatus::Red
    };

    Classification {
        status,
        days_since_contact: Some(days),
    }
}
