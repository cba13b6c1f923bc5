//! Dashboard aggregation and health-annotated listings.
//!
//! Everything here is recomputed from live data on every call. A single
//! logged interaction can move a relationship across every bucket, so
//! caching aggregates across mutations would serve stale triage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contacts::{Friend, FriendDetail, FriendSummary};
use crate::error::{CoreError, Result};
use crate::health::{classify, HealthPolicy, HealthStatus};
use crate::storage::Database;

/// Interactions returned with a friend detail view.
const DETAIL_HISTORY_LIMIT: usize = 20;

/// Dashboard view model: triage buckets plus summary counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub total_friends: usize,
    pub need_contact_today: Vec<FriendSummary>,
    pub need_contact_this_week: Vec<FriendSummary>,
    pub healthy_friendships: usize,
    pub at_risk_friendships: usize,
}

fn summarize(
    db: &Database,
    friend: Friend,
    now: DateTime<Utc>,
    policy: &HealthPolicy,
) -> Result<FriendSummary> {
    let last = db.last_contacted(&friend.id)?;
    let classification = classify(friend.contact_frequency, last, now, policy);
    Ok(FriendSummary {
        id: friend.id,
        name: friend.name,
        nickname: friend.nickname,
        relation_type: friend.relation_type,
        contact_frequency: friend.contact_frequency,
        notes: friend.notes,
        created_at: friend.created_at,
        updated_at: friend.updated_at,
        last_interaction: last,
        health_status: classification.status,
        days_since_contact: classification.days_since_contact,
    })
}

/// All friends for a device with freshly computed health.
pub fn list_with_health(
    db: &Database,
    device_id: &str,
    now: DateTime<Utc>,
    policy: &HealthPolicy,
) -> Result<Vec<FriendSummary>> {
    db.list_friends(device_id)?
        .into_iter()
        .map(|friend| summarize(db, friend, now, policy))
        .collect()
}

/// One friend with health and ordered interaction history (newest first).
pub fn friend_detail(
    db: &Database,
    device_id: &str,
    friend_id: &str,
    now: DateTime<Utc>,
    policy: &HealthPolicy,
) -> Result<FriendDetail> {
    let friend = db
        .get_friend(device_id, friend_id)?
        .ok_or_else(|| CoreError::NotFound {
            resource: "friend",
            id: friend_id.to_string(),
        })?;
    let interactions = db.interactions_for(friend_id, DETAIL_HISTORY_LIMIT)?;
    Ok(FriendDetail {
        friend: summarize(db, friend, now, policy)?,
        interactions,
    })
}

/// Most-overdue-first ordering: never-contacted relationships lead, then
/// descending days since contact, ties broken by id for determinism.
fn urgency_key(summary: &FriendSummary) -> (i64, String) {
    let overdue = summary.days_since_contact.unwrap_or(i64::MAX);
    (-overdue, summary.id.clone())
}

/// Partition health-annotated friends into the dashboard view model.
///
/// Red relationships need contact today, yellow this week; the two buckets
/// are disjoint by construction and healthy + at-risk always equals the
/// total.
pub fn build_dashboard(mut summaries: Vec<FriendSummary>) -> Dashboard {
    summaries.sort_by_key(urgency_key);

    let total_friends = summaries.len();
    let mut need_contact_today = Vec::new();
    let mut need_contact_this_week = Vec::new();
    let mut healthy_friendships = 0;

    for summary in summaries {
        match summary.health_status {
            HealthStatus::Red => need_contact_today.push(summary),
            HealthStatus::Yellow => need_contact_this_week.push(summary),
            HealthStatus::Green => healthy_friendships += 1,
        }
    }

    let at_risk_friendships = need_contact_today.len() + need_contact_this_week.len();
    Dashboard {
        total_friends,
        need_contact_today,
        need_contact_this_week,
        healthy_friendships,
        at_risk_friendships,
    }
}
