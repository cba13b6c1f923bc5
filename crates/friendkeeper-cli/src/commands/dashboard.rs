use chrono::Utc;
use friendkeeper_core::{build_dashboard, list_with_health, HealthPolicy};

use super::{print_json, Context};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;
    let policy = HealthPolicy {
        grace_multiplier: ctx.config.policy.grace_multiplier,
    };

    // Always rebuilt from live rows; a single logged interaction can move a
    // friend across every bucket.
    let summaries = list_with_health(&ctx.db, ctx.identity.as_str(), Utc::now(), &policy)?;
    print_json(&build_dashboard(summaries))
}
