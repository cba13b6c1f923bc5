use chrono::{Duration, Utc};
use clap::Args;
use friendkeeper_core::NewInteraction;

use super::{print_json, Context};

#[derive(Args)]
pub struct LogArgs {
    pub friend_id: String,
    /// What you talked about
    #[arg(long)]
    pub summary: Option<String>,
    /// Topics to follow up on next time (repeatable)
    #[arg(long = "topic")]
    pub topics: Vec<String>,
    /// Backdate the contact by this many days
    #[arg(long)]
    pub days_ago: Option<i64>,
}

pub fn run(args: LogArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;

    // Ownership check before appending to history.
    if ctx
        .db
        .get_friend(ctx.identity.as_str(), &args.friend_id)?
        .is_none()
    {
        return Err(format!("friend not found: {}", args.friend_id).into());
    }

    let input = NewInteraction {
        summary: args.summary,
        next_topics: if args.topics.is_empty() {
            None
        } else {
            Some(args.topics)
        },
        contacted_at: args.days_ago.map(|d| Utc::now() - Duration::days(d)),
    };
    let interaction = ctx.db.insert_interaction(&args.friend_id, &input)?;
    print_json(&interaction)
}
