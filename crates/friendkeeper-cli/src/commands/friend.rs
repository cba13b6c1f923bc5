use chrono::Utc;
use clap::Subcommand;
use friendkeeper_core::{
    friend_detail, list_with_health, Cadence, HealthPolicy, NewFriend, RelationType,
};

use super::{print_json, Context};

#[derive(Subcommand)]
pub enum FriendAction {
    /// Add a friend to track
    Add {
        name: String,
        #[arg(long)]
        nickname: Option<String>,
        /// friend | family | colleague | acquaintance
        #[arg(long)]
        relation: Option<String>,
        /// weekly | biweekly | monthly | quarterly
        #[arg(long)]
        cadence: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List all friends with health status
    List,
    /// Show one friend with interaction history
    Show { friend_id: String },
    /// Delete a friend and their history (no recovery)
    Delete { friend_id: String },
}

pub fn run(action: FriendAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;
    let policy = HealthPolicy {
        grace_multiplier: ctx.config.policy.grace_multiplier,
    };

    match action {
        FriendAction::Add {
            name,
            nickname,
            relation,
            cadence,
            notes,
        } => {
            let input = NewFriend {
                name,
                nickname,
                relation_type: relation.as_deref().map(RelationType::parse),
                contact_frequency: cadence.as_deref().map(Cadence::parse),
                notes,
            };
            input.validate()?;
            let friend = ctx.db.insert_friend(ctx.identity.as_str(), &input)?;
            print_json(&friend)?;
        }
        FriendAction::List => {
            let summaries =
                list_with_health(&ctx.db, ctx.identity.as_str(), Utc::now(), &policy)?;
            print_json(&summaries)?;
        }
        FriendAction::Show { friend_id } => {
            let detail = friend_detail(
                &ctx.db,
                ctx.identity.as_str(),
                &friend_id,
                Utc::now(),
                &policy,
            )?;
            print_json(&detail)?;
        }
        FriendAction::Delete { friend_id } => {
            let deleted = ctx.db.delete_friend(ctx.identity.as_str(), &friend_id)?;
            if !deleted {
                return Err(format!("friend not found: {friend_id}").into());
            }
            println!("deleted {friend_id}");
        }
    }
    Ok(())
}
