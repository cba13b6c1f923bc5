use clap::Args;
use friendkeeper_core::await_settlement;
use std::time::Duration;

use super::{print_json, Context};

#[derive(Args)]
pub struct TokensArgs {
    /// Poll until a pending purchase settles (webhook delivery can lag a
    /// redirect back from checkout)
    #[arg(long)]
    pub wait: bool,
}

const POLL_ATTEMPTS: u32 = 10;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub fn run(args: TokensArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;

    let balance = if args.wait {
        let baseline = ctx.ledger.balance(&ctx.identity)?.total();
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(await_settlement(
            &ctx.ledger,
            &ctx.identity,
            baseline,
            POLL_ATTEMPTS,
            POLL_INTERVAL,
        ))?
    } else {
        ctx.ledger.balance(&ctx.identity)?
    };

    print_json(&balance)
}
