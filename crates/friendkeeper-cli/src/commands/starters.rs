use clap::Args;
use friendkeeper_core::{CoreError, StarterGenerator};

use super::{print_json, Context};

#[derive(Args)]
pub struct StartersArgs {
    pub friend_id: String,
    /// Language code for the starters (en, zh, ja, de, fr, ko, es)
    #[arg(long, default_value = "en")]
    pub language: String,
}

pub fn run(args: StartersArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;
    let generator = StarterGenerator::new(&ctx.config.llm);

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(generator.generate(
        &ctx.db,
        &ctx.ledger,
        &ctx.identity,
        &args.friend_id,
        &args.language,
    ));

    match result {
        Ok(starters) => print_json(&starters),
        Err(CoreError::InsufficientBalance) => {
            // Payment-required is its own path, never a generic failure.
            Err("no generations remaining; run `checkout` to buy a token pack".into())
        }
        Err(e) => Err(e.into()),
    }
}
