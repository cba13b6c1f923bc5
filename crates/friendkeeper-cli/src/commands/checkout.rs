use clap::Args;
use friendkeeper_core::PaymentClient;

use super::{print_json, Context};

#[derive(Args)]
pub struct CheckoutArgs {
    /// Product SKU: starter | popular | pro
    pub sku: String,
    /// Where the payment provider should send the buyer afterwards
    #[arg(long, default_value = "https://friendkeeper.app/payment/success")]
    pub success_url: String,
}

pub fn run(args: CheckoutArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;
    let client = PaymentClient::new(&ctx.config.payment);

    let runtime = tokio::runtime::Runtime::new()?;
    let checkout = runtime.block_on(client.create_checkout(
        &ctx.db,
        &ctx.identity,
        &args.sku,
        &args.success_url,
    ))?;

    print_json(&checkout)
}
