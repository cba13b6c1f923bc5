use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "friendkeeper-cli", version, about = "FriendKeeper CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Friend management
    Friend {
        #[command(subcommand)]
        action: commands::friend::FriendAction,
    },
    /// Log an interaction with a friend
    Log(commands::interaction::LogArgs),
    /// Friendship dashboard overview
    Dashboard,
    /// Generate talk starters for a friend (consumes one credit)
    Starters(commands::starters::StartersArgs),
    /// Generation credit balance
    Tokens(commands::tokens::TokensArgs),
    /// Create a token-pack checkout session
    Checkout(commands::checkout::CheckoutArgs),
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Friend { action } => commands::friend::run(action),
        Commands::Log(args) => commands::interaction::run(args),
        Commands::Dashboard => commands::dashboard::run(),
        Commands::Starters(args) => commands::starters::run(args),
        Commands::Tokens(args) => commands::tokens::run(args),
        Commands::Checkout(args) => commands::checkout::run(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
