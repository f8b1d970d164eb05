//! Daily devotional generator.
//!
//! ```bash
//! cargo run -p devotional -- generate --output-dir devotionals
//! cargo run -p devotional -- check candidate.json
//! cargo run -p devotional -- stats
//! cargo run -p devotional -- prune --days 365
//! ```

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let level = &cli.log_level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("devotional={level},devotional_core={level},claude={level},warn").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &cli.command {
        Command::Generate(args) => commands::generate(&cli.history, args).await,
        Command::Check(args) => {
            let accepted = commands::check(&cli.history, args)?;
            if !accepted {
                std::process::exit(2);
            }
            Ok(())
        }
        Command::Stats => commands::stats(&cli.history),
        Command::Prune(args) => commands::prune(&cli.history, args),
    }
}
