//! propfeed maintenance tools.
//!
//! ```bash
//! # Copy listings.json / data.json and users.json into the configured store
//! propfeed-cli import --from ./legacy
//!
//! # Hash passwords that are still stored as plaintext
//! propfeed-cli rehash-passwords
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use propfeed::{config::AppConfig, logging, maintenance, store};

#[derive(Parser)]
#[command(name = "propfeed-cli")]
#[command(author, version, about = "propfeed data maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import legacy JSON exports, skipping records that already exist
    Import {
        /// Directory holding the export files
        #[arg(short, long)]
        from: PathBuf,
    },
    /// Replace plaintext passwords with argon2 hashes
    RehashPasswords,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let store = store::initialize(&config.store)
        .await
        .with_context(|| format!("open {:?} store", config.store.backend))?;

    match cli.command {
        Commands::Import { from } => {
            let report = maintenance::import_from_dir(&from, &store, &config.listings).await?;
            println!(
                "listings: {} imported, {} skipped; users: {} imported, {} skipped; {} failed",
                report.listings_imported,
                report.listings_skipped,
                report.users_imported,
                report.users_skipped,
                report.failed
            );
        }
        Commands::RehashPasswords => {
            let report = maintenance::rehash_legacy_passwords(&store, &config.password).await?;
            println!(
                "{} hashed, {} already current, {} under another scheme",
                report.rehashed, report.current, report.foreign
            );
        }
    }
    Ok(())
}
