//! Store directory CLI - database migrations and seed data.
//!
//! # Usage
//!
//! ```bash
//! # Create tables and the session store
//! storedir-cli migrate
//!
//! # Load sample users, stores and reviews
//! storedir-cli seed data/sample.json
//!
//! # Empty the tables first
//! storedir-cli seed data/sample.json --clear
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Load users, stores and reviews from a JSON file

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "storedir-cli")]
#[command(author, version, about = "Store directory CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations (tables and session store)
    Migrate,
    /// Load sample data from a JSON file
    Seed {
        /// Path to the seed file
        file: String,

        /// Delete existing users, stores and reviews first
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file, clear } => commands::seed::run(&file, clear).await?,
    }
    Ok(())
}
