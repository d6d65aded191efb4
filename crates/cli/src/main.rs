//! Roastery CLI - Database migrations and order management.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! roastery migrate
//!
//! # List recent orders
//! roastery orders list
//!
//! # Attach a tracking number and trigger the shipping email
//! roastery orders track ord_123 1Z999AA10123456784 --notify
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `orders list|show|track` - Inspect orders and attach tracking numbers

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "roastery")]
#[command(author, version, about = "Roastery storefront operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Inspect and update orders
    Orders {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// List the most recent orders
    List {
        /// Number of orders to show
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
    /// Show one order
    Show {
        /// Order id
        id: String,
    },
    /// Attach a tracking number to an order
    Track {
        /// Order id
        id: String,

        /// Carrier tracking number
        tracking_number: String,

        /// Ask the storefront to send the shipping notification
        #[arg(long)]
        notify: bool,
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
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Orders { action } => match action {
            OrderAction::List { limit } => commands::orders::list(limit).await?,
            OrderAction::Show { id } => commands::orders::show(&id).await?,
            OrderAction::Track {
                id,
                tracking_number,
                notify,
            } => commands::orders::track(&id, &tracking_number, notify).await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
