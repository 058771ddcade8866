//! Herald - Gmail notifications relayed to Discord direct messages
//!
//! This is the main entry point for the herald relay.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::error;
use relay::{MessageId, RelaySettings};
use std::path::PathBuf;

mod app;

use app::Herald;

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Relay new Gmail messages to a Discord operator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Settings file (defaults to ~/.config/herald/herald.json)
    #[arg(long, global = true, env = "HERALD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay until Ctrl-C (default)
    Run,
    /// Show the watch record and undelivered messages
    Status,
    /// Deliver a message again, bypassing the cursor and the ledger
    Reprocess {
        /// Gmail message id
        message_id: String,
    },
    /// Establish a new watch now
    Renew,
    /// Stop the Gmail watch
    StopWatch,
    /// Reply in the thread of a delivered message
    Reply {
        message_id: String,
        /// Reply text (at most 2000 characters)
        text: String,
    },
    /// Permanently delete a delivered message
    Delete { message_id: String },
    /// Print the verification code found in a delivered message
    Code { message_id: String },
}

fn load_settings(path: Option<&PathBuf>) -> Result<RelaySettings> {
    match path {
        Some(path) => RelaySettings::from_file(path),
        None => RelaySettings::load(),
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => Herald::new(settings)?.run().await,
        Command::Status => app::print_status(app::open_store(&settings)?.as_ref()),
        Command::Reprocess { message_id } => Herald::new(settings)?.reprocess(&message_id).await,
        Command::Renew => Herald::new(settings)?.renew().await,
        Command::StopWatch => {
            Herald::new(settings)?.stop_watch().await;
            Ok(())
        }
        Command::Reply { message_id, text } => {
            Herald::new(settings)?
                .actions()
                .reply(&MessageId::new(message_id), &text)
                .await
        }
        Command::Delete { message_id } => {
            Herald::new(settings)?
                .actions()
                .delete(&MessageId::new(message_id))
                .await
        }
        Command::Code { message_id } => {
            let code = Herald::new(settings)?
                .actions()
                .copy_code(&MessageId::new(&message_id))?;
            match code {
                Some(code) => println!("{}", code),
                None => println!("No code found in {}", message_id),
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    if let Err(e) = execute(Cli::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
