pub mod bot;
pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
mod info;
pub mod limiter;
pub mod model;
pub mod period;
pub mod render;
pub mod report;
pub mod router;
mod run;
pub mod summary;
pub mod telegram;
pub mod webhook;

use clap::Parser;
use color_eyre::Result;

pub use error::{Error, Result as BankResult};

#[derive(Debug, Parser)]
#[clap(version, about = "Relays bank account activity to Telegram chats")]
pub enum Command {
    /// Runs the bot, the webhook listener and the daily summary.
    Run(run::Cmd),
    /// Prints every configured client with its accounts.
    Info(info::Cmd),
}

impl Command {
    pub async fn run(&self) -> Result<()> {
        match self {
            Command::Run(cmd) => cmd.run().await?,
            Command::Info(cmd) => cmd.run().await?,
        }

        Ok(())
    }
}
