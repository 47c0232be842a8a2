use clap::Parser;
use color_eyre::{eyre::Context, Result};
use tracing::{info, instrument};

use crate::{client::BankClient, config::ConfigArgs, gateway::Gateway, render::money};

#[derive(Debug, Parser)]
pub struct Cmd {
    #[clap(flatten)]
    config: ConfigArgs,
}

impl Cmd {
    #[instrument("info", skip_all)]
    pub(crate) async fn run(&self) -> Result<()> {
        let config = self.config.load().await?;
        let gateway = Gateway::new(config.monobank.api_url()?, config.monobank.timeout())?;
        let options = config.client_options();

        for (index, token) in config.monobank.tokens.iter().enumerate() {
            let client = BankClient::new(token.clone(), gateway.clone(), &options);
            let data = client
                .info()
                .await
                .with_context(|| format!("Client info for token #{index}"))?;

            info!(index, client_id = client.id(), name = %data.name, webhook = ?data.web_hook_url, "Client");
            for account in &data.accounts {
                info!(
                    id = %account.id,
                    name = %account.display_name(),
                    balance = %money(account.balance, account.currency_code),
                    "Account"
                );
            }
        }

        Ok(())
    }
}
