use std::sync::Arc;

use clap::Parser;
use color_eyre::{
    eyre::{eyre, Context},
    Result,
};
use tokio::{net::TcpListener, sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    bot::Bot,
    client::BankClient,
    config::ConfigArgs,
    gateway::Gateway,
    router::Clients,
    telegram::Telegram,
    webhook,
};

#[derive(Debug, Parser)]
pub struct Cmd {
    #[clap(flatten)]
    config: ConfigArgs,
}

impl Cmd {
    #[instrument("run", skip_all)]
    pub(crate) async fn run(&self) -> Result<()> {
        let config = self.config.load().await?;

        let gateway = Gateway::new(config.monobank.api_url()?, config.monobank.timeout())?;
        let options = config.client_options();
        let clients = Clients::new(
            config
                .monobank
                .tokens
                .iter()
                .map(|token| BankClient::new(token.clone(), gateway.clone(), &options)),
        )?;

        for client in clients.iter() {
            let data = client
                .info()
                .await
                .with_context(|| format!("Initial client info for {}", client.id()))?;
            info!(client_id = client.id(), name = %data.name, accounts = data.accounts.len(), "Client ready");
        }

        let telegram = Telegram::new(config.telegram.api_url()?, config.telegram.token.clone())?;
        let me = telegram.get_me().await.context("Telegram authorization")?;
        info!(username = ?me.username, "Authorized on telegram");

        let bot = Arc::new(Bot::new(
            telegram,
            clients,
            config.telegram.admins.clone(),
            config.telegram.chats.clone(),
        ));

        let listener = TcpListener::bind(config.webhook.listen)
            .await
            .with_context(|| format!("Bind to address: {}", config.webhook.listen))?;
        let (tx, rx) = mpsc::channel(config.webhook.queue.max(1));

        let cnx = CancellationToken::new();
        let mut tasks = JoinSet::new();
        tasks.spawn(webhook::serve(listener, tx, cnx.clone()));
        tasks.spawn(bot.clone().consume(rx, cnx.clone()));
        tasks.spawn(bot.clone().run(cnx.clone()));
        match config.schedule.schedule()? {
            Some(schedule) => {
                tasks.spawn(bot.clone().schedule_summaries(schedule, config.report.timezone, cnx.clone()));
            }
            None => info!("Daily summary disabled"),
        }

        let outcome = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Waiting for shutdown signal")?;
                info!("Shutting down");
                Ok(())
            }
            Some(joined) = tasks.join_next() => match joined {
                Ok(Ok(())) => Err(eyre!("A service stopped unexpectedly")),
                Ok(Err(err)) => Err(err),
                Err(err) => Err(err).context("Service task panicked"),
            },
        };

        cnx.cancel();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = ?err, "Service failed during shutdown"),
                Err(err) => warn!(%err, "Service task panicked during shutdown"),
            }
        }

        outcome
    }
}
