//! Chat-facing side of the bridge.
//!
//! Updates are processed strictly one at a time. Push notifications arrive
//! through a queue and are handled by a separate consumer task; the only state
//! both paths touch is the report cache, which is guarded inside [`Report`].
//!
//! [`Report`]: crate::report::Report

use std::sync::Arc;

use askama::Template;
use chrono_tz::Tz;
use color_eyre::Result;
use tokio::{sync::mpsc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::{
    callback::{Action, Callback},
    client::BankClient,
    error::Error,
    model::{StatementEvent, StatementItem},
    period::{now_in, Period},
    render::{money, BalanceMessage, ReportMessage, StatementMessage, WebhookMessage},
    report::CacheKey,
    router::Clients,
    summary::{self, SummarySchedule},
    telegram::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, Telegram, Update},
};

const CHOOSE_CLIENT: &str = "Виберіть клієнта:";
const CHOOSE_ACCOUNT: &str = "Виберіть рахунок:";
const CHOOSE_PERIOD: &str = "Виберіть період:";
const ACCESS_DENIED: &str = "Access denied";
const CALLBACK_ERROR: &str = "Error :(";
const PERIODS_PER_ROW: usize = 3;
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Chat commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Balance,
    Report,
    /// `/get_webhook` or `/get_webhook_N` for the N-th configured client.
    GetWebhook(usize),
    /// `/set_webhook[_N] <url>`; the url is validated separately.
    SetWebhook(usize, String),
}

#[derive(Debug)]
pub struct Bot {
    telegram: Telegram,
    clients: Clients,
    admins: Vec<i64>,
    chats: Vec<i64>,
}

impl BotCommand {
    /// `None` for text that is not a known command or lacks its argument.
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let head = words.next()?;
        // commands in groups may be addressed as `/cmd@bot_name`
        let head = head.split('@').next().unwrap_or(head);

        let (name, index) = match head.rsplit_once('_') {
            Some((name, index)) if index.chars().all(|c| c.is_ascii_digit()) && !index.is_empty() => {
                (name, index.parse().ok()?)
            }
            _ => (head, 0),
        };

        let command = match name {
            "/balance" => BotCommand::Balance,
            "/report" => BotCommand::Report,
            "/get_webhook" => BotCommand::GetWebhook(index),
            "/set_webhook" => {
                let url = words.next()?;
                if words.next().is_some() {
                    return None;
                }
                BotCommand::SetWebhook(index, url.to_owned())
            }
            _ => return None,
        };
        Some(command)
    }
}

/// Absolute url with a scheme and a host.
pub fn is_url(text: &str) -> bool {
    Url::parse(text).is_ok_and(|url| !url.scheme().is_empty() && url.host().is_some())
}

impl Bot {
    pub fn new(telegram: Telegram, clients: Clients, admins: Vec<i64>, chats: Vec<i64>) -> Self {
        Self {
            telegram,
            clients,
            admins,
            chats,
        }
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    pub fn is_allowed(&self, user_id: i64, chat_id: i64) -> bool {
        self.admins.contains(&user_id) || self.chats.contains(&chat_id)
    }

    /// Polls for updates until cancelled.
    pub async fn run(self: Arc<Self>, cnx: CancellationToken) -> Result<()> {
        let mut offset = 0;
        loop {
            let updates = tokio::select! {
                _ = cnx.cancelled() => return Ok(()),
                updates = self.telegram.get_updates(offset) => updates,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(error = ?err, "polling for updates failed");
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let update_id = update.update_id;
                if let Err(err) = self.handle(update).await {
                    error!(update_id, error = ?err, "handling update");
                }
            }
        }
    }

    #[instrument(skip_all, fields(update_id = update.update_id))]
    pub async fn handle(&self, update: Update) -> Result<()> {
        if let Some(message) = update.message {
            self.handle_message(message).await
        } else if let Some(query) = update.callback_query {
            self.handle_callback(query).await
        } else {
            warn!("received update without message or callback");
            Ok(())
        }
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        let chat_id = message.chat.id;
        let user_id = message.from.as_ref().map(|u| u.id).unwrap_or_default();
        debug!(user_id, chat_id, "message");

        if !self.is_allowed(user_id, chat_id) {
            debug!(user_id, chat_id, "ignoring message from unknown sender");
            return Ok(());
        }

        let Some(command) = message.text.as_deref().and_then(BotCommand::parse) else {
            debug!("unsupported message");
            return Ok(());
        };

        match command {
            BotCommand::Balance => self.balance_command(&message).await,
            BotCommand::Report => self.report_command(&message).await,
            BotCommand::GetWebhook(index) => self.get_webhook_command(&message, index).await,
            BotCommand::SetWebhook(index, url) => self.set_webhook_command(&message, index, &url).await,
        }
    }

    async fn balance_command(&self, message: &Message) -> Result<()> {
        let (chat_id, reply_to) = (message.chat.id, Some(message.message_id));
        if self.clients.len() > 1 {
            let markup = self.client_picker(Action::Balance)?;
            self.telegram
                .send_message(chat_id, CHOOSE_CLIENT, reply_to, Some(&markup))
                .await?;
            return Ok(());
        }

        let client = self.first_client()?;
        let text = match client.info().await {
            Ok(info) => BalanceMessage::new(&info).render()?,
            Err(err) => user_error(&err),
        };
        self.telegram.send_message(chat_id, &text, reply_to, None).await?;
        Ok(())
    }

    async fn report_command(&self, message: &Message) -> Result<()> {
        let (chat_id, reply_to) = (message.chat.id, Some(message.message_id));
        if self.clients.len() > 1 {
            let markup = self.client_picker(Action::ReportClient)?;
            self.telegram
                .send_message(chat_id, CHOOSE_CLIENT, reply_to, Some(&markup))
                .await?;
            return Ok(());
        }

        let client = self.first_client()?;
        match account_picker(client).await {
            Ok((text, markup)) => {
                self.telegram
                    .send_message(chat_id, &text, reply_to, Some(&markup))
                    .await?;
            }
            Err(err) => {
                self.telegram
                    .send_message(chat_id, &user_error(&err), reply_to, None)
                    .await?;
            }
        }
        Ok(())
    }

    async fn get_webhook_command(&self, message: &Message, index: usize) -> Result<()> {
        let text = match self.client_at(index) {
            Ok(client) => match client.info().await {
                Ok(info) => WebhookMessage::new(&info).render()?,
                Err(err) => user_error(&err),
            },
            Err(err) => user_error(&err),
        };
        self.telegram
            .send_message(message.chat.id, &text, Some(message.message_id), None)
            .await?;
        Ok(())
    }

    async fn set_webhook_command(&self, message: &Message, index: usize, url: &str) -> Result<()> {
        let text = if !is_url(url) {
            "Incorrect url".to_owned()
        } else {
            match self.client_at(index) {
                Ok(client) => match client.set_webhook(url).await {
                    Ok(resp) if !resp.status.is_empty() => resp.status,
                    Ok(resp) => format!("error: {}", resp.error_description),
                    Err(err) => user_error(&err),
                },
                Err(err) => user_error(&err),
            }
        };
        self.telegram
            .send_message(message.chat.id, &text, Some(message.message_id), None)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(data = query.data.as_deref().unwrap_or_default()))]
    async fn handle_callback(&self, query: CallbackQuery) -> Result<()> {
        let Some(message) = query.message.as_ref() else {
            warn!("callback without message");
            return self.telegram.answer_callback_query(&query.id, None).await;
        };
        let chat_id = message.chat.id;
        let user_id = query.requester();

        if !self.is_allowed(user_id, chat_id) {
            debug!(user_id, chat_id, "callback access denied");
            return self
                .telegram
                .answer_callback_query(&query.id, Some(ACCESS_DENIED))
                .await;
        }

        let callback = match Callback::decode(query.data.as_deref().unwrap_or_default()) {
            Ok(callback) => callback,
            Err(err) => {
                warn!(%err, "undecodable callback");
                return self
                    .telegram
                    .answer_callback_query(&query.id, Some(CALLBACK_ERROR))
                    .await;
            }
        };

        let Some(client) = self.clients.by_id(callback.client_id) else {
            warn!(client_id = callback.client_id, "callback for unknown client");
            return self
                .telegram
                .answer_callback_query(&query.id, Some(ACCESS_DENIED))
                .await;
        };

        let result = match callback.action {
            Action::Balance => self.balance_callback(client, message).await,
            Action::ReportClient => self.report_client_callback(client, message).await,
            Action::ReportAccount => self.report_account_callback(client, message, &callback).await,
            Action::ReportPage | Action::ReportUpdate => {
                self.report_page_callback(client, message, user_id, &callback)
                    .await
            }
        };

        match result {
            Ok(()) => self.telegram.answer_callback_query(&query.id, None).await,
            Err(err) => {
                let text = match err.downcast_ref::<Error>() {
                    Some(err) if err.is_rejected_input() => CALLBACK_ERROR.to_owned(),
                    Some(err) => user_error(err),
                    None => {
                        error!(error = ?err, "callback failed");
                        CALLBACK_ERROR.to_owned()
                    }
                };
                self.telegram
                    .answer_callback_query(&query.id, Some(&text))
                    .await
            }
        }
    }

    async fn balance_callback(&self, client: &BankClient, message: &Message) -> Result<()> {
        let info = client.info().await?;
        let text = BalanceMessage::new(&info).render()?;
        self.telegram
            .edit_message_text(message.chat.id, message.message_id, &text, None)
            .await
    }

    async fn report_client_callback(&self, client: &BankClient, message: &Message) -> Result<()> {
        let (text, markup) = account_picker(client).await?;
        self.telegram
            .edit_message_text(message.chat.id, message.message_id, &text, Some(&markup))
            .await
    }

    async fn report_account_callback(
        &self,
        client: &BankClient,
        message: &Message,
        callback: &Callback,
    ) -> Result<()> {
        let account_id = callback
            .account
            .as_deref()
            .ok_or_else(|| Error::MalformedCallback("account missing".to_owned()))?;
        let account = client.account(account_id).await?;

        let buttons = Period::choices(now_in(client.timezone()))
            .into_iter()
            .map(|period| {
                let data = Callback::new(Action::ReportPage, client.id())
                    .with_account(account_id)
                    .with_period(period)
                    .with_page(1)
                    .encode()?;
                Ok(InlineKeyboardButton {
                    text: period.label().to_owned(),
                    callback_data: data,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let text = format!(
            "{}, {}\n{CHOOSE_PERIOD}",
            client.name(),
            money(account.balance, account.currency_code)
        );
        let markup = InlineKeyboardMarkup::rows(buttons, PERIODS_PER_ROW);
        self.telegram
            .edit_message_text(message.chat.id, message.message_id, &text, Some(&markup))
            .await
    }

    async fn report_page_callback(
        &self,
        client: &BankClient,
        message: &Message,
        user_id: i64,
        callback: &Callback,
    ) -> Result<()> {
        let (Some(account_id), Some(period)) = (callback.account.as_deref(), callback.period) else {
            return Err(Error::MalformedCallback("account or period missing".to_owned()).into());
        };
        let account = client.account(account_id).await?;
        let report = client.report(&account.id);
        let key = CacheKey::new(period, message.chat.id, user_id, client.id());

        let (items, cached) = match report.cached(&key) {
            Some(items) => (items, true),
            None => {
                // a notification landing mid-fetch leaves these items uncached
                let generation = report.generation();
                let items: Arc<[StatementItem]> = client.statement(period, &account.id).await?.into();
                report.set_cache_data_since(key.clone(), items.clone(), generation);
                (items, false)
            }
        };
        let page = report.page_of(&items, callback.page.max(1));

        // the `·N·` button re-sends the page on screen; the Bot API refuses identical edits
        if cached && callback.action == Action::ReportUpdate && callback.page == page.page {
            debug!(page = page.page, "page already shown");
            return Ok(());
        }
        let total = items.len();

        let text = ReportMessage::new(&client.name(), &account, period.label(), &page).render()?;
        let buttons = report
            .page_selector(total, page.page)
            .into_iter()
            .map(|button| {
                let data = Callback::new(Action::ReportUpdate, client.id())
                    .with_account(&account.id)
                    .with_period(period)
                    .with_page(button.page)
                    .encode()?;
                Ok(InlineKeyboardButton {
                    text: button.label,
                    callback_data: data,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let markup = InlineKeyboardMarkup::rows(buttons, usize::MAX);

        self.telegram
            .edit_message_text(message.chat.id, message.message_id, &text, Some(&markup))
            .await
    }

    fn client_picker(&self, action: Action) -> Result<InlineKeyboardMarkup> {
        let buttons = self
            .clients
            .iter()
            .map(|client| {
                Ok(InlineKeyboardButton {
                    text: client.name(),
                    callback_data: Callback::new(action, client.id()).encode()?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(InlineKeyboardMarkup::rows(buttons, usize::MAX))
    }

    fn first_client(&self) -> Result<&Arc<BankClient>> {
        Ok(self.client_at(0)?)
    }

    fn client_at(&self, index: usize) -> Result<&Arc<BankClient>, Error> {
        self.clients
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("client {index}")))
    }

    /// Relays queued push notifications until the queue closes or `cnx` fires.
    pub async fn consume(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<StatementEvent>,
        cnx: CancellationToken,
    ) -> Result<()> {
        loop {
            let event = tokio::select! {
                _ = cnx.cancelled() => return Ok(()),
                event = rx.recv() => event,
            };
            let Some(event) = event else {
                info!("notification queue closed");
                return Ok(());
            };
            if let Err(err) = self.notify(&event).await {
                error!(account = %event.data.account, error = ?err, "notification not delivered");
            }
        }
    }

    #[instrument(skip_all, fields(account = %event.data.account))]
    pub async fn notify(&self, event: &StatementEvent) -> Result<()> {
        let account_id = &event.data.account;
        let client = self.clients.by_account(account_id).await?;
        let account = client.account(account_id).await?;

        let removed = client.reset_report(account_id);
        debug!(removed, "report cache reset");

        let text = StatementMessage::new(&client.name(), &event.data.statement_item, &account).render()?;
        self.broadcast(&self.chats, &text).await;
        self.broadcast(&self.admins, &text).await;
        Ok(())
    }

    /// Sends the daily summary of every client to the configured chats.
    #[instrument(skip_all)]
    pub async fn send_summaries(&self) -> Result<()> {
        let currencies = match self.clients.get(0) {
            Some(client) => client.currencies().await.unwrap_or_else(|err| {
                warn!(%err, "currency rates unavailable");
                Vec::new()
            }),
            None => return Ok(()),
        };

        for client in self.clients.iter() {
            match summary::collect(client, &currencies).await {
                Ok(Some(message)) => {
                    let text = message.render()?;
                    self.broadcast(&self.chats, &text).await;
                }
                Ok(None) => info!(client_id = client.id(), "nothing to summarise"),
                Err(err) => warn!(client_id = client.id(), %err, "summary skipped"),
            }
        }
        Ok(())
    }

    /// Sends the summary on every run of `schedule` until cancelled.
    pub async fn schedule_summaries(
        self: Arc<Self>,
        schedule: SummarySchedule,
        tz: Tz,
        cnx: CancellationToken,
    ) -> Result<()> {
        loop {
            let Some(wait) = schedule.until_next(now_in(tz)) else {
                warn!(%schedule, "summary schedule has no further runs");
                cnx.cancelled().await;
                return Ok(());
            };
            info!(?wait, %schedule, "next summary");
            tokio::select! {
                _ = cnx.cancelled() => return Ok(()),
                _ = tokio::time::sleep(wait) => {}
            }
            if let Err(err) = self.send_summaries().await {
                error!(error = ?err, "daily summary failed");
            }
        }
    }

    async fn broadcast(&self, chat_ids: &[i64], text: &str) {
        for &chat_id in chat_ids {
            if let Err(err) = self.telegram.send_message(chat_id, text, None, None).await {
                error!(chat_id, error = ?err, "send failed");
            }
        }
    }
}

async fn account_picker(client: &BankClient) -> Result<(String, InlineKeyboardMarkup), Error> {
    let info = client.info().await?;
    let buttons = info
        .accounts
        .iter()
        .map(|account| {
            Ok(InlineKeyboardButton {
                text: account.display_name(),
                callback_data: Callback::new(Action::ReportAccount, client.id())
                    .with_account(&account.id)
                    .encode()?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let text = format!("{}\n{CHOOSE_ACCOUNT}", info.name);
    Ok((text, InlineKeyboardMarkup::rows(buttons, 1)))
}

/// Text shown to the user for a failed request.
fn user_error(err: &Error) -> String {
    if !err.is_rate_limited() && !err.is_rejected_input() {
        error!(error = ?err, "request failed");
    }
    err.to_string()
}
