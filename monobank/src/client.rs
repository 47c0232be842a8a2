//! One bank client per credential.

use std::{collections::HashMap, fmt, sync::Arc};

use chrono_tz::Tz;
use parking_lot::Mutex;
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{Endpoint, Error, Result},
    gateway::Gateway,
    identity,
    limiter::{Limits, LimitsConfig},
    model::{Account, ClientInfo, Currencies, StatementItem, WebHookRequest, WebHookResponse},
    period::{now_in, Interval, Period, DEFAULT_TIMEZONE},
    report::{Report, DEFAULT_PAGE_SIZE},
};

const TOKEN_HEADER: &str = "X-Token";

/// What `info()` does when no copy was ever fetched and the limiter says no.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColdStartPolicy {
    /// Fail with [`Error::RateLimited`] straight away.
    #[default]
    #[serde(rename = "fail")]
    FailFast,
    /// Sleep until the info bucket refills, then fetch.
    Wait,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub limits: LimitsConfig,
    pub cold_start: ColdStartPolicy,
    pub timezone: Tz,
    pub page_size: usize,
}

pub struct BankClient {
    id: u32,
    token: SecretString,
    gateway: Gateway,
    limits: Limits,
    cold_start: ColdStartPolicy,
    timezone: Tz,
    page_size: usize,
    info: Mutex<Option<ClientInfo>>,
    currencies: Mutex<Option<Currencies>>,
    reports: Mutex<HashMap<String, Arc<Report>>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::default(),
            cold_start: ColdStartPolicy::default(),
            timezone: DEFAULT_TIMEZONE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl BankClient {
    pub fn new(token: SecretString, gateway: Gateway, options: &ClientOptions) -> Self {
        Self {
            id: identity::client_id(&token),
            token,
            gateway,
            limits: Limits::new(&options.limits),
            cold_start: options.cold_start,
            timezone: options.timezone,
            page_size: options.page_size,
            info: Mutex::new(None),
            currencies: Mutex::new(None),
            reports: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Display name from the cached client info.
    pub fn name(&self) -> String {
        self.info
            .lock()
            .as_ref()
            .map(|info| info.name.clone())
            .unwrap_or_else(|| "NoName".to_owned())
    }

    pub fn cached_info(&self) -> Option<ClientInfo> {
        self.info.lock().clone()
    }

    /// Forgets the cached client info.
    pub fn clear_info(&self) {
        debug!(client_id = self.id, "clearing cached client info");
        self.info.lock().take();
    }

    /// Fresh client info when the limiter allows, otherwise the last copy.
    #[instrument(skip_all, fields(client_id = self.id))]
    pub async fn info(&self) -> Result<ClientInfo> {
        let bucket = self.limits.bucket(Endpoint::Info);
        if !bucket.allow() {
            if let Some(info) = self.cached_info() {
                debug!("rate limited, serving cached client info");
                return Ok(info);
            }
            match self.cold_start {
                ColdStartPolicy::FailFast => {
                    warn!("rate limited with no cached client info");
                    return Err(Error::RateLimited {
                        endpoint: Endpoint::Info,
                    });
                }
                ColdStartPolicy::Wait => {
                    info!("rate limited with no cached client info, waiting");
                    bucket.until_ready().await;
                }
            }
        }

        let req = self.gateway.get("/personal/client-info")?;
        let info: ClientInfo = self.gateway.send(self.authed(req)).await?;
        debug!(name = %info.name, accounts = info.accounts.len(), "fetched client info");

        *self.info.lock() = Some(info.clone());
        Ok(info)
    }

    pub async fn account(&self, account_id: &str) -> Result<Account> {
        let info = self.info().await?;
        info.account(account_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("account {account_id}")))
    }

    /// Statement items for `account_id` within `period`, newest first.
    #[instrument(skip_all, fields(client_id = self.id, %period, %account_id))]
    pub async fn statement(&self, period: Period, account_id: &str) -> Result<Vec<StatementItem>> {
        let interval = period.interval(now_in(self.timezone))?;

        if !self.limits.bucket(Endpoint::Statement).allow() {
            warn!("statement request rate limited");
            return Err(Error::RateLimited {
                endpoint: Endpoint::Statement,
            });
        }

        self.fetch_statement(interval, account_id).await
    }

    /// Like [`BankClient::statement`], but sleeps until the statement bucket refills.
    #[instrument(skip_all, fields(client_id = self.id, %period, %account_id))]
    pub async fn statement_when_ready(
        &self,
        period: Period,
        account_id: &str,
    ) -> Result<Vec<StatementItem>> {
        let interval = period.interval(now_in(self.timezone))?;
        self.limits.bucket(Endpoint::Statement).until_ready().await;
        self.fetch_statement(interval, account_id).await
    }

    async fn fetch_statement(&self, interval: Interval, account_id: &str) -> Result<Vec<StatementItem>> {
        debug!(from = interval.from, to = ?interval.to, "statement range");
        let account = urlencoding::encode(account_id);
        let path = match interval.to {
            Some(to) => format!("/personal/statement/{account}/{}/{to}", interval.from),
            None => format!("/personal/statement/{account}/{}", interval.from),
        };

        let req = self.gateway.get(&path)?;
        self.gateway.send(self.authed(req)).await
    }

    /// Same as [`BankClient::statement`] for a user-facing label.
    pub async fn statement_by_label(
        &self,
        label: &str,
        account_id: &str,
    ) -> Result<Vec<StatementItem>> {
        let period = label.parse::<Period>()?;
        self.statement(period, account_id).await
    }

    #[instrument(skip_all, fields(client_id = self.id, %url))]
    pub async fn set_webhook(&self, url: &str) -> Result<WebHookResponse> {
        if !self.limits.bucket(Endpoint::Webhook).allow() {
            return Err(Error::RateLimited {
                endpoint: Endpoint::Webhook,
            });
        }

        let req = self
            .gateway
            .post("/personal/webhook")?
            .json(&WebHookRequest { web_hook_url: url });
        let resp: WebHookResponse = self.gateway.send(self.authed(req)).await?;
        info!(status = %resp.status, "webhook registered");

        // cached info carries the previous webhook url
        self.clear_info();
        Ok(resp)
    }

    /// Currency rate table; the last table is served while the limiter says no.
    #[instrument(skip_all, fields(client_id = self.id))]
    pub async fn currencies(&self) -> Result<Currencies> {
        if !self.limits.bucket(Endpoint::Currency).allow() {
            return self
                .currencies
                .lock()
                .clone()
                .ok_or(Error::RateLimited {
                    endpoint: Endpoint::Currency,
                });
        }

        let req = self.gateway.get("/bank/currency")?;
        let currencies: Currencies = self.gateway.send(self.authed(req)).await?;
        *self.currencies.lock() = Some(currencies.clone());
        Ok(currencies)
    }

    /// Report engine for `account_id`, created on first use.
    pub fn report(&self, account_id: &str) -> Arc<Report> {
        self.reports
            .lock()
            .entry(account_id.to_owned())
            .or_insert_with(|| Arc::new(Report::new(account_id, self.timezone, self.page_size)))
            .clone()
    }

    /// Invalidates cached report pages that could include a new transaction.
    pub fn reset_report(&self, account_id: &str) -> usize {
        let report = self.reports.lock().get(account_id).cloned();
        report.map(|report| report.reset_cache()).unwrap_or_default()
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(TOKEN_HEADER, self.token.expose_secret())
    }
}

impl fmt::Debug for BankClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BankClient")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}
