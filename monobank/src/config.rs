use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono_tz::Tz;
use clap::Args;
use color_eyre::{
    eyre::{eyre, Context},
    Result,
};
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::{
    client::{ClientOptions, ColdStartPolicy},
    gateway::DEFAULT_API_URL,
    limiter::LimitsConfig,
    period::DEFAULT_TIMEZONE,
    report::DEFAULT_PAGE_SIZE,
    summary::SummarySchedule,
};

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    #[clap(short = 'c', long = "config", env = "MONO_BRIDGE_CONFIG", help = "Config file")]
    config: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    pub telegram: TelegramConfig,
    pub monobank: MonobankConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize)]
pub struct TelegramConfig {
    pub token: SecretString,
    /// Bot API base, `https://api.telegram.org` when unset.
    #[serde(default)]
    pub api_url: Option<Url>,
    /// User ids allowed everywhere; also receive notifications.
    #[serde(default)]
    pub admins: Vec<i64>,
    /// Chat ids allowed to use the bot; receive notifications and summaries.
    #[serde(default)]
    pub chats: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MonobankConfig {
    pub tokens: Vec<SecretString>,
    #[serde(default)]
    pub api_url: Option<Url>,
    #[serde(default = "MonobankConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub cold_start: ColdStartPolicy,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub listen: SocketAddr,
    /// Notifications buffered between the listener and the consumer.
    pub queue: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub page_size: usize,
    pub timezone: Tz,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// Local `HH:MM`, or a cron expression, at which the summary is sent.
    pub at: Option<String>,
}

impl ConfigArgs {
    pub async fn load(&self) -> Result<BridgeConfig> {
        BridgeConfig::load(&self.config).await
    }
}

impl BridgeConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let buf = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Read config: {}", path.display()))?;
        let config = Self::parse(&buf).with_context(|| format!("Parse config: {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(buf: &str) -> Result<Self> {
        let config: Self = toml::from_str(buf)?;
        if config.monobank.tokens.is_empty() {
            return Err(eyre!("monobank.tokens must list at least one token"));
        }
        if config.report.page_size == 0 {
            return Err(eyre!("report.page_size must be positive"));
        }
        config.schedule.schedule()?;
        Ok(config)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            limits: self.monobank.limits.clone(),
            cold_start: self.monobank.cold_start,
            timezone: self.report.timezone,
            page_size: self.report.page_size,
        }
    }
}

impl TelegramConfig {
    pub fn api_url(&self) -> Result<Url> {
        api_url_or(self.api_url.as_ref(), crate::telegram::DEFAULT_API_URL)
    }
}

impl MonobankConfig {
    pub fn api_url(&self) -> Result<Url> {
        api_url_or(self.api_url.as_ref(), DEFAULT_API_URL)
    }

    fn default_timeout_secs() -> u64 {
        15
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ScheduleConfig {
    pub fn schedule(&self) -> Result<Option<SummarySchedule>> {
        self.at
            .as_deref()
            .map(|at| {
                SummarySchedule::parse(at)
                    .ok_or_else(|| eyre!("schedule.at must be HH:MM or a cron expression, got {at:?}"))
            })
            .transpose()
    }
}

fn api_url_or(url: Option<&Url>, default: &str) -> Result<Url> {
    match url {
        Some(url) => Ok(url.clone()),
        None => Ok(Url::parse(default)?),
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            queue: 100,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            timezone: DEFAULT_TIMEZONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BridgeConfig::parse(
            r#"
            [telegram]
            token = "123:abc"

            [monobank]
            tokens = ["u1", "u2"]
            "#,
        )
        .unwrap();

        assert_eq!(config.telegram.token.expose_secret(), "123:abc");
        assert!(config.telegram.admins.is_empty());
        assert_eq!(config.monobank.tokens.len(), 2);
        assert_eq!(config.monobank.api_url().unwrap().as_str(), "https://api.monobank.ua/");
        assert_eq!(config.telegram.api_url().unwrap().as_str(), "https://api.telegram.org/");
        assert_eq!(config.monobank.timeout(), Duration::from_secs(15));
        assert_eq!(config.monobank.cold_start, ColdStartPolicy::FailFast);
        assert_eq!(config.monobank.limits.statement_secs, 65);
        assert_eq!(config.webhook.listen.port(), 8080);
        assert_eq!(config.webhook.queue, 100);
        assert_eq!(config.report.page_size, 5);
        assert_eq!(config.report.timezone, chrono_tz::Europe::Kyiv);
        assert!(config.schedule.schedule().unwrap().is_none());
    }

    #[test]
    fn test_full_config() {
        let config = BridgeConfig::parse(
            r#"
            [telegram]
            token = "123:abc"
            admins = [42]
            chats = [-100123]

            [monobank]
            tokens = ["u1"]
            api_url = "http://127.0.0.1:9000"
            timeout_secs = 5
            cold_start = "wait"

            [monobank.limits]
            info_secs = 30

            [webhook]
            listen = "127.0.0.1:9090"
            queue = 8

            [report]
            page_size = 10
            timezone = "Europe/Warsaw"

            [schedule]
            at = "21:00"
            "#,
        )
        .unwrap();

        assert_eq!(config.telegram.chats, [-100123]);
        assert_eq!(config.monobank.api_url().unwrap().as_str(), "http://127.0.0.1:9000/");
        assert_eq!(config.monobank.cold_start, ColdStartPolicy::Wait);
        assert_eq!(config.monobank.limits.info_secs, 30);
        assert_eq!(config.monobank.limits.currency_secs, 60);
        assert_eq!(config.webhook.queue, 8);
        assert_eq!(config.report.timezone, chrono_tz::Europe::Warsaw);
        assert!(matches!(
            config.schedule.schedule().unwrap(),
            Some(SummarySchedule::Daily(at)) if at == NaiveTime::from_hms_opt(21, 0, 0).unwrap()
        ));
    }

    #[test]
    fn test_cron_schedule() {
        let config = BridgeConfig::parse(
            "[telegram]\ntoken = \"t\"\n[monobank]\ntokens = [\"u\"]\n[schedule]\nat = \"0 21 * * 1-5\"\n",
        )
        .unwrap();

        assert!(matches!(
            config.schedule.schedule().unwrap(),
            Some(SummarySchedule::Cron(_))
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        for body in [
            "[telegram]\ntoken = \"t\"\n[monobank]\ntokens = []\n",
            "[telegram]\ntoken = \"t\"\n[monobank]\ntokens = [\"u\"]\n[schedule]\nat = \"25:00\"\n",
            "[telegram]\ntoken = \"t\"\n[monobank]\ntokens = [\"u\"]\n[report]\npage_size = 0\n",
            "[telegram]\ntoken = \"t\"\n[monobank]\ntokens = [\"u\"]\ncold_start = \"retry\"\n",
        ] {
            assert!(BridgeConfig::parse(body).is_err(), "{body}");
        }
    }
}
