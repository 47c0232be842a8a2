//! Daily spending summary sent to the configured chats.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    time::Duration,
};

use chrono::{DateTime, Days, NaiveTime, TimeZone};
use chrono_tz::Tz;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use tracing::{debug, warn};

use crate::{
    client::BankClient,
    error::Result,
    model::{Currency, StatementItem, LOCAL_CURRENCY, MCC_TRANSFER},
    period::Period,
    render::{price, SummaryMessage},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailySummary {
    /// Debits in local currency, minor units.
    pub spent: i64,
    pub cashback: i64,
    pub count: usize,
}

/// Summarises `items` after dropping transfers between the holder's own accounts.
pub fn summarize(items: &[StatementItem], currencies: &[Currency]) -> DailySummary {
    let ignored = own_transfers(items);
    let kept = items
        .iter()
        .filter(|item| !ignored.contains(item.id.as_str()))
        .collect::<Vec<_>>();

    DailySummary {
        spent: kept
            .iter()
            .filter(|item| item.amount < 0)
            .map(|item| spent_local(item, currencies))
            .sum(),
        cashback: kept.iter().map(|item| item.cashback_amount).sum(),
        count: kept.len(),
    }
}

/// Ids of both sides of every currency-exchange transfer between own accounts.
///
/// The outgoing side is a transfer debit whose account and operation amounts
/// differ; the incoming side carries the same amounts negated and swapped.
fn own_transfers(items: &[StatementItem]) -> HashSet<&str> {
    let outgoing = items
        .iter()
        .filter(|item| {
            item.mcc == MCC_TRANSFER
                && item.original_mcc == MCC_TRANSFER
                && item.amount < 0
                && item.operation_amount < 0
                && item.amount != item.operation_amount
        })
        .map(|item| {
            let key = (item.mcc, item.original_mcc, -item.amount, -item.operation_amount);
            (key, item.id.as_str())
        })
        .collect::<HashMap<_, _>>();

    let mut ignored = HashSet::new();
    for item in items {
        let key = (item.mcc, item.original_mcc, item.operation_amount, item.amount);
        if let Some(&from) = outgoing.get(&key) {
            ignored.insert(from);
            ignored.insert(item.id.as_str());
        }
    }
    ignored
}

/// Absolute debit of `item` in local currency.
fn spent_local(item: &StatementItem, currencies: &[Currency]) -> i64 {
    if item.amount == item.operation_amount && item.currency_code != LOCAL_CURRENCY {
        return convert(-item.amount, item.currency_code, currencies).unwrap_or_else(|| {
            warn!(currency = item.currency_code, id = %item.id, "no rate, item left out");
            0
        });
    }
    if item.amount != item.operation_amount && item.currency_code == LOCAL_CURRENCY {
        return -item.operation_amount;
    }
    -item.amount
}

fn convert(minor: i64, currency: u16, currencies: &[Currency]) -> Option<i64> {
    let rate = currencies
        .iter()
        .find(|c| c.currency_code_a == currency && c.currency_code_b == LOCAL_CURRENCY)?
        .to_local_rate()?;
    (Decimal::from(minor) * rate).round().to_i64()
}

/// Today's summary for every account of `client`, or `None` when nothing was spent.
pub async fn collect(client: &BankClient, currencies: &[Currency]) -> Result<Option<SummaryMessage>> {
    let info = client.info().await?;

    let mut items = Vec::new();
    for account in &info.accounts {
        match client.statement_when_ready(Period::Today, &account.id).await {
            Ok(mut found) => items.append(&mut found),
            Err(err) => warn!(account = %account.id, %err, "skipping account in summary"),
        }
    }

    let summary = summarize(&items, currencies);
    debug!(client_id = client.id(), ?summary, "daily summary");
    if summary.count == 0 || summary.spent == 0 {
        return Ok(None);
    }

    Ok(Some(SummaryMessage {
        name: info.name,
        spent: price(summary.spent),
        cashback: price(summary.cashback),
        count: summary.count,
    }))
}

/// When the summary is sent, evaluated in the report timezone.
#[derive(Debug, Clone)]
pub enum SummarySchedule {
    /// Every day at this local time.
    Daily(NaiveTime),
    Cron(Box<cron::Schedule>),
}

impl SummarySchedule {
    /// Accepts `HH:MM` or a cron expression. Five-field expressions use the
    /// usual minute-first layout with Sunday as day 0 or 7; six or seven
    /// fields are passed to the cron parser as they are.
    pub fn parse(expr: &str) -> Option<Self> {
        let expr = expr.trim();
        if let Some(at) = parse_time(expr) {
            return Some(SummarySchedule::Daily(at));
        }

        let fields = expr.split_whitespace().collect::<Vec<_>>();
        let expr = match fields.as_slice() {
            [minute, hour, day, month, weekday] => {
                format!("0 {minute} {hour} {day} {month} {}", weekday_names(weekday))
            }
            _ => expr.to_owned(),
        };
        let schedule = expr.parse::<cron::Schedule>().ok()?;
        Some(SummarySchedule::Cron(Box::new(schedule)))
    }

    pub fn next_after(&self, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
        match self {
            SummarySchedule::Daily(at) => Some(next_run(now, *at)),
            SummarySchedule::Cron(schedule) => schedule.after(&now).next(),
        }
    }

    /// `None` once the schedule has no further runs.
    pub fn until_next(&self, now: DateTime<Tz>) -> Option<Duration> {
        self.next_after(now)
            .map(|next| (next - now).to_std().unwrap_or_default())
    }
}

impl fmt::Display for SummarySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummarySchedule::Daily(at) => write!(f, "daily at {}", at.format("%H:%M")),
            SummarySchedule::Cron(schedule) => write!(f, "cron {schedule}"),
        }
    }
}

/// Numeric weekdays (0 and 7 are Sunday) as names; the cron parser counts from Sunday = 1.
fn weekday_names(field: &str) -> String {
    const NAMES: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    let name = |day: &str| match day.parse::<usize>() {
        Ok(n) if n < NAMES.len() => NAMES[n].to_owned(),
        _ => day.to_owned(),
    };

    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let range = range.split('-').map(name).collect::<Vec<_>>().join("-");
            match step {
                Some(step) => format!("{range}/{step}"),
                None => range,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses a `HH:MM` time of day.
pub fn parse_time(at: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(at, "%H:%M").ok()
}

/// First instant after `now` whose local time of day is `at`.
pub fn next_run(now: DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        // a time skipped by a DST change falls back to the hour after
        let local = day.and_time(at);
        let candidate = tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(local + chrono::Duration::hours(1))).earliest());
        if let Some(candidate) = candidate.filter(|candidate| *candidate > now) {
            return candidate;
        }
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => return now,
        }
    }
}
