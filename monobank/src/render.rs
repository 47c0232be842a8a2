//! Plain-text chat messages.
//!
//! Views precompute every formatted value so the templates under
//! `templates/` only lay text out.

use askama::Template;
use rust_decimal::Decimal;

use crate::{
    model::{Account, ClientInfo, StatementItem, MCC_TRANSFER},
    report::ReportPage,
};

/// Amount in minor units as a price: `12345` → `123.45`, `1200` → `12`.
pub fn price(minor: i64) -> String {
    if minor % 100 == 0 {
        (minor / 100).to_string()
    } else {
        Decimal::new(minor, 2).to_string()
    }
}

pub fn currency_symbol(code: u16) -> &'static str {
    match code {
        980 => "₴",
        840 => "$",
        978 => "€",
        985 => "zł",
        203 => "Kč",
        _ => "",
    }
}

/// Emoji for the merchant category of `item`.
pub fn icon(item: &StatementItem) -> &'static str {
    match item.mcc {
        5411 => "🍞",
        5814 => "🍔",
        8999 => "🏢",
        5499 => "🛍",
        5651 => "👕",
        5655 => "🥊",
        6011 => "🏧",
        4814 => "📱",
        7399 => "💼",
        2842 => "🔧",
        5977 => "💋",
        5912 => "💊",
        MCC_TRANSFER if item.amount > 0 => "👉💳",
        MCC_TRANSFER => "👈💳",
        _ => "🛒",
    }
}

/// Amount followed by the currency symbol.
pub fn money(minor: i64, currency: u16) -> String {
    format!("{}{}", price(minor), currency_symbol(currency))
}

/// Descriptions arrive HTML-escaped.
fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#34;", "\"")
        .replace("&amp;", "&")
}

/// One statement item; empty strings are left out of the output.
#[derive(Debug, Clone)]
pub struct ItemView {
    pub icon: &'static str,
    pub amount: String,
    pub operation: String,
    pub cashback: String,
    pub description: String,
    pub comment: String,
    pub balance: String,
}

impl ItemView {
    /// `account_currency` is the currency of the account the item belongs to.
    pub fn new(item: &StatementItem, account_currency: u16) -> Self {
        let operation = if item.amount != item.operation_amount {
            money(item.operation_amount, item.currency_code)
        } else {
            String::new()
        };
        let cashback = if item.cashback_amount != 0 {
            money(item.cashback_amount, item.currency_code)
        } else {
            String::new()
        };

        Self {
            icon: icon(item),
            amount: money(item.amount, account_currency),
            operation,
            cashback,
            description: unescape(&item.description),
            comment: item.comment.as_deref().map(unescape).unwrap_or_default(),
            balance: money(item.balance, account_currency),
        }
    }
}

#[derive(Template)]
#[template(path = "statement.txt")]
pub struct StatementMessage {
    pub name: String,
    pub item: ItemView,
}

#[derive(Debug, Clone)]
pub struct AccountView {
    pub label: String,
    pub balance: String,
}

#[derive(Template)]
#[template(path = "balance.txt")]
pub struct BalanceMessage {
    pub name: String,
    pub accounts: Vec<AccountView>,
}

#[derive(Template)]
#[template(path = "report_page.txt")]
pub struct ReportMessage {
    pub name: String,
    pub balance: String,
    pub period: String,
    pub spent: String,
    pub cashback: String,
    pub items: Vec<ItemView>,
}

#[derive(Template)]
#[template(path = "webhook.txt")]
pub struct WebhookMessage {
    pub url: String,
}

#[derive(Template)]
#[template(path = "summary.txt")]
pub struct SummaryMessage {
    pub name: String,
    pub spent: String,
    pub cashback: String,
    pub count: usize,
}

impl StatementMessage {
    pub fn new(name: &str, item: &StatementItem, account: &Account) -> Self {
        Self {
            name: name.to_owned(),
            item: ItemView::new(item, account.currency_code),
        }
    }
}

impl BalanceMessage {
    pub fn new(info: &ClientInfo) -> Self {
        Self {
            name: info.name.clone(),
            accounts: info
                .accounts
                .iter()
                .map(|account| AccountView {
                    label: account.display_name(),
                    balance: money(account.balance, account.currency_code),
                })
                .collect(),
        }
    }
}

impl ReportMessage {
    pub fn new(name: &str, account: &Account, period: &str, page: &ReportPage) -> Self {
        let currency = account.currency_code;
        Self {
            name: name.to_owned(),
            balance: money(account.balance, currency),
            period: period.to_owned(),
            spent: money(page.spent_total, currency),
            cashback: money(page.cashback_total, currency),
            items: page
                .items
                .iter()
                .map(|item| ItemView::new(item, currency))
                .collect(),
        }
    }
}

impl WebhookMessage {
    pub fn new(info: &ClientInfo) -> Self {
        Self {
            url: info.web_hook_url.clone().unwrap_or_default(),
        }
    }
}
