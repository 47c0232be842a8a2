use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Local (reporting) currency: UAH.
pub const LOCAL_CURRENCY: u16 = 980;

/// Merchant category code the provider uses for card-to-card transfers.
pub const MCC_TRANSFER: u16 = 4829;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub client_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_hook_url: Option<String>,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub currency_code: u16,
    #[serde(default)]
    pub cashback_type: Option<String>,
    /// Minor units.
    pub balance: i64,
    #[serde(default)]
    pub credit_limit: i64,
    #[serde(default)]
    pub masked_pan: Vec<String>,
    #[serde(default)]
    pub iban: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementItem {
    pub id: String,
    pub time: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub mcc: u16,
    #[serde(default)]
    pub original_mcc: u16,
    /// In the account currency, minor units.
    pub amount: i64,
    /// In the transaction currency, minor units.
    pub operation_amount: i64,
    pub currency_code: u16,
    #[serde(default)]
    pub commission_rate: i64,
    #[serde(default)]
    pub cashback_amount: i64,
    pub balance: i64,
    #[serde(default)]
    pub hold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub currency_code_a: u16,
    pub currency_code_b: u16,
    pub date: i64,
    #[serde(default)]
    pub rate_buy: Option<Decimal>,
    #[serde(default)]
    pub rate_sell: Option<Decimal>,
    #[serde(default)]
    pub rate_cross: Option<Decimal>,
}

pub type Currencies = Vec<Currency>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebHookResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error_description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WebHookRequest<'a> {
    pub(crate) web_hook_url: &'a str,
}

/// Body of a push notification delivered to the webhook listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: StatementEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementEventData {
    pub account: String,
    pub statement_item: StatementItem,
}

impl Account {
    /// Short label for buttons: type plus the last masked card number.
    pub fn display_name(&self) -> String {
        match self.masked_pan.last() {
            Some(pan) => format!("{} {}", self.kind, pan),
            None => self.kind.clone(),
        }
    }
}

impl ClientInfo {
    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|acc| acc.id == id)
    }
}

impl Currency {
    /// Rate converting currency A into currency B, falling back to the cross rate.
    pub fn to_local_rate(&self) -> Option<Decimal> {
        self.rate_sell.or(self.rate_cross)
    }
}
