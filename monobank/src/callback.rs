//! Interaction state carried inside inline-keyboard button payloads.
//!
//! Wire format, positional and fixed-arity:
//!
//! ```text
//! <tag>:<period_with_underscores>:<client id>:<account id>:<page>
//! ```
//!
//! Decoding requires exactly [`FIELDS`] fields; anything else is rejected
//! rather than defaulted, so a change in arity on one side fails closed on
//! the other.

use std::fmt;

use crate::{
    error::{Error, Result},
    period::Period,
};

pub const DELIMITER: char = ':';
pub const FIELDS: usize = 5;
/// Telegram limit for `callback_data`.
pub const MAX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Client picked for `/balance`.
    Balance,
    /// Client picked for `/report`; show its accounts.
    ReportClient,
    /// Account picked; show the period choices.
    ReportAccount,
    /// Period picked; send the first report page.
    ReportPage,
    /// Page selector clicked; edit the report in place.
    ReportUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callback {
    pub action: Action,
    pub period: Option<Period>,
    pub client_id: u32,
    pub account: Option<String>,
    pub page: u32,
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Balance => "bc",
            Action::ReportClient => "rc",
            Action::ReportAccount => "ra",
            Action::ReportPage => "rp",
            Action::ReportUpdate => "rr",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        let action = match tag {
            "bc" => Action::Balance,
            "rc" => Action::ReportClient,
            "ra" => Action::ReportAccount,
            "rp" => Action::ReportPage,
            "rr" => Action::ReportUpdate,
            _ => return None,
        };
        Some(action)
    }
}

impl Callback {
    pub fn new(action: Action, client_id: u32) -> Self {
        Self {
            action,
            period: None,
            client_id,
            account: None,
            page: 0,
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn encode(&self) -> Result<String> {
        let account = self.account.as_deref().unwrap_or_default();
        if account.contains(DELIMITER) {
            return Err(Error::MalformedCallback(format!(
                "account id contains delimiter: {account:?}"
            )));
        }

        let data = format!(
            "{tag}{d}{period}{d}{client}{d}{account}{d}{page}",
            tag = self.action.tag(),
            d = DELIMITER,
            period = self.period.map(|p| p.token()).unwrap_or_default(),
            client = self.client_id,
            page = self.page,
        );
        if data.len() > MAX_LEN {
            return Err(Error::MalformedCallback(format!(
                "{} bytes exceeds {MAX_LEN}: {data:?}",
                data.len()
            )));
        }
        Ok(data)
    }

    pub fn decode(data: &str) -> Result<Self> {
        let malformed = || Error::MalformedCallback(data.to_owned());

        let fields = data.split(DELIMITER).collect::<Vec<_>>();
        let &[tag, period, client_id, account, page] = fields.as_slice() else {
            return Err(malformed());
        };

        let action = Action::from_tag(tag).ok_or_else(malformed)?;
        let period = match period {
            "" => None,
            token => Some(
                token
                    .replace('_', " ")
                    .parse::<Period>()
                    .map_err(|_| malformed())?,
            ),
        };
        let client_id = client_id.parse::<u32>().map_err(|_| malformed())?;
        let account = match account {
            "" => None,
            id => Some(id.to_owned()),
        };
        let page = page.parse::<u32>().map_err(|_| malformed())?;

        Ok(Self {
            action,
            period,
            client_id,
            account,
            page,
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
