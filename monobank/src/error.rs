use std::fmt;

use reqwest::StatusCode;

/// Endpoint bucket an upstream call was charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Info,
    Statement,
    Webhook,
    Currency,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{endpoint} request suppressed by rate limiter, please wait a minute and try again")]
    RateLimited { endpoint: Endpoint },
    #[error("incorrect period: {0:?}")]
    InvalidPeriod(String),
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("upstream responded {status}: {description}")]
    Upstream {
        status: StatusCode,
        description: String,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("malformed callback data: {0:?}")]
    MalformedCallback(String),
    #[error("url: {0}")]
    Url(#[from] url::ParseError),
    #[error("two credentials share client id {0}")]
    DuplicateClient(u32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether the caller should prompt the user to retry after the limiter window.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Errors caused by bad external input rather than upstream failure.
    pub fn is_rejected_input(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::MalformedCallback(_))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Endpoint::Info => "client info",
            Endpoint::Statement => "statement",
            Endpoint::Webhook => "webhook",
            Endpoint::Currency => "currency",
        };
        f.write_str(name)
    }
}
