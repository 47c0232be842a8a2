//! Single entry point for HTTP calls to the banking provider.

use std::{fmt, time::Duration};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.monobank.ua";

/// Shared by every bank client; cloning shares the connection pool.
#[derive(Clone)]
pub struct Gateway {
    http: Client,
    base: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    #[serde(default)]
    error_description: String,
}

impl Gateway {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base })
    }

    pub fn get(&self, path: &str) -> Result<RequestBuilder> {
        let url = self.base.join(path)?;
        debug!(%url, "GET");
        Ok(self.http.get(url))
    }

    pub fn post(&self, path: &str) -> Result<RequestBuilder> {
        let url = self.base.join(path)?;
        debug!(%url, "POST");
        Ok(self.http.post(url))
    }

    /// Sends the request, reads the whole body and decodes it as `T`.
    ///
    /// Fields inside a successful body are handed back untouched; a non-success
    /// status becomes [`Error::Upstream`] with the provider's description.
    /// Nothing is retried here.
    pub async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        trace!(?status, headers = ?resp.headers());

        let body = resp.bytes().await?;
        debug!(%status, body = %String::from_utf8_lossy(&body), "response");

        if !status.is_success() {
            return Err(upstream_error(status, &body));
        }

        let data = serde_json::from_slice(&body)?;
        Ok(data)
    }
}

fn upstream_error(status: StatusCode, body: &[u8]) -> Error {
    let description = match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(err) if !err.error_description.is_empty() => err.error_description,
        Ok(_) | Err(_) => {
            warn!(%status, "unrecognised error response");
            String::from_utf8_lossy(body).into_owned()
        }
    };
    Error::Upstream {
        status,
        description,
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway").field("base", &self.base.as_str()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_uses_description() {
        let err = upstream_error(
            StatusCode::TOO_MANY_REQUESTS,
            br#"{"errorDescription":"Too many requests"}"#,
        );

        match err {
            Error::Upstream {
                status,
                description,
            } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(description, "Too many requests");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_upstream_error_falls_back_to_body() {
        let err = upstream_error(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");

        assert!(matches!(
            err,
            Error::Upstream { ref description, .. } if description == "<html>bad gateway</html>"
        ));
    }
}
