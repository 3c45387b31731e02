//! HTTP plumbing shared by the adapters.
//!
//! Maps transport failures, non-2xx statuses and undecodable bodies onto
//! [`MarketDataError`] so every adapter raises the same taxonomy.

use std::str::FromStr;
use std::time::Duration;

use num_traits::FromPrimitive;
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::MarketDataError;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client used by every adapter. The service applies its own, shorter,
/// per-attempt timeout on top.
pub(crate) fn build_client() -> Client {
    Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .user_agent(concat!("marketgate/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub(crate) fn build_url(
    provider: &str,
    base: &str,
    params: &[(&str, &str)],
) -> Result<Url, MarketDataError> {
    Url::parse_with_params(base, params).map_err(|e| MarketDataError::ProviderError {
        provider: provider.to_string(),
        status: None,
        message: format!("Failed to build URL: {}", e),
    })
}

pub(crate) fn transport_error(provider: &str, error: reqwest::Error) -> MarketDataError {
    if error.is_timeout() {
        MarketDataError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        MarketDataError::Network {
            provider: provider.to_string(),
            message: error.to_string(),
        }
    }
}

/// Error for a non-2xx response. `subject` is echoed back on 404.
pub(crate) fn status_error(provider: &str, status: StatusCode, subject: &str) -> MarketDataError {
    match status.as_u16() {
        401 | 403 => MarketDataError::Unauthorized {
            provider: provider.to_string(),
            message: format!("HTTP {}", status),
        },
        404 => MarketDataError::SymbolNotFound(subject.to_string()),
        429 => MarketDataError::RateLimited {
            provider: provider.to_string(),
        },
        code => MarketDataError::ProviderError {
            provider: provider.to_string(),
            status: Some(code),
            message: format!("HTTP {}", status),
        },
    }
}

pub(crate) fn decode<T: DeserializeOwned>(provider: &str, body: &str) -> Result<T, MarketDataError> {
    serde_json::from_str(body).map_err(|e| MarketDataError::MalformedResponse {
        provider: provider.to_string(),
        message: format!("Failed to parse response: {}", e),
    })
}

/// GET `url` and decode the JSON body. `redact` is masked in logs.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    provider: &str,
    url: Url,
    subject: &str,
    redact: Option<&str>,
) -> Result<T, MarketDataError> {
    let printable = match redact {
        Some(secret) if !secret.is_empty() => url.as_str().replace(secret, "***"),
        _ => url.as_str().to_string(),
    };
    debug!("{} request: {}", provider, printable);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(status_error(provider, status, subject));
    }

    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;
    decode(provider, &body)
}

pub(crate) fn parse_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(value.trim()).ok()
}

pub(crate) fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}

/// Parse a percentage string such as "1.2345%".
pub(crate) fn parse_percent(value: &str) -> Option<Decimal> {
    parse_decimal(value.trim().trim_end_matches('%'))
}
