use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Closed failure taxonomy.
///
/// Every failure observed while talking to providers is classified into one
/// of these kinds; the kind decides how the request degrades.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NetworkError,
    UpstreamRateLimited,
    AuthError,
    SymbolNotFound,
    Timeout,
    MalformedResponse,
    Unknown,
}

/// How a classified failure degrades.
///
/// | Kind | Strategy |
/// |------|----------|
/// | `NetworkError` | `StaleCache` |
/// | `UpstreamRateLimited` | `CacheOrDefault` |
/// | `AuthError` | `NextProvider` |
/// | `SymbolNotFound` | `Terminal` |
/// | `Timeout` | `Retry` |
/// | `MalformedResponse` | `NextProvider` |
/// | `Unknown` | `CacheOrDefault` |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackStrategy {
    /// Serve the last cached value, even past its TTL.
    StaleCache,
    /// Serve a cached value if one exists, else a synthetic default.
    CacheOrDefault,
    /// Nothing to synthesize locally; move on to the next provider.
    NextProvider,
    /// Surface the failure to the caller as-is.
    Terminal,
    /// Left to the orchestrator's sweep retry.
    Retry,
}

// Checked in order; the first group with a matching token wins.
const TOKEN_TABLE: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::UpstreamRateLimited,
        &["rate limit", "quota", "429", "too many requests", "call frequency"],
    ),
    (
        ErrorKind::AuthError,
        &["unauthorized", "api key", "apikey", "401", "403", "forbidden"],
    ),
    (
        ErrorKind::SymbolNotFound,
        &["unknown symbol", "invalid symbol", "not found", "404"],
    ),
    (ErrorKind::Timeout, &["timeout", "timed out"]),
    (
        ErrorKind::NetworkError,
        &["network", "connection", "fetch", "dns"],
    ),
    (
        ErrorKind::MalformedResponse,
        &["parse", "format", "json", "malformed", "decode"],
    ),
];

impl ErrorKind {
    /// Classify a free-form error message by the tokens it contains.
    pub fn from_message(message: &str) -> Self {
        let lowered = message.to_lowercase();
        TOKEN_TABLE
            .iter()
            .find(|(_, tokens)| tokens.iter().any(|token| lowered.contains(token)))
            .map(|(kind, _)| *kind)
            .unwrap_or(ErrorKind::Unknown)
    }

    /// Classify an HTTP status code, if it carries a meaning of its own.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 | 403 => Some(ErrorKind::AuthError),
            404 => Some(ErrorKind::SymbolNotFound),
            408 | 504 => Some(ErrorKind::Timeout),
            429 => Some(ErrorKind::UpstreamRateLimited),
            _ => None,
        }
    }

    pub fn fallback_strategy(self) -> FallbackStrategy {
        match self {
            ErrorKind::NetworkError => FallbackStrategy::StaleCache,
            ErrorKind::UpstreamRateLimited | ErrorKind::Unknown => FallbackStrategy::CacheOrDefault,
            ErrorKind::AuthError | ErrorKind::MalformedResponse => FallbackStrategy::NextProvider,
            ErrorKind::SymbolNotFound => FallbackStrategy::Terminal,
            ErrorKind::Timeout => FallbackStrategy::Retry,
        }
    }

    /// Suggested wait before a caller retries a request that failed with this kind.
    pub fn retry_after(self) -> Duration {
        match self {
            ErrorKind::UpstreamRateLimited => Duration::from_secs(60),
            ErrorKind::NetworkError => Duration::from_secs(5),
            ErrorKind::Timeout => Duration::from_secs(10),
            ErrorKind::AuthError => Duration::from_secs(300),
            _ => Duration::from_secs(30),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::UpstreamRateLimited => "UPSTREAM_RATE_LIMITED",
            ErrorKind::AuthError => "AUTH_ERROR",
            ErrorKind::SymbolNotFound => "SYMBOL_NOT_FOUND",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_tokens() {
        assert_eq!(
            ErrorKind::from_message("Failed to fetch: connection refused"),
            ErrorKind::NetworkError
        );
        assert_eq!(
            ErrorKind::from_message("API call frequency exceeded"),
            ErrorKind::UpstreamRateLimited
        );
        assert_eq!(
            ErrorKind::from_message("HTTP 401 Unauthorized"),
            ErrorKind::AuthError
        );
        assert_eq!(
            ErrorKind::from_message("Unknown symbol XYZ"),
            ErrorKind::SymbolNotFound
        );
        assert_eq!(
            ErrorKind::from_message("request timed out"),
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorKind::from_message("Failed to parse response"),
            ErrorKind::MalformedResponse
        );
        assert_eq!(ErrorKind::from_message("boom"), ErrorKind::Unknown);
    }

    #[test]
    fn test_rate_limit_wins_over_network_tokens() {
        // "fetch" alone would read as a network failure
        assert_eq!(
            ErrorKind::from_message("fetch rejected: quota exhausted"),
            ErrorKind::UpstreamRateLimited
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::from_status(429), Some(ErrorKind::UpstreamRateLimited));
        assert_eq!(ErrorKind::from_status(403), Some(ErrorKind::AuthError));
        assert_eq!(ErrorKind::from_status(404), Some(ErrorKind::SymbolNotFound));
        assert_eq!(ErrorKind::from_status(500), None);
    }

    #[test]
    fn test_fallback_table() {
        assert_eq!(
            ErrorKind::NetworkError.fallback_strategy(),
            FallbackStrategy::StaleCache
        );
        assert_eq!(
            ErrorKind::UpstreamRateLimited.fallback_strategy(),
            FallbackStrategy::CacheOrDefault
        );
        assert_eq!(
            ErrorKind::AuthError.fallback_strategy(),
            FallbackStrategy::NextProvider
        );
        assert_eq!(
            ErrorKind::SymbolNotFound.fallback_strategy(),
            FallbackStrategy::Terminal
        );
        assert_eq!(ErrorKind::Timeout.fallback_strategy(), FallbackStrategy::Retry);
        assert_eq!(
            ErrorKind::MalformedResponse.fallback_strategy(),
            FallbackStrategy::NextProvider
        );
        assert_eq!(
            ErrorKind::Unknown.fallback_strategy(),
            FallbackStrategy::CacheOrDefault
        );
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(
            ErrorKind::UpstreamRateLimited.retry_after(),
            Duration::from_secs(60)
        );
        assert_eq!(ErrorKind::NetworkError.retry_after(), Duration::from_secs(5));
        assert_eq!(ErrorKind::Timeout.retry_after(), Duration::from_secs(10));
        assert_eq!(ErrorKind::AuthError.retry_after(), Duration::from_secs(300));
        assert_eq!(ErrorKind::Unknown.retry_after(), Duration::from_secs(30));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ErrorKind::UpstreamRateLimited).unwrap();
        assert_eq!(json, "\"UPSTREAM_RATE_LIMITED\"");
    }
}
