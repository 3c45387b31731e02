//! Error types and failure classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: the error enum raised by providers, validation and lookups
//! - [`ErrorKind`]: the closed failure taxonomy every error is classified into
//! - [`FallbackStrategy`]: how a classified failure degrades

mod kind;

pub use kind::{ErrorKind, FallbackStrategy};

use thiserror::Error;

/// Errors that can occur during market data operations.
///
/// Each variant maps onto an [`ErrorKind`] via [`kind`](Self::kind). Provider
/// errors without a typed variant are classified from their message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// The requested symbol was not found by the provider.
    /// Terminal: never masked by cached or synthetic data.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The provider rate limited the request (HTTP 429 or an embedded quota notice).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The provider rejected our credentials.
    #[error("Unauthorized: {provider} - {message}")]
    Unauthorized { provider: String, message: String },

    /// The request did not complete within the attempt timeout.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// Connection-level failure reaching the provider.
    #[error("Network error: {provider} - {message}")]
    Network { provider: String, message: String },

    /// The provider answered with a body we could not decode.
    #[error("Malformed response: {provider} - {message}")]
    MalformedResponse { provider: String, message: String },

    /// A provider-specific error occurred.
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// HTTP status, when the failure came from a non-2xx response
        status: Option<u16>,
        /// The error message from the provider
        message: String,
    },

    /// Data validation failed.
    /// The provider returned data that failed validation checks.
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Description of the validation failure
        message: String,
    },

    /// The provider does not implement the requested operation.
    #[error("Operation '{operation}' not supported by {provider}")]
    NotSupported { operation: String, provider: String },

    /// The provider is missing required configuration (usually an API key).
    #[error("Provider not configured: {provider}")]
    NotConfigured { provider: String },

    /// No providers are available to handle the request.
    #[error("No providers available")]
    NoProvidersAvailable,

    /// All providers were tried and all failed.
    #[error("All providers failed")]
    AllProvidersFailed,
}

impl MarketDataError {
    /// Classify this error into the failure taxonomy.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketgate_market_data::errors::{ErrorKind, MarketDataError};
    ///
    /// let error = MarketDataError::RateLimited { provider: "YAHOO".to_string() };
    /// assert_eq!(error.kind(), ErrorKind::UpstreamRateLimited);
    ///
    /// let error = MarketDataError::SymbolNotFound("INVALID".to_string());
    /// assert_eq!(error.kind(), ErrorKind::SymbolNotFound);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SymbolNotFound(_) => ErrorKind::SymbolNotFound,
            Self::RateLimited { .. } => ErrorKind::UpstreamRateLimited,
            Self::Unauthorized { .. } | Self::NotConfigured { .. } => ErrorKind::AuthError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Network { .. } => ErrorKind::NetworkError,
            Self::MalformedResponse { .. } | Self::ValidationFailed { .. } => {
                ErrorKind::MalformedResponse
            }
            Self::ProviderError { status, message, .. } => match status {
                Some(code) => ErrorKind::from_status(*code)
                    .unwrap_or_else(|| ErrorKind::from_message(message)),
                None => ErrorKind::from_message(message),
            },
            Self::NotSupported { .. } | Self::NoProvidersAvailable | Self::AllProvidersFailed => {
                ErrorKind::Unknown
            }
        }
    }

    /// The provider this error originated from, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::RateLimited { provider }
            | Self::Unauthorized { provider, .. }
            | Self::Timeout { provider }
            | Self::Network { provider, .. }
            | Self::MalformedResponse { provider, .. }
            | Self::ProviderError { provider, .. }
            | Self::NotSupported { provider, .. }
            | Self::NotConfigured { provider } => Some(provider),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_variants_classify_directly() {
        assert_eq!(
            MarketDataError::SymbolNotFound("X".to_string()).kind(),
            ErrorKind::SymbolNotFound
        );
        assert_eq!(
            MarketDataError::Timeout {
                provider: "YAHOO".to_string()
            }
            .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            MarketDataError::Network {
                provider: "YAHOO".to_string(),
                message: "reset by peer".to_string()
            }
            .kind(),
            ErrorKind::NetworkError
        );
        assert_eq!(
            MarketDataError::ValidationFailed {
                message: "price must be positive".to_string()
            }
            .kind(),
            ErrorKind::MalformedResponse
        );
    }

    #[test]
    fn test_provider_error_uses_status_then_message() {
        let error = MarketDataError::ProviderError {
            provider: "IEX_CLOUD".to_string(),
            status: Some(429),
            message: "HTTP 429".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::UpstreamRateLimited);

        let error = MarketDataError::ProviderError {
            provider: "IEX_CLOUD".to_string(),
            status: Some(500),
            message: "upstream connection reset".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::NetworkError);

        let error = MarketDataError::ProviderError {
            provider: "IEX_CLOUD".to_string(),
            status: None,
            message: "something odd".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_provider_accessor() {
        let error = MarketDataError::RateLimited {
            provider: "ALPHA_VANTAGE".to_string(),
        };
        assert_eq!(error.provider(), Some("ALPHA_VANTAGE"));
        assert_eq!(MarketDataError::AllProvidersFailed.provider(), None);
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::SymbolNotFound("INVALID".to_string());
        assert_eq!(format!("{}", error), "Symbol not found: INVALID");

        let error = MarketDataError::RateLimited {
            provider: "YAHOO".to_string(),
        };
        assert_eq!(format!("{}", error), "Rate limited: YAHOO");

        let error = MarketDataError::ProviderError {
            provider: "ALPHA_VANTAGE".to_string(),
            status: None,
            message: "API key invalid".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Provider error: ALPHA_VANTAGE - API key invalid"
        );
    }
}
