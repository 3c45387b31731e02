use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::duration_millis;
use crate::errors::ErrorKind;

/// How the data in a [`DataResponse`] was obtained.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Freshness {
    /// Fetched from a provider during this call
    Live,
    /// Served from a non-expired cache entry
    Cached,
    /// Last known value served because providers failed
    Fallback,
    /// Synthetic placeholder
    Default,
}

/// Result envelope of a successful (possibly degraded) lookup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResponse<T> {
    pub data: T,
    pub freshness: Freshness,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

impl<T> DataResponse<T> {
    pub fn live(data: T) -> Self {
        Self {
            data,
            freshness: Freshness::Live,
            retry_after_ms: None,
            error_id: None,
        }
    }

    pub fn cached(data: T) -> Self {
        Self {
            data,
            freshness: Freshness::Cached,
            retry_after_ms: None,
            error_id: None,
        }
    }

    pub fn degraded(
        data: T,
        freshness: Freshness,
        retry_after: Duration,
        error_id: Option<String>,
    ) -> Self {
        Self {
            data,
            freshness,
            retry_after_ms: Some(duration_millis(retry_after)),
            error_id,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }

    /// True for fallback and synthetic data.
    pub fn is_degraded(&self) -> bool {
        matches!(self.freshness, Freshness::Fallback | Freshness::Default)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DataResponse<U> {
        DataResponse {
            data: f(self.data),
            freshness: self.freshness,
            retry_after_ms: self.retry_after_ms,
            error_id: self.error_id,
        }
    }
}

/// Terminal lookup failure, produced only for unknown symbols.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{error_kind} for '{symbol}': {message}")]
pub struct LookupFailure {
    pub symbol: String,
    pub error_kind: ErrorKind,
    pub error_id: String,
    pub message: String,
    pub retry_after_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_flags() {
        let live = DataResponse::live(1);
        assert!(!live.is_degraded());
        assert_eq!(live.retry_after(), None);

        let fallback = DataResponse::degraded(
            1,
            Freshness::Default,
            Duration::from_secs(5),
            Some("id".to_string()),
        );
        assert!(fallback.is_degraded());
        assert_eq!(fallback.retry_after(), Some(Duration::from_secs(5)));
        assert_eq!(fallback.map(|v| v + 1).data, 2);
    }
}
