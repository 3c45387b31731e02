//! Provider response validation.
//!
//! Checks the canonical records an adapter returned before they are cached:
//! - Quotes: positive price, symbol present, sane day range
//! - Series: non-empty, strictly ascending, no negative prices
//! - Rates: positive value
//!
//! Hard issues reject the response so the sweep moves on to the next
//! provider. Soft issues are logged and the data is accepted.

use log::warn;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::{CachePayload, ExchangeRate, HistoricalSeries, Quote};

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Reject the response, try the next provider.
    Hard,
    /// Accept the response but log a warning.
    Soft,
}

/// A single finding.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
}

impl ValidationIssue {
    fn hard(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Hard,
            message: message.into(),
        }
    }

    fn soft(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Soft,
            message: message.into(),
        }
    }
}

/// Validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Prices above this are rejected as garbage.
    pub max_price: Option<Decimal>,
    /// Whether to reject quotes where high < low.
    pub reject_invalid_range: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_price: Some(Decimal::from(1_000_000_000i64)),
            reject_invalid_range: false,
        }
    }
}

/// Validates provider responses.
#[derive(Default)]
pub struct ResponseValidator {
    config: ValidatorConfig,
}

impl ResponseValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, payload: &CachePayload) -> Result<(), MarketDataError> {
        let (subject, issues) = match payload {
            CachePayload::Quote(quote) => (quote.symbol.clone(), self.quote_issues(quote)),
            CachePayload::Historical(series) => (series.symbol.clone(), self.series_issues(series)),
            CachePayload::ExchangeRate(rate) => (rate.pair.to_string(), self.rate_issues(rate)),
        };
        Self::settle(&subject, issues)
    }

    pub fn validate_quote(&self, quote: &Quote) -> Result<(), MarketDataError> {
        Self::settle(&quote.symbol, self.quote_issues(quote))
    }

    fn settle(subject: &str, issues: Vec<ValidationIssue>) -> Result<(), MarketDataError> {
        let errors: Vec<&str> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();

        if !errors.is_empty() {
            return Err(MarketDataError::ValidationFailed {
                message: format!("{}: {}", subject, errors.join("; ")),
            });
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!("Validation warning for {}: {}", subject, issue.message);
        }
        Ok(())
    }

    fn price_ceiling(&self, label: &str, value: Decimal, issues: &mut Vec<ValidationIssue>) {
        if let Some(max) = self.config.max_price {
            if value > max {
                issues.push(ValidationIssue::hard(format!(
                    "{} ({}) exceeds sanity limit {}",
                    label, value, max
                )));
            }
        }
    }

    fn quote_issues(&self, quote: &Quote) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if quote.symbol.trim().is_empty() {
            issues.push(ValidationIssue::hard("Missing symbol"));
        }
        if quote.price <= Decimal::ZERO {
            issues.push(ValidationIssue::hard(format!(
                "Price must be positive, got {}",
                quote.price
            )));
        }
        self.price_ceiling("Price", quote.price, &mut issues);

        if quote.high < quote.low {
            let message = format!("High ({}) is less than Low ({})", quote.high, quote.low);
            issues.push(if self.config.reject_invalid_range {
                ValidationIssue::hard(message)
            } else {
                ValidationIssue::soft(message)
            });
        }
        if quote.timestamp.timestamp() <= 0 {
            issues.push(ValidationIssue::hard("Missing timestamp"));
        }

        issues
    }

    fn series_issues(&self, series: &HistoricalSeries) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if series.prices.is_empty() {
            issues.push(ValidationIssue::hard("Series has no prices"));
            return issues;
        }
        if !series.is_strictly_ascending() {
            issues.push(ValidationIssue::hard("Series is not in ascending date order"));
        }

        let negative = series
            .prices
            .iter()
            .filter(|p| {
                p.close < Decimal::ZERO
                    || p.open < Decimal::ZERO
                    || p.high < Decimal::ZERO
                    || p.low < Decimal::ZERO
            })
            .count();
        if negative > 0 {
            issues.push(ValidationIssue::hard(format!(
                "{} points with negative prices",
                negative
            )));
        }

        let inverted = series.prices.iter().filter(|p| p.high < p.low).count();
        if inverted > 0 {
            issues.push(ValidationIssue::soft(format!(
                "{} points with high below low",
                inverted
            )));
        }

        issues
    }

    fn rate_issues(&self, rate: &ExchangeRate) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if rate.rate <= Decimal::ZERO {
            issues.push(ValidationIssue::hard(format!(
                "Rate must be positive, got {}",
                rate.rate
            )));
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CurrencyPair, PricePoint, Timeframe};
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn quote(price: Decimal) -> Quote {
        Quote::new(
            "AAPL",
            price,
            "TEST",
            Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_valid_quote() {
        let validator = ResponseValidator::new();
        assert!(validator.validate_quote(&quote(dec!(150.25))).is_ok());
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let validator = ResponseValidator::new();
        for price in [dec!(0), dec!(-1)] {
            let result = validator.validate_quote(&quote(price));
            match result {
                Err(MarketDataError::ValidationFailed { message }) => {
                    assert!(message.contains("Price must be positive"))
                }
                other => panic!("expected validation failure, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_inverted_range_is_soft_by_default() {
        let mut q = quote(dec!(100));
        q.high = dec!(90);
        q.low = dec!(95);
        assert!(ResponseValidator::new().validate_quote(&q).is_ok());

        let strict = ResponseValidator::with_config(ValidatorConfig {
            reject_invalid_range: true,
            ..Default::default()
        });
        assert!(strict.validate_quote(&q).is_err());
    }

    #[test]
    fn test_series_rules() {
        let validator = ResponseValidator::new();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let points: Vec<PricePoint> = (0..3)
            .map(|i| PricePoint::flat(start + Duration::days(i), dec!(10)))
            .collect();

        let good = HistoricalSeries::normalize("AAPL", Timeframe::OneWeek, points.clone(), 7, "T");
        assert!(validator.validate(&good.into()).is_ok());

        let empty = HistoricalSeries::normalize("AAPL", Timeframe::OneWeek, vec![], 7, "T");
        assert!(validator.validate(&empty.into()).is_err());

        let mut unsorted = HistoricalSeries::normalize("AAPL", Timeframe::OneWeek, points, 7, "T");
        unsorted.prices.reverse();
        assert!(validator.validate(&unsorted.into()).is_err());
    }

    #[test]
    fn test_rate_must_be_positive() {
        let validator = ResponseValidator::new();
        let pair = CurrencyPair::new("EUR", "USD");
        let zero = ExchangeRate::new(pair.clone(), dec!(0), "T", Utc::now());
        assert!(validator.validate(&zero.into()).is_err());

        let ok = ExchangeRate::new(pair, dec!(1.08), "T", Utc::now());
        assert!(validator.validate(&ok.into()).is_ok());
    }
}
