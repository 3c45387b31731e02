/// Provider identifier (e.g. "YAHOO", "ALPHA_VANTAGE")
pub type ProviderId = String;

/// Ticker symbol as requested by callers, upper-cased
pub type Symbol = String;

/// Currency code (ISO 4217)
pub type Currency = String;

/// Normalize a caller-supplied symbol: trimmed and upper-cased.
pub fn normalize_symbol(symbol: &str) -> Symbol {
    symbol.trim().to_uppercase()
}
