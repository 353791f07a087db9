//! Request and response types for the daily price series.

use serde::Serialize;
use thiserror::Error;

use crate::fetch::{CacheKey, CacheKeyed};

/// Largest day count served from the compact daily series.
pub const MAX_NDAYS: u32 = 100;

const MAX_SYMBOL_LEN: usize = 12;

/// Rejected request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid symbol '{0}': expected 1-12 characters of A-Z, 0-9, '.' or '-'")]
    InvalidSymbol(String),

    #[error("invalid day count '{0}': expected an integer between 1 and 100")]
    InvalidDays(String),
}

/// Validated identity of one price-series read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StockRequest {
    symbol: String,
    ndays: u32,
}

impl StockRequest {
    /// Upper-cases `symbol` and checks both parameters.
    pub fn new(symbol: &str, ndays: u32) -> Result<Self, RequestError> {
        let symbol = normalize_symbol(symbol)?;
        if ndays == 0 || ndays > MAX_NDAYS {
            return Err(RequestError::InvalidDays(ndays.to_string()));
        }
        Ok(Self { symbol, ndays })
    }

    /// Like [`StockRequest::new`] with the day count still in path form.
    pub fn parse(symbol: &str, ndays: &str) -> Result<Self, RequestError> {
        let days = ndays
            .parse::<u32>()
            .map_err(|_| RequestError::InvalidDays(ndays.to_string()))?;
        Self::new(symbol, days).map_err(|e| match e {
            RequestError::InvalidDays(_) => RequestError::InvalidDays(ndays.to_string()),
            other => other,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn ndays(&self) -> u32 {
        self.ndays
    }
}

impl CacheKeyed for StockRequest {
    fn cache_key(&self) -> CacheKey {
        CacheKey::new("stock", [self.symbol.clone(), self.ndays.to_string()])
    }
}

fn normalize_symbol(raw: &str) -> Result<String, RequestError> {
    let symbol = raw.trim().to_ascii_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-');
    if valid {
        Ok(symbol)
    } else {
        Err(RequestError::InvalidSymbol(raw.to_string()))
    }
}

/// One trading day's close.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub date: String,
    pub close: f64,
}

/// Most recent closes for a symbol, newest first, with their mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockData {
    pub symbol: String,
    /// Number of valid prices actually returned; may be below the request.
    pub ndays: u32,
    pub prices: Vec<PricePoint>,
    pub average: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_is_uppercased() {
        let req = StockRequest::new("msft", 7).unwrap();
        assert_eq!(req.symbol(), "MSFT");
        assert_eq!(req.ndays(), 7);
        assert_eq!(req.cache_key().as_str(), "stock|MSFT|7");
    }

    #[test]
    fn test_symbol_charset() {
        assert!(StockRequest::new("BRK.B", 1).is_ok());
        assert!(StockRequest::new("RDS-A", 1).is_ok());
        assert_eq!(
            StockRequest::new("MS|FT", 1),
            Err(RequestError::InvalidSymbol("MS|FT".to_string()))
        );
        assert!(StockRequest::new("", 1).is_err());
        assert!(StockRequest::new("ABCDEFGHIJKLM", 1).is_err());
    }

    #[test]
    fn test_ndays_range() {
        assert!(StockRequest::new("MSFT", 0).is_err());
        assert!(StockRequest::new("MSFT", MAX_NDAYS).is_ok());
        assert!(StockRequest::new("MSFT", MAX_NDAYS + 1).is_err());
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(StockRequest::parse("aapl", "30").unwrap().ndays(), 30);
        assert_eq!(
            StockRequest::parse("AAPL", "abc"),
            Err(RequestError::InvalidDays("abc".to_string()))
        );
        assert_eq!(
            StockRequest::parse("AAPL", "-3"),
            Err(RequestError::InvalidDays("-3".to_string()))
        );
        assert_eq!(
            StockRequest::parse("AAPL", "500"),
            Err(RequestError::InvalidDays("500".to_string()))
        );
    }

    #[test]
    fn test_same_symbol_different_case_shares_key() {
        let a = StockRequest::new("msft", 3).unwrap();
        let b = StockRequest::new("MSFT", 3).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
