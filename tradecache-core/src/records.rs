//! Account, portfolio and market-data records served through the cache.
//!
//! Monetary fields use `rust_decimal::Decimal` and always travel as strings
//! on the wire. Timestamps travel as RFC 3339 strings with an explicit
//! `+00:00` offset.

use crate::{Timestamp, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Serde adapter for UTC timestamps with an explicit offset.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, false))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}

fn non_negative(field: &str, value: Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be non-negative, got {}", value),
        });
    }
    Ok(())
}

fn non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Brokerage account summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountSummary {
    pub id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub buying_power: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub cash: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub equity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub portfolio_value: Decimal,
    /// Account status as reported by the broker (e.g. `ACTIVE`)
    pub status: String,
    pub currency: String,
    /// Equity at the previous market close, when the broker reports it
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub last_equity: Option<Decimal>,
}

impl AccountSummary {
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_empty("id", &self.id)?;
        non_empty("currency", &self.currency)?;
        Ok(())
    }
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

/// An open portfolio position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Position {
    pub asset_id: String,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    pub side: PositionSide,
    #[serde(with = "rust_decimal::serde::str")]
    pub market_value: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub cost_basis: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub unrealized_pl: Decimal,
    /// Unrealized P/L as a fraction of cost basis
    #[serde(with = "rust_decimal::serde::str")]
    pub unrealized_plpc: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub current_price: Decimal,
}

impl Position {
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_empty("asset_id", &self.asset_id)?;
        non_empty("symbol", &self.symbol)?;
        non_negative("avg_entry_price", self.avg_entry_price)?;
        non_negative("current_price", self.current_price)?;
        Ok(())
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bar {
    #[serde(with = "iso8601")]
    pub timestamp: Timestamp,
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    pub volume: u64,
}

impl Bar {
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_negative("open", self.open)?;
        non_negative("high", self.high)?;
        non_negative("low", self.low)?;
        non_negative("close", self.close)?;
        Ok(())
    }
}

/// Latest top-of-book quote for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Quote {
    pub symbol: String,
    #[serde(with = "iso8601")]
    pub timestamp: Timestamp,
    #[serde(with = "rust_decimal::serde::str")]
    pub ask_price: Decimal,
    pub ask_size: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub bid_price: Decimal,
    pub bid_size: u64,
    /// Exchange condition codes attached to the quote
    #[serde(default)]
    pub conditions: Vec<String>,
}

impl Quote {
    pub fn validate(&self) -> Result<(), ValidationError> {
        non_empty("symbol", &self.symbol)?;
        non_negative("ask_price", self.ask_price)?;
        non_negative("bid_price", self.bid_price)?;
        Ok(())
    }

    /// Ask minus bid.
    pub fn spread(&self) -> Decimal {
        self.ask_price - self.bid_price
    }
}
