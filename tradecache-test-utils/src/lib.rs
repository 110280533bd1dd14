//! tradecache Test Utilities
//!
//! Shared test infrastructure for the tradecache workspace:
//! - Proptest generators for records and key parameters
//! - Fixtures for common scenarios
//! - The in-memory mock store and connector

// Re-export the mock store from its source crate
pub use tradecache_storage::{MockConnector, MockStore};

// Re-export core types for convenience
pub use tradecache_core::{
    AccountSummary, Bar, Position, PositionSide, Quote, ResourceType, RetryConfig, StoreError,
    Timestamp, Ttl,
};

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for tradecache records.

    use super::*;
    use proptest::prelude::*;

    /// Generate a non-negative price with up to four decimal places.
    pub fn arb_price() -> impl Strategy<Value = Decimal> {
        (0i64..100_000_000, 0u32..=4).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
    }

    /// Generate a signed decimal (P/L, quantities of short positions).
    pub fn arb_signed_decimal() -> impl Strategy<Value = Decimal> {
        (-100_000_000i64..100_000_000, 0u32..=6).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
    }

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // Generate timestamps within a reasonable range (2020-2030)
        (1577836800i64..1893456000i64, 0u32..1_000_000).prop_map(|(secs, micros)| {
            chrono::DateTime::from_timestamp(secs, micros * 1000).unwrap_or_else(Utc::now)
        })
    }

    /// Generate a ticker symbol.
    pub fn arb_symbol() -> impl Strategy<Value = String> {
        "[A-Z]{1,5}"
    }

    /// Generate a bar timeframe.
    pub fn arb_timeframe() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("1Min".to_string()),
            Just("5Min".to_string()),
            Just("1Hour".to_string()),
            Just("1Day".to_string()),
        ]
    }

    /// Generate a ResourceType variant.
    pub fn arb_resource_type() -> impl Strategy<Value = ResourceType> {
        prop::sample::select(ResourceType::ALL.to_vec())
    }

    pub fn arb_quote() -> impl Strategy<Value = Quote> {
        (
            arb_symbol(),
            arb_timestamp(),
            arb_price(),
            any::<u32>(),
            arb_price(),
            any::<u32>(),
            prop::collection::vec("[A-Z]", 0..3),
        )
            .prop_map(
                |(symbol, timestamp, ask_price, ask_size, bid_price, bid_size, conditions)| Quote {
                    symbol,
                    timestamp,
                    ask_price,
                    ask_size: u64::from(ask_size),
                    bid_price,
                    bid_size: u64::from(bid_size),
                    conditions,
                },
            )
    }

    pub fn arb_bar() -> impl Strategy<Value = Bar> {
        (
            arb_timestamp(),
            arb_price(),
            arb_price(),
            arb_price(),
            arb_price(),
            any::<u64>(),
        )
            .prop_map(|(timestamp, open, high, low, close, volume)| Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            })
    }

    pub fn arb_position() -> impl Strategy<Value = Position> {
        (
            "[a-f0-9]{8}",
            arb_symbol(),
            arb_price(),
            arb_signed_decimal(),
            prop_oneof![Just(PositionSide::Long), Just(PositionSide::Short)],
            arb_signed_decimal(),
            arb_price(),
            arb_signed_decimal(),
            arb_signed_decimal(),
            arb_price(),
        )
            .prop_map(
                |(
                    asset_id,
                    symbol,
                    avg_entry_price,
                    qty,
                    side,
                    market_value,
                    cost_basis,
                    unrealized_pl,
                    unrealized_plpc,
                    current_price,
                )| Position {
                    asset_id,
                    symbol,
                    avg_entry_price,
                    qty,
                    side,
                    market_value,
                    cost_basis,
                    unrealized_pl,
                    unrealized_plpc,
                    current_price,
                },
            )
    }

    /// Generate uniquely named key parameters for a bars request, shuffled.
    ///
    /// Always includes `symbol` and `timeframe`.
    pub fn arb_key_params() -> impl Strategy<Value = Vec<(String, String)>> {
        (
            arb_symbol(),
            arb_timeframe(),
            prop::collection::btree_map("[a-z_]{1,8}", "[A-Za-z0-9.-]{1,12}", 0..4),
        )
            .prop_map(|(symbol, timeframe, mut extra)| {
                extra.insert("symbol".to_string(), symbol);
                extra.insert("timeframe".to_string(), timeframe);
                extra.into_iter().collect::<Vec<_>>()
            })
            .prop_shuffle()
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common testing scenarios.

    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap_or_default()
    }

    /// AAPL quote at 2024-05-01T15:30:00Z, bid 150.10 / ask 150.20.
    pub fn aapl_quote() -> Quote {
        Quote {
            symbol: "AAPL".to_string(),
            timestamp: Utc
                .with_ymd_and_hms(2024, 5, 1, 15, 30, 0)
                .single()
                .unwrap_or_else(Utc::now),
            ask_price: dec("150.20"),
            ask_size: 200,
            bid_price: dec("150.10"),
            bid_size: 100,
            conditions: vec!["R".to_string()],
        }
    }

    /// Consecutive daily bars starting 2024-05-01.
    pub fn daily_bars(count: usize) -> Vec<Bar> {
        let start = Utc
            .with_ymd_and_hms(2024, 5, 1, 4, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        (0..count)
            .map(|day| {
                let base = Decimal::new(15000 + day as i64 * 25, 2);
                Bar {
                    timestamp: start + chrono::Duration::days(day as i64),
                    open: base,
                    high: base + dec("1.25"),
                    low: base - dec("0.80"),
                    close: base + dec("0.35"),
                    volume: 1_000_000 + day as u64 * 1000,
                }
            })
            .collect()
    }

    pub fn account_summary() -> AccountSummary {
        AccountSummary {
            id: "abc123".to_string(),
            buying_power: dec("100000.00"),
            cash: dec("50000.00"),
            equity: dec("150000.00"),
            portfolio_value: dec("150000.00"),
            status: "ACTIVE".to_string(),
            currency: "USD".to_string(),
            last_equity: Some(dec("149250.00")),
        }
    }

    pub fn long_position(symbol: &str) -> Position {
        Position {
            asset_id: format!("asset-{}", symbol.to_lowercase()),
            symbol: symbol.to_string(),
            avg_entry_price: dec("142.50"),
            qty: dec("10"),
            side: PositionSide::Long,
            market_value: dec("1501.50"),
            cost_basis: dec("1425.00"),
            unrealized_pl: dec("76.50"),
            unrealized_plpc: dec("0.0537"),
            current_price: dec("150.15"),
        }
    }
}
