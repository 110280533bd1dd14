//! Cacheable resource types and their expiry policy.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Time-to-live for a cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ttl {
    /// Expires after the given number of seconds
    Seconds(u64),
    /// Never expires
    Persistent,
}

impl Ttl {
    /// Seconds until expiry, or `-1` for persistent entries (the store's convention).
    pub fn as_seconds(&self) -> i64 {
        match self {
            Self::Seconds(secs) => i64::try_from(*secs).unwrap_or(i64::MAX),
            Self::Persistent => -1,
        }
    }

    /// Expiry as a `Duration`, or `None` for persistent entries.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Seconds(secs) => Some(Duration::from_secs(*secs)),
            Self::Persistent => None,
        }
    }
}

/// Closed set of resources the cache knows how to key and expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    AccountSummary,
    Positions,
    StockBars,
    StockQuote,
}

impl ResourceType {
    /// Every variant, in declaration order.
    pub const ALL: [ResourceType; 4] = [
        Self::AccountSummary,
        Self::Positions,
        Self::StockBars,
        Self::StockQuote,
    ];

    /// Wire name used as the second key segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountSummary => "account_summary",
            Self::Positions => "positions",
            Self::StockBars => "stock_bars",
            Self::StockQuote => "stock_quote",
        }
    }

    /// Parameters that must be present (and non-null) to derive a key.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            Self::AccountSummary | Self::Positions => &["user_id"],
            Self::StockBars => &["symbol", "timeframe"],
            Self::StockQuote => &["symbol"],
        }
    }

    /// Fixed expiry for entries of this resource.
    pub fn ttl(&self) -> Ttl {
        match self {
            Self::AccountSummary | Self::Positions | Self::StockBars => Ttl::Seconds(300),
            // Live quotes go stale quickly
            Self::StockQuote => Ttl::Seconds(60),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = SchemaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|resource| resource.as_str() == value)
            .ok_or_else(|| SchemaError::UnknownResourceType {
                name: value.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_table() {
        assert_eq!(ResourceType::AccountSummary.ttl(), Ttl::Seconds(300));
        assert_eq!(ResourceType::Positions.ttl(), Ttl::Seconds(300));
        assert_eq!(ResourceType::StockBars.ttl(), Ttl::Seconds(300));
        assert_eq!(ResourceType::StockQuote.ttl(), Ttl::Seconds(60));
    }

    #[test]
    fn test_ttl_sentinel() {
        assert_eq!(Ttl::Persistent.as_seconds(), -1);
        assert_eq!(Ttl::Persistent.as_duration(), None);
        assert_eq!(Ttl::Seconds(60).as_seconds(), 60);
        assert_eq!(Ttl::Seconds(60).as_duration(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_roundtrips_wire_name() {
        for resource in ResourceType::ALL {
            assert_eq!(resource.as_str().parse::<ResourceType>(), Ok(resource));
        }
    }

    #[test]
    fn test_parse_unknown_name() {
        let err = "not_a_key_type".parse::<ResourceType>().unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownResourceType {
                name: "not_a_key_type".to_string()
            }
        );
    }

    #[test]
    fn test_serde_uses_wire_name() {
        let json = serde_json::to_string(&ResourceType::StockQuote).unwrap();
        assert_eq!(json, "\"stock_quote\"");
    }
}
