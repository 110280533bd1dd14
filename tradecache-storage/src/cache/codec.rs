//! JSON codec for cached records.
//!
//! A payload is either one JSON object or an array of objects. Decimals
//! travel as strings and timestamps as RFC 3339 with an explicit offset,
//! both enforced by the record types' serde attributes.

use serde_json::Value;
use tradecache_core::CodecError;

use super::records::Records;
use super::traits::CacheRecord;

fn to_object<T: CacheRecord>(record: &T) -> Result<Value, CodecError> {
    let value = serde_json::to_value(record).map_err(|e| CodecError::UnsupportedType {
        reason: format!("{}: {}", T::RECORD_TYPE, e),
    })?;

    if !value.is_object() {
        return Err(CodecError::UnsupportedType {
            reason: format!("{} does not serialize to a JSON object", T::RECORD_TYPE),
        });
    }
    Ok(value)
}

fn to_text(value: &Value) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::UnsupportedType {
        reason: e.to_string(),
    })
}

fn decode_error<T: CacheRecord>(reason: impl ToString) -> CodecError {
    CodecError::Decode {
        record_type: T::RECORD_TYPE.to_string(),
        reason: reason.to_string(),
    }
}

/// Encode a single record.
pub fn encode_one<T: CacheRecord>(record: &T) -> Result<String, CodecError> {
    to_text(&to_object(record)?)
}

/// Encode a list of records as a JSON array.
pub fn encode_many<T: CacheRecord>(records: &[T]) -> Result<String, CodecError> {
    let items = records
        .iter()
        .map(to_object)
        .collect::<Result<Vec<_>, _>>()?;
    to_text(&Value::Array(items))
}

pub fn encode<T: CacheRecord>(records: &Records<T>) -> Result<String, CodecError> {
    match records {
        Records::One(record) => encode_one(record),
        Records::Many(items) => encode_many(items),
    }
}

/// Decode a payload. A top-level array yields [`Records::Many`].
pub fn decode<T: CacheRecord>(text: &str) -> Result<Records<T>, CodecError> {
    let value: Value = serde_json::from_str(text).map_err(decode_error::<T>)?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map(Records::Many)
            .map_err(decode_error::<T>),
        other => serde_json::from_value(other)
            .map(Records::One)
            .map_err(decode_error::<T>),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tradecache_core::{Bar, Position, Quote};
    use tradecache_test_utils::fixtures;

    #[test]
    fn test_encode_quote_wire_format() {
        let text = encode_one(&fixtures::aapl_quote()).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["symbol"], "AAPL");
        assert_eq!(value["bid_price"], "150.10");
        assert_eq!(value["timestamp"], "2024-05-01T15:30:00+00:00");
    }

    #[test]
    fn test_decode_single_and_list() {
        let quote = fixtures::aapl_quote();
        let one = decode::<Quote>(&encode_one(&quote).unwrap()).unwrap();
        assert_eq!(one, Records::One(quote.clone()));

        let bars = fixtures::daily_bars(3);
        let many = decode::<Bar>(&encode_many(&bars).unwrap()).unwrap();
        assert_eq!(many, Records::Many(bars));
    }

    #[test]
    fn test_decode_empty_list() {
        assert_eq!(decode::<Position>("[]").unwrap(), Records::Many(vec![]));
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode::<Quote>("{not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { record_type, .. } if record_type == "quote"));
    }

    #[test]
    fn test_decode_shape_mismatch() {
        // A bar payload is not a quote
        let text = encode_one(&fixtures::daily_bars(1)[0]).unwrap();
        assert!(matches!(decode::<Quote>(&text), Err(CodecError::Decode { .. })));

        assert!(matches!(decode::<Quote>("42"), Err(CodecError::Decode { .. })));
        assert!(matches!(decode::<Quote>("[1, 2]"), Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let mut value: Value = serde_json::from_str(&encode_one(&fixtures::aapl_quote()).unwrap()).unwrap();
        value["exchange"] = Value::String("V".to_string());
        let err = decode::<Quote>(&value.to_string()).unwrap_err();
        assert!(matches!(err, CodecError::Decode { reason, .. } if reason.contains("exchange")));
    }

    #[test]
    fn test_encode_records_dispatches_on_shape() {
        let quote = fixtures::aapl_quote();
        assert!(encode(&Records::One(quote.clone())).unwrap().starts_with('{'));
        assert!(encode(&Records::Many(vec![quote])).unwrap().starts_with('['));
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;
        use tradecache_test_utils::generators::{arb_bar, arb_position, arb_quote};

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_quote_roundtrip(quote in arb_quote()) {
                let records = Records::One(quote);
                prop_assert_eq!(decode::<Quote>(&encode(&records).unwrap()).unwrap(), records);
            }

            #[test]
            fn prop_bar_list_roundtrip(bars in prop::collection::vec(arb_bar(), 0..8)) {
                let records = Records::Many(bars);
                prop_assert_eq!(decode::<Bar>(&encode(&records).unwrap()).unwrap(), records);
            }

            #[test]
            fn prop_position_roundtrip(position in arb_position()) {
                let records = Records::One(position);
                prop_assert_eq!(decode::<Position>(&encode(&records).unwrap()).unwrap(), records);
            }

            #[test]
            fn prop_decode_never_panics(text in ".{0,64}") {
                let _ = decode::<Quote>(&text);
            }
        }
    }
}
