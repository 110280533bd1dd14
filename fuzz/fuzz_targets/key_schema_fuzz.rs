//! Fuzz test for cache key derivation
//!
//! Splits arbitrary input into parameter names and values and checks that
//! derived keys keep their segment structure: every segment after the
//! resource type is `name=value` with no separator leaking from user input.
//!
//! Run with: cargo +nightly fuzz run key_schema_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use tradecache_core::ResourceType;
use tradecache_storage::{KeyParams, KeySchema};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let mut params = KeyParams::new();
    for (i, chunk) in input.split('\n').take(8).enumerate() {
        let name = if i == 0 { "symbol".to_string() } else { format!("p{}", i) };
        params = params.with(name, chunk);
    }
    params = params.with("timeframe", input);

    let schema = KeySchema::default();
    for resource in [ResourceType::StockQuote, ResourceType::StockBars] {
        let key = schema
            .get_key(resource, &params)
            .expect("required params are present");

        let mut segments = key.split(':');
        assert_eq!(segments.next(), Some("cache"));
        assert_eq!(segments.next(), Some(resource.as_str()));
        for segment in segments {
            assert_eq!(segment.matches('=').count(), 1, "bad segment {:?}", segment);
            assert!(!segment.contains(char::is_whitespace));
        }
    }
});
