//! Fuzz test for the cache payload decoder
//!
//! Feeds arbitrary text to `codec::decode` for every record type. Decoding
//! must return an error for bad payloads, never panic, and anything that
//! decodes must encode again.
//!
//! Run with: cargo +nightly fuzz run codec_decode_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use tradecache_core::{AccountSummary, Bar, Position, Quote};
use tradecache_storage::{codec, CacheRecord};

fn check<T: CacheRecord>(input: &str) {
    if let Ok(records) = codec::decode::<T>(input) {
        let text = codec::encode(&records).expect("decoded records must re-encode");
        let again = codec::decode::<T>(&text).expect("re-encoded payload must decode");
        assert_eq!(again.len(), records.len());
    }
}

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        check::<Quote>(input);
        check::<Bar>(input);
        check::<Position>(input);
        check::<AccountSummary>(input);
    }
});
