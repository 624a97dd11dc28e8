//! Fuzz target for buffer key parsing.
//!
//! Arbitrary strings must either parse into a well-formed key or return an
//! error, never panic.

#![no_main]

use hd_pager::paging::BufferKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(key) = BufferKey::new(data) {
        assert!(key.as_str().starts_with('/'));
        let reparsed = BufferKey::new(key.as_str()).expect("canonical key must reparse");
        assert_eq!(reparsed, key);
        let _ = key.parent();
        let _ = key.depth();
    }
});
