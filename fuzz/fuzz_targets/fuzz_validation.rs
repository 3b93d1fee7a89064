//! Fuzz testing for request input validation.
//!
//! Every function here sees raw client input (the `Authorization` header and
//! path parameters) before any lookup runs, so none of them may panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `validate_token_plaintext`: bearer token shape check
//! - `parse_id_param`: positive id parsing for `/v1/movies/{id}`

#![no_main]

use greenlight::validation::{parse_id_param, validate_token_plaintext};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let token_ok = validate_token_plaintext(s).is_ok();

        // An accepted token is always 26 bytes of the base32 alphabet
        if token_ok {
            assert_eq!(s.len(), 26);
        }

        // Any id that parses is positive
        if let Ok(id) = parse_id_param(s) {
            assert!(id >= 1);
        }
    }
});
