//! Fuzz target for the SQLite URL parser.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_url_parser
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use tidal_sqlite::SqliteConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // The parser should never panic, only return errors
        if let Ok(config) = SqliteConfig::from_url(input) {
            let _ = config.pragmas().to_sql();
        }
    }
});
