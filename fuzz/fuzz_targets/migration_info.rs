//! Fuzz target for migration descriptors.
//!
//! Builds descriptors from arbitrary table names and source paths and checks
//! that accepted ones produce well-formed schema names and view statements.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_migration_info
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tidal_migrate::{MigrationInfo, SCHEMA_PREFIX, normalize_path};

#[derive(Debug, Arbitrary)]
struct FuzzInfo {
    target_table: String,
    source_table: String,
    source_path: Option<String>,
}

fuzz_target!(|input: FuzzInfo| {
    let info = match &input.source_path {
        Some(path) => MigrationInfo::with_source_database(
            input.target_table.as_str(),
            input.source_table.as_str(),
            path,
        ),
        None => MigrationInfo::new(input.target_table.as_str(), input.source_table.as_str()),
    };
    let Ok(info) = info else {
        return;
    };

    if let Some(path) = info.source_path() {
        assert!(info.source_schema().starts_with(SCHEMA_PREFIX));
        assert_eq!(normalize_path(path), path);
    }

    let create = info.statement_for_creating_unioned_view().to_sql();
    assert!(create.starts_with("CREATE TEMP VIEW"));
    let drop = info.statement_for_dropping_unioned_view().to_sql();
    assert!(drop.starts_with("DROP VIEW"));
});
