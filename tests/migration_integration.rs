//! Integration tests for the migration engine on real database files.
//!
//! These tests play the row-copy driver by hand: they move rows and drop
//! source tables on separate connections, then check what handles running
//! the migration stage see.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{FaultyHandle, Fixture, count};
use pretty_assertions::assert_eq;
use tidal::migrate::{MigrationConfig, MigrationSetting, schema_name_for};
use tidal::sqlite::{Handle, HandleConfig, SchemaOrigin, Statement};

fn same_database_setting(fixture: &Fixture) -> Arc<MigrationSetting> {
    Arc::new(
        MigrationSetting::builder(fixture.main_path())
            .table("msg", "old_msg")
            .expect("Failed to register table")
            .build(),
    )
}

fn seed_same_database(fixture: &Fixture) {
    fixture.run(
        "main.db",
        "CREATE TABLE msg (id INTEGER PRIMARY KEY, body TEXT);
         CREATE TABLE old_msg (id INTEGER PRIMARY KEY, body TEXT);
         INSERT INTO old_msg VALUES (1, 'a'), (2, 'b'), (3, 'c');
         INSERT INTO msg VALUES (4, 'd');",
    );
}

/// A view unions the rows still in the source with the migrated ones.
#[test]
fn test_view_unions_source_and_target() {
    let fixture = Fixture::new();
    seed_same_database(&fixture);
    let setting = same_database_setting(&fixture);
    let config = MigrationConfig::new(setting.clone());

    let mut handle = fixture.open_main();
    config.invoke(&mut handle).expect("Failed to invoke");

    assert!(handle.view_exists("temp", "msg").unwrap());
    assert_eq!(count(&handle, "msg"), 4);

    let ids: Vec<i64> = handle
        .query_column("SELECT id FROM msg ORDER BY id")
        .unwrap();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(!setting.is_migrated("msg"));
}

/// Rows the driver moves stay visible exactly once.
#[test]
fn test_rows_visible_once_while_moving() {
    let fixture = Fixture::new();
    seed_same_database(&fixture);
    let config = MigrationConfig::new(same_database_setting(&fixture));

    let mut handle = fixture.open_main();
    config.invoke(&mut handle).unwrap();

    fixture.run_batch(
        "main.db",
        "INSERT INTO msg SELECT * FROM old_msg WHERE id <= 2;
         DELETE FROM old_msg WHERE id <= 2;",
    );

    assert_eq!(count(&handle, "msg"), 4);
    let physical: i64 = handle.query_scalar("SELECT count(*) FROM main.msg").unwrap();
    assert_eq!(physical, 3);
}

/// Once the source is gone the view is retired and the table is done.
#[test]
fn test_dropped_source_finishes_table() {
    let fixture = Fixture::new();
    seed_same_database(&fixture);
    let migrated = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let setting = {
        let migrated = migrated.clone();
        Arc::new(
            MigrationSetting::builder(fixture.main_path())
                .table("msg", "old_msg")
                .unwrap()
                .on_migrated(move |info| migrated.lock().push(info.target_table().to_string()))
                .build(),
        )
    };
    let config = MigrationConfig::new(setting.clone());

    let mut handle = fixture.open_main();
    config.invoke(&mut handle).unwrap();

    fixture.run_batch(
        "main.db",
        "INSERT INTO msg SELECT * FROM old_msg;
         DROP TABLE old_msg;",
    );

    config.invoke(&mut handle).unwrap();

    assert!(setting.is_migrated("msg"));
    assert!(setting.is_all_migrated());
    assert!(!handle.view_exists("temp", "msg").unwrap());
    assert_eq!(count(&handle, "msg"), 4);
    assert_eq!(*migrated.lock(), vec!["msg".to_string()]);
}

/// A fresh handle on an already migrated database sees the physical table.
#[test]
fn test_handle_opened_after_completion() {
    let fixture = Fixture::new();
    fixture.run("main.db", "CREATE TABLE msg (id INTEGER PRIMARY KEY)");
    let setting = same_database_setting(&fixture);
    let config = MigrationConfig::new(setting.clone());

    let mut first = fixture.open_main();
    config.invoke(&mut first).unwrap();
    assert!(setting.is_migrated("msg"));

    let mut second = fixture.open_main();
    let before = second.stats();
    config.invoke(&mut second).unwrap();
    assert_eq!(second.stats().schema_changes, before.schema_changes);
    assert!(!second.view_exists("temp", "msg").unwrap());
}

/// Sources in another file are attached while needed and detached after.
#[test]
fn test_cross_database_attach_and_detach() {
    let fixture = Fixture::new();
    fixture.run(
        "legacy.db",
        "CREATE TABLE message (id INTEGER PRIMARY KEY, body TEXT);
         INSERT INTO message VALUES (1, 'a'), (2, 'b');",
    );
    fixture.run(
        "main.db",
        "CREATE TABLE message (id INTEGER PRIMARY KEY, body TEXT);
         INSERT INTO message VALUES (3, 'c');",
    );

    let legacy = fixture.path("legacy.db");
    let schema = schema_name_for(&legacy);
    let setting = Arc::new(
        MigrationSetting::builder(fixture.main_path())
            .table_from("message", "message", &legacy)
            .unwrap()
            .build(),
    );
    let config = MigrationConfig::new(setting.clone());

    let mut handle = fixture.open_main();
    config.invoke(&mut handle).unwrap();

    let attached = handle.attached_schemas().unwrap();
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[&schema].origin, SchemaOrigin::Migration);
    assert_eq!(count(&handle, "message"), 3);

    // The driver finishes the table in the source file.
    fixture.run("legacy.db", "DROP TABLE message");

    config.invoke(&mut handle).unwrap();
    assert!(setting.is_migrated("message"));
    assert!(handle.attached_schemas().unwrap().is_empty());
    assert_eq!(count(&handle, "message"), 1);
}

/// The attached set converges: needed schemas are attached, stale engine
/// schemas are detached, application schemas are left alone.
#[test]
fn test_attach_set_converges() {
    let fixture = Fixture::new();
    for (file, table) in [("a.db", "alpha"), ("b.db", "beta")] {
        fixture.run(file, &format!("CREATE TABLE {} (id INTEGER PRIMARY KEY)", table));
        fixture.run("main.db", &format!("CREATE TABLE {} (id INTEGER PRIMARY KEY)", table));
    }
    fixture.run("c.db", "CREATE TABLE app (id INTEGER PRIMARY KEY)");
    fixture.run("d.db", "CREATE TABLE gone (id INTEGER PRIMARY KEY)");

    let setting = Arc::new(
        MigrationSetting::builder(fixture.main_path())
            .table_from("alpha", "alpha", fixture.path("a.db"))
            .unwrap()
            .table_from("beta", "beta", fixture.path("b.db"))
            .unwrap()
            .build(),
    );
    let config = MigrationConfig::new(setting);

    let stale = format!("{}deadbeefdeadbeef", tidal::migrate::SCHEMA_PREFIX);
    let mut handle = fixture.open_main();
    handle
        .execute(&Statement::attach(
            fixture.path("c.db").to_str().unwrap(),
            "app_c",
        ))
        .unwrap();
    handle
        .attach(
            fixture.path("d.db").to_str().unwrap(),
            &stale,
            SchemaOrigin::Migration,
        )
        .unwrap();

    config.invoke(&mut handle).unwrap();

    let mut names: Vec<String> = handle.attached_schemas().unwrap().into_keys().collect();
    names.sort();
    let mut expected = vec![
        "app_c".to_string(),
        schema_name_for(&fixture.path("a.db")),
        schema_name_for(&fixture.path("b.db")),
    ];
    expected.sort();
    assert_eq!(names, expected);
}

/// Invoking twice changes nothing the second time.
#[test]
fn test_invoke_is_idempotent() {
    let fixture = Fixture::new();
    seed_same_database(&fixture);
    fixture.run("legacy.db", "CREATE TABLE contact (id INTEGER PRIMARY KEY)");
    fixture.run("main.db", "CREATE TABLE contact (id INTEGER PRIMARY KEY)");

    let setting = Arc::new(
        MigrationSetting::builder(fixture.main_path())
            .table("msg", "old_msg")
            .unwrap()
            .table_from("contact", "contact", fixture.path("legacy.db"))
            .unwrap()
            .build(),
    );
    let config = MigrationConfig::new(setting);

    let mut handle = fixture.open_main();
    config.invoke(&mut handle).unwrap();
    let first = handle.stats();
    assert!(first.schema_changes > 0);

    config.invoke(&mut handle).unwrap();
    assert_eq!(handle.stats().schema_changes, first.schema_changes);
    assert_eq!(count(&handle, "msg"), 4);
}

/// A sibling handle drops its view once another handle finished the table.
#[test]
fn test_sibling_view_retired() {
    let fixture = Fixture::new();
    seed_same_database(&fixture);
    let migrated = Arc::new(parking_lot::Mutex::new(0));
    let setting = {
        let migrated = migrated.clone();
        Arc::new(
            MigrationSetting::builder(fixture.main_path())
                .table("msg", "old_msg")
                .unwrap()
                .on_migrated(move |_| *migrated.lock() += 1)
                .build(),
        )
    };
    let config = MigrationConfig::new(setting.clone());

    let mut first = fixture.open_main();
    let mut second = fixture.open_main();
    config.invoke(&mut first).unwrap();
    config.invoke(&mut second).unwrap();
    assert!(second.view_exists("temp", "msg").unwrap());

    fixture.run("main.db", "DROP TABLE old_msg");

    config.invoke(&mut first).unwrap();
    assert!(setting.is_migrated("msg"));
    assert!(second.view_exists("temp", "msg").unwrap());

    config.invoke(&mut second).unwrap();
    assert!(!second.view_exists("temp", "msg").unwrap());
    assert_eq!(count(&second, "msg"), 1);
    assert_eq!(*migrated.lock(), 1);
}

/// A failure while retiring views rolls back every drop and marks nothing.
#[test]
fn test_retirement_is_atomic() {
    let fixture = Fixture::new();
    fixture.run(
        "main.db",
        "CREATE TABLE t1 (id INTEGER PRIMARY KEY);
         CREATE TABLE s1 (id INTEGER PRIMARY KEY);
         CREATE TABLE t2 (id INTEGER PRIMARY KEY);
         CREATE TABLE s2 (id INTEGER PRIMARY KEY);",
    );
    let setting = Arc::new(
        MigrationSetting::builder(fixture.main_path())
            .table("t1", "s1")
            .unwrap()
            .table("t2", "s2")
            .unwrap()
            .build(),
    );
    let config = MigrationConfig::new(setting.clone());

    let mut handle = FaultyHandle::new(fixture.open_main());
    config.invoke(&mut handle).unwrap();
    assert!(handle.view_exists("temp", "t1").unwrap());
    assert!(handle.view_exists("temp", "t2").unwrap());

    fixture.run("main.db", "DROP TABLE s1; DROP TABLE s2;");

    handle.fail_dropping("t2");
    assert!(config.invoke(&mut handle).is_err());
    assert!(!setting.is_migrated("t1"));
    assert!(!setting.is_migrated("t2"));
    assert!(handle.view_exists("temp", "t1").unwrap());
    assert!(handle.inner().connection().is_autocommit());

    handle.heal();
    config.invoke(&mut handle).unwrap();
    assert!(setting.is_all_migrated());
    assert!(!handle.view_exists("temp", "t1").unwrap());
    assert!(!handle.view_exists("temp", "t2").unwrap());
}

/// A failure while creating views rolls back every view of the pass.
#[test]
fn test_view_creation_is_atomic() {
    let fixture = Fixture::new();
    fixture.run(
        "main.db",
        "CREATE TABLE t1 (id INTEGER PRIMARY KEY);
         CREATE TABLE s1 (id INTEGER PRIMARY KEY);
         CREATE TABLE t2 (id INTEGER PRIMARY KEY);
         CREATE TABLE s2 (id INTEGER PRIMARY KEY);",
    );
    let setting = Arc::new(
        MigrationSetting::builder(fixture.main_path())
            .table("t1", "s1")
            .unwrap()
            .table("t2", "s2")
            .unwrap()
            .build(),
    );
    let config = MigrationConfig::new(setting.clone());

    let mut handle = FaultyHandle::new(fixture.open_main());
    handle.fail_creating("t2");
    assert!(config.invoke(&mut handle).is_err());
    assert!(!handle.view_exists("temp", "t1").unwrap());
    assert!(!handle.view_exists("temp", "t2").unwrap());
    assert!(handle.inner().connection().is_autocommit());
    assert_eq!(setting.pending_tables(), vec!["t1", "t2"]);

    handle.heal();
    config.invoke(&mut handle).unwrap();
    assert!(handle.view_exists("temp", "t1").unwrap());
    assert!(handle.view_exists("temp", "t2").unwrap());
}

/// The unioned view is read-only; writes address the physical tables.
#[test]
fn test_writes_through_physical_names() {
    let fixture = Fixture::new();
    seed_same_database(&fixture);
    let setting = same_database_setting(&fixture);
    let config = MigrationConfig::new(setting.clone());

    let mut handle = fixture.open_main();
    config.invoke(&mut handle).unwrap();
    assert!(
        handle
            .execute(&Statement::raw("INSERT INTO msg VALUES (9, 'z')"))
            .is_err()
    );

    let info = setting.shared_lock().read().info("msg").cloned().unwrap();
    for sql in [
        format!("INSERT INTO {} VALUES (9, 'z')", info.physical_target()),
        format!("DELETE FROM {} WHERE id = 1", info.physical_source()),
        format!("UPDATE {} SET body = 'x' WHERE id = 2", info.physical_source()),
        format!("UPDATE {} SET body = 'y' WHERE id = 4", info.physical_target()),
    ] {
        handle.execute(&Statement::raw(sql)).unwrap();
    }

    let ids: Vec<i64> = handle.query_column("SELECT id FROM msg ORDER BY id").unwrap();
    assert_eq!(ids, vec![2, 3, 4, 9]);
    let bodies: Vec<String> = handle
        .query_column("SELECT body FROM msg WHERE id IN (2, 4) ORDER BY id")
        .unwrap();
    assert_eq!(bodies, vec!["x".to_string(), "y".to_string()]);
}

/// Schema names are derived from the normalized source path.
#[test]
fn test_schema_name_ignores_path_spelling() {
    let fixture = Fixture::new();
    let plain = fixture.path("legacy.db");
    let dotted = fixture.path("sub/../legacy.db");
    assert_eq!(
        schema_name_for(&plain),
        schema_name_for(&dotted),
    );
    assert!(schema_name_for(Path::new("/x.db")).starts_with(tidal::migrate::SCHEMA_PREFIX));
}
