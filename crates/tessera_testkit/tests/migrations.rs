//! Migration engine behaviour on real adapters.

use serde_json::json;
use std::fs;
use tessera_core::migration::{MigrationState, MIGRATIONS_COLLECTION};
use tessera_core::{AdapterResult, Migration, MigrationContext};
use tessera_testkit::prelude::*;
use tessera_testkit::scenarios::collection_with_index;

/// Creates a collection on the way up and drops it on the way down.
struct CreatesCollection {
    name: &'static str,
    collection: &'static str,
}

impl Migration for CreatesCollection {
    fn name(&self) -> &str {
        self.name
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> AdapterResult<()> {
        ctx.create_collection(self.collection)
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> AdapterResult<()> {
        ctx.drop_collection(self.collection)
    }
}

/// Fails in whichever direction is configured.
struct Broken {
    name: &'static str,
    up_fails: bool,
}

impl Migration for Broken {
    fn name(&self) -> &str {
        self.name
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> AdapterResult<()> {
        ctx.insert("audit", doc(json!({"step": self.name})))?;
        if self.up_fails {
            return Err(AdapterError::invalid_operation("up exploded"));
        }
        Ok(())
    }

    fn down(&self, _ctx: &mut MigrationContext<'_>) -> AdapterResult<()> {
        Err(AdapterError::invalid_operation("down exploded"))
    }
}

fn record_count(adapter: &TestAdapter) -> usize {
    adapter
        .operations()
        .count(None, MIGRATIONS_COLLECTION, &Where::All)
        .unwrap()
}

#[test]
fn migrate_twice_is_a_no_op_the_second_time() {
    with_each_backend(|adapter| {
        write_migration(
            &adapter.migration_dir(),
            "20240101_000000_users",
            &collection_with_index("users", "email"),
        );
        let engine = adapter.migrations();

        let first = engine.migrate().unwrap();
        assert_eq!(first.batch, Some(1));
        assert_eq!(first.applied, vec!["20240101_000000_users".to_string()]);

        let second = engine.migrate().unwrap();
        assert_eq!(second.batch, None);
        assert!(second.applied.is_empty());
        assert_eq!(record_count(adapter), 1);
    });
}

#[test]
fn failed_batch_persists_no_records_and_no_changes() {
    with_each_backend(|adapter| {
        let mut engine = adapter.migrations();
        engine
            .register(CreatesCollection {
                name: "20240101_000000_posts",
                collection: "posts",
            })
            .unwrap();
        engine
            .register(Broken {
                name: "20240101_000001_broken",
                up_fails: true,
            })
            .unwrap();

        let err = engine.migrate().unwrap_err();
        match err {
            AdapterError::MigrationFailed { name, .. } => {
                assert_eq!(name, "20240101_000001_broken");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(record_count(adapter), 0);
        let collections = adapter.operations().collections(None).unwrap();
        assert!(!collections.contains(&"posts".to_string()));
        assert!(!collections.contains(&"audit".to_string()));
        assert!(adapter.registry().is_empty());
    });
}

#[test]
fn create_migrate_then_fresh_resets_to_batch_one() {
    with_each_backend(|adapter| {
        let engine = adapter.migrations();
        let created = engine.create_migration("add_index").unwrap();
        assert!(created.name.ends_with("_add_index"));
        assert!(created.path.starts_with(adapter.migration_dir()));

        let report = engine.migrate().unwrap();
        assert_eq!(report.batch, Some(1));
        let applied = engine.applied(None).unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].name, created.name);
        assert_eq!(applied[0].batch, 1);

        // a second batch, so fresh has something to collapse
        write_migration(
            &adapter.migration_dir(),
            "99990101_000000_later",
            &collection_with_index("tags", "slug"),
        );
        assert_eq!(engine.migrate().unwrap().batch, Some(2));

        let fresh = engine.migrate_fresh(true).unwrap();
        assert_eq!(fresh.batch, Some(1));
        let applied = engine.applied(None).unwrap();
        assert_eq!(applied.len(), 2);
        assert!(applied.iter().all(|r| r.batch == 1));
    });
}

#[test]
fn fresh_requires_acknowledgement() {
    with_each_backend(|adapter| {
        let ids = scenarios::populated_collection(adapter, "posts", 2);
        let engine = adapter.migrations();
        assert!(matches!(
            engine.migrate_fresh(false),
            Err(AdapterError::FreshNotAcknowledged)
        ));
        assert_eq!(
            adapter.operations().count(None, "posts", &Where::All).unwrap(),
            ids.len()
        );
    });
}

#[test]
fn fresh_drops_data_outside_migrations() {
    with_each_backend(|adapter| {
        scenarios::populated_collection(adapter, "scratch", 3);
        write_migration(
            &adapter.migration_dir(),
            "20240101_000000_users",
            &collection_with_index("users", "email"),
        );
        adapter.migrations().migrate_fresh(true).unwrap();

        let collections = adapter.operations().collections(None).unwrap();
        assert!(!collections.contains(&"scratch".to_string()));
        assert!(collections.contains(&"users".to_string()));
    });
}

#[test]
fn down_reverts_only_the_newest_batch() {
    with_each_backend(|adapter| {
        let dir = adapter.migration_dir();
        let engine = adapter.migrations();
        write_migration(&dir, "20240101_000000_users", &collection_with_index("users", "email"));
        engine.migrate().unwrap();
        write_migration(&dir, "20240102_000000_tags", &collection_with_index("tags", "slug"));
        engine.migrate().unwrap();

        let report = engine.migrate_down().unwrap();
        assert_eq!(report.reverted, vec!["20240102_000000_tags".to_string()]);

        let status = engine.migrate_status().unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].state, MigrationState::Applied);
        assert_eq!(status[1].state, MigrationState::Pending);

        let collections = adapter.operations().collections(None).unwrap();
        assert!(collections.contains(&"users".to_string()));
        assert!(!collections.contains(&"tags".to_string()));
    });
}

#[test]
fn reset_and_refresh_replay_every_migration() {
    with_each_backend(|adapter| {
        let dir = adapter.migration_dir();
        let engine = adapter.migrations();
        write_migration(&dir, "20240101_000000_users", &collection_with_index("users", "email"));
        engine.migrate().unwrap();
        write_migration(&dir, "20240102_000000_tags", &collection_with_index("tags", "slug"));
        engine.migrate().unwrap();

        let refreshed = engine.migrate_refresh().unwrap();
        assert_eq!(
            refreshed.reverted.reverted,
            vec!["20240102_000000_tags".to_string(), "20240101_000000_users".to_string()]
        );
        assert_eq!(refreshed.migrated.batch, Some(1));
        assert_eq!(refreshed.migrated.applied.len(), 2);

        let reset = engine.migrate_reset().unwrap();
        assert_eq!(reset.reverted.len(), 2);
        assert_eq!(record_count(adapter), 0);
        assert!(engine
            .migrate_status()
            .unwrap()
            .iter()
            .all(|s| s.state == MigrationState::Pending));
    });
}

#[test]
fn failed_down_stops_but_keeps_earlier_reverts() {
    with_each_backend(|adapter| {
        let mut engine = adapter.migrations();
        engine
            .register(Broken {
                name: "20240101_000000_broken_down",
                up_fails: false,
            })
            .unwrap();
        engine
            .register(CreatesCollection {
                name: "20240101_000001_posts",
                collection: "posts",
            })
            .unwrap();
        engine.migrate().unwrap();

        let err = engine.migrate_down().unwrap_err();
        assert!(matches!(err, AdapterError::MigrationFailed { .. }));

        // the newer migration was reverted before the failure
        let applied = engine.applied(None).unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].name, "20240101_000000_broken_down");
        assert!(!adapter
            .operations()
            .collections(None)
            .unwrap()
            .contains(&"posts".to_string()));
    });
}

#[test]
fn missing_definition_is_skipped_and_reported() {
    with_each_backend(|adapter| {
        let path = write_migration(
            &adapter.migration_dir(),
            "20240101_000000_users",
            &collection_with_index("users", "email"),
        );
        let engine = adapter.migrations();
        engine.migrate().unwrap();
        fs::remove_file(path).unwrap();

        let status = engine.migrate_status().unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].state, MigrationState::Missing);
        assert_eq!(status[0].batch, Some(1));

        let report = engine.migrate_down().unwrap();
        assert!(report.reverted.is_empty());
        assert_eq!(report.skipped, vec!["20240101_000000_users".to_string()]);
        assert_eq!(record_count(adapter), 1);
    });
}

#[test]
fn duplicate_names_are_rejected() {
    with_each_backend(|adapter| {
        write_migration(
            &adapter.migration_dir(),
            "20240101_000000_users",
            &collection_with_index("users", "email"),
        );
        let mut engine = adapter.migrations();
        engine
            .register(CreatesCollection {
                name: "20240101_000000_users",
                collection: "users",
            })
            .unwrap();

        assert!(matches!(
            engine.migrate(),
            Err(AdapterError::DuplicateMigrationName { .. })
        ));
        assert!(matches!(
            engine.register(CreatesCollection {
                name: "20240101_000000_users",
                collection: "users",
            }),
            Err(AdapterError::DuplicateMigrationName { .. })
        ));
    });
}

#[test]
fn migrations_survive_reconnect() {
    with_each_file_backend(|adapter| {
        write_migration(
            &adapter.migration_dir(),
            "20240101_000000_users",
            &collection_with_index("users", "email"),
        );
        adapter.migrations().migrate().unwrap();

        let adapter = adapter.reopen();
        let status = adapter.migrations().migrate_status().unwrap();
        assert_eq!(status[0].state, MigrationState::Applied);
        assert_eq!(adapter.migrations().migrate().unwrap().batch, None);
    });
}

#[test]
fn relational_tables_must_be_migrated_without_schema_push() {
    let adapter =
        TestAdapter::with_config(AdapterConfig::default().backend(BackendKind::Relational).push_schema(false));
    let ops = adapter.operations();
    assert!(matches!(
        ops.create(None, "users", doc(json!({"email": "a@example.com"}))),
        Err(AdapterError::Validation { .. })
    ));

    write_migration(
        &adapter.migration_dir(),
        "20240101_000000_users",
        &collection_with_index("users", "email"),
    );
    adapter.migrations().migrate().unwrap();
    ops.create(None, "users", doc(json!({"email": "a@example.com"})))
        .unwrap();
}
