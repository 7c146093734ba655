//! Test fixtures and adapter helpers.
//!
//! Provides convenience functions for setting up connected adapters
//! and common test scenarios.

use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tessera_core::{Adapter, AdapterConfig, BackendKind, Document};
use tessera_journal::encode_frame;

/// Every backend variant, in the order `with_each_backend` runs them.
pub const BACKENDS: [BackendKind; 2] = [BackendKind::Document, BackendKind::Relational];

/// A connected adapter with automatic cleanup.
///
/// Every fixture owns a temporary directory holding `migrations/`; file
/// fixtures also keep their data under `data/`.
pub struct TestAdapter {
    /// The adapter instance.
    pub adapter: Adapter,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestAdapter {
    /// Creates an in-memory adapter for `kind`.
    pub fn memory(kind: BackendKind) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = AdapterConfig::default()
            .backend(kind)
            .migration_dir(temp_dir.path().join("migrations"));
        Self::open(config, temp_dir)
    }

    /// Creates a directory-backed adapter for `kind`.
    pub fn file(kind: BackendKind) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = AdapterConfig::default()
            .backend(kind)
            .directory(temp_dir.path().join("data"))
            .migration_dir(temp_dir.path().join("migrations"));
        Self::open(config, temp_dir)
    }

    /// Creates an in-memory adapter from a customised configuration.
    ///
    /// The migration directory is always pointed at the fixture's temp dir.
    pub fn with_config(config: AdapterConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = config.migration_dir(temp_dir.path().join("migrations"));
        Self::open(config, temp_dir)
    }

    fn open(config: AdapterConfig, temp_dir: TempDir) -> Self {
        let adapter = Adapter::open(config).expect("Failed to open adapter");
        Self { adapter, temp_dir }
    }

    /// Returns the fixture's temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the migration directory.
    pub fn migration_dir(&self) -> PathBuf {
        self.temp_dir.path().join("migrations")
    }

    /// Returns the journal path for file fixtures.
    pub fn journal_path(&self) -> PathBuf {
        self.temp_dir.path().join("data").join("journal.log")
    }

    /// Closes the adapter and opens a new one over the same directory.
    pub fn reopen(self) -> Self {
        let Self { adapter, temp_dir } = self;
        let config = adapter.config().clone();
        adapter.destroy().expect("Failed to close adapter");
        drop(adapter);
        Self::open(config, temp_dir)
    }
}

impl std::ops::Deref for TestAdapter {
    type Target = Adapter;

    fn deref(&self) -> &Self::Target {
        &self.adapter
    }
}

/// Runs a test once per backend, each with a fresh in-memory adapter.
///
/// # Example
///
/// ```rust,ignore
/// use tessera_testkit::with_each_backend;
///
/// #[test]
/// fn my_test() {
///     with_each_backend(|adapter| {
///         adapter.operations().create(None, "posts", doc(json!({"title": "a"}))).unwrap();
///     });
/// }
/// ```
pub fn with_each_backend<F>(mut f: F)
where
    F: FnMut(&TestAdapter),
{
    for kind in BACKENDS {
        let adapter = TestAdapter::memory(kind);
        f(&adapter);
    }
}

/// Runs a test once per backend with directory-backed adapters.
pub fn with_each_file_backend<F>(mut f: F)
where
    F: FnMut(TestAdapter),
{
    for kind in BACKENDS {
        f(TestAdapter::file(kind));
    }
}

/// Converts a JSON object literal into a [`Document`].
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Writes a migration file into `dir`.
pub fn write_migration(dir: &Path, name: &str, body: &Value) -> PathBuf {
    std::fs::create_dir_all(dir).expect("Failed to create migration directory");
    let path = dir.join(format!("{name}.json"));
    let text = serde_json::to_string_pretty(body).expect("Failed to encode migration");
    std::fs::write(&path, text).expect("Failed to write migration");
    path
}

/// Appends a frame cut off halfway, as a crash during append would leave it.
pub fn append_torn_frame(journal: &Path) {
    let frame = encode_frame(b"interrupted commit").expect("Failed to encode frame");
    let mut file = OpenOptions::new()
        .append(true)
        .open(journal)
        .expect("Failed to open journal");
    file.write_all(&frame[..frame.len() / 2])
        .expect("Failed to write torn frame");
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use serde_json::json;
    use tessera_core::ID_FIELD;

    /// Creates `count` committed documents in `collection` and returns their ids.
    pub fn populated_collection(adapter: &Adapter, collection: &str, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let created = adapter
                    .operations()
                    .create(None, collection, doc(json!({ "index": i })))
                    .expect("Failed to create document");
                created[ID_FIELD]
                    .as_str()
                    .expect("Created document has no id")
                    .to_string()
            })
            .collect()
    }

    /// A declarative migration creating `collection` with a unique index on `field`.
    pub fn collection_with_index(collection: &str, field: &str) -> Value {
        json!({
            "up": [
                { "op": "create_collection", "collection": collection },
                { "op": "create_index", "collection": collection, "field": field, "unique": true }
            ],
            "down": [
                { "op": "drop_collection", "collection": collection }
            ]
        })
    }
}
