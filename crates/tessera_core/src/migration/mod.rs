//! Schema migrations.
//!
//! Migrations are applied in batches: one `migrate` run applies every
//! pending migration inside one transaction and records each of them in
//! the `_migrations` collection with the run's batch number. Reverting
//! (`migrate_down`, `migrate_reset`, `migrate_refresh`) is best-effort and
//! runs one transaction per migration.
//!
//! ## Usage
//!
//! ```ignore
//! use tessera_core::migration::{Migration, MigrationContext, MigrationEngine};
//!
//! struct AddEmailIndex;
//! impl Migration for AddEmailIndex {
//!     fn name(&self) -> &str { "20240101_000000_add_email_index" }
//!     fn up(&self, ctx: &mut MigrationContext<'_>) -> AdapterResult<()> {
//!         ctx.create_index("users", "email", true)
//!     }
//!     fn down(&self, ctx: &mut MigrationContext<'_>) -> AdapterResult<()> {
//!         ctx.drop_index("users", "email")
//!     }
//! }
//!
//! let mut engine = adapter.migrations();
//! engine.register(AddEmailIndex)?;
//! engine.migrate()?;
//! ```

mod declarative;
mod definition;
mod engine;
mod record;
mod set;

pub use declarative::{DeclarativeMigration, MigrationStep, MigrationSteps};
pub use definition::{Migration, MigrationContext, MigrationOperation};
pub use engine::{CreatedMigration, MigrationEngine};
pub use record::{
    MigrateReport, MigrationRecord, MigrationState, MigrationStatus, RefreshReport, RevertReport,
    MIGRATIONS_COLLECTION,
};
pub use set::MigrationSet;
