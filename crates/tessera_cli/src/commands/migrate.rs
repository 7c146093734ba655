//! Migration commands.

use serde_json::json;
use tessera_core::migration::{MigrationState, MigrationStatus, RevertReport};
use tessera_core::Adapter;
use tracing::info;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Write an empty migration file.
pub fn create(adapter: &Adapter, name: &str) -> CommandResult {
    let created = adapter.migrations().create_migration(name)?;
    println!("✓ Created migration {}", created.name);
    println!("  {}", created.path.display());
    Ok(())
}

/// Apply pending migrations.
pub fn run(adapter: &Adapter) -> CommandResult {
    info!(database = %adapter.config().backend, "running migrations");
    let report = adapter.migrations().migrate()?;

    match report.batch {
        None => println!("✓ No pending migrations to run."),
        Some(batch) => {
            println!(
                "✓ Applied {} migration(s) in batch {batch}",
                report.applied.len()
            );
            for name in &report.applied {
                println!("  {name}");
            }
        }
    }
    Ok(())
}

/// Show migration status.
pub fn status(adapter: &Adapter, format: &str) -> CommandResult {
    let statuses = adapter.migrations().migrate_status()?;

    match format {
        "json" => {
            let rows: Vec<_> = statuses.iter().map(status_json).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        "text" => print_status(&statuses),
        other => return Err(format!("unknown output format '{other}'").into()),
    }
    Ok(())
}

/// Drop everything and re-apply all migrations.
pub fn fresh(adapter: &Adapter, force_accept_warning: bool) -> CommandResult {
    if !force_accept_warning {
        println!("⚠ migrate:fresh deletes every collection and all of its data.");
        println!("  Re-run with --force-accept-warning to continue.");
    }
    let report = adapter.migrations().migrate_fresh(force_accept_warning)?;
    println!(
        "✓ Dropped all collections and applied {} migration(s)",
        report.applied.len()
    );
    Ok(())
}

/// Revert the latest batch.
pub fn down(adapter: &Adapter) -> CommandResult {
    let report = adapter.migrations().migrate_down()?;
    print_revert(&report);
    Ok(())
}

/// Revert every batch.
pub fn reset(adapter: &Adapter) -> CommandResult {
    let report = adapter.migrations().migrate_reset()?;
    print_revert(&report);
    Ok(())
}

/// Revert every batch, then migrate.
pub fn refresh(adapter: &Adapter) -> CommandResult {
    let report = adapter.migrations().migrate_refresh()?;
    print_revert(&report.reverted);
    println!(
        "✓ Applied {} migration(s)",
        report.migrated.applied.len()
    );
    Ok(())
}

fn print_status(statuses: &[MigrationStatus]) {
    println!("Migration Status");
    println!("================");

    if statuses.is_empty() {
        println!("  No migrations found.");
        return;
    }

    for status in statuses {
        let label = match status.state {
            MigrationState::Applied => "✓ applied",
            MigrationState::Pending => "○ pending",
            MigrationState::Missing => "? missing",
        };
        match (status.batch, &status.executed_at) {
            (Some(batch), Some(at)) => {
                println!("  {} [{label}, batch {batch}, {at}]", status.name);
            }
            _ => println!("  {} [{label}]", status.name),
        }
    }
}

fn status_json(status: &MigrationStatus) -> serde_json::Value {
    let state = match status.state {
        MigrationState::Applied => "applied",
        MigrationState::Pending => "pending",
        MigrationState::Missing => "missing",
    };
    json!({
        "name": status.name,
        "state": state,
        "batch": status.batch,
        "executedAt": status.executed_at,
    })
}

fn print_revert(report: &RevertReport) {
    if report.reverted.is_empty() {
        println!("✓ Nothing to revert.");
    } else {
        println!("✓ Reverted {} migration(s)", report.reverted.len());
        for name in &report.reverted {
            println!("  {name}");
        }
    }
    for name in &report.skipped {
        println!("  ⚠ Skipped {name}: no definition loaded");
    }
}
