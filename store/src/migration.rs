//! Database schema migration engine.
//!
//! Tracks a monotonically increasing schema version in the meta table and
//! runs sequential migration functions to bring an older database up to
//! date, all under the single write transaction opened by `Store::open`.

use heed::RwTxn;

use crate::meta::MetaStore;
use crate::StoreError;

/// The schema version that the current code expects.
pub const SCHEMA_VERSION: u32 = 2;

/// The oldest on-disk version we can upgrade from. Anything older predates
/// sideband storage and must be re-bootstrapped instead of walked.
pub const OLDEST_UPGRADABLE_VERSION: u32 = 1;

/// Runs database migrations to bring the schema up to date.
pub struct Migrator;

impl Migrator {
    /// Check the stored schema version and run any needed migrations.
    ///
    /// - Version 0 means a fresh database (no version stored yet).
    /// - If the stored version matches `SCHEMA_VERSION`, this is a no-op.
    /// - If the stored version is *higher* than what this code supports,
    ///   the database was written by a newer node and we refuse to open it.
    pub fn run(meta: &MetaStore, txn: &mut RwTxn) -> Result<(), StoreError> {
        let current = meta.version(txn)?;

        if current == SCHEMA_VERSION {
            tracing::debug!(version = current, "database schema is up to date");
            return Ok(());
        }

        if current > SCHEMA_VERSION {
            return Err(StoreError::VersionTooNew {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }

        if current != 0 && current < OLDEST_UPGRADABLE_VERSION {
            return Err(StoreError::VersionTooOld {
                found: current,
                oldest: OLDEST_UPGRADABLE_VERSION,
            });
        }

        if current == 0 {
            // Fresh database — stamp the current version and stop.
            meta.set_version(txn, SCHEMA_VERSION)?;
            tracing::info!(version = SCHEMA_VERSION, "initialized fresh database");
            return Ok(());
        }

        for version in current..SCHEMA_VERSION {
            tracing::info!(from = version, to = version + 1, "running migration");
            run_migration(version, version + 1)?;
        }

        meta.set_version(txn, SCHEMA_VERSION)?;
        tracing::info!(version = SCHEMA_VERSION, "migration complete");
        Ok(())
    }
}

fn run_migration(from: u32, to: u32) -> Result<(), StoreError> {
    match (from, to) {
        (1, 2) => {
            // Schema v2: pending entries gained the source-epoch field and
            // state blocks split into per-epoch generations. No v1 databases
            // exist outside dev networks, so there is no data to rewrite.
            Ok(())
        }
        _ => Err(StoreError::Backend(format!(
            "unknown migration: {} -> {}",
            from, to
        ))),
    }
}
