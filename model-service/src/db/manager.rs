//! Ordered schema migrations and the bookkeeping of which ones have run.

use std::sync::Arc;

use anyhow::Context;
use log::info;
use rusqlite::{OptionalExtension, Transaction};
use thiserror::Error;

use super::migration::Migration;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MigrationError {
    #[error("schema version {found} is newer than the {known} migration(s) this build knows")]
    UnknownVersion { found: u64, known: u64 },

    #[error("cannot downgrade schema from {from} to {to}")]
    Downgrade { from: u64, to: u64 },
}

pub trait MigrationManager {
    fn register_migration(&mut self, migration: Arc<dyn Migration>);

    /// Create the version table if the database has never been migrated.
    fn initialize(&self, txn: &Transaction) -> anyhow::Result<()>;

    /// Number of migrations already applied, 0 for a fresh database.
    fn current_version(&self, txn: &Transaction) -> anyhow::Result<u64>;

    fn target_version(&self) -> u64;

    fn upgrade(&self, txn: &Transaction, from: u64, to: u64) -> anyhow::Result<()>;

    /// Bring the schema up to [MigrationManager::target_version].
    fn migrate(&self, txn: &Transaction) -> anyhow::Result<u64> {
        self.initialize(txn)?;
        let current = self.current_version(txn)?;
        let target = self.target_version();
        self.upgrade(txn, current, target)?;
        Ok(target)
    }
}

/// Applies migrations one after another in registration order. Version `n` means the first `n`
/// migrations have run.
#[derive(Default)]
pub struct LinearMigrationManager {
    migrations: Vec<Arc<dyn Migration>>,
}

impl LinearMigrationManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MigrationManager for LinearMigrationManager {
    fn register_migration(&mut self, migration: Arc<dyn Migration>) {
        self.migrations.push(migration);
    }

    fn initialize(&self, txn: &Transaction) -> anyhow::Result<()> {
        txn.execute_batch(
            r"
            create table if not exists schema_migrations (
                version     integer primary key,
                name        text not null,
                applied_at  text not null default (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            );
        ",
        )?;

        Ok(())
    }

    fn current_version(&self, txn: &Transaction) -> anyhow::Result<u64> {
        let version = txn
            .query_row("select max(version) from schema_migrations", [], |row| {
                row.get::<usize, Option<i64>>(0)
            })
            .optional()
            .context("failed to read schema version")?
            .flatten();

        Ok(version.map(|v| v as u64).unwrap_or(0))
    }

    fn target_version(&self) -> u64 {
        self.migrations.len() as u64
    }

    fn upgrade(&self, txn: &Transaction, from: u64, to: u64) -> anyhow::Result<()> {
        let known = self.target_version();
        if from > known || to > known {
            return Err(MigrationError::UnknownVersion {
                found: from.max(to),
                known,
            }
            .into());
        }
        if to < from {
            return Err(MigrationError::Downgrade { from, to }.into());
        }

        for (version, migration) in self.migrations[from as usize..to as usize]
            .iter()
            .enumerate()
            .map(|(i, m)| (from + i as u64 + 1, m))
        {
            info!("applying migration {} ({})", version, migration.name());
            migration
                .forward(txn)
                .with_context(|| format!("migration {} failed", migration.name()))?;
            txn.execute(
                "insert into schema_migrations (version, name) values (?1, ?2)",
                rusqlite::params![version as i64, migration.name()],
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use rusqlite::Connection;

    use super::{LinearMigrationManager, MigrationError, MigrationManager};
    use crate::db::migration::V0;

    #[test]
    pub fn migrate_is_recorded_and_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut manager = LinearMigrationManager::new();
        manager.register_migration(Arc::new(V0));

        let txn = conn.transaction().unwrap();
        manager.initialize(&txn).unwrap();
        assert_eq!(manager.current_version(&txn).unwrap(), 0);
        assert_eq!(manager.migrate(&txn).unwrap(), 1);
        assert_eq!(manager.current_version(&txn).unwrap(), 1);

        // Already current: nothing to do.
        assert_eq!(manager.migrate(&txn).unwrap(), 1);
        txn.commit().unwrap();

        let names: Vec<String> = conn
            .prepare("select name from schema_migrations")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(names, vec!["models and instances".to_owned()]);
    }

    #[test]
    pub fn invalid_ranges_are_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut manager = LinearMigrationManager::new();
        manager.register_migration(Arc::new(V0));

        let txn = conn.transaction().unwrap();
        manager.initialize(&txn).unwrap();

        let downgrade = manager.upgrade(&txn, 1, 0).unwrap_err();
        assert_eq!(
            downgrade.downcast_ref::<MigrationError>(),
            Some(&MigrationError::Downgrade { from: 1, to: 0 })
        );
        let unknown = manager.upgrade(&txn, 0, 2).unwrap_err();
        assert_eq!(
            unknown.downcast_ref::<MigrationError>(),
            Some(&MigrationError::UnknownVersion { found: 2, known: 1 })
        );
    }
}
