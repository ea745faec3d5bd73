//! Migration runner
//!
//! Brings a catalog database from whatever version it is stored at up to the
//! latest known migration. The version lives in a one-row `__version` table
//! and advances by exactly one per applied migration. Each migration runs in
//! its own transaction, so a failed step leaves the previous version intact.

use super::catalog::ScopedCatalog;
use super::connection::{finish, run_script, table_exists, Connection};
use super::migration::Migration;
use super::migrations;
use crate::error::{AppError, Result};
use sqlx::SqliteConnection;
use std::collections::BTreeSet;

/// Table holding the schema version counter
pub const VERSION_TABLE: &str = "__version";

/// Validated, ordered set of migrations `1..=N`
#[derive(Clone, Debug)]
pub struct MigrationRunner {
    migrations: Vec<Migration>,
}

impl MigrationRunner {
    /// Validate and order `migrations`. Declaration order does not matter;
    /// versions must be exactly `1..=N`.
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self> {
        if migrations.is_empty() {
            return Err(AppError::NoMigrations);
        }

        migrations.sort_by_key(Migration::version);

        let mut seen = BTreeSet::new();
        for migration in &migrations {
            if migration.version() == 0 {
                return Err(AppError::InvalidMigrationVersion(0));
            }
            if !seen.insert(migration.version()) {
                return Err(AppError::DuplicateMigrationVersion(migration.version()));
            }
        }

        for (index, migration) in migrations.iter().enumerate() {
            let expected = index as u32 + 1;
            if migration.version() != expected {
                return Err(AppError::MissingMigrationVersion(expected));
            }
        }

        Ok(Self { migrations })
    }

    /// Runner over the catalog's own migration history.
    pub fn catalog() -> Result<Self> {
        Self::new(migrations::all())
    }

    pub fn latest_version(&self) -> u32 {
        self.migrations.len() as u32
    }

    /// Stored schema version, or `None` if the database is uninitialized.
    pub async fn current_version(&self, conn: &Connection) -> Result<Option<u32>> {
        let mut db = conn.acquire().await?;
        read_version(&mut db).await
    }

    /// Initialize (if needed) and migrate to the latest version.
    /// Returns the number of migrations applied.
    pub async fn open(&self, conn: &Connection) -> Result<u32> {
        match self.current_version(conn).await? {
            None => self.initialize(conn).await,
            Some(_) => self.migrate(conn).await,
        }
    }

    /// Create the version table, apply migration 1, then migrate the rest.
    ///
    /// Table creation and the first migration share one transaction, so a
    /// failure leaves the database uninitialized rather than at version 0.
    pub async fn initialize(&self, conn: &Connection) -> Result<u32> {
        let mut tx = conn.begin().await?;
        let result = self.initialize_in(&mut tx).await;
        let initialized = finish(tx, result).await?;

        let applied = self.migrate(conn).await?;
        Ok(applied + u32::from(initialized))
    }

    async fn initialize_in(&self, conn: &mut SqliteConnection) -> Result<bool> {
        if table_exists(conn, VERSION_TABLE).await? {
            return Ok(false);
        }

        tracing::info!("Initializing catalog database");

        sqlx::query("CREATE TABLE __version (version INTEGER NOT NULL)")
            .execute(&mut *conn)
            .await?;
        sqlx::query("INSERT INTO __version (version) VALUES (0)")
            .execute(&mut *conn)
            .await?;

        apply_migration(conn, &self.migrations[0]).await?;
        Ok(true)
    }

    /// Apply every pending migration in ascending order.
    /// Returns the number of migrations applied.
    pub async fn migrate(&self, conn: &Connection) -> Result<u32> {
        let stored = self
            .current_version(conn)
            .await?
            .ok_or(AppError::DatabaseUninitialized)?;
        let latest = self.latest_version();

        if stored > latest {
            return Err(AppError::SchemaTooNew { stored, latest });
        }

        if stored == latest {
            tracing::debug!("Catalog schema is up to date at version {}", stored);
            return Ok(0);
        }

        tracing::info!("Migrating catalog schema from {} to {}", stored, latest);

        let mut applied = 0;
        for migration in self.migrations.iter().skip(stored as usize) {
            let mut tx = conn.begin().await?;
            let result = apply_migration(&mut tx, migration).await;
            finish(tx, result).await?;
            applied += 1;
        }

        tracing::info!("Catalog schema migrated to version {}", latest);
        Ok(applied)
    }
}

async fn read_version(conn: &mut SqliteConnection) -> Result<Option<u32>> {
    if !table_exists(conn, VERSION_TABLE).await? {
        return Ok(None);
    }

    let version: i64 = sqlx::query_scalar("SELECT version FROM __version")
        .fetch_one(&mut *conn)
        .await?;

    let version = u32::try_from(version)
        .map_err(|_| AppError::Generic(format!("Invalid stored schema version: {}", version)))?;
    Ok(Some(version))
}

/// Run one migration on `conn`, which must already be inside a transaction.
async fn apply_migration(conn: &mut SqliteConnection, migration: &Migration) -> Result<()> {
    let expected = migration.version();

    if migration.is_stub() {
        tracing::info!("Applying stub migration version {}", expected);
    } else {
        tracing::info!("Applying migration version {}", expected);
    }

    for hook in migration.pre_hooks() {
        tracing::debug!("Running pre-migration hook {}", hook.name());
        let mut catalog = ScopedCatalog::new(&mut *conn);
        hook.run(&mut catalog).await?;
    }

    for script in migration.scripts() {
        run_script(&mut *conn, script).await?;
    }

    sqlx::query("UPDATE __version SET version = version + 1")
        .execute(&mut *conn)
        .await?;

    for hook in migration.post_hooks() {
        tracing::debug!("Running post-migration hook {}", hook.name());
        let mut catalog = ScopedCatalog::new(&mut *conn);
        hook.run(&mut catalog).await?;
    }

    let actual = read_version(conn).await?.unwrap_or(0);
    if actual != expected {
        return Err(AppError::MigrationIntegrity { expected, actual });
    }

    tracing::info!("Migration version {} applied successfully", expected);
    Ok(())
}
