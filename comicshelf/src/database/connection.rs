//! Catalog database connection
//!
//! A catalog owns exactly one SQLite connection. It is held in a sqlx pool
//! capped at a single connection so every statement, PRAGMA and transaction
//! runs on the same handle, and an in-memory database lives as long as the
//! `Connection` does.

use crate::config::DATABASE_BUSY_TIMEOUT;
use crate::error::Result;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::str::FromStr;

/// Build connection options for an on-disk catalog.
fn file_options(db_path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .busy_timeout(DATABASE_BUSY_TIMEOUT)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
}

/// Handle to the single catalog connection
#[derive(Clone, Debug)]
pub struct Connection {
    pool: SqlitePool,
}

impl Connection {
    /// Open (creating if missing) the catalog database at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self> {
        tracing::info!("Opening catalog database at: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::connect(file_options(db_path)).await
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // Idle reaping would silently discard an in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Execute one statement, returning the number of affected rows.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Execute a `;`-separated script statement by statement.
    pub async fn execute_script(&self, script: &str) -> Result<()> {
        let mut conn = self.acquire().await?;
        run_script(&mut conn, script).await
    }

    /// Run a query returning a single value.
    pub async fn scalar<T>(&self, sql: &str) -> Result<T>
    where
        T: Send + Unpin,
        (T,): for<'r> sqlx::FromRow<'r, SqliteRow>,
    {
        let value = sqlx::query_scalar::<_, T>(sql).fetch_one(&self.pool).await?;
        Ok(value)
    }

    /// Check whether a table exists in the schema.
    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let mut conn = self.acquire().await?;
        table_exists(&mut conn, name).await
    }

    /// Borrow the underlying connection outside of a transaction.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Start a transaction. It rolls back if dropped without `commit`.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Close the connection, waiting for in-flight work to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Commit `tx` if `result` is Ok, otherwise roll it back and return the error.
pub(crate) async fn finish<T>(tx: Transaction<'_, Sqlite>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback failed after error {}: {}", e, rollback_err);
            }
            Err(e)
        }
    }
}

/// Split a script into statements, dropping `--` line comments.
///
/// Statements are separated by `;`; scripts must not contain `;` or `--`
/// inside string literals.
pub fn split_statements(script: &str) -> Vec<String> {
    let stripped: String = script
        .lines()
        .map(|line| match line.find("--") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    stripped
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Execute every statement of `script` in order on `conn`.
pub async fn run_script(conn: &mut SqliteConnection, script: &str) -> Result<()> {
    for statement in split_statements(script) {
        sqlx::query(&statement).execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn table_exists(conn: &mut SqliteConnection, name: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_statements_drops_comments_and_blanks() {
        let script = r#"
            -- first table
            CREATE TABLE a (x INTEGER);

            CREATE TABLE b (y TEXT); -- trailing note
            ;
            -- end
        "#;

        let statements = split_statements(script);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (x INTEGER)", "CREATE TABLE b (y TEXT)"]
        );
    }

    #[tokio::test]
    async fn test_in_memory_connection_survives_between_calls() {
        let conn = Connection::open_in_memory().await.unwrap();

        conn.execute_script("CREATE TABLE t (v INTEGER); INSERT INTO t (v) VALUES (7)")
            .await
            .unwrap();

        let value: i64 = conn.scalar("SELECT v FROM t").await.unwrap();
        assert_eq!(value, 7);
        assert!(conn.table_exists("t").await.unwrap());
        assert!(!conn.table_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().await.unwrap();

        let foreign_keys: i32 = conn.scalar("PRAGMA foreign_keys").await.unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.execute("CREATE TABLE t (v INTEGER)").await.unwrap();

        {
            let mut tx = conn.begin().await.unwrap();
            sqlx::query("INSERT INTO t (v) VALUES (1)")
                .execute(&mut *tx)
                .await
                .unwrap();
        }

        let count: i64 = conn.scalar("SELECT COUNT(*) FROM t").await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_open_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("catalog.db");

        let conn = Connection::open(&db_path).await.unwrap();
        conn.execute("CREATE TABLE t (v INTEGER)").await.unwrap();
        conn.close().await;

        assert!(db_path.exists());
    }
}
