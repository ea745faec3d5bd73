//! Keyed-column row reader
//!
//! Wraps a row stream together with the logical column names a query
//! projects. Consumers read values by name, so the projection order of a
//! query can change without touching the code that reads it.

use crate::error::{AppError, Result};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Sqlite, Type, ValueRef};

type RowStream<'c> = BoxStream<'c, std::result::Result<SqliteRow, sqlx::Error>>;

/// Forward-only reader over a query result
///
/// Column positions are resolved once, on the first row. Dropping the reader
/// releases the stream and the connection it borrows.
pub struct RowReader<'c> {
    stream: RowStream<'c>,
    columns: &'static [&'static str],
    positions: Vec<usize>,
    current: Option<SqliteRow>,
}

impl<'c> RowReader<'c> {
    pub fn new(stream: RowStream<'c>, columns: &'static [&'static str]) -> Self {
        Self {
            stream,
            columns,
            positions: Vec::with_capacity(columns.len()),
            current: None,
        }
    }

    /// Move to the next row. Returns false once the result is exhausted.
    pub async fn advance(&mut self) -> Result<bool> {
        match self.stream.try_next().await? {
            Some(row) => {
                if self.positions.is_empty() {
                    self.positions = resolve_positions(&row, self.columns)?;
                }
                self.current = Some(row);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn current_row(&self, name: &str) -> Result<(&SqliteRow, usize)> {
        let row = self.current.as_ref().ok_or(AppError::NoCurrentRow)?;
        let index = self
            .columns
            .iter()
            .position(|column| *column == name)
            .ok_or_else(|| AppError::UnknownColumn(name.to_string()))?;

        Ok((row, self.positions[index]))
    }

    /// Decode a required value. SQL NULL is an error, never a default.
    fn get<T>(&self, name: &str) -> Result<T>
    where
        T: for<'r> Decode<'r, Sqlite> + Type<Sqlite>,
    {
        let (row, position) = self.current_row(name)?;
        if row.try_get_raw(position)?.is_null() {
            return Err(AppError::UnexpectedNull(name.to_string()));
        }

        Ok(row.try_get::<T, usize>(position)?)
    }

    fn get_optional<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: for<'r> Decode<'r, Sqlite> + Type<Sqlite>,
    {
        let (row, position) = self.current_row(name)?;
        Ok(row.try_get::<Option<T>, usize>(position)?)
    }

    pub fn get_string(&self, name: &str) -> Result<String> {
        self.get(name)
    }

    pub fn get_i32(&self, name: &str) -> Result<i32> {
        self.get(name)
    }

    pub fn get_i64(&self, name: &str) -> Result<i64> {
        self.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Result<f64> {
        self.get(name)
    }

    pub fn get_optional_string(&self, name: &str) -> Result<Option<String>> {
        self.get_optional(name)
    }

    pub fn get_optional_i32(&self, name: &str) -> Result<Option<i32>> {
        self.get_optional(name)
    }

    pub fn get_optional_bool(&self, name: &str) -> Result<Option<bool>> {
        self.get_optional(name)
    }

    pub fn get_optional_f64(&self, name: &str) -> Result<Option<f64>> {
        self.get_optional(name)
    }
}

fn resolve_positions(row: &SqliteRow, columns: &[&str]) -> Result<Vec<usize>> {
    columns
        .iter()
        .map(|name| {
            row.columns()
                .iter()
                .position(|column| column.name() == *name)
                .ok_or_else(|| AppError::UnknownColumn(name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Connection;

    const COLUMNS: &[&str] = &["name", "count", "flag", "ratio"];

    async fn create_test_connection() -> Connection {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.execute_script(
            r#"
            CREATE TABLE samples (name TEXT, count INTEGER, flag INTEGER, ratio REAL);
            INSERT INTO samples VALUES ('first', 3, 1, 0.5);
            INSERT INTO samples VALUES (NULL, NULL, NULL, NULL)
            "#,
        )
        .await
        .unwrap();
        conn
    }

    #[tokio::test]
    async fn test_reads_columns_by_name_regardless_of_projection_order() {
        let conn = create_test_connection().await;
        let mut db = conn.acquire().await.unwrap();

        let stream =
            sqlx::query("SELECT ratio, flag, count, name FROM samples WHERE name IS NOT NULL")
                .fetch(&mut *db);
        let mut reader = RowReader::new(stream, COLUMNS);

        assert!(reader.advance().await.unwrap());
        assert_eq!(reader.get_string("name").unwrap(), "first");
        assert_eq!(reader.get_i32("count").unwrap(), 3);
        assert_eq!(reader.get_i64("count").unwrap(), 3);
        assert!(reader.get_bool("flag").unwrap());
        assert_eq!(reader.get_f64("ratio").unwrap(), 0.5);

        assert!(!reader.advance().await.unwrap());
        assert!(matches!(reader.get_string("name"), Err(AppError::NoCurrentRow)));
    }

    #[tokio::test]
    async fn test_nullable_getters_return_none() {
        let conn = create_test_connection().await;
        let mut db = conn.acquire().await.unwrap();

        let stream = sqlx::query("SELECT name, count, flag, ratio FROM samples WHERE name IS NULL")
            .fetch(&mut *db);
        let mut reader = RowReader::new(stream, COLUMNS);

        assert!(reader.advance().await.unwrap());
        assert_eq!(reader.get_optional_string("name").unwrap(), None);
        assert_eq!(reader.get_optional_i32("count").unwrap(), None);
        assert_eq!(reader.get_optional_bool("flag").unwrap(), None);
        assert_eq!(reader.get_optional_f64("ratio").unwrap(), None);
        assert!(reader.get_string("name").is_err());
    }

    #[tokio::test]
    async fn test_required_getters_reject_null() {
        let conn = create_test_connection().await;
        let mut db = conn.acquire().await.unwrap();

        let stream = sqlx::query("SELECT name, count, flag, ratio FROM samples WHERE name IS NULL")
            .fetch(&mut *db);
        let mut reader = RowReader::new(stream, COLUMNS);

        assert!(reader.advance().await.unwrap());
        assert!(matches!(reader.get_string("name"), Err(AppError::UnexpectedNull(c)) if c == "name"));
        assert!(matches!(reader.get_i32("count"), Err(AppError::UnexpectedNull(_))));
        assert!(matches!(reader.get_i64("count"), Err(AppError::UnexpectedNull(_))));
        assert!(matches!(reader.get_bool("flag"), Err(AppError::UnexpectedNull(_))));
        assert!(matches!(reader.get_f64("ratio"), Err(AppError::UnexpectedNull(_))));
    }

    #[tokio::test]
    async fn test_missing_column_is_reported() {
        let conn = create_test_connection().await;
        let mut db = conn.acquire().await.unwrap();

        let stream = sqlx::query("SELECT name, count FROM samples").fetch(&mut *db);
        let mut reader = RowReader::new(stream, COLUMNS);

        let result = reader.advance().await;
        assert!(matches!(result, Err(AppError::UnknownColumn(name)) if name == "flag"));
    }

    #[tokio::test]
    async fn test_unknown_logical_name_is_reported() {
        let conn = create_test_connection().await;
        let mut db = conn.acquire().await.unwrap();

        let stream = sqlx::query("SELECT name, count, flag, ratio FROM samples").fetch(&mut *db);
        let mut reader = RowReader::new(stream, COLUMNS);

        assert!(reader.advance().await.unwrap());
        assert!(matches!(
            reader.get_string("nope"),
            Err(AppError::UnknownColumn(_))
        ));
    }
}
