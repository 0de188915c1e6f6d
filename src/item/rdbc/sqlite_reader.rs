use std::{cell::RefCell, collections::VecDeque};

use log::debug;
use sqlx::{sqlite::SqliteRow, Pool, Sqlite};

use crate::{
    core::item::{restart_beyond_end, ItemReader, ItemReaderResult},
    BatchError,
};

use super::block_on;

/// Maps one result row to an item.
pub trait RowMapper<T> {
    fn map_row(&self, row: &SqliteRow) -> Result<T, BatchError>;
}

impl<T, F> RowMapper<T> for F
where
    F: Fn(&SqliteRow) -> Result<T, BatchError>,
{
    fn map_row(&self, row: &SqliteRow) -> Result<T, BatchError> {
        self(row)
    }
}

/// A cursor over the result of one SQLite query.
///
/// The query runs once, on the first read or when the reader is opened at a
/// restart position. Rows are then handed out in result order, each mapped
/// only when it is read.
pub struct SqliteItemReader<'a, T> {
    pool: &'a Pool<Sqlite>,
    query: &'a str,
    row_mapper: &'a dyn RowMapper<T>,
    rows: RefCell<Option<VecDeque<SqliteRow>>>,
}

impl<T> SqliteItemReader<'_, T> {
    fn fetch(&self) -> Result<VecDeque<SqliteRow>, BatchError> {
        let rows = block_on(sqlx::query(self.query).fetch_all(self.pool))?
            .map_err(|error| BatchError::ItemReader(format!("SQLite query failed: {}", error)))?;

        debug!("Query returned {} rows: {}", rows.len(), self.query);
        Ok(rows.into())
    }

    fn with_rows<R>(
        &self,
        f: impl FnOnce(&mut VecDeque<SqliteRow>) -> Result<R, BatchError>,
    ) -> Result<R, BatchError> {
        let mut rows = self.rows.borrow_mut();
        if rows.is_none() {
            *rows = Some(self.fetch()?);
        }
        f(rows.get_or_insert_with(VecDeque::new))
    }
}

impl<T> ItemReader<T> for SqliteItemReader<'_, T> {
    fn read(&self) -> ItemReaderResult<T> {
        self.with_rows(|rows| match rows.pop_front() {
            Some(row) => self.row_mapper.map_row(&row).map(Some),
            None => Ok(None),
        })
    }

    /// Discards the first `position` rows without mapping them.
    fn open(&self, position: usize) -> Result<(), BatchError> {
        self.with_rows(|rows| {
            if rows.len() < position {
                return Err(restart_beyond_end(position, rows.len()));
            }
            rows.drain(..position);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct SqliteItemReaderBuilder<'a, T> {
    pool: Option<&'a Pool<Sqlite>>,
    query: Option<&'a str>,
    row_mapper: Option<&'a dyn RowMapper<T>>,
}

impl<'a, T> SqliteItemReaderBuilder<'a, T> {
    pub fn new() -> Self {
        Self {
            pool: None,
            query: None,
            row_mapper: None,
        }
    }

    pub fn pool(mut self, pool: &'a Pool<Sqlite>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn query(mut self, query: &'a str) -> Self {
        self.query = Some(query);
        self
    }

    pub fn row_mapper(mut self, row_mapper: &'a dyn RowMapper<T>) -> Self {
        self.row_mapper = Some(row_mapper);
        self
    }

    pub fn build(self) -> Result<SqliteItemReader<'a, T>, BatchError> {
        let missing = |what: &str| BatchError::Configuration(format!("SQLite reader: missing {}", what));

        Ok(SqliteItemReader {
            pool: self.pool.ok_or_else(|| missing("pool"))?,
            query: self.query.ok_or_else(|| missing("query"))?,
            row_mapper: self.row_mapper.ok_or_else(|| missing("row mapper"))?,
            rows: RefCell::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use sqlx::{Row, SqlitePool};

    use super::*;

    async fn setup_test_db() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;

        sqlx::query("CREATE TABLE numbers (value INTEGER NOT NULL)")
            .execute(&pool)
            .await?;
        sqlx::query("INSERT INTO numbers (value) VALUES (1), (2), (3)")
            .execute(&pool)
            .await?;

        Ok(pool)
    }

    fn value(row: &SqliteRow) -> Result<i64, BatchError> {
        row.try_get("value")
            .map_err(|error| BatchError::ItemReader(error.to_string()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rows_should_be_read_in_query_order() -> Result<(), BatchError> {
        let pool = setup_test_db().await.unwrap();
        let reader = SqliteItemReaderBuilder::<i64>::new()
            .pool(&pool)
            .query("SELECT value FROM numbers ORDER BY value DESC")
            .row_mapper(&value)
            .build()?;

        assert_eq!(reader.read()?, Some(3));
        assert_eq!(reader.read()?, Some(2));
        assert_eq!(reader.read()?, Some(1));
        assert_eq!(reader.read()?, None);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_should_skip_rows_already_committed() -> Result<(), BatchError> {
        let pool = setup_test_db().await.unwrap();
        let reader = SqliteItemReaderBuilder::<i64>::new()
            .pool(&pool)
            .query("SELECT value FROM numbers ORDER BY value")
            .row_mapper(&value)
            .build()?;

        reader.open(2)?;

        assert_eq!(reader.read()?, Some(3));
        assert_eq!(reader.read()?, None);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_past_the_last_row_should_fail() {
        let pool = setup_test_db().await.unwrap();
        let reader = SqliteItemReaderBuilder::<i64>::new()
            .pool(&pool)
            .query("SELECT value FROM numbers")
            .row_mapper(&value)
            .build()
            .unwrap();

        assert!(matches!(reader.open(4), Err(BatchError::ItemReader(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_query_should_be_a_read_error() {
        let pool = setup_test_db().await.unwrap();
        let reader = SqliteItemReaderBuilder::<i64>::new()
            .pool(&pool)
            .query("SELECT value FROM missing_table")
            .row_mapper(&value)
            .build()
            .unwrap();

        assert!(matches!(reader.read(), Err(BatchError::ItemReader(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mapping_failure_should_be_a_read_error() {
        let pool = setup_test_db().await.unwrap();
        let missing_column = |row: &SqliteRow| -> Result<i64, BatchError> {
            row.try_get("other")
                .map_err(|error| BatchError::ItemReader(error.to_string()))
        };
        let reader = SqliteItemReaderBuilder::<i64>::new()
            .pool(&pool)
            .query("SELECT value FROM numbers")
            .row_mapper(&missing_column)
            .build()
            .unwrap();

        assert!(matches!(reader.read(), Err(BatchError::ItemReader(_))));
    }

    #[test]
    fn build_should_require_every_component() {
        let result = SqliteItemReaderBuilder::<i64>::new()
            .query("SELECT 1")
            .build();

        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}
