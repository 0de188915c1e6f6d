use log::{debug, error, warn};
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};

use crate::core::item::{ItemWriter, ItemWriterResult};
use crate::item::rdbc::{block_on, DatabaseItemBinder};
use crate::BatchError;

// SQLite refuses statements with more host parameters than this
const BIND_LIMIT: usize = 32766;

/// A writer inserting items into a SQLite table.
///
/// Each call to `write` is one transaction: all items of the chunk are
/// inserted, split into as many multi-row INSERT statements as the
/// bind-parameter limit requires, and committed together. Any failure rolls
/// the transaction back so none of the chunk's rows remain.
///
/// # Examples
///
/// ```no_run
/// use batch_etl::item::rdbc::sqlite_writer::SqliteItemWriter;
/// use batch_etl::item::rdbc::DatabaseItemBinder;
/// use sqlx::{SqlitePool, query_builder::Separated, Sqlite};
///
/// struct User {
///     id: i32,
///     name: String,
/// }
///
/// struct UserBinder;
/// impl DatabaseItemBinder<User, Sqlite> for UserBinder {
///     fn bind(&self, item: &User, mut query_builder: Separated<Sqlite, &str>) {
///         query_builder.push_bind(item.id);
///         query_builder.push_bind(item.name.clone());
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = SqlitePool::connect("sqlite://database.db").await?;
/// let binder = UserBinder;
///
/// let writer = SqliteItemWriter::<User>::new()
///     .pool(&pool)
///     .table("users")
///     .add_column("id")
///     .add_column("name")
///     .item_binder(&binder);
/// # Ok(())
/// # }
/// ```
pub struct SqliteItemWriter<'a, O> {
    pool: Option<&'a Pool<Sqlite>>,
    table: Option<&'a str>,
    columns: Vec<&'a str>,
    item_binder: Option<&'a dyn DatabaseItemBinder<O, Sqlite>>,
}

impl<O> Default for SqliteItemWriter<'_, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, O> SqliteItemWriter<'a, O> {
    /// Creates a writer with nothing configured.
    ///
    /// Pool, table, at least one column and the item binder must be set
    /// before the writer is used.
    pub fn new() -> Self {
        Self {
            pool: None,
            table: None,
            columns: Vec::new(),
            item_binder: None,
        }
    }

    pub fn pool(mut self, pool: &'a Pool<Sqlite>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }

    /// Adds a column; the binder pushes values in the order columns are added.
    pub fn add_column(mut self, column: &'a str) -> Self {
        self.columns.push(column);
        self
    }

    pub fn item_binder(mut self, item_binder: &'a dyn DatabaseItemBinder<O, Sqlite>) -> Self {
        self.item_binder = Some(item_binder);
        self
    }

    #[allow(clippy::type_complexity)]
    fn configuration(
        &self,
    ) -> Result<(&'a Pool<Sqlite>, &'a str, &'a dyn DatabaseItemBinder<O, Sqlite>), BatchError> {
        let missing = |what: &str| BatchError::Configuration(format!("SQLite writer: missing {}", what));

        if self.columns.is_empty() {
            return Err(missing("columns"));
        }

        Ok((
            self.pool.ok_or_else(|| missing("pool"))?,
            self.table.ok_or_else(|| missing("table"))?,
            self.item_binder.ok_or_else(|| missing("item binder"))?,
        ))
    }

    /// Inserts `items` in one transaction, rolled back on the first failing statement.
    ///
    /// The insert error is returned even when the rollback fails too.
    async fn insert_all(
        &self,
        pool: &Pool<Sqlite>,
        table: &str,
        binder: &dyn DatabaseItemBinder<O, Sqlite>,
        items: &[O],
    ) -> Result<(), sqlx::Error> {
        let mut transaction = pool.begin().await?;

        match self.insert_rows(&mut transaction, table, binder, items).await {
            Ok(()) => transaction.commit().await,
            Err(error) => Err(insert_failure(table, error, transaction.rollback().await)),
        }
    }

    async fn insert_rows(
        &self,
        connection: &mut SqliteConnection,
        table: &str,
        binder: &dyn DatabaseItemBinder<O, Sqlite>,
        items: &[O],
    ) -> Result<(), sqlx::Error> {
        let rows_per_statement = (BIND_LIMIT / self.columns.len()).max(1);

        for rows in items.chunks(rows_per_statement) {
            let mut query_builder = QueryBuilder::new("INSERT INTO ");
            query_builder.push(table);
            query_builder.push(" (");
            query_builder.push(self.columns.join(","));
            query_builder.push(") ");
            query_builder.push_values(rows, |b, item| binder.bind(item, b));

            query_builder.build().execute(&mut *connection).await?;
        }

        Ok(())
    }
}

/// Keeps the insert error as the cause; a failed rollback is only logged.
fn insert_failure(table: &str, error: sqlx::Error, rollback: Result<(), sqlx::Error>) -> sqlx::Error {
    if let Err(rollback_error) = rollback {
        warn!("Rollback of {} failed after insert error: {}", table, rollback_error);
    }
    error
}

impl<O> ItemWriter<O> for SqliteItemWriter<'_, O> {
    fn write(&self, items: &[O]) -> ItemWriterResult {
        if items.is_empty() {
            return Ok(());
        }

        let (pool, table, binder) = self.configuration()?;

        match block_on(self.insert_all(pool, table, binder, items))? {
            Ok(()) => {
                debug!("Inserted {} rows into SQLite table {}", items.len(), table);
                Ok(())
            }
            Err(e) => {
                error!("Failed to write items to SQLite table {}: {}", table, e);
                Err(BatchError::ItemWriter(format!("SQLite write failed: {}", e)))
            }
        }
    }

    /// Checks the configuration before the first chunk is read.
    fn open(&self, _committed: usize) -> ItemWriterResult {
        self.configuration().map(|_| ())
    }
}
