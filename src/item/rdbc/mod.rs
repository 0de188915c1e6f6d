use std::future::Future;

use sqlx::{query_builder::Separated, Database};
use tokio::runtime::Handle;

use crate::BatchError;

/// This module contains the SQLite cursor reader.
pub mod sqlite_reader;

/// This module contains the SQLite bulk writer.
pub mod sqlite_writer;

/// Trait for binding item data to database query parameters.
///
/// The binder pushes one value per configured column, in column order.
///
/// # Type Parameters
///
/// * `O` - The item type to bind
/// * `DB` - The SQLx database type (e.g. `Sqlite`)
///
/// # Examples
///
/// ```no_run
/// use batch_etl::item::rdbc::DatabaseItemBinder;
/// use sqlx::{query_builder::Separated, Sqlite};
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
/// ```
pub trait DatabaseItemBinder<O, DB: Database> {
    /// Binds the properties of an item to a separated query builder.
    fn bind(&self, item: &O, query_builder: Separated<DB, &str>);
}

/// Runs `future` to completion from the synchronous batch engine.
///
/// Requires a multi-threaded tokio runtime on the current thread.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output, BatchError> {
    let handle = Handle::try_current().map_err(|error| {
        BatchError::Configuration(format!("database access needs a tokio runtime: {}", error))
    })?;

    Ok(tokio::task::block_in_place(|| handle.block_on(future)))
}
