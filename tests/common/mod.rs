#![allow(dead_code, unused_imports)]

mod mocks;

pub use mocks::MockFile;

use std::path::Path;

use sqlx::SqlitePool;

/// Opens (creating it if needed) a SQLite database file under `dir`.
pub async fn sqlite_pool(dir: &Path) -> SqlitePool {
    let url = format!("sqlite://{}?mode=rwc", dir.join("etl.db").display());
    SqlitePool::connect(&url).await.unwrap()
}

/// One `first_name,age,email` line per person.
pub fn people_lines(count: usize) -> String {
    (0..count)
        .map(|i| format!("person{},{},person{}@x.com\n", i, 20 + i % 3, i))
        .collect()
}
