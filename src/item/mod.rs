#[cfg(feature = "logger")]
/// This module provides a logger item writer, useful for debugging purposes.
pub mod logger;

#[cfg(feature = "csv")]
/// This module provides the delimited-text item reader and writer.
pub mod csv;

#[cfg(feature = "rdbc-sqlite")]
/// This module provides the SQLite item reader and writer.
pub mod rdbc;
