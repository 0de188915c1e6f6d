use csv::{ReaderBuilder, StringRecordsIntoIter, Terminator, Trim};
use log::debug;
use serde::de::DeserializeOwned;
use std::{cell::RefCell, fs::File, io::Read, path::Path};

use crate::{
    core::item::{restart_beyond_end, ItemReader, ItemReaderResult},
    error::BatchError,
};

/// A delimited-text item reader.
///
/// Each line is split on the configured delimiter and the fields are
/// deserialized, in order, into the target type with serde. Malformed lines
/// and failed type conversions are reported as `BatchError::ItemReader`;
/// nothing is skipped silently.
///
/// # Examples
///
/// ```
/// use batch_etl::item::csv::csv_reader::CsvItemReaderBuilder;
/// use batch_etl::core::item::ItemReader;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Person {
///     first_name: String,
///     age: i32,
///     email: String,
/// }
///
/// let reader = CsvItemReaderBuilder::new()
///     .from_reader("alice,30,a@x.com\nbob,40,b@x.com".as_bytes());
///
/// let alice: Person = reader.read().unwrap().unwrap();
/// assert_eq!(alice.first_name, "alice");
/// assert_eq!(alice.age, 30);
///
/// let bob: Person = reader.read().unwrap().unwrap();
/// assert_eq!(bob.email, "b@x.com");
///
/// assert!(ItemReader::<Person>::read(&reader).unwrap().is_none());
/// ```
pub struct CsvItemReader<R> {
    /// Iterator over the raw records
    ///
    /// Uses `RefCell` to provide interior mutability so we can iterate
    /// through records while keeping the `read` method signature compatible
    /// with the `ItemReader` trait.
    records: RefCell<StringRecordsIntoIter<R>>,
}

impl<R: Read, T: DeserializeOwned> ItemReader<T> for CsvItemReader<R> {
    /// Reads the next line and converts it to `T`.
    ///
    /// # Returns
    /// - `Ok(Some(record))` if a record is successfully read
    /// - `Ok(None)` if there are no more records to read
    /// - `Err(BatchError::ItemReader(error))` if the line cannot be parsed or converted
    fn read(&self) -> ItemReaderResult<T> {
        match self.records.borrow_mut().next() {
            Some(Ok(string_record)) => string_record
                .deserialize(None)
                .map(Some)
                .map_err(|error| BatchError::ItemReader(error.to_string())),
            Some(Err(error)) => Err(BatchError::ItemReader(error.to_string())),
            None => Ok(None),
        }
    }

    /// Skips `position` raw records without converting them.
    fn open(&self, position: usize) -> Result<(), BatchError> {
        if position > 0 {
            debug!("Skipping {} already committed records", position);
        }

        let mut records = self.records.borrow_mut();
        for skipped in 0..position {
            match records.next() {
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(BatchError::ItemReader(error.to_string())),
                None => return Err(restart_beyond_end(position, skipped)),
            }
        }
        Ok(())
    }
}

/// A builder for configuring delimited-text reading.
///
/// # Default Configuration
///
/// - Delimiter: comma (,)
/// - Terminator: CRLF (accepts `\n`, `\r` and `\r\n`)
/// - Headers: disabled
/// - Trimming: none, so padded fields written by
///   [`CsvItemWriter`](super::csv_writer::CsvItemWriter) read back unchanged
pub struct CsvItemReaderBuilder {
    /// The delimiter character (default: comma ',')
    delimiter: u8,
    /// The line terminator (default: CRLF)
    terminator: Terminator,
    /// Whether the first line is a header to skip (default: false)
    has_headers: bool,
    /// Whitespace trimming around fields (default: none)
    trim: Trim,
}

impl Default for CsvItemReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvItemReaderBuilder {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            terminator: Terminator::CRLF,
            has_headers: false,
            trim: Trim::None,
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn has_headers(mut self, yes: bool) -> Self {
        self.has_headers = yes;
        self
    }

    /// Strips whitespace around fields before they are converted.
    pub fn trim(mut self, trim: Trim) -> Self {
        self.trim = trim;
        self
    }

    fn reader_builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .trim(self.trim)
            .delimiter(self.delimiter)
            .terminator(self.terminator)
            .has_headers(self.has_headers);
        builder
    }

    /// Creates a reader over any source implementing `Read`.
    pub fn from_reader<R: Read>(self, rdr: R) -> CsvItemReader<R> {
        let records = self.reader_builder().from_reader(rdr).into_records();

        CsvItemReader {
            records: RefCell::new(records),
        }
    }

    /// Creates a reader over the file at `path`.
    ///
    /// # Errors
    /// `BatchError::ItemReader` when the file cannot be opened.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<CsvItemReader<File>, BatchError> {
        let path = path.as_ref();
        let rdr = self.reader_builder().from_path(path).map_err(|error| {
            BatchError::ItemReader(format!("{}: {}", path.display(), error))
        })?;

        Ok(CsvItemReader {
            records: RefCell::new(rdr.into_records()),
        })
    }
}
