/// Delimited-text support: one record per line, fields in fixed order.
///
/// # Module Architecture
///
/// 1. **CsvItemReader**: splits each line on the delimiter and deserializes
///    the fields, by position, into a Rust struct using serde.
///
/// 2. **CsvItemWriter**: formats each item into one line, through serde or a
///    field-extraction function, and appends every chunk atomically.
///
/// Both components follow the builder pattern for easy configuration.
///
/// # Round trip
///
/// ```
/// use batch_etl::item::csv::csv_reader::CsvItemReaderBuilder;
/// use batch_etl::item::csv::csv_writer::CsvItemWriterBuilder;
/// use batch_etl::core::item::{ItemReader, ItemWriter};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
/// struct Person {
///     first_name: String,
///     age: i32,
///     email: String,
/// }
///
/// let people = vec![
///     Person { first_name: "alice".into(), age: 30, email: "a@x.com".into() },
///     Person { first_name: "bob".into(), age: 40, email: "b@x.com".into() },
/// ];
///
/// let writer = CsvItemWriterBuilder::new().from_writer(Vec::<u8>::new());
/// writer.write(&people).unwrap();
/// let content = writer.into_inner();
///
/// let reader = CsvItemReaderBuilder::new().from_reader(content.as_slice());
/// let mut read_back: Vec<Person> = Vec::new();
/// while let Some(person) = reader.read().unwrap() {
///     read_back.push(person);
/// }
///
/// assert_eq!(read_back, people);
/// ```

/// A module providing facilities for reading delimited records.
pub mod csv_reader;

/// A module providing facilities for writing delimited records.
pub mod csv_writer;
