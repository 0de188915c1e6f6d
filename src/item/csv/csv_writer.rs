use std::{
    cell::RefCell,
    fs::{File, OpenOptions},
    io::{self, Seek, SeekFrom, Write},
    path::Path,
};

use csv::{Terminator, WriterBuilder};
use log::{debug, error};
use serde::Serialize;

use crate::{
    core::item::{ItemWriter, ItemWriterResult},
    BatchError,
};

/// A write target whose tail can be cut off again.
///
/// Lets [`CsvItemWriter`] undo a chunk that was only partially appended.
pub trait TruncateWrite: Write {
    /// Moves to the end of the content and returns its length.
    fn seek_end(&mut self) -> io::Result<u64>;

    /// Discards everything past `len` and moves to the new end.
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl TruncateWrite for File {
    fn seek_end(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::End(0)).map(|_| ())
    }
}

impl TruncateWrite for Vec<u8> {
    fn seek_end(&mut self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.truncate(len as usize);
        Ok(())
    }
}

/// Appends one chunk; cuts the target back to where it started unless committed.
struct ChunkTransaction<'w, W: TruncateWrite> {
    target: &'w mut W,
    start: u64,
    committed: bool,
}

impl<'w, W: TruncateWrite> ChunkTransaction<'w, W> {
    fn begin(target: &'w mut W) -> Result<Self, BatchError> {
        let start = target.seek_end().map_err(to_writer_error)?;
        Ok(Self {
            target,
            start,
            committed: false,
        })
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), BatchError> {
        self.target
            .write_all(bytes)
            .and_then(|()| self.target.flush())
            .map_err(to_writer_error)
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl<W: TruncateWrite> Drop for ChunkTransaction<'_, W> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match self.target.truncate_to(self.start) {
            Ok(()) => debug!("Chunk rolled back to offset {}", self.start),
            Err(error) => error!("Unable to roll back chunk at offset {}: {}", self.start, error),
        }
    }
}

fn to_writer_error(error: impl ToString) -> BatchError {
    BatchError::ItemWriter(error.to_string())
}

/// Appends the record of one item to the lines of a chunk.
type RecordFormatter<'a, O> = Box<dyn Fn(&mut csv::Writer<Vec<u8>>, &O) -> csv::Result<()> + 'a>;

/// A delimited-text item writer.
///
/// Every chunk is first formatted completely in memory, then appended to the
/// target with a single write and flush. If appending fails, the target is
/// truncated back to its length before the chunk, so a chunk is present
/// entirely or not at all.
pub struct CsvItemWriter<'a, O, W: TruncateWrite> {
    target: RefCell<W>,
    delimiter: u8,
    formatter: RecordFormatter<'a, O>,
}

impl<O, W: TruncateWrite> CsvItemWriter<'_, O, W> {
    /// Formats `items` into lines without touching the target.
    fn render(&self, items: &[O]) -> Result<Vec<u8>, BatchError> {
        let mut lines = WriterBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::<u8>::new());

        for item in items {
            (self.formatter)(&mut lines, item).map_err(to_writer_error)?;
        }

        lines.into_inner().map_err(to_writer_error)
    }

    pub fn into_inner(self) -> W {
        self.target.into_inner()
    }
}

impl<O, W: TruncateWrite> ItemWriter<O> for CsvItemWriter<'_, O, W> {
    fn write(&self, items: &[O]) -> ItemWriterResult {
        let lines = self.render(items)?;

        let mut target = self.target.borrow_mut();
        let mut transaction = ChunkTransaction::begin(&mut *target)?;
        transaction.append(&lines)?;
        transaction.commit();

        debug!("Appended {} lines", items.len());
        Ok(())
    }

    /// Truncates the output on a fresh run; keeps the committed lines on a restart.
    fn open(&self, committed: usize) -> ItemWriterResult {
        let mut target = self.target.borrow_mut();
        if committed == 0 {
            target.truncate_to(0).map_err(to_writer_error)
        } else {
            debug!("Keeping output of {} committed items", committed);
            target.seek_end().map(|_| ()).map_err(to_writer_error)
        }
    }

    fn flush(&self) -> ItemWriterResult {
        self.target.borrow_mut().flush().map_err(to_writer_error)
    }
}

/// A builder for [`CsvItemWriter`].
///
/// # Default Configuration
///
/// - Delimiter: comma (,)
/// - No header line
/// - Lines produced by serde serialization of the item, unless the builder
///   is created [with a field extractor](CsvItemWriterBuilder::with_field_extractor)
pub struct CsvItemWriterBuilder<'a, O> {
    delimiter: u8,
    formatter: RecordFormatter<'a, O>,
}

impl<'a, O: Serialize + 'a> Default for CsvItemWriterBuilder<'a, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, O: Serialize + 'a> CsvItemWriterBuilder<'a, O> {
    /// Starts a writer serializing each item's fields with serde.
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            formatter: Box::new(|lines: &mut csv::Writer<Vec<u8>>, item: &O| lines.serialize(item)),
        }
    }
}

impl<'a, O: 'a> CsvItemWriterBuilder<'a, O> {
    /// Starts a writer producing the fields of each line with `extractor`.
    ///
    /// The item type needs no serde support.
    ///
    /// ```
    /// use batch_etl::item::csv::csv_writer::CsvItemWriterBuilder;
    /// use batch_etl::core::item::ItemWriter;
    ///
    /// struct AgeCount {
    ///     age: i64,
    ///     count: i64,
    /// }
    ///
    /// let writer = CsvItemWriterBuilder::with_field_extractor(|bucket: &AgeCount| {
    ///     vec![bucket.age.to_string(), bucket.count.to_string()]
    /// })
    /// .from_writer(Vec::<u8>::new());
    ///
    /// writer
    ///     .write(&[AgeCount { age: 30, count: 2 }, AgeCount { age: 40, count: 1 }])
    ///     .unwrap();
    /// assert_eq!(writer.into_inner(), b"30,2\n40,1\n");
    /// ```
    pub fn with_field_extractor(extractor: impl Fn(&O) -> Vec<String> + 'a) -> Self {
        Self {
            delimiter: b',',
            formatter: Box::new(move |lines: &mut csv::Writer<Vec<u8>>, item: &O| {
                lines.write_record(extractor(item))
            }),
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Creates a writer appending to the file at `path`, created if missing.
    ///
    /// The file keeps its content until the writer is opened by a step, which
    /// truncates it on a fresh run.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<CsvItemWriter<'a, O, File>, BatchError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|error| BatchError::ItemWriter(format!("{}: {}", path.display(), error)))?;

        Ok(self.from_writer(file))
    }

    pub fn from_writer<W: TruncateWrite>(self, wtr: W) -> CsvItemWriter<'a, O, W> {
        CsvItemWriter {
            target: RefCell::new(wtr),
            delimiter: self.delimiter,
            formatter: self.formatter,
        }
    }
}
