use log::debug;

use crate::error::BatchError;

/// Result of a single read: `Ok(None)` once the source is exhausted.
pub type ItemReaderResult<I> = Result<Option<I>, BatchError>;

pub type ItemProcessorResult<O> = Result<O, BatchError>;

pub type ItemWriterResult = Result<(), BatchError>;

/// Produces the input of a step, one item at a time, forward only.
pub trait ItemReader<I> {
    /// Reads the next item, or `Ok(None)` when there is nothing left.
    fn read(&self) -> ItemReaderResult<I>;

    /// Positions a freshly built reader so that the next `read` returns the
    /// item at `position` (the number of items already committed).
    ///
    /// The default implementation reads and discards; readers that can skip
    /// without converting records should override it.
    fn open(&self, position: usize) -> Result<(), BatchError> {
        if position > 0 {
            debug!("Skipping {} items by reading them", position);
        }
        for skipped in 0..position {
            if self.read()?.is_none() {
                return Err(restart_beyond_end(position, skipped));
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

pub trait ItemProcessor<I, O> {
    fn process(&self, item: &I) -> ItemProcessorResult<O>;
}

/// Persists one chunk of items per call.
///
/// A call to `write` is one unit of work: either every item of the slice is
/// durably stored, or none is and an error is returned.
pub trait ItemWriter<O> {
    fn write(&self, items: &[O]) -> ItemWriterResult;

    /// Called once after the last chunk was written.
    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    /// Called once before the first chunk. `committed` is the number of items
    /// already committed by earlier executions of the same step (0 on a fresh run).
    fn open(&self, _committed: usize) -> ItemWriterResult {
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Processor used when a step is built without one.
#[derive(Default)]
pub struct PassThroughProcessor;

impl<T: Clone> ItemProcessor<T, T> for PassThroughProcessor {
    fn process(&self, item: &T) -> ItemProcessorResult<T> {
        Ok(item.clone())
    }
}

pub(crate) fn restart_beyond_end(position: usize, available: usize) -> BatchError {
    BatchError::ItemReader(format!(
        "restart position {} is beyond the end of the source ({} items)",
        position, available
    ))
}
