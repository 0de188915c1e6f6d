use chrono::Utc;
use log::{debug, error, info, warn};

use crate::BatchError;

use super::{
    chunk::{Chunk, ChunkStatus},
    execution::{BatchStatus, StepExecution},
    item::{ItemProcessor, ItemReader, ItemWriter, PassThroughProcessor},
    repository::JobRepository,
};

/// Commit interval used when none is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

static PASS_THROUGH: PassThroughProcessor = PassThroughProcessor;

/// Where a running step reports its progress.
pub struct StepContext<'r> {
    repository: &'r dyn JobRepository,
    job_execution_id: u64,
}

impl<'r> StepContext<'r> {
    pub fn new(repository: &'r dyn JobRepository, job_execution_id: u64) -> Self {
        Self {
            repository,
            job_execution_id,
        }
    }

    /// Persists the current state of `step_execution`.
    pub fn save(&self, step_execution: &StepExecution) -> Result<(), BatchError> {
        self.repository
            .update_step_execution(self.job_execution_id, step_execution)
    }
}

/// A stage of a job.
pub trait Step {
    fn get_name(&self) -> &str;

    /// Executes the step, recording its progress on `step_execution`.
    ///
    /// # Returns
    /// - `Ok(())`: the step completed
    /// - `Err(BatchError)`: the step failed; `step_execution` holds the cause
    fn execute(
        &self,
        step_execution: &mut StepExecution,
        context: &StepContext,
    ) -> Result<(), BatchError>;
}

/// Reads items into a bounded chunk and writes every chunk as one unit of work.
///
/// ```text
/// Starting -> Started -> Completed
///                     \-> Failed
/// ```
///
/// Any read, process or write error fails the step at once. The chunk being
/// filled when the error occurs is never written, and a failed write leaves
/// nothing of its chunk behind (see [`ItemWriter`]). Counters and the restart
/// position only move after a chunk write succeeded.
///
/// The write and the repository update are not one transaction. When the
/// update fails after a commit, the step fails and logs the committed
/// position; until it is recorded, a restart replays that chunk.
pub struct ChunkOrientedStep<'a, I, O> {
    name: String,
    /// Component responsible for reading items from the source
    reader: &'a dyn ItemReader<I>,
    /// Component responsible for processing items
    processor: &'a dyn ItemProcessor<I, O>,
    /// Component responsible for writing items to the destination
    writer: &'a dyn ItemWriter<O>,
    /// Number of items to process in each chunk
    chunk_size: usize,
}

impl<I, O> Step for ChunkOrientedStep<'_, I, O> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        step_execution: &mut StepExecution,
        context: &StepContext,
    ) -> Result<(), BatchError> {
        step_execution.start_time = Some(Utc::now());
        step_execution.status = BatchStatus::Started;
        context.save(step_execution)?;

        info!(
            "Start of step: {}, id: {}",
            step_execution.name, step_execution.id
        );

        let result = self.run_chunks(step_execution, context);

        // Resources are released on every path; a close error only fails a
        // step that otherwise succeeded.
        let closed = self.reader.close().and(self.writer.close());
        let result = match (result, closed) {
            (Ok(()), closed) => closed,
            (Err(error), Err(close_error)) => {
                warn!("Error closing step {}: {}", self.name, close_error);
                Err(error)
            }
            (Err(error), Ok(())) => Err(error),
        };

        step_execution.end_time = Some(Utc::now());

        match &result {
            Ok(()) => {
                step_execution.status = BatchStatus::Completed;
                info!(
                    "End of step: {}, id: {}, read: {}, written: {}, commits: {}",
                    step_execution.name,
                    step_execution.id,
                    step_execution.read_count,
                    step_execution.write_count,
                    step_execution.commit_count
                );
            }
            Err(cause) => {
                step_execution.status = BatchStatus::Failed;
                step_execution.failure = Some(cause.to_string());
                error!(
                    "Step {} failed after {} committed items: {}",
                    step_execution.name, step_execution.restart_position, cause
                );
            }
        }

        let saved = context.save(step_execution);
        result.and(saved)
    }
}

impl<I, O> ChunkOrientedStep<'_, I, O> {
    pub fn get_chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn run_chunks(
        &self,
        step_execution: &mut StepExecution,
        context: &StepContext,
    ) -> Result<(), BatchError> {
        let position = step_execution.restart_position;
        if position > 0 {
            info!("Restarting step {} at item {}", self.name, position);
        }

        self.reader.open(position)?;
        self.writer.open(position)?;

        let mut chunk = Chunk::new(self.chunk_size);

        loop {
            let status = self.read_chunk(&mut chunk)?;

            if !chunk.is_empty() {
                let processed = self.process_chunk(chunk.get_items())?;
                self.write_chunk(step_execution, &processed, chunk.len())?;
                if let Err(error) = context.save(step_execution) {
                    warn!(
                        "Step {} committed up to item {} but could not record it: {}",
                        self.name, step_execution.restart_position, error
                    );
                    return Err(error);
                }
                chunk.clear();
            }

            if status == ChunkStatus::Finished {
                return self.writer.flush();
            }
        }
    }

    /// Fills `chunk` until it is full or the reader is exhausted.
    fn read_chunk(&self, chunk: &mut Chunk<I>) -> Result<ChunkStatus, BatchError> {
        debug!("Start reading chunk");

        while !chunk.is_full() {
            match self.reader.read() {
                Ok(Some(item)) => chunk.push(item),
                Ok(None) => {
                    debug!("End reading chunk: FINISHED");
                    return Ok(ChunkStatus::Finished);
                }
                Err(error) => {
                    warn!("Error reading item: {}", error);
                    return Err(error);
                }
            }
        }

        debug!("End reading chunk: FULL");
        Ok(ChunkStatus::Full)
    }

    fn process_chunk(&self, read_items: &[I]) -> Result<Vec<O>, BatchError> {
        debug!("Processing chunk of {} items", read_items.len());

        read_items
            .iter()
            .map(|item| {
                self.processor.process(item).inspect_err(|error| {
                    warn!("Error processing item: {}", error);
                })
            })
            .collect()
    }

    fn write_chunk(
        &self,
        step_execution: &mut StepExecution,
        processed_items: &[O],
        consumed: usize,
    ) -> Result<(), BatchError> {
        debug!("Writing chunk of {} items", processed_items.len());

        match self.writer.write(processed_items) {
            Ok(()) => {
                step_execution.read_count += consumed;
                step_execution.write_count += processed_items.len();
                step_execution.commit_count += 1;
                step_execution.restart_position += consumed;
                debug!(
                    "Chunk committed, restart position: {}",
                    step_execution.restart_position
                );
                Ok(())
            }
            Err(error) => {
                step_execution.rollback_count += 1;
                warn!("Error writing items, chunk rolled back: {}", error);
                Err(error)
            }
        }
    }
}

/// Builder for [`ChunkOrientedStep`].
///
/// ```
/// # use batch_etl::core::item::{ItemReader, ItemReaderResult, ItemWriter, ItemWriterResult};
/// # use batch_etl::core::step::StepBuilder;
/// # struct Empty;
/// # impl ItemReader<String> for Empty {
/// #     fn read(&self) -> ItemReaderResult<String> { Ok(None) }
/// # }
/// # struct Sink;
/// # impl ItemWriter<String> for Sink {
/// #     fn write(&self, _items: &[String]) -> ItemWriterResult { Ok(()) }
/// # }
/// let (reader, writer) = (Empty, Sink);
/// let step = StepBuilder::new("file-db")
///     .reader(&reader)
///     .writer(&writer)
///     .chunk(100)
///     .build()
///     .unwrap();
/// assert_eq!(step.get_chunk_size(), 100);
/// ```
pub struct StepBuilder<'a, I, O> {
    name: String,
    reader: Option<&'a dyn ItemReader<I>>,
    processor: Option<&'a dyn ItemProcessor<I, O>>,
    writer: Option<&'a dyn ItemWriter<O>>,
    chunk_size: usize,
}

impl<'a, T: Clone> StepBuilder<'a, T, T> {
    /// Starts a step whose items reach the writer unchanged unless a
    /// processor is set.
    pub fn new(name: &str) -> Self {
        Self::with_processor(name, &PASS_THROUGH)
    }
}

impl<'a, I, O> StepBuilder<'a, I, O> {
    /// Starts a step converting items with `processor`.
    pub fn with_processor(name: &str, processor: &'a dyn ItemProcessor<I, O>) -> Self {
        Self {
            name: name.to_string(),
            reader: None,
            processor: Some(processor),
            writer: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn reader(mut self, reader: &'a dyn ItemReader<I>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn processor(mut self, processor: &'a dyn ItemProcessor<I, O>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn writer(mut self, writer: &'a dyn ItemWriter<O>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Sets the commit interval.
    pub fn chunk(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn build(self) -> Result<ChunkOrientedStep<'a, I, O>, BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(format!(
                "step {}: chunk size must be at least 1",
                self.name
            )));
        }

        let missing = |component: &str| {
            BatchError::Configuration(format!("step {}: {} is required", self.name, component))
        };

        Ok(ChunkOrientedStep {
            reader: self.reader.ok_or_else(|| missing("a reader"))?,
            processor: self.processor.ok_or_else(|| missing("a processor"))?,
            writer: self.writer.ok_or_else(|| missing("a writer"))?,
            chunk_size: self.chunk_size,
            name: self.name,
        })
    }
}
