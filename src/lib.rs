#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # Batch ETL for Rust

 A small chunk-oriented batch engine and the two-stage ETL pipeline built on it:
 stage one loads delimited records from a flat file into a relational table,
 stage two aggregates that table and writes a summary back to a flat file.

 ## Core Concepts

- **Job:** An ordered sequence of `Step`s. A step only starts once its predecessor completed.
- **Step:** A read-process-write stage. The chunk-oriented step pulls items from an
  `ItemReader` into a bounded chunk and hands every full chunk to an `ItemWriter`
  as one atomic unit of work.
- **ItemReader:** Produces the input of a step, one item at a time, and can be
  repositioned at the last committed item when a failed step is restarted.
- **ItemWriter:** Persists one chunk at a time, wholly or not at all.
- **JobRepository:** Records job and step executions so that a failed job can be
  relaunched from its first incomplete step, at its last committed chunk.
- **JobLauncher:** Starts jobs, rejects duplicate runs and derives the next run
  identifier through a `RunIdIncrementer`.

 ## Features

| **Feature**   | **Description**                                                   |
|---------------|-------------------------------------------------------------------|
| csv           | Enables the delimited-text `ItemReader` and `ItemWriter`          |
| rdbc-sqlite   | Enables the SQLite cursor `ItemReader` and bulk-insert `ItemWriter` |
| logger        | Enables a logger `ItemWriter`, useful for debugging purposes      |
| full          | Enables all available features                                    |

 ## Getting Started

```rust
# use batch_etl::{
#     core::{
#         item::{ItemReader, ItemReaderResult, ItemWriter, ItemWriterResult},
#         job::JobBuilder,
#         launcher::JobLauncher,
#         parameters::JobParameters,
#         repository::InMemoryJobRepository,
#         step::StepBuilder,
#         execution::BatchStatus,
#     },
#     error::BatchError,
# };
# use std::cell::{Cell, RefCell};
# struct Numbers { next: Cell<u32> }
# impl ItemReader<u32> for Numbers {
#     fn read(&self) -> ItemReaderResult<u32> {
#         let n = self.next.get();
#         self.next.set(n + 1);
#         Ok(if n < 5 { Some(n) } else { None })
#     }
# }
# #[derive(Default)]
# struct Collector { items: RefCell<Vec<u32>> }
# impl ItemWriter<u32> for Collector {
#     fn write(&self, items: &[u32]) -> ItemWriterResult {
#         self.items.borrow_mut().extend_from_slice(items);
#         Ok(())
#     }
# }
fn main() -> Result<(), BatchError> {
    let reader = Numbers { next: Cell::new(0) };
    let writer = Collector::default();

    let step = StepBuilder::new("numbers")
        .reader(&reader)
        .writer(&writer)
        .chunk(2)
        .build()?;

    let job = JobBuilder::new().name("count".to_string()).start(&step).build();

    let repository = InMemoryJobRepository::default();
    let execution = JobLauncher::new(&repository).run(&job, JobParameters::new())?;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.step_executions[0].commit_count, 3);
    Ok(())
}
```
 */

/// Core module for batch operations
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Set of items readers / writers (delimited text, SQLite, logger)
pub mod item;

/// Runtime configuration of the ETL pipeline
pub mod config;

#[cfg(all(feature = "csv", feature = "rdbc-sqlite"))]
/// The file -> database -> file pipeline wired on top of the engine
pub mod pipeline;
