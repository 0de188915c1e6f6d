use std::fmt::Debug;

use log::info;

use crate::core::item::{ItemWriter, ItemWriterResult};

/// Writes every item to the log at info level. Never fails.
///
/// Handy as the sink of a step while its reader and processor are being
/// wired up.
#[derive(Default)]
pub struct LoggerWriter {
    label: Option<String>,
}

impl LoggerWriter {
    /// Prefixes each logged item with `label`.
    pub fn labelled(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
        }
    }
}

impl<T: Debug> ItemWriter<T> for LoggerWriter {
    fn write(&self, items: &[T]) -> ItemWriterResult {
        let label = self.label.as_deref().unwrap_or("Record");
        items.iter().for_each(|item| info!("{}:{:?}", label, item));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        execution::{BatchStatus, StepExecution},
        parameters::JobParameters,
        repository::{InMemoryJobRepository, JobRepository},
        step::{Step, StepBuilder, StepContext},
        testing::VecReader,
    };

    #[test]
    fn logger_writer_should_accept_every_chunk() {
        let reader = VecReader::new(vec!["a", "b", "c"]);
        let writer = LoggerWriter::labelled("letter");
        let step = StepBuilder::new("log")
            .reader(&reader)
            .writer(&writer)
            .chunk(2)
            .build()
            .unwrap();

        let repository = InMemoryJobRepository::new();
        let job_execution = repository
            .create_job_execution("log", &JobParameters::new())
            .unwrap();
        let mut execution = StepExecution::new("log");
        let result = step.execute(&mut execution, &StepContext::new(&repository, job_execution.id));

        assert!(result.is_ok());
        assert_eq!(execution.status, BatchStatus::Completed);
        assert_eq!(execution.write_count, 3);
        assert_eq!(execution.commit_count, 2);
    }
}
