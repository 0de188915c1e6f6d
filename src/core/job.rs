use chrono::Utc;
use log::{error, info};
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    execution::{BatchStatus, JobExecution, StepExecution},
    parameters::JobParametersIncrementer,
    repository::JobRepository,
    step::{Step, StepContext},
};

/// Type alias for job execution results.
type JobResult<T> = Result<T, BatchError>;

/// Represents a job that can be executed.
///
/// A job is an ordered sequence of steps. Steps run one after the other on
/// the calling thread, a step starts only once its predecessor completed, and
/// the first failing step ends the run.
pub trait Job {
    fn get_name(&self) -> &str;

    /// Strategy deriving the parameters of the next run, if the job has one.
    fn get_incrementer(&self) -> Option<&dyn JobParametersIncrementer>;

    /// Runs the job, recording progress on `job_execution` and in `repository`.
    ///
    /// Steps already completed by an earlier execution of the same job
    /// instance are skipped; a step that failed earlier resumes from its last
    /// committed chunk.
    ///
    /// # Returns
    /// - `Ok(())` when every step completed
    /// - `Err(BatchError)` when a step failed or the repository could not be updated
    fn run(&self, job_execution: &mut JobExecution, repository: &dyn JobRepository)
        -> JobResult<()>;
}

/// A job definition: a name, its steps in execution order and an optional
/// run-identifier strategy.
pub struct JobInstance<'a> {
    /// Unique identifier for this job definition, used in logs
    id: Uuid,
    /// Human-readable name for the job
    name: String,
    /// Collection of steps that make up this job, in execution order
    steps: Vec<&'a dyn Step>,
    incrementer: Option<&'a dyn JobParametersIncrementer>,
}

impl Job for JobInstance<'_> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn get_incrementer(&self) -> Option<&dyn JobParametersIncrementer> {
        self.incrementer
    }

    fn run(
        &self,
        job_execution: &mut JobExecution,
        repository: &dyn JobRepository,
    ) -> JobResult<()> {
        job_execution.start_time = Some(Utc::now());
        job_execution.status = BatchStatus::Started;
        repository.update_job_execution(job_execution)?;

        info!(
            "Start of job: {}, id: {}, execution: {}, parameters: {}",
            self.name, self.id, job_execution.id, job_execution.parameters
        );

        let result = self.run_steps(job_execution, repository);

        job_execution.end_time = Some(Utc::now());

        match &result {
            Ok(()) => {
                job_execution.status = BatchStatus::Completed;
                info!(
                    "End of job: {}, id: {}, execution: {}",
                    self.name, self.id, job_execution.id
                );
            }
            Err(cause) => {
                job_execution.status = BatchStatus::Failed;
                if job_execution.failure.is_none() {
                    job_execution.failure = Some(cause.to_string());
                }
                error!(
                    "Job {} failed, execution: {}: {}",
                    self.name, job_execution.id, cause
                );
            }
        }

        repository.update_job_execution(job_execution)?;
        result
    }
}

impl JobInstance<'_> {
    pub fn get_step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.get_name()).collect()
    }

    fn run_steps(
        &self,
        job_execution: &mut JobExecution,
        repository: &dyn JobRepository,
    ) -> JobResult<()> {
        let context = StepContext::new(repository, job_execution.id);
        let mut predecessor: Option<(&str, BatchStatus)> = None;

        for step in &self.steps {
            let name = step.get_name();
            let previous =
                repository.get_last_step_execution(&self.name, &job_execution.parameters, name)?;

            if let Some(previous) = &previous {
                if previous.status == BatchStatus::Completed {
                    info!("Step {} already completed, skipping", name);
                    predecessor = Some((name, BatchStatus::Completed));
                    continue;
                }
            }

            Self::ensure_predecessor_completed(name, predecessor)?;

            let mut step_execution = match &previous {
                Some(previous) => StepExecution::resume(previous),
                None => StepExecution::new(name),
            };

            let result = step.execute(&mut step_execution, &context);

            job_execution.upsert_step_execution(&step_execution);
            predecessor = Some((name, step_execution.status));

            if result.is_err() {
                job_execution.failure = step_execution
                    .failure
                    .as_ref()
                    .map(|cause| format!("step {}: {}", name, cause));
                return Err(BatchError::Step(name.to_string()));
            }
        }

        Ok(())
    }

    /// Rejects a step whose predecessor in this run did not complete.
    fn ensure_predecessor_completed(
        step: &str,
        predecessor: Option<(&str, BatchStatus)>,
    ) -> JobResult<()> {
        match predecessor {
            Some((name, status)) if status != BatchStatus::Completed => {
                Err(BatchError::StepSequencing {
                    step: step.to_string(),
                    predecessor: name.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Builder for creating a job instance.
///
/// ```rust,ignore
/// let job = JobBuilder::new()
///     .name("etl".to_string())
///     .incrementer(&RunIdIncrementer)
///     .start(&file_to_db)
///     .next(&db_to_file)
///     .build();
/// ```
#[derive(Default)]
pub struct JobBuilder<'a> {
    /// Optional name for the job (generated randomly if not specified)
    name: Option<String>,
    /// Collection of steps to be executed, in order
    steps: Vec<&'a dyn Step>,
    incrementer: Option<&'a dyn JobParametersIncrementer>,
}

impl<'a> JobBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: None,
            steps: Vec::new(),
            incrementer: None,
        }
    }

    pub fn name(mut self, name: String) -> JobBuilder<'a> {
        self.name = Some(name);
        self
    }

    /// Sets the first step of the job.
    pub fn start(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    /// Adds a step, run after every step added before it.
    pub fn next(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    pub fn incrementer(mut self, incrementer: &'a dyn JobParametersIncrementer) -> JobBuilder<'a> {
        self.incrementer = Some(incrementer);
        self
    }

    /// Builds the job. If no name has been provided, a random name is generated.
    pub fn build(self) -> JobInstance<'a> {
        JobInstance {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            steps: self.steps,
            incrementer: self.incrementer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        parameters::JobParameters,
        repository::InMemoryJobRepository,
        step::StepBuilder,
        testing::{VecReader, VecWriter},
    };

    fn launch(job: &JobInstance, repository: &InMemoryJobRepository) -> (JobExecution, JobResult<()>) {
        let mut execution = repository
            .create_job_execution(job.get_name(), &JobParameters::new())
            .unwrap();
        let result = job.run(&mut execution, repository);
        (execution, result)
    }

    #[test]
    fn job_should_run_steps_in_order() {
        let first_reader = VecReader::new(vec![1, 2, 3]);
        let first_writer = VecWriter::default();
        let second_reader = VecReader::new(vec![4, 5]);
        let second_writer = VecWriter::default();

        let first = StepBuilder::new("first")
            .reader(&first_reader)
            .writer(&first_writer)
            .chunk(2)
            .build()
            .unwrap();
        let second = StepBuilder::new("second")
            .reader(&second_reader)
            .writer(&second_writer)
            .chunk(2)
            .build()
            .unwrap();

        let job = JobBuilder::new()
            .name("ordered".to_string())
            .start(&first)
            .next(&second)
            .build();
        assert_eq!(job.get_step_names(), vec!["first", "second"]);

        let repository = InMemoryJobRepository::new();
        let (execution, result) = launch(&job, &repository);

        assert!(result.is_ok());
        assert_eq!(execution.status, BatchStatus::Completed);
        assert!(execution.end_time >= execution.start_time);
        let names: Vec<&str> = execution
            .step_executions
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(first_writer.get_items(), vec![1, 2, 3]);
        assert_eq!(second_writer.get_items(), vec![4, 5]);

        assert_eq!(repository.get_job_executions(), vec![execution]);
    }

    #[test]
    fn failed_step_should_stop_the_job() {
        let first_reader = VecReader::new(vec![1, 2, 3]).failing_at(2);
        let first_writer = VecWriter::default();
        let second_reader = VecReader::new(vec![4, 5]);
        let second_writer = VecWriter::default();

        let first = StepBuilder::new("first")
            .reader(&first_reader)
            .writer(&first_writer)
            .build()
            .unwrap();
        let second = StepBuilder::new("second")
            .reader(&second_reader)
            .writer(&second_writer)
            .build()
            .unwrap();

        let job = JobBuilder::new().start(&first).next(&second).build();

        let repository = InMemoryJobRepository::new();
        let (execution, result) = launch(&job, &repository);

        assert_eq!(result, Err(BatchError::Step("first".to_string())));
        assert_eq!(execution.status, BatchStatus::Failed);
        assert_eq!(execution.step_executions.len(), 1);
        assert!(execution.failure.as_deref().unwrap_or("").contains("first"));
        assert_eq!(second_reader.get_reads(), 0);
        assert_eq!(second_writer.get_calls(), 0);
    }

    #[test]
    fn step_should_not_start_after_an_incomplete_predecessor() {
        let result =
            JobInstance::ensure_predecessor_completed("second", Some(("first", BatchStatus::Failed)));
        assert_eq!(
            result,
            Err(BatchError::StepSequencing {
                step: "second".to_string(),
                predecessor: "first".to_string(),
            })
        );

        assert!(JobInstance::ensure_predecessor_completed("first", None).is_ok());
        assert!(JobInstance::ensure_predecessor_completed(
            "second",
            Some(("first", BatchStatus::Completed))
        )
        .is_ok());
    }

    #[test]
    fn rerun_of_the_same_instance_should_skip_completed_steps() {
        let repository = InMemoryJobRepository::new();
        let parameters = JobParameters::new().with("run.id", 1);

        let first_reader = VecReader::new(vec![1, 2]);
        let first_writer = VecWriter::default();
        let second_reader = VecReader::new(vec![3, 4, 5]).failing_at(2);
        let second_writer = VecWriter::default();
        let first = StepBuilder::new("first")
            .reader(&first_reader)
            .writer(&first_writer)
            .chunk(1)
            .build()
            .unwrap();
        let second = StepBuilder::new("second")
            .reader(&second_reader)
            .writer(&second_writer)
            .chunk(1)
            .build()
            .unwrap();
        let job = JobBuilder::new().name("etl".to_string()).start(&first).next(&second).build();

        let mut failed = repository.create_job_execution("etl", &parameters).unwrap();
        assert!(job.run(&mut failed, &repository).is_err());
        assert_eq!(second_writer.get_items(), vec![3, 4]);

        // Fresh components, as a relaunch in a new process would build them.
        let first_reader = VecReader::new(vec![1, 2]);
        let first_writer = VecWriter::default();
        let second_reader = VecReader::new(vec![3, 4, 5]);
        let second_writer = VecWriter::default();
        let first = StepBuilder::new("first")
            .reader(&first_reader)
            .writer(&first_writer)
            .chunk(1)
            .build()
            .unwrap();
        let second = StepBuilder::new("second")
            .reader(&second_reader)
            .writer(&second_writer)
            .chunk(1)
            .build()
            .unwrap();
        let job = JobBuilder::new().name("etl".to_string()).start(&first).next(&second).build();

        let mut restarted = repository.create_job_execution("etl", &parameters).unwrap();
        assert!(job.run(&mut restarted, &repository).is_ok());

        assert_eq!(first_reader.get_reads(), 0);
        assert_eq!(second_reader.get_first_read(), Some(2));
        assert_eq!(second_writer.get_items(), vec![5]);
        assert_eq!(restarted.step_executions.len(), 1);
        assert_eq!(restarted.step_executions[0].restart_position, 3);
    }
}
