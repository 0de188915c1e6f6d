use chrono::Utc;
use log::{info, warn};

use crate::BatchError;

use super::{
    execution::{BatchStatus, JobExecution},
    job::Job,
    parameters::JobParameters,
    repository::JobRepository,
};

/// Launches jobs against a [`JobRepository`].
///
/// A launch either returns the execution it ran, completed or failed, or is
/// rejected up front with an error when the job instance must not run.
pub struct JobLauncher<'r> {
    repository: &'r dyn JobRepository,
}

impl<'r> JobLauncher<'r> {
    pub fn new(repository: &'r dyn JobRepository) -> Self {
        Self { repository }
    }

    /// Runs `job` for the instance identified by `parameters`.
    ///
    /// - an instance that already completed is rejected with [`BatchError::DuplicateRun`]
    /// - an instance whose last execution is still running is rejected with
    ///   [`BatchError::JobAlreadyRunning`]
    /// - an instance whose last execution failed is restarted
    ///
    /// A step failure does not make this method fail: the returned execution
    /// carries the `Failed` status and its cause.
    pub fn run(&self, job: &dyn Job, parameters: JobParameters) -> Result<JobExecution, BatchError> {
        let name = job.get_name();

        if let Some(last) = self.repository.get_last_job_execution(name, &parameters)? {
            match last.status {
                BatchStatus::Completed => {
                    return Err(BatchError::DuplicateRun {
                        job: name.to_string(),
                        parameters: parameters.to_string(),
                    });
                }
                status if status.is_running() => {
                    return Err(BatchError::JobAlreadyRunning(name.to_string()));
                }
                _ => info!(
                    "Restarting job {} after failed execution {}",
                    name, last.id
                ),
            }
        }

        let mut job_execution = self.repository.create_job_execution(name, &parameters)?;

        match job.run(&mut job_execution, self.repository) {
            Ok(()) => Ok(job_execution),
            Err(BatchError::Repository(cause)) => Err(BatchError::Repository(cause)),
            Err(error) => {
                warn!("Job {} ended with an error: {}", name, error);
                Ok(job_execution)
            }
        }
    }

    /// Launches the next instance of `job`.
    ///
    /// When the last execution of the job failed or was stopped, it is
    /// restarted with its own parameters; otherwise the job's incrementer
    /// derives fresh parameters so the run never collides with an earlier one.
    ///
    /// A last execution still recorded as running is rejected with
    /// [`BatchError::JobAlreadyRunning`]. If the process running it died, see
    /// [`JobLauncher::recover_interrupted`].
    pub fn start_next_instance(&self, job: &dyn Job) -> Result<JobExecution, BatchError> {
        let name = job.get_name();

        let incrementer = job.get_incrementer().ok_or_else(|| {
            BatchError::Configuration(format!("job {} has no parameters incrementer", name))
        })?;

        let last = self.repository.get_last_job_execution_by_name(name)?;

        let parameters = match last {
            Some(last) if last.status.is_running() => {
                return Err(BatchError::JobAlreadyRunning(name.to_string()));
            }
            Some(last) if last.status.is_restartable() => last.parameters,
            Some(last) => incrementer.get_next(Some(&last.parameters)),
            None => incrementer.get_next(None),
        };

        self.run(job, parameters)
    }

    /// Marks the last execution of `job` as failed when it is still recorded
    /// as running, so the next launch restarts it from its committed chunks.
    ///
    /// Only for executions left behind by a process that ended without
    /// finishing the job. Returns the execution marked failed, if any.
    pub fn recover_interrupted(&self, job: &dyn Job) -> Result<Option<JobExecution>, BatchError> {
        let name = job.get_name();

        let mut last = match self.repository.get_last_job_execution_by_name(name)? {
            Some(last) if last.status.is_running() => last,
            _ => return Ok(None),
        };

        let now = Utc::now();
        let cause = format!("execution {} was interrupted", last.id);

        for step in last
            .step_executions
            .iter_mut()
            .filter(|step| step.status.is_running())
        {
            step.status = BatchStatus::Failed;
            step.end_time = Some(now);
            step.failure = Some(cause.clone());
        }
        last.status = BatchStatus::Failed;
        last.end_time = Some(now);
        last.failure = Some(cause);

        self.repository.update_job_execution(&last)?;

        warn!(
            "Job {} execution {} was left running, marked failed for restart",
            name, last.id
        );
        Ok(Some(last))
    }
}
