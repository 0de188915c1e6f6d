use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::BatchError;

use super::{
    execution::{JobExecution, StepExecution},
    parameters::JobParameters,
};

/// Persists job and step executions so that failed jobs can be restarted.
pub trait JobRepository {
    /// Registers a new execution of the (job, parameters) instance and assigns
    /// it the next execution id.
    fn create_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<JobExecution, BatchError>;

    fn update_job_execution(&self, job_execution: &JobExecution) -> Result<(), BatchError>;

    /// Records the state of a step execution. Called after every chunk commit.
    fn update_step_execution(
        &self,
        job_execution_id: u64,
        step_execution: &StepExecution,
    ) -> Result<(), BatchError>;

    fn get_last_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<Option<JobExecution>, BatchError>;

    fn get_last_job_execution_by_name(
        &self,
        job_name: &str,
    ) -> Result<Option<JobExecution>, BatchError>;

    /// Last recorded execution of `step_name` within the (job, parameters) instance.
    fn get_last_step_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
        step_name: &str,
    ) -> Result<Option<StepExecution>, BatchError>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct RepositoryState {
    last_id: u64,
    executions: Vec<JobExecution>,
}

impl RepositoryState {
    fn create(&mut self, job_name: &str, parameters: &JobParameters) -> JobExecution {
        self.last_id += 1;
        let execution = JobExecution::new(self.last_id, job_name, parameters.clone());
        self.executions.push(execution.clone());
        execution
    }

    fn find_mut(&mut self, id: u64) -> Result<&mut JobExecution, BatchError> {
        self.executions
            .iter_mut()
            .find(|execution| execution.id == id)
            .ok_or_else(|| BatchError::Repository(format!("unknown job execution {}", id)))
    }

    fn update_job(&mut self, job_execution: &JobExecution) -> Result<(), BatchError> {
        let stored = self.find_mut(job_execution.id)?;
        *stored = job_execution.clone();
        Ok(())
    }

    fn update_step(&mut self, id: u64, step_execution: &StepExecution) -> Result<(), BatchError> {
        self.find_mut(id)?.upsert_step_execution(step_execution);
        Ok(())
    }

    fn instance_executions<'s>(
        &'s self,
        job_name: &'s str,
        parameters: &'s JobParameters,
    ) -> impl DoubleEndedIterator<Item = &'s JobExecution> + 's {
        self.executions
            .iter()
            .filter(move |e| e.job_name == job_name && &e.parameters == parameters)
    }

    fn last_job(&self, job_name: &str, parameters: &JobParameters) -> Option<JobExecution> {
        self.instance_executions(job_name, parameters)
            .next_back()
            .cloned()
    }

    fn last_job_by_name(&self, job_name: &str) -> Option<JobExecution> {
        self.executions
            .iter()
            .rev()
            .find(|e| e.job_name == job_name)
            .cloned()
    }

    /// Forgets the completed instances of `job_name` beyond the `keep` most
    /// recently launched ones. Unfinished instances are always kept.
    fn prune(&mut self, job_name: &str, keep: usize) {
        let mut instances: Vec<&JobParameters> = Vec::new();
        for execution in self.executions.iter().rev().filter(|e| e.job_name == job_name) {
            if !instances.contains(&&execution.parameters) {
                instances.push(&execution.parameters);
            }
        }

        let forgotten: Vec<JobParameters> = instances
            .into_iter()
            .skip(keep)
            .filter(|parameters| {
                self.last_job(job_name, parameters)
                    .is_some_and(|last| last.is_successful())
            })
            .cloned()
            .collect();

        if !forgotten.is_empty() {
            debug!("Forgetting {} completed instances of {}", forgotten.len(), job_name);
            self.executions
                .retain(|e| e.job_name != job_name || !forgotten.contains(&e.parameters));
        }
    }

    fn last_step(
        &self,
        job_name: &str,
        parameters: &JobParameters,
        step_name: &str,
    ) -> Option<StepExecution> {
        self.instance_executions(job_name, parameters)
            .rev()
            .find_map(|e| e.get_step_execution(step_name))
            .cloned()
    }
}

/// Keeps executions in memory for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryJobRepository {
    state: RefCell<RepositoryState>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All executions recorded so far, oldest first.
    pub fn get_job_executions(&self) -> Vec<JobExecution> {
        self.state.borrow().executions.clone()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn create_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<JobExecution, BatchError> {
        Ok(self.state.borrow_mut().create(job_name, parameters))
    }

    fn update_job_execution(&self, job_execution: &JobExecution) -> Result<(), BatchError> {
        self.state.borrow_mut().update_job(job_execution)
    }

    fn update_step_execution(
        &self,
        job_execution_id: u64,
        step_execution: &StepExecution,
    ) -> Result<(), BatchError> {
        self.state
            .borrow_mut()
            .update_step(job_execution_id, step_execution)
    }

    fn get_last_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<Option<JobExecution>, BatchError> {
        Ok(self.state.borrow().last_job(job_name, parameters))
    }

    fn get_last_job_execution_by_name(
        &self,
        job_name: &str,
    ) -> Result<Option<JobExecution>, BatchError> {
        Ok(self.state.borrow().last_job_by_name(job_name))
    }

    fn get_last_step_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
        step_name: &str,
    ) -> Result<Option<StepExecution>, BatchError> {
        Ok(self.state.borrow().last_step(job_name, parameters, step_name))
    }
}

/// Stores executions in a JSON document, rewritten after every change, so
/// that a job failed in one process can be restarted by the next.
///
/// The whole history is rewritten on each chunk commit. Bound it with
/// [`JsonFileJobRepository::with_retained_instances`]; by default nothing is
/// forgotten.
pub struct JsonFileJobRepository {
    path: PathBuf,
    state: RefCell<RepositoryState>,
    retained_instances: Option<usize>,
}

impl JsonFileJobRepository {
    /// Opens the repository at `path`, starting empty when the file does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let path = path.as_ref().to_path_buf();

        let state: RepositoryState = if path.exists() {
            let content = fs::read(&path).map_err(|error| repository_error(&path, error))?;
            serde_json::from_slice(&content).map_err(|error| repository_error(&path, error))?
        } else {
            RepositoryState::default()
        };

        debug!("Job repository opened at {}", path.display());

        Ok(Self {
            path,
            state: RefCell::new(state),
            retained_instances: None,
        })
    }

    /// Keeps only the `keep` most recent instances of each job once they
    /// completed; pruning happens when an execution is created.
    ///
    /// A forgotten instance is no longer detected as a duplicate run.
    pub fn with_retained_instances(mut self, keep: usize) -> Self {
        self.retained_instances = Some(keep.max(1));
        self
    }

    fn mutate<T>(
        &self,
        operation: impl FnOnce(&mut RepositoryState) -> Result<T, BatchError>,
    ) -> Result<T, BatchError> {
        let mut state = self.state.borrow_mut();
        let result = operation(&mut state)?;
        self.save(&state)?;
        Ok(result)
    }

    fn save(&self, state: &RepositoryState) -> Result<(), BatchError> {
        let content =
            serde_json::to_vec_pretty(state).map_err(|error| repository_error(&self.path, error))?;

        // Write aside then rename so a crash never leaves a truncated document.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content).map_err(|error| repository_error(&staging, error))?;
        fs::rename(&staging, &self.path).map_err(|error| repository_error(&self.path, error))
    }
}

fn repository_error(path: &Path, error: impl ToString) -> BatchError {
    BatchError::Repository(format!("{}: {}", path.display(), error.to_string()))
}

impl JobRepository for JsonFileJobRepository {
    fn create_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<JobExecution, BatchError> {
        self.mutate(|state| {
            let execution = state.create(job_name, parameters);
            if let Some(keep) = self.retained_instances {
                state.prune(job_name, keep);
            }
            Ok(execution)
        })
    }

    fn update_job_execution(&self, job_execution: &JobExecution) -> Result<(), BatchError> {
        self.mutate(|state| state.update_job(job_execution))
    }

    fn update_step_execution(
        &self,
        job_execution_id: u64,
        step_execution: &StepExecution,
    ) -> Result<(), BatchError> {
        self.mutate(|state| state.update_step(job_execution_id, step_execution))
    }

    fn get_last_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<Option<JobExecution>, BatchError> {
        Ok(self.state.borrow().last_job(job_name, parameters))
    }

    fn get_last_job_execution_by_name(
        &self,
        job_name: &str,
    ) -> Result<Option<JobExecution>, BatchError> {
        Ok(self.state.borrow().last_job_by_name(job_name))
    }

    fn get_last_step_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
        step_name: &str,
    ) -> Result<Option<StepExecution>, BatchError> {
        Ok(self.state.borrow().last_step(job_name, parameters, step_name))
    }
}
