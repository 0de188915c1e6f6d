use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parameters::JobParameters;

/// Status shared by job and step executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Created, not yet running.
    Starting,
    /// Running.
    Started,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped by request before finishing.
    Stopped,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Stopped
        )
    }

    /// Whether an execution ending in this status may be resumed by a relaunch.
    pub fn is_restartable(&self) -> bool {
        matches!(self, BatchStatus::Failed | BatchStatus::Stopped)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, BatchStatus::Starting | BatchStatus::Started)
    }
}

/// One execution of one step.
///
/// Counters only ever reflect committed chunks: they move right after a
/// chunk write succeeded, never before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    /// Unique identifier for this step execution
    pub id: Uuid,
    /// Name of the step
    pub name: String,
    /// Current status of the step execution
    pub status: BatchStatus,
    /// Items read and committed by this execution
    pub read_count: usize,
    /// Items written and committed by this execution
    pub write_count: usize,
    /// Chunks committed by this execution
    pub commit_count: usize,
    /// Chunks rolled back by this execution
    pub rollback_count: usize,
    /// Source items committed across every execution of the step. A restart
    /// resumes reading at this position.
    pub restart_position: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Cause of the failure, if the step failed
    pub failure: Option<String>,
}

impl StepExecution {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: BatchStatus::Starting,
            read_count: 0,
            write_count: 0,
            commit_count: 0,
            rollback_count: 0,
            restart_position: 0,
            start_time: None,
            end_time: None,
            failure: None,
        }
    }

    /// Creates the execution that resumes `previous` where its last commit left off.
    pub fn resume(previous: &StepExecution) -> Self {
        Self {
            restart_position: previous.restart_position,
            ..Self::new(&previous.name)
        }
    }
}

/// One run of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    /// Monotonic identifier assigned by the repository at launch
    pub id: u64,
    pub job_name: String,
    pub parameters: JobParameters,
    pub status: BatchStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Step executions of this run, in execution order
    pub step_executions: Vec<StepExecution>,
    pub failure: Option<String>,
}

impl JobExecution {
    pub fn new(id: u64, job_name: &str, parameters: JobParameters) -> Self {
        Self {
            id,
            job_name: job_name.to_string(),
            parameters,
            status: BatchStatus::Starting,
            start_time: None,
            end_time: None,
            step_executions: Vec::new(),
            failure: None,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == BatchStatus::Completed
    }

    pub fn get_step_execution(&self, name: &str) -> Option<&StepExecution> {
        self.step_executions.iter().find(|step| step.name == name)
    }

    /// Replaces the recorded execution with the same id, or appends it.
    pub fn upsert_step_execution(&mut self, step_execution: &StepExecution) {
        match self
            .step_executions
            .iter_mut()
            .find(|step| step.id == step_execution.id)
        {
            Some(existing) => *existing = step_execution.clone(),
            None => self.step_executions.push(step_execution.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_should_carry_only_the_restart_position() {
        let mut failed = StepExecution::new("file-db");
        failed.status = BatchStatus::Failed;
        failed.read_count = 200;
        failed.commit_count = 2;
        failed.restart_position = 200;
        failed.failure = Some("boom".to_string());

        let resumed = StepExecution::resume(&failed);

        assert_eq!(resumed.name, "file-db");
        assert_eq!(resumed.status, BatchStatus::Starting);
        assert_eq!(resumed.restart_position, 200);
        assert_eq!(resumed.read_count, 0);
        assert_eq!(resumed.commit_count, 0);
        assert!(resumed.failure.is_none());
        assert_ne!(resumed.id, failed.id);
    }

    #[test]
    fn upsert_should_replace_by_id() {
        let mut job_execution = JobExecution::new(1, "etl", JobParameters::new());
        let mut step = StepExecution::new("file-db");

        job_execution.upsert_step_execution(&step);
        step.commit_count = 1;
        job_execution.upsert_step_execution(&step);

        assert_eq!(job_execution.step_executions.len(), 1);
        assert_eq!(job_execution.step_executions[0].commit_count, 1);
    }

    #[test]
    fn statuses_should_classify() {
        assert!(BatchStatus::Completed.is_terminal());
        assert!(!BatchStatus::Started.is_terminal());
        assert!(BatchStatus::Failed.is_restartable());
        assert!(!BatchStatus::Completed.is_restartable());
        assert!(BatchStatus::Starting.is_running());
    }
}
