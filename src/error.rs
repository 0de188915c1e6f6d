use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Batch error
pub enum BatchError {
    #[error("ItemWriter from: {0}")]
    ItemWriter(String),

    #[error("ItemReader from: {0}")]
    ItemReader(String),

    #[error("ItemProcessor from: {0}")]
    ItemProcessor(String),

    /// A step ended in failure. Carries the step name.
    #[error("Step {0} failed")]
    Step(String),

    /// A step was about to start while its predecessor had not completed.
    #[error("Step {step} cannot start: predecessor {predecessor} did not complete")]
    StepSequencing { step: String, predecessor: String },

    /// The job instance identified by these parameters already completed.
    #[error("Job {job} already completed with parameters {parameters}")]
    DuplicateRun { job: String, parameters: String },

    #[error("Job {0} is already running")]
    JobAlreadyRunning(String),

    #[error("Job repository: {0}")]
    Repository(String),

    #[error("Configuration: {0}")]
    Configuration(String),
}
