use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Key under which [`RunIdIncrementer`] stores the run identifier.
pub const RUN_ID_KEY: &str = "run.id";

/// Parameters of a job run.
///
/// Together with the job name they identify a job instance: launching a job
/// twice with equal parameters targets the same instance, which is how a
/// failed run gets restarted and how a completed one gets rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    parameters: BTreeMap<String, String>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Returns the value of `key` parsed as an integer, if present and numeric.
    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|value| value.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

impl fmt::Display for JobParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (index, (key, value)) in self.parameters.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, "}}")
    }
}

/// Derives the parameters of the next job instance from the previous ones.
pub trait JobParametersIncrementer {
    fn get_next(&self, previous: Option<&JobParameters>) -> JobParameters;
}

/// Increments `run.id` so that every launch gets a new job instance.
#[derive(Default)]
pub struct RunIdIncrementer;

impl JobParametersIncrementer for RunIdIncrementer {
    fn get_next(&self, previous: Option<&JobParameters>) -> JobParameters {
        let previous = previous.cloned().unwrap_or_default();
        let run_id = previous.get_long(RUN_ID_KEY).unwrap_or(0) + 1;
        previous.with(RUN_ID_KEY, run_id)
    }
}
