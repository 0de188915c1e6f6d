use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::BatchError;

/// Number of items committed together by both pipeline steps.
pub const CHUNK_SIZE: usize = 100;

const DEFAULT_DATABASE_URL: &str = "sqlite://etl.db?mode=rwc";

/// Runtime settings of the ETL pipeline.
///
/// `input` and `output` accept plain paths as well as `file://` URIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Delimited file loaded into the database
    pub input: PathBuf,
    /// Delimited file receiving the per-age summary
    pub output: PathBuf,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// JSON file persisting job executions across processes; in memory when absent
    #[serde(default)]
    pub repository: Option<PathBuf>,
    /// Marks a last execution left running by a dead process as failed
    /// before launching, so it resumes instead of being rejected
    #[serde(default)]
    pub recover_interrupted: bool,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_delimiter() -> char {
    ','
}

/// Turns a `file://` URI into a path; anything else is taken as a path.
fn locator_path(locator: &str) -> PathBuf {
    PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator))
}

fn invalid(message: String) -> BatchError {
    BatchError::Configuration(message)
}

impl EtlConfig {
    pub fn new(input: &str, output: &str) -> Self {
        Self {
            input: locator_path(input),
            output: locator_path(output),
            database_url: default_database_url(),
            delimiter: default_delimiter(),
            repository: None,
            recover_interrupted: false,
        }
    }

    pub fn with_database_url(mut self, database_url: &str) -> Self {
        self.database_url = database_url.to_string();
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_repository(mut self, repository: &str) -> Self {
        self.repository = Some(locator_path(repository));
        self
    }

    pub fn with_recover_interrupted(mut self, recover: bool) -> Self {
        self.recover_interrupted = recover;
        self
    }

    /// Reads `ETL_INPUT` and `ETL_OUTPUT` (required), `ETL_DATABASE_URL`,
    /// `ETL_DELIMITER`, `ETL_REPOSITORY` and `ETL_RECOVER_INTERRUPTED`
    /// (optional, `true` or `false`).
    pub fn from_env() -> Result<Self, BatchError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BatchError> {
        let required =
            |key: &str| lookup(key).ok_or_else(|| invalid(format!("missing variable {}", key)));

        let mut config = Self::new(&required("ETL_INPUT")?, &required("ETL_OUTPUT")?);

        if let Some(url) = lookup("ETL_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(delimiter) = lookup("ETL_DELIMITER") {
            let mut chars = delimiter.chars();
            config.delimiter = match (chars.next(), chars.next()) {
                (Some(delimiter), None) => delimiter,
                _ => return Err(invalid(format!("ETL_DELIMITER must be one character, got {:?}", delimiter))),
            };
        }
        if let Some(repository) = lookup("ETL_REPOSITORY") {
            config = config.with_repository(&repository);
        }
        if let Some(recover) = lookup("ETL_RECOVER_INTERRUPTED") {
            config.recover_interrupted = recover.parse().map_err(|_| {
                invalid(format!("ETL_RECOVER_INTERRUPTED must be true or false, got {:?}", recover))
            })?;
        }

        config.validate()
    }

    /// Loads the settings from a JSON document.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|error| invalid(format!("{}: {}", path.display(), error)))?;
        let mut config: EtlConfig = serde_json::from_str(&content)
            .map_err(|error| invalid(format!("{}: {}", path.display(), error)))?;

        config.input = locator_path(&config.input.to_string_lossy());
        config.output = locator_path(&config.output.to_string_lossy());
        config.repository = config
            .repository
            .map(|repository| locator_path(&repository.to_string_lossy()));

        config.validate()
    }

    fn validate(self) -> Result<Self, BatchError> {
        self.delimiter_byte()?;
        Ok(self)
    }

    /// The delimiter as the single byte the delimited items expect.
    pub fn delimiter_byte(&self) -> Result<u8, BatchError> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(invalid(format!(
                "delimiter must be an ASCII character, got {:?}",
                self.delimiter
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use tempfile::NamedTempFile;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn file_uris_should_become_paths() {
        let config = EtlConfig::new("file:///data/people.csv", "out/summary.csv");

        assert_eq!(config.input, PathBuf::from("/data/people.csv"));
        assert_eq!(config.output, PathBuf::from("out/summary.csv"));
        assert_eq!(config.delimiter, ',');
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.repository, None);
    }

    #[test]
    fn environment_should_provide_every_setting() {
        let config = EtlConfig::from_lookup(lookup(&[
            ("ETL_INPUT", "in.csv"),
            ("ETL_OUTPUT", "file://out.csv"),
            ("ETL_DATABASE_URL", "sqlite::memory:"),
            ("ETL_DELIMITER", ";"),
            ("ETL_REPOSITORY", "jobs.json"),
            ("ETL_RECOVER_INTERRUPTED", "true"),
        ]))
        .unwrap();

        assert_eq!(config.input, PathBuf::from("in.csv"));
        assert_eq!(config.output, PathBuf::from("out.csv"));
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.delimiter_byte(), Ok(b';'));
        assert_eq!(config.repository, Some(PathBuf::from("jobs.json")));
        assert!(config.recover_interrupted);
    }

    #[test]
    fn recovery_flag_should_be_a_boolean() {
        let result = EtlConfig::from_lookup(lookup(&[
            ("ETL_INPUT", "in.csv"),
            ("ETL_OUTPUT", "out.csv"),
            ("ETL_RECOVER_INTERRUPTED", "yes"),
        ]));
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn missing_locator_should_be_rejected() {
        let result = EtlConfig::from_lookup(lookup(&[("ETL_INPUT", "in.csv")]));

        assert_eq!(
            result,
            Err(BatchError::Configuration("missing variable ETL_OUTPUT".to_string()))
        );
    }

    #[test]
    fn delimiter_should_be_a_single_ascii_character() {
        let too_long = EtlConfig::from_lookup(lookup(&[
            ("ETL_INPUT", "in.csv"),
            ("ETL_OUTPUT", "out.csv"),
            ("ETL_DELIMITER", ";;"),
        ]));
        assert!(matches!(too_long, Err(BatchError::Configuration(_))));

        let not_ascii = EtlConfig::new("in.csv", "out.csv").with_delimiter('§');
        assert!(matches!(not_ascii.delimiter_byte(), Err(BatchError::Configuration(_))));
    }

    #[test]
    fn json_file_should_fill_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"input": "file://people.csv", "output": "summary.csv"}}"#).unwrap();

        let config = EtlConfig::from_json_file(file.path()).unwrap();

        assert_eq!(config, EtlConfig::new("people.csv", "summary.csv"));
    }

    #[test]
    fn unreadable_json_should_be_a_configuration_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        assert!(matches!(
            EtlConfig::from_json_file(file.path()),
            Err(BatchError::Configuration(_))
        ));
        assert!(matches!(
            EtlConfig::from_json_file("/nonexistent/etl.json"),
            Err(BatchError::Configuration(_))
        ));
    }
}
