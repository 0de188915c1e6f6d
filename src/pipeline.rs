//! The two-stage ETL job.
//!
//! - `file-db` loads `first_name,age,email` lines into the `PEOPLE` table.
//! - `db-file` counts people per age and writes one `age,count` line per age.
//!
//! Both steps commit every [`CHUNK_SIZE`] items. The job is launched with the
//! next `run.id`, or restarted with the previous one when the last run failed.
//! A run left `Started` by a dead process blocks the job until it is recovered
//! (see [`EtlConfig::recover_interrupted`]).

use log::info;
use serde::{Deserialize, Serialize};
use sqlx::{query_builder::Separated, sqlite::SqliteRow, Pool, Row, Sqlite};

use crate::{
    config::{EtlConfig, CHUNK_SIZE},
    core::{
        execution::JobExecution,
        job::JobBuilder,
        launcher::JobLauncher,
        parameters::RunIdIncrementer,
        repository::JobRepository,
        step::StepBuilder,
    },
    item::{
        csv::{csv_reader::CsvItemReaderBuilder, csv_writer::CsvItemWriterBuilder},
        rdbc::{
            sqlite_reader::SqliteItemReaderBuilder, sqlite_writer::SqliteItemWriter,
            DatabaseItemBinder,
        },
    },
    BatchError,
};

pub const JOB_NAME: &str = "etl";
pub const FILE_TO_DB_STEP: &str = "file-db";
pub const DB_TO_FILE_STEP: &str = "db-file";

const CREATE_PEOPLE_TABLE: &str = "CREATE TABLE IF NOT EXISTS PEOPLE (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    AGE INTEGER,
    FIRST_NAME TEXT,
    EMAIL TEXT
)";

/// Number of people per age, ascending by age.
pub const AGE_COUNT_QUERY: &str =
    "SELECT COUNT(age) AS b, age AS a FROM PEOPLE GROUP BY age ORDER BY age";

/// One line of the input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub age: i32,
    pub email: String,
}

/// One line of the output file.
#[derive(Debug, Clone, PartialEq)]
pub struct AgeCount {
    pub age: i64,
    pub count: i64,
}

struct PersonBinder;

impl DatabaseItemBinder<Person, Sqlite> for PersonBinder {
    fn bind(&self, item: &Person, mut query_builder: Separated<Sqlite, &str>) {
        query_builder.push_bind(item.age);
        query_builder.push_bind(item.first_name.clone());
        query_builder.push_bind(item.email.clone());
    }
}

fn map_age_count(row: &SqliteRow) -> Result<AgeCount, BatchError> {
    let column = |name: &str| {
        row.try_get::<i64, _>(name)
            .map_err(|error| BatchError::ItemReader(format!("column {}: {}", name, error)))
    };

    Ok(AgeCount {
        age: column("a")?,
        count: column("b")?,
    })
}

fn age_count_fields(item: &AgeCount) -> Vec<String> {
    vec![item.age.to_string(), item.count.to_string()]
}

/// Creates the `PEOPLE` table when it does not exist yet.
pub async fn initialize_schema(pool: &Pool<Sqlite>) -> Result<(), BatchError> {
    sqlx::query(CREATE_PEOPLE_TABLE)
        .execute(pool)
        .await
        .map_err(|error| BatchError::Configuration(format!("PEOPLE table: {}", error)))?;
    Ok(())
}

/// Wires both steps and launches the next instance of the `etl` job.
///
/// Must be called from a multi-threaded tokio runtime; the schema must exist.
///
/// # Errors
/// Configuration problems and launch rejections. A step failure is not an
/// error: the returned execution is `Failed` and records the cause.
pub fn launch(
    config: &EtlConfig,
    pool: &Pool<Sqlite>,
    repository: &dyn JobRepository,
) -> Result<JobExecution, BatchError> {
    let delimiter = config.delimiter_byte()?;

    let person_reader = CsvItemReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(&config.input)?;
    let binder = PersonBinder;
    let person_writer = SqliteItemWriter::<Person>::new()
        .pool(pool)
        .table("PEOPLE")
        .add_column("AGE")
        .add_column("FIRST_NAME")
        .add_column("EMAIL")
        .item_binder(&binder);

    let file_to_db = StepBuilder::<Person, Person>::new(FILE_TO_DB_STEP)
        .reader(&person_reader)
        .writer(&person_writer)
        .chunk(CHUNK_SIZE)
        .build()?;

    let age_count_reader = SqliteItemReaderBuilder::<AgeCount>::new()
        .pool(pool)
        .query(AGE_COUNT_QUERY)
        .row_mapper(&map_age_count)
        .build()?;
    let age_count_writer = CsvItemWriterBuilder::with_field_extractor(age_count_fields)
        .delimiter(delimiter)
        .from_path(&config.output)?;

    let db_to_file = StepBuilder::new(DB_TO_FILE_STEP)
        .reader(&age_count_reader)
        .writer(&age_count_writer)
        .chunk(CHUNK_SIZE)
        .build()?;

    let job = JobBuilder::new()
        .name(JOB_NAME.to_string())
        .incrementer(&RunIdIncrementer)
        .start(&file_to_db)
        .next(&db_to_file)
        .build();

    info!(
        "Launching {}: {} -> {} -> {}",
        JOB_NAME,
        config.input.display(),
        config.database_url,
        config.output.display()
    );

    let launcher = JobLauncher::new(repository);
    if config.recover_interrupted {
        launcher.recover_interrupted(&job)?;
    }
    launcher.start_next_instance(&job)
}
