//! Loads people from a delimited file into SQLite, then writes the number of
//! people per age to another delimited file.
//!
//! ```sh
//! ETL_INPUT=people.csv ETL_OUTPUT=ages.csv ETL_REPOSITORY=jobs.json \
//!     RUST_LOG=info cargo run --example people_etl --features full
//! ```
//!
//! With `ETL_REPOSITORY` set, a failed run is resumed by the next invocation.
//! A run killed before it finished stays recorded as running; relaunch with
//! `ETL_RECOVER_INTERRUPTED=true` to resume it.

use anyhow::{bail, Context, Result};
use batch_etl::{
    config::EtlConfig,
    core::{
        execution::JobExecution,
        repository::{InMemoryJobRepository, JsonFileJobRepository},
    },
    pipeline::{initialize_schema, launch},
};
use log::info;
use sqlx::SqlitePool;

/// Completed runs kept in the job repository.
const RETAINED_RUNS: usize = 20;

fn report(execution: &JobExecution) {
    for step in &execution.step_executions {
        info!(
            "{}: {:?}, read {}, written {}, commits {}, rollbacks {}",
            step.name,
            step.status,
            step.read_count,
            step.write_count,
            step.commit_count,
            step.rollback_count
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = EtlConfig::from_env().context("reading ETL_* variables")?;
    let pool = SqlitePool::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    initialize_schema(&pool).await?;

    let execution = match &config.repository {
        Some(path) => {
            let repository = JsonFileJobRepository::open(path)?.with_retained_instances(RETAINED_RUNS);
            launch(&config, &pool, &repository)?
        }
        None => launch(&config, &pool, &InMemoryJobRepository::new())?,
    };

    report(&execution);

    if !execution.is_successful() {
        bail!(
            "job {} failed: {}",
            execution.id,
            execution.failure.as_deref().unwrap_or("unknown cause")
        );
    }

    info!("Summary written to {}", config.output.display());
    Ok(())
}
