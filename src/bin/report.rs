//! Cron entry point for the report job. Takes no arguments; see `TAXI_PIPELINE_CONFIG`.

use std::process::ExitCode;

use taxi_pipeline::app::{self, Job};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    app::execute(Job::Report, None).await
}
