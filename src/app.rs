//! Process entry: config, logging, clients, then one job.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Local;
use reqwest::Client;
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::{Config, WarehouseConfig};
use crate::error::exit_code_for;
use crate::jobs::{self, load::LoadLeg};
use crate::logging;
use crate::secrets::{fetch_credentials, AwsSecrets, WarehouseCredentials};
use crate::stage::s3::load_aws_config;
use crate::stage::{ObjectStore, S3Store};
use crate::warehouse::snowflake::{account_url, SnowflakeSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Scrape,
    Load,
    Report,
}

impl Job {
    pub fn name(self) -> &'static str {
        match self {
            Job::Scrape => "scrape",
            Job::Load => "load",
            Job::Report => "report",
        }
    }
}

/// Run `job` to completion and map the outcome to a process exit code.
pub async fn execute(job: Job, config_path: Option<&Path>) -> ExitCode {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("taxi-pipeline: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };
    let _guard = match logging::init(config.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("taxi-pipeline: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    info!(job = job.name(), "job started");
    match dispatch(job, &config).await {
        Ok(()) => {
            info!(job = job.name(), elapsed = ?start.elapsed(), "job completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = exit_code_for(&e);
            error!(job = job.name(), exit_code = code, error = ?e, "job failed");
            ExitCode::from(code)
        }
    }
}

async fn dispatch(job: Job, config: &Config) -> Result<()> {
    let http = config.http.client()?;
    let today = Local::now().date_naive();
    let sdk = load_aws_config(&config.warehouse.region).await;

    match job {
        Job::Scrape => {
            let trips = S3Store::from_config(&sdk, &config.scrape.bucket);
            let weather = S3Store::from_config(&sdk, &config.weather.bucket);
            let weather = config
                .weather
                .enabled
                .then_some(&weather as &dyn ObjectStore);
            jobs::scrape::run(&http, &trips, weather, config, today).await
        }
        Job::Load => {
            let creds = credentials(&sdk, &config.warehouse).await?;
            let stores: Vec<S3Store> = config
                .warehouse
                .targets()
                .map(|t| S3Store::from_config(&sdk, &t.bucket))
                .collect();
            let legs: Vec<LoadLeg<'_>> = config
                .warehouse
                .targets()
                .zip(&stores)
                .map(|(target, store)| LoadLeg { target, store })
                .collect();

            let session = open_session(&http, &config.warehouse, &creds).await?;
            jobs::load::run(session, &legs, &creds, config.warehouse.history_lookback_days)
                .await
                .map(|_| ())
        }
        Job::Report => {
            let creds = credentials(&sdk, &config.warehouse).await?;
            let session = open_session(&http, &config.warehouse, &creds).await?;
            jobs::report::run(session, &config.report, today).await.map(|_| ())
        }
    }
}

async fn credentials(sdk: &aws_config::SdkConfig, cfg: &WarehouseConfig) -> Result<WarehouseCredentials> {
    fetch_credentials(&AwsSecrets::from_config(sdk), &cfg.secret_name)
        .await
        .context("reading warehouse credentials")
}

async fn open_session(
    http: &Client,
    cfg: &WarehouseConfig,
    creds: &WarehouseCredentials,
) -> Result<SnowflakeSession> {
    let base = account_url(&creds.account, cfg.base_url.as_deref())?;
    SnowflakeSession::connect(http.clone(), base, creds, cfg.statement_timeout())
        .await
        .context("opening warehouse session")
}
