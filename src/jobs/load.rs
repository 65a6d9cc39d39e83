use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};

use crate::config::LoadTarget;
use crate::error::PipelineError;
use crate::novelty::{known_set, novelty_filter};
use crate::secrets::WarehouseCredentials;
use crate::stage::{list_staged, ObjectStore};
use crate::warehouse::copy::{
    create_variant_table_sql, list_load_history, status_lines, use_context_sql, CopyStatement, FileFormat,
};
use crate::warehouse::Warehouse;

/// A table to fill and the bucket its stage points at.
pub struct LoadLeg<'a> {
    pub target: &'a LoadTarget,
    pub store: &'a dyn ObjectStore,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub table: String,
    /// Stage-relative paths named in the COPY; empty when nothing was new.
    pub files: Vec<String>,
    pub status: Vec<String>,
}

/// One stage → table step: staged files minus copy history, copied in a single statement.
#[instrument(level = "info", skip_all, fields(table = %leg.target.table))]
pub async fn load_target(
    wh: &mut dyn Warehouse,
    leg: &LoadLeg<'_>,
    creds: &WarehouseCredentials,
    lookback_days: u32,
) -> Result<LoadOutcome> {
    let target = leg.target;
    if !wh.is_open() {
        error!("Error: Snowflake connection is closed.");
        return Err(PipelineError::Connection("session closed before load step".into()).into());
    }

    for sql in use_context_sql(creds)? {
        wh.execute(&sql).await?;
    }
    if target.format == FileFormat::Json {
        wh.execute(&create_variant_table_sql(&target.table)?).await?;
    }

    let staged = list_staged(leg.store, &target.prefix)
        .await
        .with_context(|| format!("listing stage for {}", target.table))?;
    let history = list_load_history(wh, &target.table, creds, lookback_days)
        .await
        .with_context(|| format!("reading copy history for {}", target.table))?;
    let new = novelty_filter(&staged, &known_set(&history), None);
    info!(staged = staged.len(), loaded = history.len(), new = new.len(), "novelty computed");

    let mut outcome = LoadOutcome {
        table: target.table.clone(),
        ..Default::default()
    };
    for record in &new {
        match record.identifier.relative_to(&target.bucket, &target.prefix) {
            Some(path) => outcome.files.push(path.to_string()),
            None => warn!(file = %record.identifier, "outside the stage root; not copied"),
        }
    }
    if outcome.files.is_empty() {
        info!("There are no new files to be loaded.");
        return Ok(outcome);
    }
    let copy = CopyStatement {
        table: target.table.clone(),
        stage: target.stage.clone(),
        files: outcome.files.clone(),
        format: target.format,
    };
    let result = wh.execute(&copy.to_sql()?).await?;

    outcome.status = status_lines(&result);
    for line in &outcome.status {
        info!("{}", line);
    }
    info!(
        "The uploading of S3 files to Snowflake table {} has been completed successfully.",
        target.table
    );
    Ok(outcome)
}

/// Run every leg on `session`, then close it whatever happened. A failed leg
/// is logged and the next one still runs; the first failure is returned.
pub async fn run<W: Warehouse>(
    mut session: W,
    legs: &[LoadLeg<'_>],
    creds: &WarehouseCredentials,
    lookback_days: u32,
) -> Result<Vec<LoadOutcome>> {
    let mut outcomes = Vec::with_capacity(legs.len());
    let mut first_error = None;
    for leg in legs {
        match load_target(&mut session, leg, creds, lookback_days).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                error!(table = %leg.target.table, error = ?e, "load step failed");
                first_error.get_or_insert(e);
            }
        }
    }

    if let Err(e) = session.close().await {
        warn!(error = %e, "closing warehouse session");
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}
