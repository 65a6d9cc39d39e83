use std::fs;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use crate::config::{DateWindow, ReportConfig};
use crate::enrich::{drop_missing, enrich};
use crate::report::{export, render, rows_to_trips, summarise, trip_query_sql, within_window, Dashboard};
use crate::warehouse::Warehouse;

#[derive(Debug)]
pub struct ReportOutcome {
    pub window: DateWindow,
    pub rows: usize,
    pub dashboard: Dashboard,
}

#[instrument(level = "info", skip_all, fields(start = %window.start, end = %window.end))]
async fn build(wh: &mut dyn Warehouse, cfg: &ReportConfig, window: DateWindow) -> Result<ReportOutcome> {
    let result = wh.execute(&trip_query_sql(&cfg.view, &window)?).await?;
    let trips = within_window(rows_to_trips(&result)?, &window);
    let trips = drop_missing(trips, &cfg.require_fields, cfg.require_how);
    let enriched = enrich(trips, cfg.exchange_rate);
    info!(rows = enriched.len(), "trips enriched");

    let dashboard = summarise(&enriched);
    let html = render::render_html(&dashboard, &window);
    fs::write(&cfg.output_html, html)
        .with_context(|| format!("writing dashboard {:?}", cfg.output_html))?;
    info!(path = %cfg.output_html.display(), "dashboard written");

    if let Some(path) = &cfg.export_parquet {
        export::write_parquet(path, &enriched)?;
    }

    Ok(ReportOutcome {
        window,
        rows: enriched.len(),
        dashboard,
    })
}

/// Query, enrich, aggregate and render one window, closing `session` afterwards.
pub async fn run<W: Warehouse>(mut session: W, cfg: &ReportConfig, today: NaiveDate) -> Result<ReportOutcome> {
    let outcome = match cfg.window(today) {
        Ok(window) => build(&mut session, cfg, window).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = session.close().await {
        warn!(error = %e, "closing warehouse session");
    }
    if outcome.is_ok() {
        info!("Dashboard successfully updated.");
    }
    outcome
}
