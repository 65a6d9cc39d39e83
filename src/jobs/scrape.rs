use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::config::{Config, ScrapeConfig, WeatherConfig};
use crate::error::PipelineError;
use crate::fetch::links::{list_links, LinkFilter};
use crate::fetch::weather::{fetch_hourly, weather_filename};
use crate::identifier::{dated_key, RemoteFileRef};
use crate::novelty::{known_set, novelty_filter, DateCutoff};
use crate::stage::transfer::MIN_PART_SIZE;
use crate::stage::{list_staged, BatchSummary, ObjectStore, TransferAgent, TransferReceipt};

/// What one pass over the trip-record page did.
#[derive(Debug, Default)]
pub struct TripScrape {
    pub listed: usize,
    pub new: Vec<RemoteFileRef>,
    pub batch: BatchSummary,
}

/// Page → novelty against the staged bucket → transfer of whatever is new.
#[instrument(level = "info", skip_all, fields(bucket = store.bucket()))]
pub async fn scrape_trips(http: &Client, store: &dyn ObjectStore, cfg: &ScrapeConfig) -> Result<TripScrape> {
    let page = Url::parse(&cfg.page_url)
        .map_err(|e| PipelineError::Configuration(format!("scrape page URL: {}", e)))?;
    let cutoff = cfg.cutoff.as_deref().map(DateCutoff::new).transpose()?;

    let filter = LinkFilter {
        label: &cfg.link_label,
        extension: &cfg.extension,
    };
    let links = list_links(http, &page, &filter).await?;
    let remote = links
        .into_iter()
        .map(|url| RemoteFileRef::staged_at(url, store.bucket(), &cfg.prefix))
        .collect::<crate::error::Result<Vec<_>>>()?;

    let staged = list_staged(store, &cfg.prefix)
        .await
        .context("listing staged trip files")?;
    let new = novelty_filter(&remote, &known_set(&staged), cutoff.as_ref());
    info!(listed = remote.len(), staged = staged.len(), new = new.len(), "novelty computed");

    if new.is_empty() {
        info!("There are no new files to be scraped.");
        return Ok(TripScrape {
            listed: remote.len(),
            ..Default::default()
        });
    }

    let agent = TransferAgent::new(http, store, cfg.part_size_bytes);
    let batch = agent.transfer_batch(&new).await;
    Ok(TripScrape {
        listed: remote.len(),
        new,
        batch,
    })
}

/// Stage one window of hourly weather unless that object already exists.
#[instrument(level = "info", skip_all, fields(bucket = store.bucket()))]
pub async fn scrape_weather(
    http: &Client,
    store: &dyn ObjectStore,
    cfg: &WeatherConfig,
    today: NaiveDate,
) -> Result<Option<TransferReceipt>> {
    let window = cfg.window(today)?;
    let key = dated_key(window.start, &weather_filename(&window));
    let candidate = [store.identifier(&key)];

    let month_prefix = format!("{}/", window.start.format("%Y-%m"));
    let staged = list_staged(store, &month_prefix)
        .await
        .context("listing staged weather files")?;
    if novelty_filter(&candidate, &known_set(&staged), None).is_empty() {
        info!(%key, "weather window already staged");
        return Ok(None);
    }

    let resp = fetch_hourly(http, cfg, &window).await?;
    let receipt = TransferAgent::new(http, store, MIN_PART_SIZE)
        .transfer_response(resp, &key)
        .await?;
    info!(key = %receipt.key, bytes = receipt.bytes, "New file uploaded to S3");
    Ok(Some(receipt))
}

/// Trips first, then weather when enabled. Per-file transfer failures do not
/// stop the batch but do fail the run once everything else has been tried.
pub async fn run(
    http: &Client,
    trips: &dyn ObjectStore,
    weather: Option<&dyn ObjectStore>,
    config: &Config,
    today: NaiveDate,
) -> Result<()> {
    let scrape = scrape_trips(http, trips, &config.scrape).await?;

    let weather_result = match weather {
        Some(store) => scrape_weather(http, store, &config.weather, today)
            .await
            .context("weather scrape")
            .map(|_| ()),
        None => Ok(()),
    };

    // trip failures decide the exit code over a weather failure
    if !scrape.batch.is_clean() {
        for failed in &scrape.batch.failed {
            warn!(file = %failed.identifier, reason = %failed.reason, "not staged");
        }
        if let Err(e) = &weather_result {
            error!(error = ?e, "weather scrape failed");
        }
        return Err(PipelineError::transfer(
            format!("{} of {} new files", scrape.batch.failed.len(), scrape.new.len()),
            "see log for per-file errors",
        )
        .into());
    }
    weather_result
}
