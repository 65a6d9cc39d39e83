//! YAML configuration with defaults for every field.
//!
//! Loaded from `$TAXI_PIPELINE_CONFIG` (default `pipeline.yaml`). A missing
//! file means "all defaults"; a present but malformed one is an error.
//! A few values can be overridden from the environment: `METEO_API_KEY`,
//! `LOG_FILE` and `AWS_REGION`.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::enrich::{MissingHow, TripField, DEFAULT_EXCHANGE_RATE};
use crate::error::{PipelineError, Result};
use crate::novelty::DateCutoff;
use crate::warehouse::copy::FileFormat;

pub const CONFIG_ENV: &str = "TAXI_PIPELINE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "pipeline.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_file: Option<PathBuf>,
    pub http: HttpConfig,
    pub scrape: ScrapeConfig,
    pub weather: WeatherConfig,
    pub warehouse: WarehouseConfig,
    pub report: ReportConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load from `path`, or from `$TAXI_PIPELINE_CONFIG` / `pipeline.yaml` when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let mut config = if path.is_file() {
            let text = fs::read_to_string(&path)?;
            Self::from_yaml(&text).map_err(|e| match e {
                PipelineError::Configuration(msg) => {
                    PipelineError::Configuration(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| PipelineError::Configuration(e.to_string()))
    }

    /// Reject values that would otherwise only fail, or be ignored, mid-run.
    pub fn validate(&self) -> Result<()> {
        if let Some(cutoff) = &self.scrape.cutoff {
            DateCutoff::new(cutoff.as_str())?;
        }
        DateWindow::configured(self.weather.start, self.weather.end)
            .map_err(|e| in_section("weather", e))?;
        DateWindow::configured(self.report.start, self.report.end)
            .map_err(|e| in_section("report", e))?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(key) = env::var("METEO_API_KEY") {
            self.weather.api_key = Some(key);
        }
        if let Ok(file) = env::var("LOG_FILE") {
            self.log_file = Some(PathBuf::from(file));
        }
        if let Ok(region) = env::var("AWS_REGION") {
            self.warehouse.region = region;
        }
    }
}

fn in_section(section: &str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::Configuration(msg) => PipelineError::Configuration(format!("{}: {}", section, msg)),
        other => other,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 600,
            user_agent: format!("taxi-pipeline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Shared HTTP client with explicit timeouts.
    pub fn client(&self) -> Result<Client> {
        Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| PipelineError::Configuration(format!("building HTTP client: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub page_url: String,
    pub link_label: String,
    pub extension: String,
    pub bucket: String,
    pub prefix: String,
    pub cutoff: Option<String>,
    pub part_size_bytes: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            page_url: "https://www.nyc.gov/site/tlc/about/tlc-trip-record-data.page".into(),
            link_label: "Yellow Taxi Trip Records".into(),
            extension: ".parquet".into(),
            bucket: "my-nyc-yellowtaxi".into(),
            prefix: String::new(),
            cutoff: Some("2024-06.parquet".into()),
            part_size_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_host: String,
    pub api_key: Option<String>,
    pub lat: String,
    pub lon: String,
    pub tz: String,
    pub bucket: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://meteostat.p.rapidapi.com/point/hourly".into(),
            api_host: "meteostat.p.rapidapi.com".into(),
            api_key: None,
            lat: "40.7143".into(),
            lon: "-74.006".into(),
            tz: "America/Toronto".into(),
            bucket: "meteo-weather".into(),
            start: None,
            end: None,
        }
    }
}

impl WeatherConfig {
    pub fn window(&self, today: NaiveDate) -> Result<DateWindow> {
        DateWindow::configured_or_previous_month(self.start, self.end, today)
    }
}

/// One stage → table leg of the load job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTarget {
    pub table: String,
    pub stage: String,
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    pub format: FileFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub secret_name: String,
    pub region: String,
    /// Overrides `https://{account}.snowflakecomputing.com`.
    pub base_url: Option<String>,
    pub statement_timeout_secs: u64,
    pub history_lookback_days: u32,
    pub trips: LoadTarget,
    pub weather: Option<LoadTarget>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            secret_name: "snowflake/credentials".into(),
            region: "us-east-1".into(),
            base_url: None,
            statement_timeout_secs: 600,
            history_lookback_days: 365,
            trips: LoadTarget {
                table: "taxi_trips".into(),
                stage: "s3_nyc_yellowtaxi_stage".into(),
                bucket: "my-nyc-yellowtaxi".into(),
                prefix: String::new(),
                format: FileFormat::Parquet,
            },
            weather: Some(LoadTarget {
                table: "raw_historical_weather".into(),
                stage: "s3_meteostat_weather_stage".into(),
                bucket: "meteo-weather".into(),
                prefix: String::new(),
                format: FileFormat::Json,
            }),
        }
    }
}

impl WarehouseConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }

    pub fn targets(&self) -> impl Iterator<Item = &LoadTarget> {
        std::iter::once(&self.trips).chain(self.weather.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub view: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub output_html: PathBuf,
    pub export_parquet: Option<PathBuf>,
    pub exchange_rate: f64,
    pub require_fields: Vec<TripField>,
    pub require_how: MissingHow,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            view: "nyc_yellowtaxi.dev.stg_tlc__trips".into(),
            start: None,
            end: None,
            output_html: PathBuf::from("dashboard.html"),
            export_parquet: None,
            exchange_rate: DEFAULT_EXCHANGE_RATE,
            require_fields: Vec::new(),
            require_how: MissingHow::All,
        }
    }
}

impl ReportConfig {
    pub fn window(&self, today: NaiveDate) -> Result<DateWindow> {
        DateWindow::configured_or_previous_month(self.start, self.end, today)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub bin_dir: PathBuf,
    pub config_path: Option<PathBuf>,
    pub scrape: String,
    pub load: String,
    pub report: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from("/usr/local/bin"),
            config_path: None,
            scrape: "30 14 15 * *".into(),
            load: "35 14 15 * *".into(),
            report: "40 14 15 * *".into(),
        }
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(PipelineError::Configuration(format!(
                "date window ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// The calendar month before the one containing `today`.
    pub fn previous_month(today: NaiveDate) -> Self {
        let first_of_month = today - ChronoDuration::days(i64::from(today.day0()));
        let end = first_of_month - ChronoDuration::days(1);
        let start = end - ChronoDuration::days(i64::from(end.day0()));
        Self { start, end }
    }

    /// An explicit window from config. Both ends or neither must be set.
    pub fn configured(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Option<Self>> {
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end).map(Some),
            (None, None) => Ok(None),
            (Some(_), None) => Err(PipelineError::Configuration(
                "date window has a start but no end".into(),
            )),
            (None, Some(_)) => Err(PipelineError::Configuration(
                "date window has an end but no start".into(),
            )),
        }
    }

    fn configured_or_previous_month(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self> {
        Ok(Self::configured(start, end)?.unwrap_or_else(|| Self::previous_month(today)))
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// First day after the window, for half-open SQL bounds.
    pub fn end_exclusive(&self) -> NaiveDate {
        self.end + ChronoDuration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = tempdir().unwrap();
        let cfg = Config::load(Some(&tmp.path().join("absent.yaml"))).unwrap();
        assert_eq!(cfg.scrape.link_label, "Yellow Taxi Trip Records");
        assert_eq!(cfg.scrape.cutoff.as_deref(), Some("2024-06.parquet"));
        assert_eq!(cfg.warehouse.trips.format, FileFormat::Parquet);
        assert_eq!(cfg.warehouse.targets().count(), 2);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let cfg = Config::from_yaml(
            r#"
scrape:
  bucket: other-bucket
  cutoff: null
warehouse:
  weather: null
  trips:
    table: trips
    stage: trips_stage
    bucket: other-bucket
    format: PARQUET
report:
  require_fields: [TOTAL_AMOUNT, FARE_AMOUNT]
  require_how: any
"#,
        )
        .unwrap();
        assert_eq!(cfg.scrape.bucket, "other-bucket");
        assert!(cfg.scrape.cutoff.is_none());
        assert_eq!(cfg.scrape.extension, ".parquet");
        assert_eq!(cfg.warehouse.targets().count(), 1);
        assert_eq!(cfg.warehouse.trips.prefix, "");
        assert_eq!(
            cfg.report.require_fields,
            vec![TripField::TotalAmount, TripField::FareAmount]
        );
        assert_eq!(cfg.report.require_how, MissingHow::Any);
    }

    #[test]
    fn test_malformed_yaml_is_configuration_error() {
        let err = Config::from_yaml("scrape: [not, a, map]").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_previous_month() {
        let w = DateWindow::previous_month(day(2024, 7, 15));
        assert_eq!(w.start, day(2024, 6, 1));
        assert_eq!(w.end, day(2024, 6, 30));

        let jan = DateWindow::previous_month(day(2025, 1, 1));
        assert_eq!(jan.start, day(2024, 12, 1));
        assert_eq!(jan.end, day(2024, 12, 31));

        let leap = DateWindow::previous_month(day(2024, 3, 31));
        assert_eq!(leap.end, day(2024, 2, 29));
    }

    #[test]
    fn test_configured_window_wins() {
        let cfg = ReportConfig {
            start: Some(day(2024, 6, 1)),
            end: Some(day(2024, 6, 30)),
            ..Default::default()
        };
        let w = cfg.window(day(2026, 1, 1)).unwrap();
        assert_eq!(w, DateWindow::new(day(2024, 6, 1), day(2024, 6, 30)).unwrap());
        assert_eq!(w.end_exclusive(), day(2024, 7, 1));
        assert!(w.contains(day(2024, 6, 30)));
        assert!(!w.contains(day(2024, 7, 1)));
    }

    #[test]
    fn test_inverted_window_rejected() {
        assert!(DateWindow::new(day(2024, 6, 2), day(2024, 6, 1)).is_err());

        let cfg = ReportConfig {
            start: Some(day(2024, 6, 30)),
            end: Some(day(2024, 6, 1)),
            ..Default::default()
        };
        assert!(matches!(
            cfg.window(day(2026, 1, 15)),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_half_set_window_rejected() {
        let report = ReportConfig {
            start: Some(day(2024, 6, 1)),
            ..Default::default()
        };
        assert!(matches!(
            report.window(day(2026, 1, 15)),
            Err(PipelineError::Configuration(_))
        ));

        let weather = WeatherConfig {
            end: Some(day(2024, 6, 30)),
            ..Default::default()
        };
        assert!(matches!(
            weather.window(day(2026, 1, 15)),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_unset_window_is_previous_month() {
        let w = WeatherConfig::default().window(day(2026, 1, 15)).unwrap();
        assert_eq!(w, DateWindow::previous_month(day(2026, 1, 15)));
    }

    #[test]
    fn test_load_rejects_bad_window_and_cutoff() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("pipeline.yaml");

        fs::write(&path, "report:\n  start: 2024-06-30\n  end: 2024-06-01\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        match err {
            PipelineError::Configuration(msg) => assert!(msg.contains("report")),
            other => panic!("unexpected error: {:?}", other),
        }

        fs::write(&path, "scrape:\n  cutoff: june.parquet\n").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(PipelineError::Configuration(_))
        ));
    }
}
