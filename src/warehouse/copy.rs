//! Statements for moving staged files into warehouse tables.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{QueryResult, Warehouse};
use crate::error::{PipelineError, Result};
use crate::identifier::LoadedFileRecord;
use crate::secrets::WarehouseCredentials;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$.]*$").expect("object name pattern should compile"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileFormat {
    Parquet,
    Json,
}

impl FileFormat {
    pub fn type_name(self) -> &'static str {
        match self {
            FileFormat::Parquet => "PARQUET",
            FileFormat::Json => "JSON",
        }
    }
}

/// Reject anything that is not a plain (optionally dotted) object name.
pub fn checked_name<'a>(kind: &str, name: &'a str) -> Result<&'a str> {
    if NAME_RE.is_match(name) {
        Ok(name)
    } else {
        Err(PipelineError::Configuration(format!("invalid {} name {:?}", kind, name)))
    }
}

/// Single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `USE WAREHOUSE`, `USE DATABASE`, `USE SCHEMA` for the credentials' context.
pub fn use_context_sql(creds: &WarehouseCredentials) -> Result<Vec<String>> {
    Ok(vec![
        format!("USE WAREHOUSE {}", checked_name("warehouse", &creds.warehouse)?),
        format!("USE DATABASE {}", checked_name("database", &creds.database)?),
        format!("USE SCHEMA {}", checked_name("schema", &creds.schema)?),
    ])
}

pub fn create_variant_table_sql(table: &str) -> Result<String> {
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (data VARIANT)",
        checked_name("table", table)?
    ))
}

/// One `COPY INTO` naming exactly the files to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyStatement {
    pub table: String,
    pub stage: String,
    /// Paths relative to the stage root.
    pub files: Vec<String>,
    pub format: FileFormat,
}

impl CopyStatement {
    pub fn to_sql(&self) -> Result<String> {
        if self.files.is_empty() {
            return Err(PipelineError::Configuration(
                "COPY INTO needs at least one file".into(),
            ));
        }
        let table = checked_name("table", &self.table)?;
        let stage = checked_name("stage", &self.stage)?;
        let files = self
            .files
            .iter()
            .map(|f| quote_literal(f))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "COPY INTO {} FROM @{} FILES = ({}) FILE_FORMAT = (TYPE = '{}')",
            table,
            stage,
            files,
            self.format.type_name()
        );
        if self.format == FileFormat::Parquet {
            sql.push_str(" MATCH_BY_COLUMN_NAME = CASE_INSENSITIVE");
        }
        Ok(sql)
    }
}

/// Files successfully copied into `table` within the lookback window.
pub fn load_history_sql(table: &str, creds: &WarehouseCredentials, lookback_days: u32) -> Result<String> {
    let table = checked_name("table", table)?;
    Ok(format!(
        "SELECT DISTINCT STAGE_LOCATION, FILE_NAME \
         FROM SNOWFLAKE.ACCOUNT_USAGE.COPY_HISTORY \
         WHERE TABLE_NAME = UPPER({}) \
         AND TABLE_SCHEMA_NAME = UPPER({}) \
         AND TABLE_CATALOG_NAME = UPPER({}) \
         AND STATUS = 'Loaded' \
         AND LAST_LOAD_TIME >= DATEADD(day, -{}, CURRENT_TIMESTAMP())",
        quote_literal(table),
        quote_literal(&creds.schema),
        quote_literal(&creds.database),
        lookback_days
    ))
}

/// Warehouse variant of the source lister: distinct identifiers already loaded into `table`.
pub async fn list_load_history(
    wh: &mut dyn Warehouse,
    table: &str,
    creds: &WarehouseCredentials,
    lookback_days: u32,
) -> Result<Vec<LoadedFileRecord>> {
    let result = wh.execute(&load_history_sql(table, creds, lookback_days)?).await?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for row in 0..result.len() {
        let Some(file) = result.get(row, "FILE_NAME") else {
            continue;
        };
        let location = result.get(row, "STAGE_LOCATION").unwrap_or_default();
        let record = LoadedFileRecord::copied(location, file);
        if seen.insert(record.identifier.clone()) {
            records.push(record);
        }
    }
    debug!(table, count = records.len(), "load history listed");
    Ok(records)
}

/// Human-readable outcome of a COPY: one line per file when several were
/// reported, otherwise the single status message.
pub fn status_lines(result: &QueryResult) -> Vec<String> {
    let cell = |row: &Vec<Option<String>>, idx: usize| {
        row.get(idx).and_then(|v| v.clone()).unwrap_or_default()
    };
    match result.rows.as_slice() {
        [] => vec!["Copy executed with 0 files processed.".to_string()],
        [only] => vec![cell(only, 0)],
        rows => rows
            .iter()
            .map(|row| format!("{} is now loaded {} to Snowflake.", cell(row, 0), cell(row, 1)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> WarehouseCredentials {
        WarehouseCredentials {
            user: "etl".into(),
            password: "pw".into(),
            account: "xy12345".into(),
            warehouse: "COMPUTE_WH".into(),
            database: "NYC_YELLOWTAXI".into(),
            schema: "RAW".into(),
        }
    }

    #[test]
    fn test_parquet_copy_names_files() {
        let stmt = CopyStatement {
            table: "taxi_trips".into(),
            stage: "s3_nyc_yellowtaxi_stage".into(),
            files: vec![
                "yellow_tripdata_2024-06.parquet".into(),
                "yellow_tripdata_2024-07.parquet".into(),
            ],
            format: FileFormat::Parquet,
        };
        assert_eq!(
            stmt.to_sql().unwrap(),
            "COPY INTO taxi_trips FROM @s3_nyc_yellowtaxi_stage \
             FILES = ('yellow_tripdata_2024-06.parquet', 'yellow_tripdata_2024-07.parquet') \
             FILE_FORMAT = (TYPE = 'PARQUET') MATCH_BY_COLUMN_NAME = CASE_INSENSITIVE"
        );
    }

    #[test]
    fn test_json_copy_has_no_column_matching() {
        let stmt = CopyStatement {
            table: "raw_historical_weather".into(),
            stage: "s3_meteostat_weather_stage".into(),
            files: vec!["2024-06/weather_20240601_20240630.json".into()],
            format: FileFormat::Json,
        };
        let sql = stmt.to_sql().unwrap();
        assert!(sql.ends_with("FILE_FORMAT = (TYPE = 'JSON')"));
    }

    #[test]
    fn test_empty_file_list_is_rejected() {
        let stmt = CopyStatement {
            table: "t".into(),
            stage: "s".into(),
            files: Vec::new(),
            format: FileFormat::Parquet,
        };
        assert!(stmt.to_sql().is_err());
    }

    #[test]
    fn test_names_and_literals_are_guarded() {
        assert!(checked_name("table", "db.schema.taxi_trips").is_ok());
        assert!(checked_name("table", "taxi_trips; DROP TABLE x").is_err());
        assert!(checked_name("stage", "1stage").is_err());
        assert_eq!(quote_literal("o'brien.parquet"), "'o''brien.parquet'");
        assert!(create_variant_table_sql("bad name").is_err());
    }

    #[test]
    fn test_use_context_order() {
        assert_eq!(
            use_context_sql(&creds()).unwrap(),
            vec![
                "USE WAREHOUSE COMPUTE_WH",
                "USE DATABASE NYC_YELLOWTAXI",
                "USE SCHEMA RAW",
            ]
        );
    }

    #[test]
    fn test_history_query_filters_loaded_rows() {
        let sql = load_history_sql("taxi_trips", &creds(), 365).unwrap();
        assert!(sql.contains("SNOWFLAKE.ACCOUNT_USAGE.COPY_HISTORY"));
        assert!(sql.contains("TABLE_NAME = UPPER('taxi_trips')"));
        assert!(sql.contains("STATUS = 'Loaded'"));
        assert!(sql.contains("DATEADD(day, -365"));
    }

    #[test]
    fn test_status_lines() {
        let none = QueryResult::default();
        assert_eq!(status_lines(&none), vec!["Copy executed with 0 files processed."]);

        let one = QueryResult {
            columns: vec!["status".into()],
            rows: vec![vec![Some("Copy executed with 0 files processed.".into())]],
        };
        assert_eq!(status_lines(&one), vec!["Copy executed with 0 files processed."]);

        let many = QueryResult {
            columns: vec!["file".into(), "status".into()],
            rows: vec![
                vec![Some("s3://b/a.parquet".into()), Some("LOADED".into())],
                vec![Some("s3://b/c.parquet".into()), Some("LOADED".into())],
            ],
        };
        assert_eq!(
            status_lines(&many),
            vec![
                "s3://b/a.parquet is now loaded LOADED to Snowflake.",
                "s3://b/c.parquet is now loaded LOADED to Snowflake.",
            ]
        );
    }
}
