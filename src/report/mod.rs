//! Dashboard over a window of warehouse trips.

pub mod aggregate;
pub mod export;
pub mod render;

use chrono::{DateTime, NaiveDateTime};

use crate::config::DateWindow;
use crate::enrich::TripRecord;
use crate::error::{PipelineError, Result};
use crate::warehouse::copy::checked_name;
use crate::warehouse::QueryResult;

pub use aggregate::{summarise, Dashboard};

const TRIP_COLUMNS: &str =
    "PICKUP_AT, PASSENGER_COUNT, PAYMENT_TYPE, FARE_AMOUNT, TIP_AMOUNT, TOTAL_AMOUNT, AIRPORT_FEE";

/// Half-open read over the window's days.
pub fn trip_query_sql(view: &str, window: &DateWindow) -> Result<String> {
    Ok(format!(
        "SELECT {} FROM {} WHERE PICKUP_AT >= '{}' AND PICKUP_AT < '{}'",
        TRIP_COLUMNS,
        checked_name("view", view)?,
        window.start.format("%Y-%m-%d"),
        window.end_exclusive().format("%Y-%m-%d"),
    ))
}

/// Decode warehouse rows. A column absent from the result reads as all-NULL.
pub fn rows_to_trips(result: &QueryResult) -> Result<Vec<TripRecord>> {
    (0..result.len())
        .map(|row| -> Result<TripRecord> {
            let cell = |name: &str| result.get(row, name);
            Ok(TripRecord {
                pickup_at: cell("PICKUP_AT").map(parse_timestamp).transpose()?,
                passenger_count: cell("PASSENGER_COUNT").map(parse_int).transpose()?,
                payment_type: cell("PAYMENT_TYPE").map(parse_int).transpose()?,
                fare_amount: cell("FARE_AMOUNT").map(parse_float).transpose()?,
                tip_amount: cell("TIP_AMOUNT").map(parse_float).transpose()?,
                total_amount: cell("TOTAL_AMOUNT").map(parse_float).transpose()?,
                airport_fee: cell("AIRPORT_FEE").map(parse_float).transpose()?,
            })
        })
        .collect()
}

/// Drop trips whose pickup day falls outside `window` (or is unknown).
pub fn within_window(trips: Vec<TripRecord>, window: &DateWindow) -> Vec<TripRecord> {
    trips
        .into_iter()
        .filter(|t| t.pickup_at.is_some_and(|at| window.contains(at.date())))
        .collect()
}

fn parse_float(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| PipelineError::Query(format!("expected a number, got {:?}", raw)))
}

fn parse_int(raw: &str) -> Result<i64> {
    let value = parse_float(raw)?;
    if value.fract() != 0.0 {
        return Err(PipelineError::Query(format!("expected an integer, got {:?}", raw)));
    }
    Ok(value as i64)
}

/// Either a formatted datetime or epoch seconds as `secs[.fraction]`.
fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    let bad = || PipelineError::Query(format!("unrecognised timestamp {:?}", raw));

    if raw.contains('-') && !raw.starts_with('-') {
        return ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .ok_or_else(bad);
    }

    let (secs, frac) = raw.split_once('.').unwrap_or((raw, ""));
    let secs: i64 = secs.parse().map_err(|_| bad())?;
    let nanos = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
        digits.parse::<u32>().map_err(|_| bad())?
    };
    DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.naive_utc())
        .ok_or_else(bad)
}
