use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, Timelike};
use serde::Serialize;

use crate::enrich::EnrichedTrip;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    /// `%a`, e.g. `Mon`.
    pub day_of_week: String,
    pub trips: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyCount {
    pub hour: u32,
    pub date: NaiveDate,
    pub trips: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentShare {
    pub label: String,
    pub trips: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeanTip {
    pub label: &'static str,
    /// `None` when every tip in the group is missing.
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub daily: Vec<DailyCount>,
    pub hourly: Vec<HourlyCount>,
    pub payments: Vec<PaymentShare>,
    pub tips: Vec<MeanTip>,
}

pub fn summarise(trips: &[EnrichedTrip]) -> Dashboard {
    Dashboard {
        daily: daily_counts(trips),
        hourly: hourly_counts(trips),
        payments: payment_distribution(trips),
        tips: mean_tip_by_airport(trips),
    }
}

/// Trips per pickup day, in date order.
pub fn daily_counts(trips: &[EnrichedTrip]) -> Vec<DailyCount> {
    let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for at in trips.iter().filter_map(|t| t.trip.pickup_at) {
        *by_day.entry(at.date()).or_default() += 1;
    }
    by_day
        .into_iter()
        .map(|(date, trips)| DailyCount {
            date,
            day_of_week: date.format("%a").to_string(),
            trips,
        })
        .collect()
}

/// Trips per (pickup hour, pickup day).
pub fn hourly_counts(trips: &[EnrichedTrip]) -> Vec<HourlyCount> {
    let mut buckets: BTreeMap<(u32, NaiveDate), u64> = BTreeMap::new();
    for at in trips.iter().filter_map(|t| t.trip.pickup_at) {
        *buckets.entry((at.hour(), at.date())).or_default() += 1;
    }
    buckets
        .into_iter()
        .map(|((hour, date), trips)| HourlyCount { hour, date, trips })
        .collect()
}

pub fn payment_label(code: i64) -> String {
    match code {
        1 => "Credit Card".into(),
        2 => "Cash".into(),
        3 => "No charge".into(),
        4 => "Dispute".into(),
        5 => "Unknown".into(),
        6 => "Voided trip".into(),
        0 => "Error data".into(),
        other => other.to_string(),
    }
}

/// Trips per payment type, most common first. Missing payment types are not counted.
pub fn payment_distribution(trips: &[EnrichedTrip]) -> Vec<PaymentShare> {
    let mut counts: HashMap<i64, u64> = HashMap::new();
    for code in trips.iter().filter_map(|t| t.trip.payment_type) {
        *counts.entry(code).or_default() += 1;
    }
    let mut shares: Vec<(i64, u64)> = counts.into_iter().collect();
    shares.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    shares
        .into_iter()
        .map(|(code, trips)| PaymentShare {
            label: payment_label(code),
            trips,
        })
        .collect()
}

/// Average tip for non-airport then airport pickups; empty groups are left out.
pub fn mean_tip_by_airport(trips: &[EnrichedTrip]) -> Vec<MeanTip> {
    [(false, "Non-Airport Pickup"), (true, "Airport Pickup")]
        .into_iter()
        .filter_map(|(flag, label)| {
            let group: Vec<&EnrichedTrip> =
                trips.iter().filter(|t| t.is_airport_trip == flag).collect();
            if group.is_empty() {
                return None;
            }
            let tips: Vec<f64> = group.iter().filter_map(|t| t.trip.tip_amount).collect();
            let mean = (!tips.is_empty()).then(|| tips.iter().sum::<f64>() / tips.len() as f64);
            Some(MeanTip { label, mean })
        })
        .collect()
}
