//! Row-level derived columns for trip records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Totals strictly above this carry the congestion surcharge.
pub const SURCHARGE_THRESHOLD: f64 = 50.0;
pub const SURCHARGE_AMOUNT: f64 = 2.0;
/// USD to the reporting currency.
pub const DEFAULT_EXCHANGE_RATE: f64 = 3.5;

/// One trip as read from the warehouse. Every source column is nullable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripRecord {
    pub pickup_at: Option<NaiveDateTime>,
    pub passenger_count: Option<i64>,
    pub payment_type: Option<i64>,
    pub fare_amount: Option<f64>,
    pub tip_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub airport_fee: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripField {
    PickupAt,
    PassengerCount,
    PaymentType,
    FareAmount,
    TipAmount,
    TotalAmount,
    AirportFee,
}

impl TripRecord {
    pub fn is_missing(&self, field: TripField) -> bool {
        match field {
            TripField::PickupAt => self.pickup_at.is_none(),
            TripField::PassengerCount => self.passenger_count.is_none(),
            TripField::PaymentType => self.payment_type.is_none(),
            TripField::FareAmount => self.fare_amount.is_none(),
            TripField::TipAmount => self.tip_amount.is_none(),
            TripField::TotalAmount => self.total_amount.is_none(),
            TripField::AirportFee => self.airport_fee.is_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassengerCategory {
    GhostPassenger,
    DealSeeker,
    GenerousSoloTraveller,
    BudgetSoloTraveller,
    Other,
}

impl PassengerCategory {
    pub fn label(self) -> &'static str {
        match self {
            PassengerCategory::GhostPassenger => "Ghost passenger",
            PassengerCategory::DealSeeker => "Deal seeker",
            PassengerCategory::GenerousSoloTraveller => "Generous solo traveller",
            PassengerCategory::BudgetSoloTraveller => "Budget solo traveller",
            PassengerCategory::Other => "Other",
        }
    }
}

/// `(passenger_count, tip_amount) -> matches`, paired with the label it assigns.
pub type CategoryRule = (fn(i64, f64) -> bool, PassengerCategory);

/// Evaluated in order; the last matching rule wins.
pub const CATEGORY_RULES: [CategoryRule; 4] = [
    (|n, tip| n == 0 && tip == 0.0, PassengerCategory::GhostPassenger),
    (|n, tip| n > 4 && tip < 5.0, PassengerCategory::DealSeeker),
    (|n, tip| n == 1 && tip > 5.0, PassengerCategory::GenerousSoloTraveller),
    (|n, tip| n == 1 && tip <= 5.0, PassengerCategory::BudgetSoloTraveller),
];

pub fn categorise(passenger_count: Option<i64>, tip_amount: Option<f64>) -> PassengerCategory {
    categorise_with(&CATEGORY_RULES, passenger_count, tip_amount)
}

/// Apply an arbitrary rule table. Missing inputs never match.
pub fn categorise_with(
    rules: &[CategoryRule],
    passenger_count: Option<i64>,
    tip_amount: Option<f64>,
) -> PassengerCategory {
    let (Some(n), Some(tip)) = (passenger_count, tip_amount) else {
        return PassengerCategory::Other;
    };
    rules
        .iter()
        .filter(|(matches, _)| matches(n, tip))
        .last()
        .map_or(PassengerCategory::Other, |(_, category)| *category)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedTrip {
    pub trip: TripRecord,
    pub is_airport_trip: bool,
    pub total_surcharge: Option<f64>,
    pub total_amount_converted: Option<f64>,
    pub passenger_category: PassengerCategory,
}

pub fn is_airport_trip(airport_fee: Option<f64>) -> bool {
    airport_fee.is_some_and(|fee| fee > 0.0)
}

pub fn total_surcharge(total_amount: Option<f64>, fare_amount: Option<f64>) -> Option<f64> {
    let (total, fare) = (total_amount?, fare_amount?);
    let extra = if total > SURCHARGE_THRESHOLD { SURCHARGE_AMOUNT } else { 0.0 };
    Some(total - fare + extra)
}

pub fn enrich_one(trip: TripRecord, exchange_rate: f64) -> EnrichedTrip {
    EnrichedTrip {
        is_airport_trip: is_airport_trip(trip.airport_fee),
        total_surcharge: total_surcharge(trip.total_amount, trip.fare_amount),
        total_amount_converted: trip.total_amount.map(|total| total * exchange_rate),
        passenger_category: categorise(trip.passenger_count, trip.tip_amount),
        trip,
    }
}

pub fn enrich(rows: Vec<TripRecord>, exchange_rate: f64) -> Vec<EnrichedTrip> {
    rows.into_iter().map(|trip| enrich_one(trip, exchange_rate)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingHow {
    /// Drop when any listed field is missing.
    Any,
    /// Drop only when every listed field is missing.
    All,
}

pub fn drop_missing(rows: Vec<TripRecord>, subset: &[TripField], how: MissingHow) -> Vec<TripRecord> {
    if subset.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            let mut missing = subset.iter().map(|f| row.is_missing(*f));
            let drop = match how {
                MissingHow::Any => missing.any(|m| m),
                MissingHow::All => missing.all(|m| m),
            };
            !drop
        })
        .collect()
}
