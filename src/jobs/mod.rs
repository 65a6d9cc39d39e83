//! The three scheduled jobs. Each takes its clients as arguments so tests can
//! hand in doubles.

pub mod load;
pub mod report;
pub mod scrape;
