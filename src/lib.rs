pub mod app;
pub mod config;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod identifier;
pub mod jobs;
pub mod logging;
pub mod novelty;
pub mod report;
pub mod schedule;
pub mod secrets;
pub mod stage;
pub mod warehouse;
