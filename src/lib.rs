//! Realtime neutron monitor data: fetch into PostgreSQL, list, and plot.

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod plot;
pub mod report;
pub mod store;
