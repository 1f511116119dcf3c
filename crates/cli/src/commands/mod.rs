//! Subcommand implementations

pub mod anomalies;
pub mod models;
pub mod predict;
