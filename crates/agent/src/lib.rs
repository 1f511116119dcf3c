//! Analytics agent
//!
//! HTTP surface and background tasks around the analytics core.

pub mod api;
pub mod config;
pub mod scan;
