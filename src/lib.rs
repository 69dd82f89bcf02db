//! Packet Sentry
//!
//! Live packet capture with per-source port-scan, volumetric-flood and
//! oversized-packet alerts.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod utils;
