//! Shared library surface for the telemetry server and its tests.

pub mod api;
pub mod backoff;
pub mod config;
pub mod elevation;
pub mod loops;
pub mod modems;
pub mod persistence;
pub mod state;
