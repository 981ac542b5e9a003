//! SQLite persistence for the flight registry, telemetry points, and the
//! modem allow-list mirror.
//!
//! The in-memory state is authoritative while the server runs; the database
//! is a write-behind log used to rebuild state at startup.

pub mod db;
pub mod flights;
pub mod modems;

pub use db::{init_database, Database};
