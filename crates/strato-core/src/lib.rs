//! Core flight assembly and landing prediction for the Strato balloon tracker.
//!
//! Raw telemetry points enter through the [`FlightAssigner`], which resolves
//! them onto a [`Flight`] via caller-supplied registry/store collaborators.
//! A [`LandingPredictor`] consumes a flight's history to build an empirical
//! wind-by-altitude model and integrate the expected descent displacement.

pub mod assigner;
pub mod flight;
pub mod landing;
pub mod point;
pub mod vector;

pub use assigner::{
    AssignError, Assignment, AssignmentKind, AssignerConfig, FlightAssigner, FlightStore,
    ModemRegistry, StoreError,
};
pub use flight::{Flight, FlightError, FlightStats, PinStates};
pub use landing::{LandingPredictor, PredictionError, PredictorConfig};
pub use point::FlightPoint;
pub use vector::{Position, Vec2};
