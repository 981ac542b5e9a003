//! Flight-boundary decision logic for incoming telemetry points.
//!
//! An incoming point lands on today's flight, on a recent cross-midnight
//! flight, or starts a new one. The registry and store are supplied by the
//! caller so the decision engine itself stays free of I/O.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::point::FlightPoint;

/// How an incoming point was attached to a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentKind {
    /// Appended to the flight keyed by (imei, start of this point's UTC day).
    Today,
    /// Appended to a flight that was still active within the contiguity
    /// window, stitching points across the UTC midnight wraparound.
    Recent,
    /// No matching flight; a new one was created.
    Created,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub flight_uid: String,
    pub kind: AssignmentKind,
}

/// Failures surfaced by a [`FlightStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `(flight, timestamp)` uniqueness rule was violated.
    #[error("point at {timestamp} already exists for flight {uid}")]
    DuplicatePoint { uid: String, timestamp: i64 },
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Why a point was not assigned.
///
/// Everything except [`StoreError::Backend`] is a structured rejection of a
/// single point, not a fault; the assigner never retries either way.
#[derive(Debug, Error)]
pub enum AssignError {
    #[error("altitude {altitude}m outside allowed range [{min}m, {max}m], point rejected")]
    AltitudeOutOfBounds { altitude: f64, min: f64, max: f64 },
    #[error("modem IMEI {0} not in allowed list, point rejected")]
    UnknownModem(u64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AssignError {
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AssignError::Store(StoreError::Backend(_)))
    }
}

/// Allow-list of modems permitted to submit points.
pub trait ModemRegistry {
    fn contains(&self, imei: u64) -> bool;
}

/// The keyed flight store the assigner resolves identities against.
///
/// Implementations enforce `(flight, timestamp)` uniqueness in
/// `append_point` and report violations as [`StoreError::DuplicatePoint`].
pub trait FlightStore {
    fn find_by_identity(&self, imei: u64, date: NaiveDate) -> Option<String>;

    /// Most recent flight for this modem with a point at or after `since`.
    fn find_recent_active(&self, imei: u64, since: DateTime<Utc>) -> Option<String>;

    fn create_flight(&self, imei: u64, date: NaiveDate) -> Result<String, StoreError>;

    fn append_point(&self, uid: &str, point: FlightPoint) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct AssignerConfig {
    /// Lowest plausible altitude for a telemetry point (Dead Sea shore).
    pub min_altitude_m: f64,
    /// Highest plausible altitude for a balloon flight.
    pub max_altitude_m: f64,
    /// How long after its last point a flight still absorbs new points
    /// across the UTC day boundary.
    pub contiguity_window: Duration,
}

impl Default for AssignerConfig {
    fn default() -> Self {
        Self {
            min_altitude_m: -86.0,
            max_altitude_m: 60_000.0,
            contiguity_window: Duration::hours(2),
        }
    }
}

/// Decides which flight an incoming point belongs to.
pub struct FlightAssigner {
    config: AssignerConfig,
}

impl FlightAssigner {
    pub fn new(config: AssignerConfig) -> Self {
        Self { config }
    }

    /// Resolve `point` onto a flight, creating one if needed.
    ///
    /// Same-UTC-day identity is checked before the recency window so a
    /// flight is always anchored first by day continuity; the window only
    /// stitches points arriving just after midnight onto the previous day's
    /// flight. The window is anchored to `now`, not to the gap between the
    /// flight's last point and the incoming one.
    pub fn assign<R: ModemRegistry, S: FlightStore>(
        &self,
        registry: &R,
        store: &S,
        imei: u64,
        point: FlightPoint,
        now: DateTime<Utc>,
    ) -> Result<Assignment, AssignError> {
        if point.altitude < self.config.min_altitude_m
            || point.altitude > self.config.max_altitude_m
        {
            return Err(AssignError::AltitudeOutOfBounds {
                altitude: point.altitude,
                min: self.config.min_altitude_m,
                max: self.config.max_altitude_m,
            });
        }
        if !registry.contains(imei) {
            return Err(AssignError::UnknownModem(imei));
        }

        let date = point.datetime().date_naive();
        if let Some(uid) = store.find_by_identity(imei, date) {
            store.append_point(&uid, point)?;
            return Ok(Assignment {
                flight_uid: uid,
                kind: AssignmentKind::Today,
            });
        }

        let since = now - self.config.contiguity_window;
        if let Some(uid) = store.find_recent_active(imei, since) {
            store.append_point(&uid, point)?;
            return Ok(Assignment {
                flight_uid: uid,
                kind: AssignmentKind::Recent,
            });
        }

        let uid = store.create_flight(imei, date)?;
        store.append_point(&uid, point)?;
        Ok(Assignment {
            flight_uid: uid,
            kind: AssignmentKind::Created,
        })
    }
}
