//! Ordered flight data model with incremental statistics and per-point
//! velocity-vector derivation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::point::FlightPoint;
use crate::vector::{round_to_two, weighted_average, Position, Vec2};

#[derive(Debug, Error)]
pub enum FlightError {
    #[error("index range [{low}, {high}) out of bounds for flight of length {len}")]
    RangeOutOfBounds { low: usize, high: usize, len: usize },
}

/// Running aggregate over every point added to a flight, valid or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightStats {
    pub max_altitude: f64,
    pub min_altitude: f64,
    pub max_ground_speed: f64,
    /// Signed vertical velocity with the largest magnitude seen so far.
    pub max_vertical_velocity: f64,
    /// Rounded to two decimal places after each update.
    pub avg_ground_speed: f64,
    pub avg_coords: Position,
}

impl FlightStats {
    fn from_point(point: &FlightPoint) -> Self {
        Self {
            max_altitude: point.altitude,
            min_altitude: point.altitude,
            max_ground_speed: point.ground_speed,
            max_vertical_velocity: point.vertical_velocity,
            avg_ground_speed: round_to_two(point.ground_speed),
            avg_coords: point.coords(),
        }
    }

    /// Fold one more point into the aggregate. `prior_count` is the number
    /// of points already reflected in the averages.
    fn update(&mut self, point: &FlightPoint, prior_count: u32) {
        if point.altitude > self.max_altitude {
            self.max_altitude = point.altitude;
        }
        if point.altitude < self.min_altitude {
            self.min_altitude = point.altitude;
        }
        if point.ground_speed > self.max_ground_speed {
            self.max_ground_speed = point.ground_speed;
        }
        if point.vertical_velocity.abs() > self.max_vertical_velocity.abs() {
            self.max_vertical_velocity = point.vertical_velocity;
        }
        self.avg_ground_speed = round_to_two(weighted_average(
            self.avg_ground_speed,
            prior_count,
            point.ground_speed,
        ));
        self.avg_coords = Position::new(
            weighted_average(self.avg_coords.lat, prior_count, point.latitude),
            weighted_average(self.avg_coords.lng, prior_count, point.longitude),
        );
    }

    /// Aggregate a bulk-loaded point set in one pass.
    pub fn build(points: &[FlightPoint]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut stats = Self::from_point(first);
        for (i, point) in rest.iter().enumerate() {
            stats.update(point, (i + 1) as u32);
        }
        Some(stats)
    }
}

/// Pin states paired with the sample they were observed in, for event logs.
#[derive(Debug, Clone, Serialize)]
pub struct PinStates {
    pub input: u8,
    pub output: u8,
    pub timestamp: i64,
    pub altitude: f64,
}

/// An ordered, identity-tagged series of telemetry points attributed to one
/// modem and one nominal start date.
///
/// Points are kept sorted ascending by timestamp and the running stats are
/// updated on every append, so readers never observe the two out of sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    uid: String,
    imei: u64,
    /// UTC calendar date of the first point, fixed at flight creation.
    start_date: NaiveDate,
    points: Vec<FlightPoint>,
    stats: Option<FlightStats>,
    min_satellites: u32,
}

impl Flight {
    pub fn new(uid: impl Into<String>, imei: u64, start_date: NaiveDate, min_satellites: u32) -> Self {
        Self {
            uid: uid.into(),
            imei,
            start_date,
            points: Vec::new(),
            stats: None,
            min_satellites,
        }
    }

    /// Rebuild a flight from stored points: sort by timestamp (stable for
    /// ties), aggregate stats in bulk, and rederive velocity vectors.
    pub fn from_points(
        uid: impl Into<String>,
        imei: u64,
        start_date: NaiveDate,
        min_satellites: u32,
        mut points: Vec<FlightPoint>,
    ) -> Self {
        points.sort_by_key(|p| p.timestamp);
        let stats = FlightStats::build(&points);
        let mut flight = Self {
            uid: uid.into(),
            imei,
            start_date,
            points,
            stats,
            min_satellites,
        };
        flight.rederive_vectors();
        flight
    }

    fn rederive_vectors(&mut self) {
        for i in 0..self.points.len() {
            let vector = match self.points.get(i + 1) {
                Some(next) => Self::vector_between(&self.points[i], next),
                None => Vec2::ZERO,
            };
            self.points[i].velocity_vector = vector;
        }
    }

    fn vector_between(from: &FlightPoint, to: &FlightPoint) -> Vec2 {
        let dt = to.timestamp - from.timestamp;
        if dt == 0 {
            // Duplicate timestamps are rejected upstream; never divide by zero.
            return Vec2::ZERO;
        }
        let dt = dt as f64;
        Vec2::new(
            (to.latitude - from.latitude) / dt,
            (to.longitude - from.longitude) / dt,
        )
    }

    /// Append a point, back-patching the previous last point's velocity
    /// vector, and fold the new point into the stats. Returns the index of
    /// the appended point.
    ///
    /// The vector between the old last point and the new one is stored on
    /// the old last point; the new point's own vector stays zero until its
    /// successor arrives. A zero time delta leaves the previous vector
    /// untouched (the store's uniqueness rule rejects duplicates upstream).
    pub fn add(&mut self, mut point: FlightPoint) -> usize {
        point.velocity_vector = Vec2::ZERO;
        if let Some(last_index) = self.points.len().checked_sub(1) {
            if point.timestamp != self.points[last_index].timestamp {
                self.points[last_index].velocity_vector =
                    Self::vector_between(&self.points[last_index], &point);
            }
        }
        let prior_count = self.points.len() as u32;
        match self.stats.as_mut() {
            Some(stats) => stats.update(&point, prior_count),
            None => self.stats = Some(FlightStats::from_point(&point)),
        }
        self.points.push(point);
        self.points.len() - 1
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn imei(&self) -> u64 {
        self.imei
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn stats(&self) -> Option<&FlightStats> {
        self.stats.as_ref()
    }

    pub fn min_satellites(&self) -> u32 {
        self.min_satellites
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FlightPoint> {
        self.points.get(index)
    }

    /// All points in timestamp order.
    pub fn points(&self) -> &[FlightPoint] {
        &self.points
    }

    /// Search by unix timestamp.
    pub fn get_by_timestamp(&self, timestamp: i64) -> Option<&FlightPoint> {
        self.points.iter().find(|p| p.timestamp == timestamp)
    }

    pub fn index_of(&self, timestamp: i64) -> Option<usize> {
        self.points.iter().position(|p| p.timestamp == timestamp)
    }

    pub fn first_point(&self) -> Option<&FlightPoint> {
        self.points.first()
    }

    pub fn last_point(&self) -> Option<&FlightPoint> {
        self.points.last()
    }

    pub fn first_valid_point(&self) -> Option<&FlightPoint> {
        self.points.iter().find(|p| p.is_valid(self.min_satellites))
    }

    pub fn last_valid_point(&self) -> Option<&FlightPoint> {
        self.points
            .iter()
            .rev()
            .find(|p| p.is_valid(self.min_satellites))
    }

    /// Valid points in timestamp order. Each call starts a fresh pass.
    pub fn valid_points(&self) -> impl Iterator<Item = &FlightPoint> {
        self.points
            .iter()
            .filter(move |p| p.is_valid(self.min_satellites))
    }

    /// Raw points newer than the given timestamp, for client update polls.
    pub fn points_after(&self, timestamp: i64) -> impl Iterator<Item = &FlightPoint> {
        self.points.iter().filter(move |p| p.timestamp > timestamp)
    }

    /// Half-open index iteration `[low, high)` over raw points.
    pub fn iter_range(
        &self,
        low: usize,
        high: usize,
    ) -> Result<impl Iterator<Item = &FlightPoint>, FlightError> {
        if low > high || high > self.points.len() {
            return Err(FlightError::RangeOutOfBounds {
                low,
                high,
                len: self.points.len(),
            });
        }
        Ok(self.points[low..high].iter())
    }

    /// Coordinates of valid points, for track polylines.
    pub fn coords(&self) -> Vec<Position> {
        self.valid_points().map(|p| p.coords()).collect()
    }

    /// Altitudes of valid points, for altitude charts.
    pub fn altitudes(&self) -> Vec<f64> {
        self.valid_points().map(|p| p.altitude).collect()
    }

    /// Pin states of valid points, for pin event logs.
    pub fn pin_states(&self) -> Vec<PinStates> {
        self.valid_points()
            .map(|p| PinStates {
                input: p.input_pins,
                output: p.output_pins,
                timestamp: p.timestamp,
                altitude: p.altitude,
            })
            .collect()
    }

    /// Detached copy for the reader/updater swap: apply updates to the copy
    /// and swap the reference visible to readers, so a concurrent reader
    /// never observes a half-applied update.
    pub fn snapshot(&self) -> Flight {
        Flight {
            uid: self.uid.clone(),
            imei: self.imei,
            start_date: self.start_date,
            points: self.points.clone(),
            stats: self.stats.clone(),
            min_satellites: self.min_satellites,
        }
    }
}
