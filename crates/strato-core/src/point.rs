//! A single telemetry sample received from a balloon modem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vector::{Position, Vec2};

/// One frame in time/space from a flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPoint {
    /// Unix seconds, UTC.
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level.
    pub altitude: f64,
    /// Meters per second, negative while descending.
    pub vertical_velocity: f64,
    /// Meters per second.
    pub ground_speed: f64,
    pub satellites: u32,
    /// Raw input pin states (0-15).
    pub input_pins: u8,
    /// Raw output pin states (0-7).
    pub output_pins: u8,
    /// Vector from this point to its successor in the same flight, in
    /// degrees per second. Zero until a successor is appended; this is a
    /// derived field, not the point's own velocity.
    #[serde(default)]
    pub velocity_vector: Vec2,
}

impl FlightPoint {
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }

    pub fn coords(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }

    /// A point is trusted for display, statistics, and modeling once enough
    /// satellites were visible to the GPS.
    pub fn is_valid(&self, min_satellites: u32) -> bool {
        self.satellites > min_satellites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(satellites: u32) -> FlightPoint {
        FlightPoint {
            timestamp: 1_704_067_200,
            latitude: 45.0,
            longitude: -93.2,
            altitude: 1200.0,
            vertical_velocity: 3.1,
            ground_speed: 12.0,
            satellites,
            input_pins: 0,
            output_pins: 0,
            velocity_vector: Vec2::ZERO,
        }
    }

    #[test]
    fn validity_is_strictly_above_threshold() {
        assert!(!point(5).is_valid(6));
        assert!(!point(6).is_valid(6));
        assert!(point(7).is_valid(6));
    }

    #[test]
    fn datetime_round_trips_unix_seconds() {
        let p = point(8);
        assert_eq!(p.datetime().timestamp(), p.timestamp);
        assert_eq!(p.datetime().to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn velocity_vector_defaults_to_zero_when_absent() {
        let parsed: FlightPoint = serde_json::from_str(
            r#"{
                "timestamp": 1704067200,
                "latitude": 45.0,
                "longitude": -93.2,
                "altitude": 1200.0,
                "vertical_velocity": 3.1,
                "ground_speed": 12.0,
                "satellites": 8,
                "input_pins": 0,
                "output_pins": 0
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.velocity_vector, Vec2::ZERO);
    }
}
