//! Small vector math shared by velocity derivation, statistics, and the
//! wind model.

use serde::{Deserialize, Serialize};

/// Fold `to_add` into a running mean that already reflects `count` samples.
pub fn weighted_average(current: f64, count: u32, to_add: f64) -> f64 {
    let n = count as f64;
    current * n / (n + 1.0) + to_add / (n + 1.0)
}

/// Round to two decimal places.
pub fn round_to_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A horizontal velocity or displacement in degrees (latitude, longitude).
///
/// Velocity vectors are expressed in degrees per second; scaling one by a
/// duration yields a displacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub d_lat: f64,
    pub d_lng: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 {
        d_lat: 0.0,
        d_lng: 0.0,
    };

    pub fn new(d_lat: f64, d_lng: f64) -> Self {
        Self { d_lat, d_lng }
    }

    pub fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.d_lat + other.d_lat, self.d_lng + other.d_lng)
    }

    /// Unweighted midpoint of two vectors.
    pub fn avg(self, other: Vec2) -> Vec2 {
        Vec2::new(
            (self.d_lat + other.d_lat) / 2.0,
            (self.d_lng + other.d_lng) / 2.0,
        )
    }

    /// Fold `other` into a running mean that already reflects `count` samples.
    pub fn weighted_avg(self, other: Vec2, count: u32) -> Vec2 {
        Vec2::new(
            weighted_average(self.d_lat, count, other.d_lat),
            weighted_average(self.d_lng, count, other.d_lng),
        )
    }

    /// Element-wise map.
    pub fn map(self, f: impl Fn(f64) -> f64) -> Vec2 {
        Vec2::new(f(self.d_lat), f(self.d_lng))
    }

    pub fn scale(self, factor: f64) -> Vec2 {
        self.map(|x| x * factor)
    }
}

/// A geodetic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Displace this position by a vector in degrees.
    pub fn offset(self, v: Vec2) -> Position {
        Position::new(self.lat + v.d_lat, self.lng + v.d_lng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_average_matches_arithmetic_mean() {
        let mut avg = 10.0;
        for count in 1..5 {
            avg = weighted_average(avg, count, 20.0);
        }
        // 10, 20, 20, 20, 20
        assert!((avg - 18.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_average_is_idempotent_for_equal_samples() {
        let mut avg = 7.5;
        for count in 1..100 {
            avg = weighted_average(avg, count, 7.5);
        }
        assert!((avg - 7.5).abs() < 1e-9);
    }

    #[test]
    fn vector_avg_and_scale() {
        let a = Vec2::new(1.0, 0.0);
        let b = Vec2::new(0.0, 1.0);
        assert_eq!(a.avg(b), Vec2::new(0.5, 0.5));
        assert_eq!(a.scale(3.0), Vec2::new(3.0, 0.0));
        assert_eq!(a.add(b), Vec2::new(1.0, 1.0));
    }
}
