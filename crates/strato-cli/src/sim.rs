//! Balloon flight simulation.
//!
//! Generates an ascent / burst / descent profile with constant horizontal
//! drift, good enough to exercise flight assembly, the wind model, and
//! landing prediction against a live server.

use strato_core::{FlightPoint, Vec2};

/// Density-scale height used to speed up the simulated descent with altitude.
const DENSITY_SCALE_HEIGHT_M: f64 = 7238.3;
/// Meters per degree of latitude, for deriving ground speed from drift.
const METERS_PER_DEGREE: f64 = 111_320.0;

#[derive(Debug, Clone)]
pub struct FlightProfile {
    pub launch_lat: f64,
    pub launch_lng: f64,
    pub ground_altitude_m: f64,
    pub ascent_rate_mps: f64,
    pub burst_altitude_m: f64,
    /// Descent speed at sea level; grows with altitude as density drops.
    pub sea_level_descent_mps: f64,
    /// Horizontal drift in degrees per second (latitude, longitude).
    pub drift: Vec2,
    pub satellites: u32,
}

/// Stepwise integration of one balloon flight.
pub struct Simulation {
    profile: FlightProfile,
    lat: f64,
    lng: f64,
    altitude_m: f64,
    burst: bool,
    landed: bool,
}

impl Simulation {
    pub fn new(profile: FlightProfile) -> Self {
        Self {
            lat: profile.launch_lat,
            lng: profile.launch_lng,
            altitude_m: profile.ground_altitude_m,
            burst: false,
            landed: false,
            profile,
        }
    }

    pub fn landed(&self) -> bool {
        self.landed
    }

    fn descent_speed(&self) -> f64 {
        self.profile.sea_level_descent_mps * (self.altitude_m / (2.0 * DENSITY_SCALE_HEIGHT_M)).exp()
    }

    /// Advance the flight by `dt_s` seconds and emit the telemetry sample
    /// the modem would have produced, stamped with `timestamp`.
    pub fn step(&mut self, dt_s: f64, timestamp: i64) -> FlightPoint {
        let vertical_velocity = if self.landed {
            0.0
        } else if self.burst {
            -self.descent_speed()
        } else {
            self.profile.ascent_rate_mps
        };

        self.altitude_m += vertical_velocity * dt_s;
        if self.altitude_m >= self.profile.burst_altitude_m {
            self.altitude_m = self.profile.burst_altitude_m;
            self.burst = true;
        }
        if self.burst && self.altitude_m <= self.profile.ground_altitude_m {
            self.altitude_m = self.profile.ground_altitude_m;
            self.landed = true;
        }
        if !self.landed {
            self.lat += self.profile.drift.d_lat * dt_s;
            self.lng += self.profile.drift.d_lng * dt_s;
        }

        let ground_speed = (self.profile.drift.d_lat.hypot(self.profile.drift.d_lng))
            * METERS_PER_DEGREE;

        FlightPoint {
            timestamp,
            latitude: self.lat,
            longitude: self.lng,
            altitude: self.altitude_m,
            vertical_velocity,
            ground_speed,
            satellites: self.profile.satellites,
            input_pins: 0,
            output_pins: 0,
            velocity_vector: Vec2::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> FlightProfile {
        FlightProfile {
            launch_lat: 44.9,
            launch_lng: -93.1,
            ground_altitude_m: 300.0,
            ascent_rate_mps: 5.0,
            burst_altitude_m: 3000.0,
            sea_level_descent_mps: 8.0,
            drift: Vec2::new(1e-4, 5e-5),
            satellites: 9,
        }
    }

    #[test]
    fn ascends_bursts_then_descends_to_ground() {
        let mut sim = Simulation::new(profile());
        let mut max_altitude: f64 = 0.0;
        let mut steps = 0;
        let mut ts = 0;
        while !sim.landed() && steps < 100_000 {
            let point = sim.step(10.0, ts);
            max_altitude = max_altitude.max(point.altitude);
            ts += 10;
            steps += 1;
        }
        assert!(sim.landed(), "flight never landed");
        assert_eq!(max_altitude, 3000.0);
    }

    #[test]
    fn drift_moves_the_balloon_downwind() {
        let mut sim = Simulation::new(profile());
        let start = sim.step(10.0, 0);
        let later = sim.step(10.0, 10);
        assert!(later.latitude > start.latitude);
        assert!(later.longitude > start.longitude);
        assert!(later.ground_speed > 0.0);
    }

    #[test]
    fn descent_is_faster_at_altitude() {
        let mut sim = Simulation::new(profile());
        // Run up to burst.
        let mut ts = 0;
        while !sim.burst {
            sim.step(10.0, ts);
            ts += 10;
        }
        let high = sim.step(10.0, ts);
        // Near the ground the descent speed approaches the sea level value.
        let mut low_speed = 0.0;
        while !sim.landed() {
            ts += 10;
            low_speed = sim.step(10.0, ts).vertical_velocity;
        }
        assert!(high.vertical_velocity < 0.0);
        assert!(high.vertical_velocity.abs() > low_speed.abs() * 0.9);
    }
}
