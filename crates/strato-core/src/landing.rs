//! Empirical wind model and landing displacement integration.
//!
//! The predictor bins a flight's own velocity vectors into fixed-width
//! altitude blocks, interpolates empty blocks, and integrates the resulting
//! wind column against a caller-supplied descent-speed function to estimate
//! where the balloon touches down.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::flight::{Flight, FlightError};
use crate::point::FlightPoint;
use crate::vector::{Position, Vec2};

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("flight has no points to build a wind model from")]
    EmptyFlight,
    #[error("point index {0} out of bounds")]
    IndexOutOfBounds(usize),
    #[error("lowest block not set: build the altitude profile first")]
    ModelNotBuilt,
    #[error(transparent)]
    Range(#[from] FlightError),
}

#[derive(Debug, Clone)]
pub struct PredictorConfig {
    /// Altitude bucket width in meters. A block key `b` covers the
    /// half-open range `[b, b + block_size_m)`.
    pub block_size_m: i64,
    /// Outlier bound for velocity-vector components in degrees per second.
    /// Defaults to roughly 150 mph; anything faster is a clock or GPS glitch.
    pub max_component_speed: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            block_size_m: 150,
            max_component_speed: 6.0386e-4,
        }
    }
}

/// Altitude-binned average wind velocities derived from one flight.
///
/// `build_profile`/`fix_blocks` share the per-block running-average counter,
/// so incremental updates to the same predictor must be serialized by the
/// caller (they are `&mut self` here, which enforces exactly that).
pub struct LandingPredictor {
    config: PredictorConfig,
    model: BTreeMap<i64, Vec2>,
    /// Sample count of the block the last build pass ended in, persisted so
    /// a later incremental pass continues the same running average.
    last_velocity_count: u32,
    /// Floor block of the flight's first point, fixed on the initial build
    /// and used as the lower integration bound.
    lowest_block: Option<i64>,
}

impl LandingPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            model: BTreeMap::new(),
            last_velocity_count: 0,
            lowest_block: None,
        }
    }

    /// Floor of the block containing `altitude`. Floors toward negative
    /// infinity, so -10m lands in block -150, not block 0.
    pub fn block(&self, altitude: f64) -> i64 {
        let size = self.config.block_size_m as f64;
        (altitude.div_euclid(size) * size) as i64
    }

    pub fn lowest_block(&self) -> Option<i64> {
        self.lowest_block
    }

    pub fn block_vector(&self, block: i64) -> Option<Vec2> {
        self.model.get(&block).copied()
    }

    fn vector_reasonable(&self, point: &FlightPoint) -> bool {
        point.velocity_vector.d_lat.abs() <= self.config.max_component_speed
            && point.velocity_vector.d_lng.abs() <= self.config.max_component_speed
    }

    /// Fold the flight's points in `[low, high)` into the per-block running
    /// averages. Only valid points with reasonable velocity vectors are
    /// used. The per-block counter survives across calls so an incremental
    /// build continues the running mean instead of restarting it.
    pub fn build_profile(
        &mut self,
        flight: &Flight,
        low: usize,
        high: usize,
    ) -> Result<(), PredictionError> {
        let first = flight
            .get(low)
            .ok_or(PredictionError::IndexOutOfBounds(low))?;
        let mut current_block = self.block(first.altitude);
        let mut velocity_count = self.last_velocity_count;

        for point in flight.iter_range(low, high)? {
            if !point.is_valid(flight.min_satellites()) || !self.vector_reasonable(point) {
                continue;
            }
            let block = self.block(point.altitude);
            if block != current_block {
                current_block = block;
                velocity_count = 0;
            }
            match self.model.get_mut(&block) {
                Some(existing) => {
                    *existing = existing.weighted_avg(point.velocity_vector, velocity_count);
                    velocity_count += 1;
                }
                None => {
                    self.model.insert(block, point.velocity_vector);
                    velocity_count = 1;
                }
            }
        }

        self.last_velocity_count = velocity_count;
        Ok(())
    }

    /// Interpolate vectors for empty blocks between the two altitude bounds
    /// (unordered; swapped if needed). `altitude_end == None` means "up to
    /// the highest populated block". The endpoints themselves are assumed
    /// populated and never touched. Each gap is filled with the average of
    /// the nearest populated block above and below it; a direction with no
    /// populated block falls back to that direction's endpoint.
    pub fn fix_blocks(
        &mut self,
        altitude_start: f64,
        altitude_end: Option<f64>,
        set_lowest: bool,
    ) -> Result<(), PredictionError> {
        let end_block = match altitude_end {
            Some(altitude) => self.block(altitude),
            None => *self
                .model
                .keys()
                .next_back()
                .ok_or(PredictionError::EmptyFlight)?,
        };
        let mut low = self.block(altitude_start);
        let mut high = end_block;
        if high < low {
            std::mem::swap(&mut low, &mut high);
        }

        if set_lowest {
            self.lowest_block = Some(low);
        }

        let size = self.config.block_size_m;
        let mut block = low + size;
        while block < high {
            if !self.model.contains_key(&block) {
                let above = self.next_populated_above(block, high);
                let below = self.next_populated_below(block, low);
                let above_vector = self.model.get(&above).copied().unwrap_or_default();
                let below_vector = self.model.get(&below).copied().unwrap_or_default();
                self.model.insert(block, above_vector.avg(below_vector));
            }
            block += size;
        }
        Ok(())
    }

    fn next_populated_above(&self, block: i64, high: i64) -> i64 {
        let mut candidate = block + self.config.block_size_m;
        while candidate < high {
            if self.model.contains_key(&candidate) {
                return candidate;
            }
            candidate += self.config.block_size_m;
        }
        high
    }

    fn next_populated_below(&self, block: i64, low: i64) -> i64 {
        let mut candidate = block - self.config.block_size_m;
        while candidate > low {
            if self.model.contains_key(&candidate) {
                return candidate;
            }
            candidate -= self.config.block_size_m;
        }
        low
    }

    /// Initial full build over the whole flight history. Records the lower
    /// integration bound from the flight's first point.
    pub fn build_altitude_profile(&mut self, flight: &Flight) -> Result<(), PredictionError> {
        let first_altitude = flight
            .first_point()
            .ok_or(PredictionError::EmptyFlight)?
            .altitude;
        self.build_profile(flight, 0, flight.len())?;
        self.fix_blocks(first_altitude, None, true)
    }

    /// Incremental update when new points arrive. `index_a` and `index_b`
    /// are an unordered pair of range endpoints; the lower integration
    /// bound is left untouched.
    pub fn update_altitude_profile(
        &mut self,
        flight: &Flight,
        index_a: usize,
        index_b: usize,
    ) -> Result<(), PredictionError> {
        let altitude_a = flight
            .get(index_a)
            .ok_or(PredictionError::IndexOutOfBounds(index_a))?
            .altitude;
        let altitude_b = flight
            .get(index_b)
            .ok_or(PredictionError::IndexOutOfBounds(index_b))?
            .altitude;
        self.build_profile(flight, index_a, flight.len())?;
        self.fix_blocks(altitude_a, Some(altitude_b), false)
    }

    /// Integrate wind displacement from `point` down to the lowest known
    /// block. `descent_speed` maps altitude (m) to expected vertical speed
    /// (m/s); its sign is ignored, and an exact zero is substituted with a
    /// small epsilon so a block never takes infinite time to fall through.
    ///
    /// Fails if no profile has been built yet.
    pub fn calculate_landing(
        &self,
        point: &FlightPoint,
        descent_speed: impl Fn(f64) -> f64,
    ) -> Result<Position, PredictionError> {
        let lowest = self.lowest_block.ok_or(PredictionError::ModelNotBuilt)?;
        let size = self.config.block_size_m;
        let max_block = self.block(point.altitude);

        let mut position = point.coords();
        let mut block = lowest;
        while block <= max_block {
            let mut terminal = descent_speed(block as f64).abs();
            if terminal == 0.0 {
                terminal = 1e-7;
            }
            let block_duration = size as f64 / terminal;
            let wind = self.model.get(&block).copied().unwrap_or_default();
            position = position.offset(wind.scale(block_duration));
            block += size;
        }
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const MIN_SATELLITES: u32 = 6;

    fn point(timestamp: i64, lat: f64, lng: f64, altitude: f64) -> FlightPoint {
        FlightPoint {
            timestamp,
            latitude: lat,
            longitude: lng,
            altitude,
            vertical_velocity: 4.0,
            ground_speed: 10.0,
            satellites: 9,
            input_pins: 0,
            output_pins: 0,
            velocity_vector: Vec2::ZERO,
        }
    }

    fn flight_from(points: Vec<FlightPoint>) -> Flight {
        Flight::from_points(
            "predict-test",
            300234060252680,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            MIN_SATELLITES,
            points,
        )
    }

    /// Ascending flight drifting at a constant 1e-4 deg/s northward.
    fn constant_drift_flight(max_altitude: f64) -> Flight {
        let mut points = Vec::new();
        let mut altitude = 0.0;
        let mut lat = 40.0;
        let mut ts = 0i64;
        while altitude <= max_altitude {
            points.push(point(ts, lat, -100.0, altitude));
            ts += 10;
            lat += 0.001; // 1e-4 deg/s over 10s
            altitude += 50.0;
        }
        flight_from(points)
    }

    #[test]
    fn block_floors_toward_negative_infinity() {
        let predictor = LandingPredictor::new(PredictorConfig::default());
        assert_eq!(predictor.block(0.0), 0);
        assert_eq!(predictor.block(149.0), 0);
        assert_eq!(predictor.block(150.0), 150);
        assert_eq!(predictor.block(-10.0), -150);
        assert_eq!(predictor.block(-150.0), -150);
    }

    #[test]
    fn build_collects_block_averages_from_velocity_vectors() {
        let flight = constant_drift_flight(600.0);
        let mut predictor = LandingPredictor::new(PredictorConfig::default());
        predictor.build_altitude_profile(&flight).unwrap();

        assert_eq!(predictor.lowest_block(), Some(0));
        for block in [0i64, 150, 300, 450] {
            let vector = predictor.block_vector(block).expect("block populated");
            assert!(
                (vector.d_lat - 1e-4).abs() < 1e-9,
                "block {block} vector {vector:?}"
            );
            assert!(vector.d_lng.abs() < 1e-12);
        }
    }

    #[test]
    fn unreasonable_vectors_are_excluded() {
        // Second point jumps a whole degree in 10 seconds: a GPS glitch far
        // above the component speed bound.
        let points = vec![
            point(0, 40.0, -100.0, 10.0),
            point(10, 41.0, -100.0, 20.0),
            point(20, 41.0001, -100.0, 30.0),
        ];
        let flight = flight_from(points);
        let mut predictor = LandingPredictor::new(PredictorConfig::default());
        predictor.build_altitude_profile(&flight).unwrap();

        let vector = predictor.block_vector(0).expect("block populated");
        // Only the last pair's modest vector survives the filter.
        assert!(vector.d_lat.abs() <= PredictorConfig::default().max_component_speed);
    }

    #[test]
    fn fix_blocks_interpolates_gaps_between_known_neighbors() {
        let mut predictor = LandingPredictor::new(PredictorConfig::default());
        predictor.model.insert(0, Vec2::new(1.0, 0.0));
        predictor.model.insert(600, Vec2::new(0.0, 1.0));
        predictor.fix_blocks(0.0, Some(600.0), true).unwrap();

        assert_eq!(predictor.lowest_block(), Some(0));
        // 150 averages its endpoints; later gaps see earlier fills.
        assert_eq!(predictor.block_vector(150), Some(Vec2::new(0.5, 0.5)));
        assert_eq!(predictor.block_vector(300), Some(Vec2::new(0.25, 0.75)));
        assert_eq!(predictor.block_vector(450), Some(Vec2::new(0.125, 0.875)));
    }

    #[test]
    fn landing_integration_with_constant_wind_and_descent_speed() {
        let mut predictor = LandingPredictor::new(PredictorConfig::default());
        for block in [0i64, 150, 300] {
            predictor.model.insert(block, Vec2::new(1e-4, 0.0));
        }
        predictor.lowest_block = Some(0);

        // Just below 300m: blocks 0 and 150, 150s each at 1 m/s.
        let start = point(0, 10.0, 20.0, 299.0);
        let landing = predictor.calculate_landing(&start, |_| 1.0).unwrap();
        assert!((landing.lat - 10.03).abs() < 1e-9);
        assert!((landing.lng - 20.0).abs() < 1e-12);

        // At exactly 300m the 300 block is included too (inclusive ceiling).
        let start = point(0, 10.0, 20.0, 300.0);
        let landing = predictor.calculate_landing(&start, |_| 1.0).unwrap();
        assert!((landing.lat - 10.045).abs() < 1e-9);
    }

    #[test]
    fn zero_terminal_speed_is_epsilon_substituted() {
        let mut predictor = LandingPredictor::new(PredictorConfig::default());
        predictor.model.insert(0, Vec2::new(1e-4, 0.0));
        predictor.lowest_block = Some(0);

        let start = point(0, 10.0, 20.0, 100.0);
        let landing = predictor.calculate_landing(&start, |_| 0.0).unwrap();
        assert!(landing.lat.is_finite());
        assert!(landing.lng.is_finite());
    }

    #[test]
    fn landing_before_any_build_fails_loudly() {
        let predictor = LandingPredictor::new(PredictorConfig::default());
        let start = point(0, 10.0, 20.0, 100.0);
        assert!(matches!(
            predictor.calculate_landing(&start, |_| 5.0),
            Err(PredictionError::ModelNotBuilt)
        ));
    }

    #[test]
    fn incremental_update_continues_the_running_average() {
        let mut flight = constant_drift_flight(600.0);
        let mut predictor = LandingPredictor::new(PredictorConfig::default());
        predictor.build_altitude_profile(&flight).unwrap();
        let lowest_before = predictor.lowest_block();

        // New points continue upward at the same drift.
        let update_from = flight.len() - 1;
        let last = flight.last_point().unwrap().clone();
        let mut ts = last.timestamp;
        let mut lat = last.latitude;
        let mut altitude = last.altitude;
        for _ in 0..6 {
            ts += 10;
            lat += 0.001;
            altitude += 50.0;
            flight.add(point(ts, lat, -100.0, altitude));
        }
        predictor
            .update_altitude_profile(&flight, update_from, flight.len() - 1)
            .unwrap();

        // Lower bound is untouched by incremental updates.
        assert_eq!(predictor.lowest_block(), lowest_before);

        // Block 600 held a single zero-vector sample from the old apex; the
        // continued running mean blends it with the new 1e-4 samples.
        let blended = predictor.block_vector(600).expect("block populated");
        assert!(blended.d_lat > 0.0 && blended.d_lat < 1e-4);

        // Block 750 only ever saw the new drift samples.
        let fresh = predictor.block_vector(750).expect("new block populated");
        assert!((fresh.d_lat - 1e-4).abs() < 1e-9);
    }

    #[test]
    fn update_with_unordered_indices_is_accepted() {
        let flight = constant_drift_flight(600.0);
        let mut predictor = LandingPredictor::new(PredictorConfig::default());
        predictor.build_altitude_profile(&flight).unwrap();
        // Endpoints reversed: treated as an unordered pair.
        predictor
            .update_altitude_profile(&flight, flight.len() - 1, 0)
            .unwrap();
    }

    #[test]
    fn end_to_end_prediction_drifts_downwind() {
        let flight = constant_drift_flight(3000.0);
        let mut predictor = LandingPredictor::new(PredictorConfig::default());
        predictor.build_altitude_profile(&flight).unwrap();

        let burst = flight.last_point().unwrap();
        let landing = predictor.calculate_landing(burst, |_| 5.0).unwrap();
        // Wind blows north the whole way down, so the touchdown is north of
        // the burst point and on the same meridian.
        assert!(landing.lat > burst.latitude);
        assert!((landing.lng - burst.longitude).abs() < 1e-9);
    }
}
