//! Authoritative in-memory flight store backing the API.
//!
//! Flights live in a DashMap keyed by uid with a second map resolving
//! `(imei, start_date)` identities. Mutations happen through the core
//! assigner's `FlightStore` view; durable writes are handed to the persist
//! loop through an mpsc channel and never block ingestion.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use strato_core::{
    AssignError, Assignment, AssignerConfig, Flight, FlightAssigner, FlightPoint, FlightStore,
    StoreError,
};

use crate::config::Config;
use crate::elevation::ElevationClient;
use crate::modems::ModemList;

/// Durable-write request handed to the persist loop.
#[derive(Debug)]
pub enum PersistRequest {
    FlightCreated {
        uid: String,
        imei: u64,
        start_date: NaiveDate,
    },
    Point {
        uid: String,
        point: FlightPoint,
    },
}

pub struct AppState {
    config: Config,
    modems: ModemList,
    assigner: FlightAssigner,
    elevation: ElevationClient,
    flights: DashMap<String, Flight>,
    identity: DashMap<(u64, NaiveDate), String>,
    persist_tx: Option<mpsc::Sender<PersistRequest>>,
}

impl AppState {
    pub fn new(config: Config, modems: ModemList) -> Self {
        let assigner = FlightAssigner::new(AssignerConfig {
            min_altitude_m: config.min_altitude_m,
            max_altitude_m: config.max_altitude_m,
            contiguity_window: chrono::Duration::hours(config.contiguity_window_hrs),
        });
        let elevation = ElevationClient::new(config.elevation_api_key.clone());
        Self {
            config,
            modems,
            assigner,
            elevation,
            flights: DashMap::new(),
            identity: DashMap::new(),
            persist_tx: None,
        }
    }

    /// Attach the channel feeding the point persist loop.
    pub fn with_persistence(mut self, tx: mpsc::Sender<PersistRequest>) -> Self {
        self.persist_tx = Some(tx);
        self
    }

    /// Seed the store with flights rebuilt from the database at startup.
    pub fn load_flights(&self, flights: Vec<Flight>) {
        for flight in flights {
            self.identity
                .insert((flight.imei(), flight.start_date()), flight.uid().to_string());
            self.flights.insert(flight.uid().to_string(), flight);
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn modems(&self) -> &ModemList {
        &self.modems
    }

    pub fn elevation(&self) -> &ElevationClient {
        &self.elevation
    }

    pub fn flight_count(&self) -> usize {
        self.flights.len()
    }

    /// Run the full assignment pipeline on one incoming point.
    pub fn assign_point(&self, imei: u64, point: FlightPoint) -> Result<Assignment, AssignError> {
        self.assigner.assign(&self.modems, self, imei, point, Utc::now())
    }

    /// Detached copy of a flight for handlers, so responses never hold a
    /// map lock across serialization.
    pub fn snapshot(&self, uid: &str) -> Option<Flight> {
        self.flights.get(uid).map(|f| f.snapshot())
    }

    /// Snapshots of flights whose last trusted point is at or after `since`.
    pub fn active_flights(&self, since: DateTime<Utc>) -> Vec<Flight> {
        self.flights
            .iter()
            .filter(|entry| {
                entry
                    .last_valid_point()
                    .map(|p| p.datetime() >= since)
                    .unwrap_or(false)
            })
            .map(|entry| entry.snapshot())
            .collect()
    }

    /// `(start_date, uid)` registry entries for one modem, oldest first.
    pub fn flights_for_modem(&self, imei: u64) -> Vec<(NaiveDate, String)> {
        let mut entries: Vec<(NaiveDate, String)> = self
            .identity
            .iter()
            .filter(|entry| entry.key().0 == imei)
            .map(|entry| (entry.key().1, entry.value().clone()))
            .collect();
        entries.sort();
        entries
    }

    fn persist(&self, request: PersistRequest) {
        let Some(tx) = &self.persist_tx else {
            return;
        };
        // In-memory state stays authoritative; a full channel costs
        // durability for the dropped write, not correctness.
        if let Err(err) = tx.try_send(request) {
            tracing::warn!("Persist queue rejected write: {err}");
        }
    }
}

impl FlightStore for AppState {
    fn find_by_identity(&self, imei: u64, date: NaiveDate) -> Option<String> {
        self.identity.get(&(imei, date)).map(|uid| uid.clone())
    }

    fn find_recent_active(&self, imei: u64, since: DateTime<Utc>) -> Option<String> {
        self.flights
            .iter()
            .filter(|entry| entry.imei() == imei)
            .filter_map(|entry| {
                let last = entry.last_point()?;
                (last.datetime() >= since).then(|| (last.timestamp, entry.uid().to_string()))
            })
            .max_by_key(|(timestamp, _)| *timestamp)
            .map(|(_, uid)| uid)
    }

    fn create_flight(&self, imei: u64, date: NaiveDate) -> Result<String, StoreError> {
        // Concurrent first points for one (imei, date) race through the
        // assigner's lookup; the entry lock makes the second arrival reuse
        // the first uid instead of orphaning a flight.
        match self.identity.entry((imei, date)) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let uid = Uuid::new_v4().to_string();
                self.flights.insert(
                    uid.clone(),
                    Flight::new(&uid, imei, date, self.config.min_satellites),
                );
                slot.insert(uid.clone());
                self.persist(PersistRequest::FlightCreated {
                    uid: uid.clone(),
                    imei,
                    start_date: date,
                });
                Ok(uid)
            }
        }
    }

    fn append_point(&self, uid: &str, point: FlightPoint) -> Result<(), StoreError> {
        let mut flight = self
            .flights
            .get_mut(uid)
            .ok_or_else(|| StoreError::Backend(format!("no flight {uid} in store")))?;
        if flight.get_by_timestamp(point.timestamp).is_some() {
            return Err(StoreError::DuplicatePoint {
                uid: uid.to_string(),
                timestamp: point.timestamp,
            });
        }
        flight.add(point.clone());
        drop(flight);
        self.persist(PersistRequest::Point {
            uid: uid.to_string(),
            point,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modems::Modem;
    use strato_core::{AssignmentKind, Vec2};

    const IMEI: u64 = 300234060252680;

    fn test_state() -> AppState {
        let mut config = Config::from_env();
        config.min_satellites = 6;
        let modems = ModemList::from_modems(vec![Modem {
            imei: IMEI,
            org: "State-Uni".into(),
            name: "MDM_001".into(),
        }]);
        AppState::new(config, modems)
    }

    fn point(timestamp: i64) -> FlightPoint {
        FlightPoint {
            timestamp,
            latitude: 44.9,
            longitude: -93.1,
            altitude: 1000.0,
            vertical_velocity: 3.0,
            ground_speed: 10.0,
            satellites: 9,
            input_pins: 0,
            output_pins: 0,
            velocity_vector: Vec2::ZERO,
        }
    }

    #[tokio::test]
    async fn creates_then_appends_to_todays_flight() {
        let state = test_state();
        let now = Utc::now().timestamp();

        let first = state.assign_point(IMEI, point(now)).unwrap();
        assert_eq!(first.kind, AssignmentKind::Created);

        let second = state.assign_point(IMEI, point(now + 10)).unwrap();
        assert_ne!(second.kind, AssignmentKind::Created);
        assert_eq!(second.flight_uid, first.flight_uid);

        let snapshot = state.snapshot(&first.flight_uid).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.imei(), IMEI);
    }

    #[tokio::test]
    async fn duplicate_timestamps_are_rejected() {
        let state = test_state();
        let now = Utc::now().timestamp();

        state.assign_point(IMEI, point(now)).unwrap();
        let result = state.assign_point(IMEI, point(now));
        assert!(matches!(
            result,
            Err(AssignError::Store(StoreError::DuplicatePoint { .. }))
        ));
    }

    #[tokio::test]
    async fn active_flights_and_registry_listings() {
        let state = test_state();
        let now = Utc::now().timestamp();
        let assignment = state.assign_point(IMEI, point(now)).unwrap();

        let active = state.active_flights(Utc::now() - chrono::Duration::hours(12));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].uid(), assignment.flight_uid);

        let listed = state.flights_for_modem(IMEI);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1, assignment.flight_uid);
        assert!(state.flights_for_modem(1).is_empty());
    }

    #[tokio::test]
    async fn simultaneous_first_points_share_one_flight() {
        let state = std::sync::Arc::new(test_state());
        let date: NaiveDate = "2024-01-01".parse().unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let state = std::sync::Arc::clone(&state);
            tasks.push(tokio::spawn(async move {
                state.create_flight(IMEI, date).unwrap()
            }));
        }
        let mut uids = Vec::new();
        for task in tasks {
            uids.push(task.await.unwrap());
        }
        uids.dedup();
        assert_eq!(uids.len(), 1);
        assert_eq!(state.flight_count(), 1);
        assert_eq!(state.find_by_identity(IMEI, date), Some(uids[0].clone()));
    }

    #[tokio::test]
    async fn recent_lookup_prefers_the_latest_flight() {
        let state = test_state();
        let date_a = "2024-01-01".parse().unwrap();
        let date_b = "2024-01-02".parse().unwrap();
        let uid_a = state.create_flight(IMEI, date_a).unwrap();
        let uid_b = state.create_flight(IMEI, date_b).unwrap();
        state.append_point(&uid_a, point(1_704_150_000)).unwrap();
        state.append_point(&uid_b, point(1_704_160_000)).unwrap();

        let since = DateTime::from_timestamp(1_704_100_000, 0).unwrap();
        assert_eq!(state.find_recent_active(IMEI, since), Some(uid_b));
    }
}
