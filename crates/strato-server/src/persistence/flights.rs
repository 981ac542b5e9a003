//! Flight registry and telemetry point persistence.

use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{Sqlite, SqlitePool};

use strato_core::{Flight, FlightPoint};

/// Insert a registry row within an existing transaction. Replayed rows are
/// ignored so the persist loop can safely retry a failed batch.
pub async fn insert_registry_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    uid: &str,
    imei: u64,
    start_date: NaiveDate,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO flight_registry (uid, imei, start_date) VALUES (?1, ?2, ?3)",
    )
    .bind(uid)
    .bind(imei as i64)
    .bind(start_date.to_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Insert a telemetry point within an existing transaction. The in-memory
/// store already rejected duplicate timestamps, so a conflicting row here is
/// a replay and is ignored.
pub async fn insert_point_tx(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    uid: &str,
    point: &FlightPoint,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO flight_points
            (uid, timestamp, latitude, longitude, altitude, vertical_velocity,
             ground_speed, satellites, input_pins, output_pins)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(uid)
    .bind(point.timestamp)
    .bind(point.latitude)
    .bind(point.longitude)
    .bind(point.altitude)
    .bind(point.vertical_velocity)
    .bind(point.ground_speed)
    .bind(point.satellites as i64)
    .bind(point.input_pins as i64)
    .bind(point.output_pins as i64)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Rebuild every flight from the database at startup. Velocity vectors and
/// stats are rederived in memory; they are never persisted.
pub async fn load_all(pool: &SqlitePool, min_satellites: u32) -> Result<Vec<Flight>> {
    let registry = sqlx::query_as::<_, RegistryRow>(
        "SELECT uid, imei, start_date FROM flight_registry",
    )
    .fetch_all(pool)
    .await?;

    let point_rows = sqlx::query_as::<_, PointRow>(
        r#"
        SELECT uid, timestamp, latitude, longitude, altitude, vertical_velocity,
               ground_speed, satellites, input_pins, output_pins
        FROM flight_points ORDER BY uid, timestamp
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut points_by_uid: HashMap<String, Vec<FlightPoint>> = HashMap::new();
    for row in point_rows {
        let (uid, point) = row.into_parts();
        points_by_uid.entry(uid).or_default().push(point);
    }

    let mut flights = Vec::with_capacity(registry.len());
    for row in registry {
        let start_date: NaiveDate = row.start_date.parse()?;
        let points = points_by_uid.remove(&row.uid).unwrap_or_default();
        flights.push(Flight::from_points(
            row.uid,
            row.imei as u64,
            start_date,
            min_satellites,
            points,
        ));
    }
    Ok(flights)
}

#[derive(sqlx::FromRow)]
struct RegistryRow {
    uid: String,
    imei: i64,
    start_date: String,
}

#[derive(sqlx::FromRow)]
struct PointRow {
    uid: String,
    timestamp: i64,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    vertical_velocity: f64,
    ground_speed: f64,
    satellites: i64,
    input_pins: i64,
    output_pins: i64,
}

impl PointRow {
    fn into_parts(self) -> (String, FlightPoint) {
        (
            self.uid,
            FlightPoint {
                timestamp: self.timestamp,
                latitude: self.latitude,
                longitude: self.longitude,
                altitude: self.altitude,
                vertical_velocity: self.vertical_velocity,
                ground_speed: self.ground_speed,
                satellites: self.satellites as u32,
                input_pins: self.input_pins as u8,
                output_pins: self.output_pins as u8,
                velocity_vector: Default::default(),
            },
        )
    }
}
