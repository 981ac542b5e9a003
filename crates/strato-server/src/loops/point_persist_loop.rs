//! Write-behind persistence loop.
//!
//! Ingestion appends to the in-memory store and queues durable writes here;
//! this loop batches them into periodic transactions so a burst of telemetry
//! never serializes on SQLite. Registry rows and points are written in
//! arrival order, which keeps a new flight's registry row ahead of its
//! points within any batch.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;

use crate::backoff::Backoff;
use crate::persistence::{flights as flights_db, Database};
use crate::state::PersistRequest;

const FLUSH_SECS: u64 = 1;
const DB_BACKOFF_MAX_SECS: u64 = 30;

pub async fn run_point_persist_loop(
    db: Database,
    mut rx: mpsc::Receiver<PersistRequest>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(Duration::from_secs(FLUSH_SECS));
    let mut backoff = Backoff::new(
        Duration::from_secs(FLUSH_SECS),
        Duration::from_secs(DB_BACKOFF_MAX_SECS),
    );
    let mut pending: Vec<PersistRequest> = Vec::new();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Point persistence loop shutting down");
                break;
            }
            maybe_request = rx.recv() => {
                match maybe_request {
                    Some(request) => {
                        pending.push(request);
                        drain_queue(&mut pending, &mut rx);
                    }
                    None => {
                        tracing::info!("Point persistence channel closed");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if !backoff.ready() {
                    continue;
                }
                if let Err(err) = flush_pending(&db, &mut pending).await {
                    let delay = backoff.fail();
                    tracing::warn!(
                        "Point persistence flush failed: {} (backing off {:?})",
                        err,
                        delay
                    );
                } else {
                    backoff.reset();
                }
            }
        }
    }

    // Writes can still be sitting in the channel when the shutdown signal
    // wins the select; pull them in so the final flush covers everything
    // accepted before the server stopped.
    drain_queue(&mut pending, &mut rx);
    if let Err(err) = flush_pending(&db, &mut pending).await {
        tracing::warn!("Point persistence final flush failed: {}", err);
    }
}

fn drain_queue(pending: &mut Vec<PersistRequest>, rx: &mut mpsc::Receiver<PersistRequest>) {
    while let Ok(request) = rx.try_recv() {
        pending.push(request);
    }
}

/// Flush the batch in one transaction. On failure the batch is requeued in
/// front of anything that arrived meanwhile, preserving write order.
async fn flush_pending(db: &Database, pending: &mut Vec<PersistRequest>) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }

    let mut batch = std::mem::take(pending);
    let mut tx = match db.pool().begin().await {
        Ok(tx) => tx,
        Err(err) => {
            batch.append(pending);
            *pending = batch;
            return Err(err.into());
        }
    };

    let mut write_error: Option<anyhow::Error> = None;
    for request in &batch {
        let result = match request {
            PersistRequest::FlightCreated {
                uid,
                imei,
                start_date,
            } => flights_db::insert_registry_tx(&mut tx, uid, *imei, *start_date).await,
            PersistRequest::Point { uid, point } => {
                flights_db::insert_point_tx(&mut tx, uid, point).await
            }
        };
        if let Err(err) = result {
            write_error = Some(err);
            break;
        }
    }

    if let Some(err) = write_error {
        tx.rollback().await.ok();
        batch.append(pending);
        *pending = batch;
        return Err(err);
    }

    if let Err(err) = tx.commit().await {
        batch.append(pending);
        *pending = batch;
        return Err(err.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;
    use chrono::NaiveDate;
    use strato_core::{FlightPoint, Vec2};

    fn point(timestamp: i64) -> FlightPoint {
        FlightPoint {
            timestamp,
            latitude: 44.9,
            longitude: -93.1,
            altitude: 1000.0,
            vertical_velocity: 3.0,
            ground_speed: 10.0,
            satellites: 8,
            input_pins: 0,
            output_pins: 0,
            velocity_vector: Vec2::ZERO,
        }
    }

    #[tokio::test]
    async fn flush_writes_registry_rows_before_their_points() {
        let db = init_database(":memory:", 1).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let mut pending = vec![
            PersistRequest::FlightCreated {
                uid: "uid-1".into(),
                imei: 42,
                start_date: date,
            },
            PersistRequest::Point {
                uid: "uid-1".into(),
                point: point(0),
            },
            PersistRequest::Point {
                uid: "uid-1".into(),
                point: point(10),
            },
        ];
        flush_pending(&db, &mut pending).await.unwrap();
        assert!(pending.is_empty());

        let flights = flights_db::load_all(db.pool(), 6).await.unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].len(), 2);
    }

    #[tokio::test]
    async fn shutdown_flushes_buffered_writes_before_exit() {
        let db = init_database(":memory:", 1).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, _) = broadcast::channel(1);

        let handle = tokio::spawn(run_point_persist_loop(
            db.clone(),
            rx,
            shutdown_tx.subscribe(),
        ));

        tx.send(PersistRequest::FlightCreated {
            uid: "uid-1".into(),
            imei: 42,
            start_date: date,
        })
        .await
        .unwrap();
        tx.send(PersistRequest::Point {
            uid: "uid-1".into(),
            point: point(0),
        })
        .await
        .unwrap();

        // Signal shutdown immediately; the loop must still land both writes.
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let flights = flights_db::load_all(db.pool(), 6).await.unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].len(), 1);
    }

    #[tokio::test]
    async fn empty_flush_is_a_no_op() {
        let db = init_database(":memory:", 1).await.unwrap();
        let mut pending = Vec::new();
        flush_pending(&db, &mut pending).await.unwrap();
    }
}
