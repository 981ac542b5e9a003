//! REST API routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use strato_core::{
    AssignError, FlightPoint, FlightStats, LandingPredictor, PredictorConfig, StoreError,
};

use crate::modems::RedactedModem;
use crate::state::AppState;

/// Don't bother resolving ground elevation while the balloon is still high.
const ELEVATION_LOOKUP_CEILING_M: f64 = 3000.0;

/// Isothermal-atmosphere scale height used to grow the descent speed with
/// altitude (air density halves roughly every 5 km; terminal velocity goes
/// with the inverse square root of density).
const DENSITY_SCALE_HEIGHT_M: f64 = 7238.3;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/assign", post(assign_point))
        .route("/v1/update", post(poll_updates))
        .route("/v1/flights/:uid", get(get_flight))
        .route("/v1/flights/:uid/landing", get(predict_landing))
        .route("/v1/meta/modems", get(list_modems))
        .route("/v1/meta/flights", get(list_modem_flights))
        .route("/v1/meta/active", get(list_active))
}

// === Request/Response types ===

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub point: IncomingPoint,
}

/// Wire form of a telemetry point: the modem identity plus the sample.
#[derive(Debug, Deserialize)]
pub struct IncomingPoint {
    pub imei: u64,
    #[serde(flatten)]
    pub point: FlightPoint,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub uid: String,
    /// Unix timestamp of the newest point the client already has.
    pub datetime: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub update: bool,
    pub result: Vec<FlightPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_elevation: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct FlightResponse {
    pub uid: String,
    pub modem: RedactedModem,
    pub start_date: NaiveDate,
    pub stats: Option<FlightStats>,
    pub points: Vec<FlightPoint>,
}

#[derive(Debug, Deserialize)]
pub struct LandingQuery {
    /// Point to predict from; defaults to the last trusted point.
    pub timestamp: Option<i64>,
    /// Expected descent speed at sea level, m/s.
    pub sea_level_speed: f64,
}

#[derive(Debug, Deserialize)]
pub struct ModemFlightsQuery {
    pub modem_name: String,
}

#[derive(Debug, Serialize)]
pub struct FlightListing {
    pub date: NaiveDate,
    pub uid: String,
}

#[derive(Debug, Serialize)]
pub struct ActiveFlightRecord {
    pub uid: String,
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub modem: RedactedModem,
    pub start_date: NaiveDate,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "status": "error", "data": message.into() }))).into_response()
}

// === Handlers ===

async fn assign_point(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AssignRequest>,
) -> Response {
    match state.assign_point(req.point.imei, req.point.point) {
        Ok(assignment) => Json(json!({
            "status": "success",
            "type": assignment.kind,
            "flight": assignment.flight_uid,
        }))
        .into_response(),
        Err(err) => {
            let status = match &err {
                AssignError::AltitudeOutOfBounds { .. } => StatusCode::BAD_REQUEST,
                AssignError::UnknownModem(_) => StatusCode::FORBIDDEN,
                AssignError::Store(StoreError::DuplicatePoint { .. }) => StatusCode::BAD_REQUEST,
                AssignError::Store(StoreError::Backend(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if err.is_rejection() {
                tracing::info!("Rejected point: {err}");
            } else {
                tracing::error!("Point assignment failed: {err}");
            }
            error_body(status, err.to_string())
        }
    }
}

/// Client poll for points newer than the last one it has seen. When the
/// newest point is low and descending, the response is annotated with the
/// ground elevation under it so the client can show height above ground.
async fn poll_updates(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateRequest>,
) -> Response {
    let Some(flight) = state.snapshot(&req.uid) else {
        return error_body(StatusCode::NOT_FOUND, format!("no flight {}", req.uid));
    };

    let result: Vec<FlightPoint> = flight.points_after(req.datetime).cloned().collect();

    let mut ground_elevation = None;
    if let Some(last) = result.last() {
        if last.altitude < ELEVATION_LOOKUP_CEILING_M && last.vertical_velocity < 0.0 {
            ground_elevation = state
                .elevation()
                .ground_elevation(last.latitude, last.longitude)
                .await;
        }
    }

    Json(UpdateResponse {
        update: !result.is_empty(),
        result,
        ground_elevation,
    })
    .into_response()
}

async fn get_flight(State(state): State<Arc<AppState>>, Path(uid): Path<String>) -> Response {
    let Some(flight) = state.snapshot(&uid) else {
        return error_body(StatusCode::NOT_FOUND, format!("no flight {uid}"));
    };
    let Some(modem) = state.modems().redacted(flight.imei()) else {
        tracing::error!("Flight {uid} references a modem missing from the allow-list");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
    };

    Json(FlightResponse {
        uid: flight.uid().to_string(),
        modem,
        start_date: flight.start_date(),
        stats: flight.stats().cloned(),
        points: flight.points().to_vec(),
    })
    .into_response()
}

/// Predict the landing position from a point on the flight, using the wind
/// profile the flight itself has observed on the way up.
async fn predict_landing(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    Query(query): Query<LandingQuery>,
) -> Response {
    if !(query.sea_level_speed > 0.0) {
        return error_body(
            StatusCode::BAD_REQUEST,
            "sea_level_speed must be a positive descent speed in m/s",
        );
    }
    let Some(flight) = state.snapshot(&uid) else {
        return error_body(StatusCode::NOT_FOUND, format!("no flight {uid}"));
    };
    if flight.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "flight has no points");
    }

    let point = match query.timestamp {
        Some(ts) => match flight.get_by_timestamp(ts) {
            Some(point) => point.clone(),
            None => {
                return error_body(
                    StatusCode::NOT_FOUND,
                    format!("no point at timestamp {ts} for flight {uid}"),
                );
            }
        },
        None => match flight.last_valid_point().or_else(|| flight.last_point()) {
            Some(point) => point.clone(),
            None => return error_body(StatusCode::BAD_REQUEST, "flight has no points"),
        },
    };

    let mut predictor = LandingPredictor::new(PredictorConfig::default());
    if let Err(err) = predictor.build_altitude_profile(&flight) {
        tracing::error!("Wind profile build failed for {uid}: {err}");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
    }

    let sea_level_speed = query.sea_level_speed;
    let descent_speed =
        move |altitude: f64| sea_level_speed * (altitude / (2.0 * DENSITY_SCALE_HEIGHT_M)).exp();
    match predictor.calculate_landing(&point, descent_speed) {
        Ok(landing) => Json(json!({
            "uid": uid,
            "timestamp": point.timestamp,
            "landing": landing,
        }))
        .into_response(),
        Err(err) => {
            tracing::error!("Landing prediction failed for {uid}: {err}");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}

async fn list_modems(State(state): State<Arc<AppState>>) -> Response {
    Json(state.modems().redacted_set()).into_response()
}

async fn list_modem_flights(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModemFlightsQuery>,
) -> Response {
    let Some(modem) = state.modems().get_by_name(&query.modem_name) else {
        return error_body(
            StatusCode::NOT_FOUND,
            format!("invalid modem name '{}'", query.modem_name),
        );
    };

    let listings: Vec<FlightListing> = state
        .flights_for_modem(modem.imei)
        .into_iter()
        .map(|(date, uid)| FlightListing { date, uid })
        .collect();
    Json(listings).into_response()
}

/// Flights with a trusted point inside the active window, newest first.
async fn list_active(State(state): State<Arc<AppState>>) -> Response {
    let since = Utc::now() - Duration::hours(state.config().active_window_hrs);

    let mut records = Vec::new();
    for flight in state.active_flights(since) {
        let Some(last) = flight.last_valid_point() else {
            continue;
        };
        let Some(modem) = state.modems().redacted(flight.imei()) else {
            tracing::warn!(
                "Active flight {} references a modem missing from the allow-list",
                flight.uid()
            );
            continue;
        };
        records.push(ActiveFlightRecord {
            uid: flight.uid().to_string(),
            timestamp: last.timestamp,
            latitude: last.latitude,
            longitude: last.longitude,
            altitude: last.altitude,
            modem,
            start_date: flight.start_date(),
        });
    }
    records.sort_by_key(|record| std::cmp::Reverse(record.timestamp));

    if records.is_empty() {
        Json(json!({ "status": "none" })).into_response()
    } else {
        Json(json!({ "status": "active", "points": records })).into_response()
    }
}
