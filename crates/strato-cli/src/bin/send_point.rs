//! CLI tool to post a single telemetry point to the server.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use serde_json::json;

use strato_core::{FlightPoint, Vec2};

/// Send one telemetry point to the balloon telemetry server
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Modem IMEI
    #[arg(long)]
    imei: u64,

    #[arg(long, default_value_t = 44.9)]
    lat: f64,

    #[arg(long, default_value_t = -93.1)]
    lng: f64,

    /// Altitude in meters
    #[arg(long, default_value_t = 1000.0)]
    altitude: f64,

    /// Vertical velocity in m/s (negative while descending)
    #[arg(long, default_value_t = 0.0)]
    vertical_velocity: f64,

    /// Ground speed in m/s
    #[arg(long, default_value_t = 0.0)]
    ground_speed: f64,

    /// Visible GPS satellites
    #[arg(long, default_value_t = 9)]
    satellites: u32,

    #[arg(long, default_value_t = 0)]
    input_pins: u8,

    #[arg(long, default_value_t = 0)]
    output_pins: u8,

    /// Unix timestamp; defaults to now
    #[arg(long)]
    timestamp: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let point = FlightPoint {
        timestamp: args.timestamp.unwrap_or_else(|| Utc::now().timestamp()),
        latitude: args.lat,
        longitude: args.lng,
        altitude: args.altitude,
        vertical_velocity: args.vertical_velocity,
        ground_speed: args.ground_speed,
        satellites: args.satellites,
        input_pins: args.input_pins,
        output_pins: args.output_pins,
        velocity_vector: Vec2::ZERO,
    };

    let mut body = serde_json::to_value(&point)?;
    body["imei"] = json!(args.imei);

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/v1/assign", args.url))
        .json(&json!({ "point": body }))
        .send()
        .await?;

    let status = response.status();
    let reply: serde_json::Value = response.json().await?;
    println!("{} -> {}", status, reply);

    if !status.is_success() {
        anyhow::bail!("point rejected");
    }
    Ok(())
}
