//! CLI tool to stream a simulated balloon flight to the server.
//!
//! Runs a full ascent / burst / descent profile so flight assembly, the
//! wind model, and landing prediction can be exercised end to end.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use tokio::time;

use strato_cli::sim::{FlightProfile, Simulation};
use strato_core::Vec2;

/// Simulate a balloon flight against the telemetry server
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server URL
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Modem IMEI (must be on the server's allow-list)
    #[arg(long)]
    imei: u64,

    /// Launch latitude
    #[arg(long, default_value_t = 44.9)]
    lat: f64,

    /// Launch longitude
    #[arg(long, default_value_t = -93.1)]
    lng: f64,

    /// Ground altitude in meters
    #[arg(long, default_value_t = 300.0)]
    ground_altitude: f64,

    /// Ascent rate in m/s
    #[arg(long, default_value_t = 5.0)]
    ascent_rate: f64,

    /// Burst altitude in meters
    #[arg(long, default_value_t = 30_000.0)]
    burst_altitude: f64,

    /// Descent speed at sea level in m/s
    #[arg(long, default_value_t = 8.0)]
    descent_speed: f64,

    /// Northward drift in degrees per second
    #[arg(long, default_value_t = 1e-4)]
    drift_lat: f64,

    /// Eastward drift in degrees per second
    #[arg(long, default_value_t = 5e-5)]
    drift_lng: f64,

    /// Simulated seconds between telemetry points
    #[arg(long, default_value_t = 30.0)]
    step: f64,

    /// Wall-clock seconds between sends (0 = as fast as possible)
    #[arg(long, default_value_t = 1.0)]
    interval: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut sim = Simulation::new(FlightProfile {
        launch_lat: args.lat,
        launch_lng: args.lng,
        ground_altitude_m: args.ground_altitude,
        ascent_rate_mps: args.ascent_rate,
        burst_altitude_m: args.burst_altitude,
        sea_level_descent_mps: args.descent_speed,
        drift: Vec2::new(args.drift_lat, args.drift_lng),
        satellites: 9,
    });

    println!("Simulating flight for IMEI {} against {}", args.imei, args.url);
    println!(
        "  Launch: ({}, {}) at {}m, burst at {}m",
        args.lat, args.lng, args.ground_altitude, args.burst_altitude
    );
    println!();

    let client = reqwest::Client::new();
    let mut interval = time::interval(Duration::from_secs_f64(args.interval.max(0.001)));
    let mut timestamp = Utc::now().timestamp();
    let mut sent = 0u32;

    while !sim.landed() {
        interval.tick().await;

        let point = sim.step(args.step, timestamp);
        timestamp += args.step as i64;

        let mut body = serde_json::to_value(&point)?;
        body["imei"] = json!(args.imei);

        let response = client
            .post(format!("{}/v1/assign", args.url))
            .json(&json!({ "point": body }))
            .send()
            .await?;
        let status = response.status();
        let reply: serde_json::Value = response.json().await?;

        sent += 1;
        println!(
            "[{:4}] alt {:8.1}m vv {:+6.2}m/s -> {} {}",
            sent, point.altitude, point.vertical_velocity, status, reply["type"]
        );

        if !status.is_success() {
            eprintln!("Point rejected: {}", reply["data"]);
        }
    }

    println!("\nFlight complete. Sent {} points.", sent);
    Ok(())
}
