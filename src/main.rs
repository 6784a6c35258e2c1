#![allow(clippy::similar_names)]
#![warn(
    clippy::shadow_reuse,
    clippy::shadow_same,
    clippy::builtin_type_shadow
)]
mod command;
mod config;
mod devices;
mod flight_control;
mod flight_director;
mod http_handler;
mod keychain;
#[macro_use]
mod logger;
mod measurement_sink;
mod rocket;
mod serial;

use crate::config::FlightConfig;
use crate::flight_control::{CommandReporter, FlightExecutor};
use crate::http_handler::{CommandFeed, FlightDataUplink, FlightServer, HttpFlightServer, run_setup_handshake};
use crate::keychain::Keychain;
use crate::measurement_sink::TelemetryUplink;
use crate::rocket::spatula::{Spatula, make_spatula};
use chrono::Utc;
use std::sync::Arc;

#[cfg(all(feature = "profiling", not(target_env = "msvc")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let config = FlightConfig::from_env();
    info!("Starting flight computer for {} against {}.", config.vessel_name, config.server_url);

    let server = Arc::new(
        HttpFlightServer::new(&config.server_url).unwrap_or_else(|e| fatal!("Cannot build HTTP client: {e}")),
    );
    let uplink = Arc::new(FlightDataUplink::new(Arc::clone(&server) as Arc<dyn FlightServer>));
    let Spatula { rocket, adapter, imu } =
        make_spatula(&config, Arc::clone(&uplink) as Arc<dyn TelemetryUplink>)
            .unwrap_or_else(|e| fatal!("Invalid rocket layout: {e}"));

    let flight_name = format!("{} {}", config.vessel_name, Utc::now().format("%Y-%m-%d %H:%M"));
    let flight_id = run_setup_handshake(server.as_ref(), &rocket, &flight_name, Utc::now())
        .await
        .unwrap_or_else(|e| fatal!("Setup handshake failed: {e}"));
    uplink.bind(flight_id);
    info!("Flight {flight_name} ({flight_id}) created.");

    let keychain = Keychain::new(server, adapter, imu, flight_id);
    let cancel = keychain.cancel_token();

    let feed_handle = {
        let feed_keychain = keychain.clone();
        let feed_cancel = cancel.clone();
        tokio::spawn(async move {
            let feed = CommandFeed::new(feed_keychain.inbox(), feed_keychain.flight_id());
            feed.run(feed_keychain.server().as_ref(), feed_cancel).await;
        })
    };
    let reporter = CommandReporter::new(keychain.flight_server(), flight_id, keychain.reports());
    let reporter_handle = tokio::spawn(reporter.run(cancel.clone()));
    let executor = FlightExecutor::new(rocket, keychain.inbox(), keychain.reports(), config.min_frame_time);
    info!("Executing {} parts per tick.", executor.execution_order().len());
    let executor_handle = tokio::spawn(executor.run(cancel.clone()));

    // platform IMU drivers attach through `keychain.imu()`, until one is
    // running the inertial parts stay without data and refuse calibration
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for shutdown signal: {e}");
    }
    info!("Shutting down.");
    cancel.cancel();
    for (name, handle) in [("executor", executor_handle), ("reporter", reporter_handle), ("command feed", feed_handle)] {
        if let Err(e) = handle.await {
            error!("Task {name} ended abnormally: {e}");
        }
    }
    if keychain.adapter().is_connected() {
        info!("Serial link still open at exit.");
    }
}
