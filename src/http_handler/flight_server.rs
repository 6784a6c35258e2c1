use super::http_client::HTTPClient;
use super::http_request::{
    command_confirm_post::CommandConfirmRequest, flight_create_post::FlightCreateRequest,
    flight_data_binary_post::FlightDataBinaryRequest, vessel_register_post::VesselRegisterRequest,
};
use super::http_response::response_common::ResponseError;
use crate::command::Command;
use crate::measurement_sink::TelemetryUplink;
use crate::rocket::{FlightDescriptor, Rocket, VesselDescriptor};
use crate::{info, warn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

/// Calls the flight computer makes against the flight-management server.
#[async_trait]
pub trait FlightServer: Send + Sync {
    /// Registers the vessel, returning the id and version the server assigned.
    async fn register_vessel(&self, vessel: &VesselDescriptor) -> Result<(Uuid, u32), ResponseError>;
    /// Opens a new flight and returns its id.
    async fn create_flight(&self, flight: &FlightDescriptor) -> Result<Uuid, ResponseError>;
    async fn report_command_responses(&self, flight_id: Uuid, commands: &[Command]) -> Result<(), ResponseError>;
    async fn report_flight_data_binary(&self, flight_id: Uuid, payload: Vec<u8>) -> Result<(), ResponseError>;
}

/// [`FlightServer`] over the REST API.
#[derive(Debug, Clone)]
pub struct HttpFlightServer {
    client: HTTPClient,
}

impl HttpFlightServer {
    /// # Errors
    /// Fails if the underlying HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ResponseError> { Ok(Self { client: HTTPClient::new(base_url)? }) }

    pub(crate) fn client(&self) -> &HTTPClient { &self.client }
}

#[async_trait]
impl FlightServer for HttpFlightServer {
    async fn register_vessel(&self, vessel: &VesselDescriptor) -> Result<(Uuid, u32), ResponseError> {
        let resp = self.client.send_json(&VesselRegisterRequest { vessel }).await?;
        Ok((resp.id(), resp.version()))
    }

    async fn create_flight(&self, flight: &FlightDescriptor) -> Result<Uuid, ResponseError> {
        let resp = self.client.send_json(&FlightCreateRequest { flight }).await?;
        info!("Created flight {:?} with id {}.", resp.name(), resp.id());
        Ok(resp.id())
    }

    async fn report_command_responses(&self, flight_id: Uuid, commands: &[Command]) -> Result<(), ResponseError> {
        self.client.send_json(&CommandConfirmRequest { flight_id, commands }).await?;
        Ok(())
    }

    async fn report_flight_data_binary(&self, flight_id: Uuid, payload: Vec<u8>) -> Result<(), ResponseError> {
        self.client.send_binary(FlightDataBinaryRequest { flight_id, payload }).await?;
        Ok(())
    }
}

/// Forwards measurement batches to a [`FlightServer`].
///
/// The rocket, and with it the sink owning this uplink, exists before the
/// flight is created, so the flight id is bound afterwards.
pub struct FlightDataUplink {
    server: Arc<dyn FlightServer>,
    flight_id: OnceLock<Uuid>,
}

impl FlightDataUplink {
    pub fn new(server: Arc<dyn FlightServer>) -> Self { Self { server, flight_id: OnceLock::new() } }

    /// Binds the uplink to `flight_id`. Returns `false` if it was bound already.
    pub fn bind(&self, flight_id: Uuid) -> bool { self.flight_id.set(flight_id).is_ok() }
}

#[async_trait]
impl TelemetryUplink for FlightDataUplink {
    async fn send(&self, payload: Vec<u8>) -> Result<(), ResponseError> {
        let Some(flight_id) = self.flight_id.get() else {
            return Err(ResponseError::BadRequest(String::from("no flight created yet")));
        };
        self.server.report_flight_data_binary(*flight_id, payload).await
    }
}

const SETUP_ATTEMPTS: u32 = 4;
const SETUP_RETRY_DELAY: Duration = Duration::from_secs(1);

async fn with_retries<T, F, Fut>(what: &str, mut call: F) -> Result<T, ResponseError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ResponseError>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(val) => return Ok(val),
            Err(e) if attempt < SETUP_ATTEMPTS => {
                warn!("{what} failed ({e}), retry {attempt}.");
                attempt += 1;
                tokio::time::sleep(SETUP_RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Registers the vessel and opens a flight for it, retrying each step a few
/// times. Returns the flight id.
///
/// # Errors
/// Returns the last [`ResponseError`] once a step ran out of retries.
pub async fn run_setup_handshake(
    server: &dyn FlightServer,
    rocket: &Rocket,
    flight_name: &str,
    now: DateTime<Utc>,
) -> Result<Uuid, ResponseError> {
    let (vessel, mut flight) = rocket.to_vessel_and_flight(now);
    let (vessel_id, version) = with_retries("Vessel registration", || server.register_vessel(&vessel)).await?;
    info!("Vessel {} registered as {vessel_id} version {version}.", vessel.name);
    flight.vessel_id = vessel_id;
    flight.vessel_version = version;
    flight.name = String::from(flight_name);
    with_retries("Flight creation", || server.create_flight(&flight)).await
}
