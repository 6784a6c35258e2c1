use crate::command::LockedCommandBuffer;
use crate::devices::ImuInputs;
use crate::http_handler::{FlightServer, HttpFlightServer};
use crate::serial::SerialAdapter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Handles shared between the long-running tasks of one flight.
#[derive(Clone)]
pub struct Keychain {
    /// The HTTP connection to the flight-management server.
    server: Arc<HttpFlightServer>,
    /// The serial adapter of the microcontroller link.
    adapter: Arc<SerialAdapter>,
    /// Entry point of the smartphone IMU drivers.
    imu: Arc<ImuInputs>,
    /// Commands received from the server, waiting for the executor.
    inbox: Arc<LockedCommandBuffer>,
    /// Completed commands, waiting for the reporter.
    reports: Arc<LockedCommandBuffer>,
    flight_id: Uuid,
    cancel: CancellationToken,
}

impl Keychain {
    pub fn new(server: Arc<HttpFlightServer>, adapter: Arc<SerialAdapter>, imu: ImuInputs, flight_id: Uuid) -> Self {
        Self {
            server,
            adapter,
            imu: Arc::new(imu),
            inbox: Arc::new(LockedCommandBuffer::new()),
            reports: Arc::new(LockedCommandBuffer::new()),
            flight_id,
            cancel: CancellationToken::new(),
        }
    }

    /// Provides a shared reference to the HTTP flight server.
    pub fn server(&self) -> Arc<HttpFlightServer> { Arc::clone(&self.server) }

    /// Provides the server behind its trait object, as the reporting tasks expect it.
    pub fn flight_server(&self) -> Arc<dyn FlightServer> { Arc::clone(&self.server) as Arc<dyn FlightServer> }

    pub fn adapter(&self) -> Arc<SerialAdapter> { Arc::clone(&self.adapter) }

    /// Handle for the platform IMU drivers to publish samples through.
    pub fn imu(&self) -> Arc<ImuInputs> { Arc::clone(&self.imu) }

    pub(crate) fn inbox(&self) -> Arc<LockedCommandBuffer> { Arc::clone(&self.inbox) }

    pub(crate) fn reports(&self) -> Arc<LockedCommandBuffer> { Arc::clone(&self.reports) }

    pub fn flight_id(&self) -> Uuid { self.flight_id }

    /// Token shared by all tasks. Cancelling it shuts the flight computer down.
    pub fn cancel_token(&self) -> CancellationToken { self.cancel.clone() }
}
