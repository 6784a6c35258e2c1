use super::request_common::{BinaryBodyHTTPRequestType, HTTPRequestMethod, HTTPRequestType};
use super::response_common::NoBodyResponse;
use uuid::Uuid;

/// One binary telemetry batch.
#[derive(Debug)]
pub(crate) struct FlightDataBinaryRequest {
    pub(crate) flight_id: Uuid,
    pub(crate) payload: Vec<u8>,
}

impl BinaryBodyHTTPRequestType for FlightDataBinaryRequest {
    fn into_body(self) -> Vec<u8> { self.payload }
}

impl HTTPRequestType for FlightDataBinaryRequest {
    type Response = NoBodyResponse;
    fn endpoint(&self) -> String { format!("/flight_data/report_binary/{}", self.flight_id) }
    fn request_method(&self) -> HTTPRequestMethod { HTTPRequestMethod::Post }
}
