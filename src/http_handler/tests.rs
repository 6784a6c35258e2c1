use super::http_request::{
    command_confirm_post::CommandConfirmRequest, flight_data_binary_post::FlightDataBinaryRequest,
    request_common::{HTTPRequestMethod, HTTPRequestType},
};
use super::http_response::response_common::{HTTPResponseType, NoBodyResponse};
use super::http_response::vessel_register::VesselRegisterResponse;
use super::*;
use crate::command::{Command, CommandKind, CommandState, LockedCommandBuffer};
use crate::measurement_sink::TelemetryUplink;
use crate::rocket::{FlightDescriptor, Rocket, VesselDescriptor};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct ScriptedServer {
    register_failures: Mutex<u32>,
    flights: Mutex<Vec<FlightDescriptor>>,
    binary: Mutex<Vec<(Uuid, Vec<u8>)>>,
}

#[async_trait]
impl FlightServer for ScriptedServer {
    async fn register_vessel(&self, vessel: &VesselDescriptor) -> Result<(Uuid, u32), ResponseError> {
        let mut failures = self.register_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ResponseError::NoConnection);
        }
        Ok((vessel.id, 7))
    }

    async fn create_flight(&self, flight: &FlightDescriptor) -> Result<Uuid, ResponseError> {
        self.flights.lock().unwrap().push(flight.clone());
        Ok(Uuid::from_u128(42))
    }

    async fn report_command_responses(&self, _flight_id: Uuid, _commands: &[Command]) -> Result<(), ResponseError> {
        Ok(())
    }

    async fn report_flight_data_binary(&self, flight_id: Uuid, payload: Vec<u8>) -> Result<(), ResponseError> {
        self.binary.lock().unwrap().push((flight_id, payload));
        Ok(())
    }
}

#[test]
fn test_endpoints() {
    let flight_id = Uuid::from_u128(1);
    let confirm = CommandConfirmRequest { flight_id, commands: &[] };
    assert_eq!(confirm.endpoint(), "/command/confirm/00000000-0000-0000-0000-000000000001");
    assert_eq!(confirm.request_method(), HTTPRequestMethod::Post);
    let data = FlightDataBinaryRequest { flight_id, payload: vec![1, 2, 3] };
    assert_eq!(data.endpoint(), "/flight_data/report_binary/00000000-0000-0000-0000-000000000001");
}

#[test]
fn test_response_parsing() {
    let body = br#"{"_id": "b0a3acb6-9374-482f-a1c4-4411c995a13e", "_version": 3, "name": "Spatula", "parts": []}"#;
    let resp = VesselRegisterResponse::parse(body).unwrap();
    assert_eq!(resp.version(), 3);
    assert!(matches!(VesselRegisterResponse::parse(b"{}"), Err(ResponseError::Malformed(_))));
    assert_eq!(NoBodyResponse::parse(b"anything").unwrap(), NoBodyResponse);
}

#[test]
fn test_command_event_is_queued_as_received() {
    let inbox = Arc::new(LockedCommandBuffer::new());
    let feed = CommandFeed::new(Arc::clone(&inbox), Uuid::new_v4());
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let data = r#"{"commands": [
        {"_id": "4f4534de-3a53-44ae-ada5-b7a0b0636e13", "_command_type": "Control.Arm",
         "_part_id": "37155a2c-c51d-41b7-9dae-67d640d8c284", "state": "dispatched",
         "create_time": "2024-06-01T08:59:59Z"},
        {"_id": "not a uuid"}
    ]}"#;
    assert_eq!(feed.accept(data, now), 1);
    assert_eq!(feed.accept("garbage", now), 0);

    let queued = inbox.swap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].kind(), CommandKind::Arm);
    assert_eq!(queued[0].state(), CommandState::Received);
    assert_eq!(queued[0].receive_time(), Some(now));
}

#[tokio::test(start_paused = true)]
async fn test_handshake_retries_registration() {
    let server = ScriptedServer { register_failures: Mutex::new(2), ..ScriptedServer::default() };
    let rocket = Rocket::new(Uuid::from_u128(9), "Spatula", 0);
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let flight_id = run_setup_handshake(&server, &rocket, "Test flight", now).await.unwrap();
    assert_eq!(flight_id, Uuid::from_u128(42));

    let flights = server.flights.lock().unwrap();
    assert_eq!(flights.len(), 1);
    assert_eq!(flights[0].vessel_id, Uuid::from_u128(9));
    assert_eq!(flights[0].vessel_version, 7);
    assert_eq!(flights[0].name, "Test flight");
}

#[tokio::test(start_paused = true)]
async fn test_handshake_gives_up() {
    let server = ScriptedServer { register_failures: Mutex::new(10), ..ScriptedServer::default() };
    let rocket = Rocket::new(Uuid::from_u128(9), "Spatula", 0);
    let result = run_setup_handshake(&server, &rocket, "Test flight", Utc::now()).await;
    assert!(matches!(result, Err(ResponseError::NoConnection)));
    assert!(server.flights.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_uplink_targets_flight() {
    let server = Arc::new(ScriptedServer::default());
    let uplink = FlightDataUplink::new(server.clone());
    assert!(matches!(uplink.send(vec![9]).await, Err(ResponseError::BadRequest(_))));
    assert!(uplink.bind(Uuid::from_u128(5)));
    assert!(!uplink.bind(Uuid::from_u128(6)));
    uplink.send(vec![0, 1]).await.unwrap();
    assert_eq!(server.binary.lock().unwrap().as_slice(), &[(Uuid::from_u128(5), vec![0, 1])]);
}
