use super::flight_create::FlightCreateResponse;
use super::request_common::{HTTPRequestMethod, HTTPRequestType, JSONBodyHTTPRequestType};
use crate::rocket::FlightDescriptor;

/// Request type for the /flight/create endpoint.
#[derive(Debug)]
pub(crate) struct FlightCreateRequest<'a> {
    pub(crate) flight: &'a FlightDescriptor,
}

impl JSONBodyHTTPRequestType for FlightCreateRequest<'_> {
    type Body = FlightDescriptor;
    fn body(&self) -> &Self::Body { self.flight }
}

impl HTTPRequestType for FlightCreateRequest<'_> {
    type Response = FlightCreateResponse;
    fn endpoint(&self) -> String { String::from("/flight/create") }
    fn request_method(&self) -> HTTPRequestMethod { HTTPRequestMethod::Post }
}
