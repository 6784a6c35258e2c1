use super::request_common::{HTTPRequestMethod, HTTPRequestType, JSONBodyHTTPRequestType};
use super::vessel_register::VesselRegisterResponse;
use crate::rocket::VesselDescriptor;

/// Request type for the /vessel/register endpoint.
#[derive(Debug)]
pub(crate) struct VesselRegisterRequest<'a> {
    pub(crate) vessel: &'a VesselDescriptor,
}

impl JSONBodyHTTPRequestType for VesselRegisterRequest<'_> {
    type Body = VesselDescriptor;
    fn body(&self) -> &Self::Body { self.vessel }
}

impl HTTPRequestType for VesselRegisterRequest<'_> {
    type Response = VesselRegisterResponse;
    fn endpoint(&self) -> String { String::from("/vessel/register") }
    fn request_method(&self) -> HTTPRequestMethod { HTTPRequestMethod::Post }
}
