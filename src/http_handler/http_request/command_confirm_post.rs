use super::request_common::{HTTPRequestMethod, HTTPRequestType, JSONBodyHTTPRequestType};
use super::response_common::NoBodyResponse;
use crate::command::Command;
use uuid::Uuid;

/// Reports the final state of completed commands.
#[derive(Debug)]
pub(crate) struct CommandConfirmRequest<'a> {
    pub(crate) flight_id: Uuid,
    pub(crate) commands: &'a [Command],
}

impl JSONBodyHTTPRequestType for CommandConfirmRequest<'_> {
    type Body = [Command];
    fn body(&self) -> &Self::Body { self.commands }
}

impl HTTPRequestType for CommandConfirmRequest<'_> {
    type Response = NoBodyResponse;
    fn endpoint(&self) -> String { format!("/command/confirm/{}", self.flight_id) }
    fn request_method(&self) -> HTTPRequestMethod { HTTPRequestMethod::Post }
}
