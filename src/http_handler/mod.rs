mod command_feed;
mod flight_server;
pub(crate) mod http_client;
pub(crate) mod http_request;
pub(crate) mod http_response;

#[cfg(test)]
mod tests;

pub use command_feed::CommandFeed;
pub use flight_server::{FlightDataUplink, FlightServer, HttpFlightServer, run_setup_handshake};
pub use http_response::response_common::ResponseError;
