use super::http_response::{flight_create, response_common, vessel_register};

pub(crate) mod command_confirm_post;
pub(crate) mod flight_create_post;
pub(crate) mod flight_data_binary_post;
pub(crate) mod request_common;
pub(crate) mod vessel_register_post;
