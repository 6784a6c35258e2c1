pub(crate) mod flight_create;
pub(crate) mod response_common;
pub(crate) mod vessel_register;
