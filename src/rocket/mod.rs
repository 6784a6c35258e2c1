mod execution;
mod part;
#[allow(clippy::module_inception)]
mod rocket;
pub mod spatula;
mod vessel;

#[cfg(test)]
mod tests;

pub use execution::topological_order;
pub use part::{
    FieldFormat, MeasurementField, MeasurementRow, MeasurementValue, Part, PartError, PartIndex,
    PartMeta, field,
};
pub use rocket::{Rocket, RocketError};
pub use vessel::{CommandInfo, FlightDescriptor, FlightMeasurementDescriptor, VesselDescriptor};
