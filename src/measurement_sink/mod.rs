mod api_measurement_sink;
pub mod binary_batch;
mod measurement_buffer;

#[cfg(test)]
mod tests;

pub use api_measurement_sink::{ApiMeasurementSink, SinkCore, SinkStatus, TelemetryUplink};
pub use measurement_buffer::{MeasurementBuffer, MeasurementsByPart, PartMeasurements};
