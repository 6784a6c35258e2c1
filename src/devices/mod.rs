mod attitude_analyzer;
mod inertial_frame;
mod orientation_sensor;
mod periodic_tester;
mod pressure_sensor;
mod readings;
mod serial_actuator;
mod vector_sensor;


pub use attitude_analyzer::AttitudeAnalyzer;
pub use inertial_frame::InertialReferenceFrame;
pub use orientation_sensor::OrientationSensor;
pub use periodic_tester::PeriodicTester;
pub use pressure_sensor::{PressureReading, PressureSensor};
pub use readings::{AttitudeReading, OrientationSample, VectorReading};
pub use serial_actuator::{ActuatorKind, SerialActuator};
pub use vector_sensor::{ImuInputs, RawVectorSample, VectorSensor, VectorSensorKind};
