use super::{Part, PartMeta, Rocket, RocketError};
use crate::config::FlightConfig;
use crate::devices::{
    ActuatorKind, AttitudeAnalyzer, ImuInputs, InertialReferenceFrame, OrientationSensor, PeriodicTester,
    PressureSensor, SerialActuator, VectorSensor, VectorSensorKind,
};
use crate::flight_director::{DirectorLinks, FlightDirector};
use crate::measurement_sink::{ApiMeasurementSink, TelemetryUplink};
use crate::serial::{SerialAdapter, SerialLink};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::{Uuid, uuid};

pub const VESSEL_ID: Uuid = uuid!("e4b3a7c1-52d6-4f0e-9a38-6c1d0f2b7a95");

const MEASUREMENT_SINK: Uuid = uuid!("fa9eac88-5d2f-41a6-aeab-85c1591433a2");
const ACCELEROMETER: Uuid = uuid!("d91eed66-d699-4816-892d-3e99282966ab");
const GYROSCOPE: Uuid = uuid!("5159e64a-0f55-4a8c-8d24-596a0118e0be");
const INERTIAL_FRAME: Uuid = uuid!("27f5d5e0-5fa9-4ae1-88af-8477d80960d7");
const SERIAL_PORT: Uuid = uuid!("cd170fff-0138-4820-8e97-969eb3f2f287");
const SERVO: Uuid = uuid!("9f86acb1-9795-46fc-b083-e6451f214d1f");
const IGNITER: Uuid = uuid!("f309669d-6bd7-4ee3-90a5-45a0e1bdd60e");
const ORIENTATION: Uuid = uuid!("158314cc-6d1f-11ee-b962-0242ac120002");
const PRESSURE: Uuid = uuid!("6277bf09-36ba-4e41-861f-df6169d83f5f");
const ATTITUDE_SMARTPHONE: Uuid = uuid!("cc53cfb9-05bd-4ca7-bba5-202039636b48");
const ATTITUDE_EXTERNAL: Uuid = uuid!("b0a3acb6-9374-482f-a1c4-4411c995a13e");
const FLIGHT_DIRECTOR: Uuid = uuid!("37155a2c-c51d-41b7-9dae-67d640d8c284");
const PERIODIC_TESTER: Uuid = uuid!("4f4534de-3a53-44ae-ada5-b7a0b0636e13");

/// The assembled rocket plus the handles living outside the part graph.
pub struct Spatula {
    pub rocket: Rocket,
    pub adapter: Arc<SerialAdapter>,
    pub imu: ImuInputs,
}

/// Builds the Spatula rocket. Part ids are fixed so the server keeps one
/// history per part across restarts.
///
/// # Errors
/// Only fails if the part graph below is inconsistent.
pub fn make_spatula(config: &FlightConfig, uplink: Arc<dyn TelemetryUplink>) -> Result<Spatula, RocketError> {
    let mut rocket = Rocket::new(VESSEL_ID, &config.vessel_name, 0);
    let adapter = Arc::new(SerialAdapter::new());
    let (accelerometer, acc_input) = watch::channel(None);
    let (gyroscope, gyro_input) = watch::channel(None);

    rocket.add_part(Box::new(ApiMeasurementSink::new(
        PartMeta::new(MEASUREMENT_SINK, "Measurement dispatch"),
        uplink,
    )))?;

    let acc = VectorSensor::new(PartMeta::new(ACCELEROMETER, "Accelerometer"), VectorSensorKind::Accelerometer, acc_input);
    let gyro = VectorSensor::new(PartMeta::new(GYROSCOPE, "Gyroscope"), VectorSensorKind::Gyroscope, gyro_input);
    let inertial = InertialReferenceFrame::new(
        PartMeta::new(INERTIAL_FRAME, "Inertial Reference Frame").with_dependencies(&[ACCELEROMETER, GYROSCOPE]),
        acc.subscribe(),
        gyro.subscribe(),
    );
    let smartphone = AttitudeAnalyzer::new(
        PartMeta::new(ATTITUDE_SMARTPHONE, "Attitude Analyzer Smartphone").with_dependencies(&[INERTIAL_FRAME]),
        inertial.subscribe(),
    );
    rocket.add_part(Box::new(acc))?;
    rocket.add_part(Box::new(gyro))?;
    rocket.add_part(Box::new(inertial))?;

    rocket.add_part(Box::new(SerialLink::new(
        PartMeta::new(SERIAL_PORT, "Serial Port"),
        Arc::clone(&adapter),
        config.serial_port.clone(),
        config.serial_baud,
    )))?;
    let on_link = |id: Uuid, name: &str| PartMeta::new(id, name).with_parent(SERIAL_PORT).with_dependencies(&[SERIAL_PORT]);
    rocket.add_part(Box::new(SerialActuator::new(on_link(SERVO, "Servo"), ActuatorKind::Parachute, Arc::clone(&adapter))))?;
    rocket.add_part(Box::new(SerialActuator::new(on_link(IGNITER, "Igniter"), ActuatorKind::Igniter, Arc::clone(&adapter))))?;
    let orientation = OrientationSensor::new(on_link(ORIENTATION, "Orientation"), &adapter);
    let external = AttitudeAnalyzer::new(
        PartMeta::new(ATTITUDE_EXTERNAL, "Attitude Analyzer External").with_dependencies(&[ORIENTATION]),
        orientation.subscribe(),
    );
    rocket.add_part(Box::new(orientation))?;
    rocket.add_part(Box::new(PressureSensor::new(on_link(PRESSURE, "Pressure"), &adapter)))?;

    let links = DirectorLinks {
        accelerometer: ACCELEROMETER,
        gyroscope: GYROSCOPE,
        orientation: ORIENTATION,
        inertial_frame: INERTIAL_FRAME,
        igniter: IGNITER,
        parachute: SERVO,
        serial_link: SERIAL_PORT,
        attitude_smartphone: ATTITUDE_SMARTPHONE,
        attitude_external: ATTITUDE_EXTERNAL,
    };
    let director = FlightDirector::new(
        PartMeta::new(FLIGHT_DIRECTOR, "Flight Director"),
        links,
        Arc::clone(&adapter),
        external.subscribe(),
        smartphone.subscribe(),
        config,
    );
    rocket.add_part(Box::new(smartphone))?;
    rocket.add_part(Box::new(external))?;
    rocket.add_part(Box::new(director))?;

    let mut tester = PeriodicTester::new(PartMeta::new(PERIODIC_TESTER, "Periodic HW tester"), IGNITER, SERVO);
    tester.meta_mut().set_enabled(config.hardware_test);
    rocket.add_part(Box::new(tester))?;

    Ok(Spatula { rocket, adapter, imu: ImuInputs::new(accelerometer, gyroscope) })
}
