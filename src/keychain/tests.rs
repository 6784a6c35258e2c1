use super::*;
use crate::devices::{VectorSensor, VectorSensorKind};
use crate::rocket::{Part, PartMeta};
use chrono::{TimeZone, Utc};
use nalgebra::Vector3;
use tokio::sync::watch;

#[test]
fn test_imu_samples_reach_sensor_parts() {
    let (accelerometer, acc_input) = watch::channel(None);
    let (gyroscope, gyro_input) = watch::channel(None);
    let mut acc = VectorSensor::new(PartMeta::new(Uuid::new_v4(), "acc"), VectorSensorKind::Accelerometer, acc_input);
    let mut gyro = VectorSensor::new(PartMeta::new(Uuid::new_v4(), "gyro"), VectorSensorKind::Gyroscope, gyro_input);
    let server = Arc::new(HttpFlightServer::new("http://localhost:8080").unwrap());
    let keychain = Keychain::new(server, Arc::new(SerialAdapter::new()), ImuInputs::new(accelerometer, gyroscope), Uuid::new_v4());

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let driver = keychain.clone();
    driver.imu().publish_acceleration(Vector3::new(0.1, 0.0, 9.8), now);
    driver.imu().publish_rotation(Vector3::new(0.0, 0.02, 0.0), now);
    acc.update(&mut [], now, 0).unwrap();
    gyro.update(&mut [], now, 0).unwrap();

    let reading = acc.subscribe().borrow().unwrap();
    assert_eq!(reading.value, Vector3::new(0.1, 0.0, 9.8));
    assert_eq!(reading.time, now);
    assert_eq!(gyro.subscribe().borrow().unwrap().value, Vector3::new(0.0, 0.02, 0.0));
}
