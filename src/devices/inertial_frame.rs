use super::readings::{OrientationSample, VectorReading};
use crate::command::{Command, CommandKind};
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, Part, PartError, PartMeta, field};
use chrono::{DateTime, Utc};
use nalgebra::{UnitQuaternion, Vector3};
use tokio::sync::watch;

/// Dead-reckoned device orientation from the smartphone IMU.
///
/// Calibration aligns the accelerometer's rest vector with world up, after
/// that every new gyroscope sample is integrated into the orientation.
pub struct InertialReferenceFrame {
    meta: PartMeta,
    accelerometer: watch::Receiver<Option<VectorReading>>,
    gyroscope: watch::Receiver<Option<VectorReading>>,
    orientation: Option<UnitQuaternion<f64>>,
    last_gyro: Option<DateTime<Utc>>,
    output: watch::Sender<Option<OrientationSample>>,
    unread: Vec<UnitQuaternion<f64>>,
}

impl InertialReferenceFrame {
    const SHAPE: [MeasurementField; 4] = [
        field("w", FieldFormat::F32),
        field("x", FieldFormat::F32),
        field("y", FieldFormat::F32),
        field("z", FieldFormat::F32),
    ];

    pub fn new(
        meta: PartMeta,
        accelerometer: watch::Receiver<Option<VectorReading>>,
        gyroscope: watch::Receiver<Option<VectorReading>>,
    ) -> Self {
        Self {
            meta: meta.virtual_part(),
            accelerometer,
            gyroscope,
            orientation: None,
            last_gyro: None,
            output: watch::Sender::new(None),
            unread: Vec::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<OrientationSample>> { self.output.subscribe() }

    /// Rotation that maps the measured rest vector onto world up.
    fn initial_orientation(rest: &Vector3<f64>) -> UnitQuaternion<f64> {
        UnitQuaternion::rotation_between(rest, &Vector3::z())
            .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI))
    }

    fn calibrate(&mut self, c: &mut Command, now: DateTime<Utc>) {
        let acc_rest = self.accelerometer.borrow().and_then(|r| r.rest);
        let gyro = *self.gyroscope.borrow();
        let Some(rest) = acc_rest.filter(|r| r.norm() > f64::EPSILON) else {
            c.fail("Accelerometer not calibrated", now);
            return;
        };
        if gyro.and_then(|g| g.rest).is_none() {
            c.fail("Gyroscope not calibrated", now);
            return;
        }
        self.orientation = Some(Self::initial_orientation(&rest));
        self.last_gyro = gyro.map(|g| g.time);
        c.succeed(now);
    }
}

impl Part for InertialReferenceFrame {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { "Inertial Reference Frame" }

    fn accepted_commands(&self) -> &'static [CommandKind] {
        &[CommandKind::Enable, CommandKind::Disable, CommandKind::Calibrate]
    }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        for c in commands.iter_mut() {
            if !self.meta.apply_toggle(c, now) && c.kind() == CommandKind::Calibrate && c.is_fresh() {
                self.calibrate(c, now);
            }
        }

        let Some(mut orientation) = self.orientation else { return Ok(Vec::new()) };
        let gyro = *self.gyroscope.borrow_and_update();
        if let Some(sample) = gyro.filter(|g| self.last_gyro.is_some_and(|t| g.time > t)) {
            let elapsed = sample.time - self.last_gyro.unwrap_or(sample.time);
            let dt = elapsed.num_microseconds().unwrap_or_default() as f64 / 1e6;
            orientation *= UnitQuaternion::from_scaled_axis(sample.value * dt);
            orientation.renormalize_fast();
            self.orientation = Some(orientation);
            self.last_gyro = Some(sample.time);
            self.unread.push(orientation);
            self.output.send_replace(Some(OrientationSample { orientation, time: sample.time }));
        }
        Ok(Vec::new())
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &Self::SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        Ok(std::mem::take(&mut self.unread)
            .into_iter()
            .map(|q| vec![q.w.into(), q.i.into(), q.j.into(), q.k.into()])
            .collect())
    }
}
