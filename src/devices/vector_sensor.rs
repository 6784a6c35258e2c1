use super::readings::VectorReading;
use crate::command::{Command, CommandKind, CommandState};
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, Part, PartError, PartMeta, field};
use chrono::{DateTime, TimeDelta, Utc};
use nalgebra::Vector3;
use tokio::sync::watch;
use uuid::Uuid;

/// Raw three-axis sample as published by a platform driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawVectorSample {
    pub value: Vector3<f64>,
    pub time: DateTime<Utc>,
}

/// Where platform drivers hand smartphone IMU samples to the rocket. The
/// accelerometer and gyroscope parts pick up the latest sample on each update.
pub struct ImuInputs {
    accelerometer: watch::Sender<Option<RawVectorSample>>,
    gyroscope: watch::Sender<Option<RawVectorSample>>,
}

impl ImuInputs {
    pub fn new(
        accelerometer: watch::Sender<Option<RawVectorSample>>,
        gyroscope: watch::Sender<Option<RawVectorSample>>,
    ) -> Self {
        Self { accelerometer, gyroscope }
    }

    /// Specific force in m/s², device frame.
    pub fn publish_acceleration(&self, value: Vector3<f64>, time: DateTime<Utc>) {
        self.accelerometer.send_replace(Some(RawVectorSample { value, time }));
    }

    /// Angular rate in rad/s, device frame.
    pub fn publish_rotation(&self, value: Vector3<f64>, time: DateTime<Utc>) {
        self.gyroscope.send_replace(Some(RawVectorSample { value, time }));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSensorKind {
    Accelerometer,
    Gyroscope,
}

struct CalibrationRun {
    command: Uuid,
    started: DateTime<Utc>,
    sum: Vector3<f64>,
    count: u32,
}

/// Accelerometer or gyroscope fed by a driver through a `watch` channel.
///
/// `Calibrate.Zero` averages [`VectorSensor::CALIBRATION_WINDOW`] of samples
/// taken at rest. The gyroscope subtracts that mean as bias, the
/// accelerometer keeps it as its gravity reference.
pub struct VectorSensor {
    meta: PartMeta,
    kind: VectorSensorKind,
    input: watch::Receiver<Option<RawVectorSample>>,
    output: watch::Sender<Option<VectorReading>>,
    rest: Option<Vector3<f64>>,
    last_seen: Option<DateTime<Utc>>,
    unread: Vec<VectorReading>,
    calibration: Option<CalibrationRun>,
}

impl VectorSensor {
    pub const CALIBRATION_WINDOW: TimeDelta = TimeDelta::seconds(1);

    const SHAPE: [MeasurementField; 3] =
        [field("x", FieldFormat::F32), field("y", FieldFormat::F32), field("z", FieldFormat::F32)];

    pub fn new(meta: PartMeta, kind: VectorSensorKind, input: watch::Receiver<Option<RawVectorSample>>) -> Self {
        Self {
            meta,
            kind,
            input,
            output: watch::Sender::new(None),
            rest: None,
            last_seen: None,
            unread: Vec::new(),
            calibration: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<VectorReading>> { self.output.subscribe() }

    fn bias(&self) -> Vector3<f64> {
        match (self.kind, self.rest) {
            (VectorSensorKind::Gyroscope, Some(rest)) => rest,
            _ => Vector3::zeros(),
        }
    }

    fn handle_calibration(&mut self, c: &mut Command, now: DateTime<Utc>) {
        if c.is_fresh() {
            if let Some(run) = &self.calibration {
                c.fail(format!("Calibration {} still running", run.command), now);
                return;
            }
            c.start_processing();
            self.calibration = Some(CalibrationRun { command: c.id(), started: now, sum: Vector3::zeros(), count: 0 });
            return;
        }
        if c.state() != CommandState::Processing {
            return;
        }
        let Some(run) = self.calibration.as_ref().filter(|r| r.command == c.id()) else {
            c.fail("Calibration was superseded", now);
            return;
        };
        if now - run.started < Self::CALIBRATION_WINDOW {
            return;
        }
        let (sum, count) = (run.sum, run.count);
        self.calibration = None;
        if count == 0 {
            c.fail("No samples received during calibration", now);
        } else {
            let rest = sum / f64::from(count);
            self.rest = Some(rest);
            // the inertial frame reads the rest vector off the latest reading
            self.output.send_modify(|reading| {
                if let Some(reading) = reading.as_mut() {
                    reading.rest = Some(rest);
                }
            });
            c.succeed(now);
        }
    }
}

impl Part for VectorSensor {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }

    fn part_type(&self) -> &'static str {
        match self.kind {
            VectorSensorKind::Accelerometer => "Accelerometer",
            VectorSensorKind::Gyroscope => "Gyroscope",
        }
    }

    fn accepted_commands(&self) -> &'static [CommandKind] {
        &[CommandKind::Enable, CommandKind::Disable, CommandKind::Calibrate]
    }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        let sample = *self.input.borrow_and_update();
        if let Some(sample) = sample.filter(|s| self.last_seen.is_none_or(|t| s.time > t)) {
            self.last_seen = Some(sample.time);
            if let Some(run) = self.calibration.as_mut() {
                run.sum += sample.value;
                run.count += 1;
            }
            let reading = VectorReading { value: sample.value - self.bias(), time: sample.time, rest: self.rest };
            if self.meta.is_enabled() {
                self.unread.push(reading);
            }
            self.output.send_replace(Some(reading));
        }
        for c in commands.iter_mut() {
            if !self.meta.apply_toggle(c, now) && c.kind() == CommandKind::Calibrate {
                self.handle_calibration(c, now);
            }
        }
        Ok(Vec::new())
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &Self::SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        Ok(std::mem::take(&mut self.unread)
            .into_iter()
            .map(|r| vec![r.value.x.into(), r.value.y.into(), r.value.z.into()])
            .collect())
    }
}
