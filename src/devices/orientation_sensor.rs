use super::readings::OrientationSample;
use crate::command::{Command, CommandKind};
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, Part, PartError, PartMeta, field};
use crate::serial::{SensorDataPacket, SerialAdapter};
use crate::warn;
use chrono::{DateTime, TimeDelta, Utc};
use nalgebra::{Quaternion, UnitQuaternion};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

#[derive(Default)]
struct Inbox {
    latest: Option<OrientationSample>,
    unread: Vec<OrientationSample>,
}

/// External orientation board on the microcontroller.
///
/// Payload is four little-endian `f32` forming the quaternion `w, x, y, z`.
/// `Calibrate.Zero` stores the current attitude as reference, published
/// orientations are relative to it.
pub struct OrientationSensor {
    meta: PartMeta,
    inbox: Arc<Mutex<Inbox>>,
    reference: UnitQuaternion<f64>,
    output: watch::Sender<Option<OrientationSample>>,
}

impl OrientationSensor {
    pub const DATA_PART: u8 = 12;
    pub const MAX_SAMPLE_AGE: TimeDelta = TimeDelta::seconds(3);

    const SHAPE: [MeasurementField; 4] = [
        field("w", FieldFormat::F32),
        field("x", FieldFormat::F32),
        field("y", FieldFormat::F32),
        field("z", FieldFormat::F32),
    ];

    pub fn new(meta: PartMeta, adapter: &SerialAdapter) -> Self {
        let inbox = Arc::new(Mutex::new(Inbox::default()));
        let sink = Arc::clone(&inbox);
        adapter.register_data_callback(
            Self::DATA_PART,
            Box::new(move |packet: &SensorDataPacket, now| match decode_quaternion(&packet.payload) {
                Some(orientation) => {
                    let sample = OrientationSample { orientation, time: now };
                    let mut inbox = sink.lock().unwrap_or_else(PoisonError::into_inner);
                    inbox.latest = Some(sample);
                    inbox.unread.push(sample);
                }
                None => warn!("Orientation packet with {} bytes payload ignored.", packet.payload.len()),
            }),
        );
        Self { meta, inbox, reference: UnitQuaternion::identity(), output: watch::Sender::new(None) }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<OrientationSample>> { self.output.subscribe() }

    fn relative(&self, sample: OrientationSample) -> OrientationSample {
        OrientationSample { orientation: self.reference.inverse() * sample.orientation, time: sample.time }
    }
}

fn decode_quaternion(payload: &[u8]) -> Option<UnitQuaternion<f64>> {
    let mut parts = [0f64; 4];
    for (i, part) in parts.iter_mut().enumerate() {
        *part = f64::from(f32::from_le_bytes(payload.get(i * 4..i * 4 + 4)?.try_into().ok()?));
    }
    let q = Quaternion::new(parts[0], parts[1], parts[2], parts[3]);
    (q.norm() > f64::EPSILON).then(|| UnitQuaternion::from_quaternion(q))
}

impl Part for OrientationSensor {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { "Orientation" }

    fn accepted_commands(&self) -> &'static [CommandKind] {
        &[CommandKind::Enable, CommandKind::Disable, CommandKind::Calibrate]
    }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        let latest = self.inbox.lock().unwrap_or_else(PoisonError::into_inner).latest;
        for c in commands.iter_mut() {
            if self.meta.apply_toggle(c, now) || c.kind() != CommandKind::Calibrate {
                continue;
            }
            match latest {
                Some(sample) if now - sample.time < Self::MAX_SAMPLE_AGE => {
                    self.reference = sample.orientation;
                    c.succeed(now);
                }
                _ => {
                    c.fail("No recent orientation data", now);
                }
            }
        }
        if let Some(sample) = latest {
            let relative = self.relative(sample);
            self.output.send_if_modified(|current| {
                let changed = *current != Some(relative);
                *current = Some(relative);
                changed
            });
        }
        Ok(Vec::new())
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &Self::SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        let unread = std::mem::take(&mut self.inbox.lock().unwrap_or_else(PoisonError::into_inner).unread);
        Ok(unread
            .into_iter()
            .map(|s| {
                let q = self.relative(s).orientation;
                vec![q.w.into(), q.i.into(), q.j.into(), q.k.into()]
            })
            .collect())
    }
}
