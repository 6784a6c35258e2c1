use super::readings::{AttitudeReading, OrientationSample};
use crate::command::{Command, CommandKind};
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, Part, PartError, PartMeta, field};
use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use tokio::sync::watch;

/// Reduces an orientation to "nose up" or "nose down".
pub struct AttitudeAnalyzer {
    meta: PartMeta,
    source: watch::Receiver<Option<OrientationSample>>,
    output: watch::Sender<AttitudeReading>,
}

impl AttitudeAnalyzer {
    const SHAPE: [MeasurementField; 1] = [field("pointing_up", FieldFormat::I8)];

    pub fn new(meta: PartMeta, source: watch::Receiver<Option<OrientationSample>>) -> Self {
        Self { meta: meta.virtual_part(), source, output: watch::Sender::new(AttitudeReading::default()) }
    }

    pub fn subscribe(&self) -> watch::Receiver<AttitudeReading> { self.output.subscribe() }

    pub fn analyze(sample: Option<OrientationSample>) -> AttitudeReading {
        let Some(sample) = sample else { return AttitudeReading::default() };
        let up = sample.orientation * Vector3::z();
        AttitudeReading { pointing_up: if up.z > 0.0 { 1 } else { -1 }, data_time: Some(sample.time) }
    }
}

impl Part for AttitudeAnalyzer {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { "Attitude Analyzer" }
    fn accepted_commands(&self) -> &'static [CommandKind] { &[CommandKind::Enable, CommandKind::Disable] }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        for c in commands.iter_mut() {
            self.meta.apply_toggle(c, now);
        }
        let reading = Self::analyze(*self.source.borrow_and_update());
        self.output.send_replace(reading);
        Ok(Vec::new())
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &Self::SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        Ok(vec![vec![i32::from(self.output.borrow().pointing_up).into()]])
    }
}
