use crate::command::{Command, CommandKind};
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, Part, PartError, PartMeta, field};
use crate::serial::{SensorDataPacket, SerialAdapter};
use crate::warn;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureReading {
    pub pressure: f32,
    pub temperature: f32,
}

impl PressureReading {
    /// Two little-endian `f32`: pressure, then temperature.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let pressure = f32::from_le_bytes(payload.get(0..4)?.try_into().ok()?);
        let temperature = f32::from_le_bytes(payload.get(4..8)?.try_into().ok()?);
        Some(Self { pressure, temperature })
    }
}

/// Barometer on the microcontroller, pushed as sensor-data packets.
pub struct PressureSensor {
    meta: PartMeta,
    pending: Arc<Mutex<Vec<PressureReading>>>,
}

impl PressureSensor {
    pub const DATA_PART: u8 = 11;

    const SHAPE: [MeasurementField; 2] = [field("temperature", FieldFormat::F32), field("pressure", FieldFormat::F32)];

    pub fn new(meta: PartMeta, adapter: &SerialAdapter) -> Self {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pending);
        adapter.register_data_callback(
            Self::DATA_PART,
            Box::new(move |packet: &SensorDataPacket, _| match PressureReading::decode(&packet.payload) {
                Some(reading) => sink.lock().unwrap_or_else(PoisonError::into_inner).push(reading),
                None => warn!("Pressure packet with {} bytes payload ignored.", packet.payload.len()),
            }),
        );
        Self { meta, pending }
    }
}

impl Part for PressureSensor {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { "Pressure" }
    fn accepted_commands(&self) -> &'static [CommandKind] { &[CommandKind::Enable, CommandKind::Disable] }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        for c in commands.iter_mut() {
            self.meta.apply_toggle(c, now);
        }
        Ok(Vec::new())
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &Self::SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        let readings = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        if !self.meta.is_enabled() {
            return Ok(Vec::new());
        }
        Ok(readings.into_iter().map(|r| vec![r.temperature.into(), r.pressure.into()]).collect())
    }
}
