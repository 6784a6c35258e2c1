use crate::rocket::{MeasurementField, MeasurementRow, PartIndex};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Rows one part produced during one tick, collected over `[start, end]`.
#[derive(Debug, Clone)]
pub struct PartMeasurements {
    pub part: PartIndex,
    pub shape: &'static [MeasurementField],
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub rows: Vec<MeasurementRow>,
}

/// Everything measured during one tick.
pub type MeasurementsByPart = Vec<PartMeasurements>;

/// Accumulation buffer between the control loop and a sink.
///
/// The control loop only appends, the sink swaps the whole content out.
/// Ticks are shared behind `Arc` so several sinks can hold the same data.
#[derive(Debug, Default)]
pub struct MeasurementBuffer {
    ticks: Mutex<Vec<Arc<MeasurementsByPart>>>,
}

impl MeasurementBuffer {
    pub fn new() -> Self { Self::default() }

    fn lock_ticks(&self) -> std::sync::MutexGuard<'_, Vec<Arc<MeasurementsByPart>>> {
        self.ticks.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn push(&self, tick: Arc<MeasurementsByPart>) { self.lock_ticks().push(tick); }

    /// Takes everything accumulated so far.
    pub fn swap(&self) -> Vec<Arc<MeasurementsByPart>> { std::mem::take(&mut *self.lock_ticks()) }

    pub fn len(&self) -> usize { self.lock_ticks().len() }

    pub fn is_empty(&self) -> bool { self.lock_ticks().is_empty() }
}
