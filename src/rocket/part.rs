use crate::command::{Command, CommandKind};
use crate::measurement_sink::MeasurementBuffer;
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Dense, registration-ordered index of a part inside its [`super::Rocket`].
/// It doubles as the one-byte part identifier in telemetry batches.
pub type PartIndex = usize;

/// Packing of one measurement field, written in network byte order.
///
/// [`FieldFormat::descriptor`] yields the struct-style format character the
/// server uses to decode the binary batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Fixed-width byte string, zero padded or truncated.
    Str(usize),
}

impl FieldFormat {
    pub fn descriptor(self) -> String {
        match self {
            FieldFormat::Bool => "?".into(),
            FieldFormat::U8 => "B".into(),
            FieldFormat::I8 => "b".into(),
            FieldFormat::U16 => "H".into(),
            FieldFormat::I16 => "h".into(),
            FieldFormat::U32 => "I".into(),
            FieldFormat::I32 => "i".into(),
            FieldFormat::U64 => "Q".into(),
            FieldFormat::I64 => "q".into(),
            FieldFormat::F32 => "f".into(),
            FieldFormat::F64 => "d".into(),
            FieldFormat::Str(len) => format!("{len}s"),
        }
    }

    /// Encoded width in bytes.
    pub fn width(self) -> usize {
        match self {
            FieldFormat::Bool | FieldFormat::U8 | FieldFormat::I8 => 1,
            FieldFormat::U16 | FieldFormat::I16 => 2,
            FieldFormat::U32 | FieldFormat::I32 | FieldFormat::F32 => 4,
            FieldFormat::U64 | FieldFormat::I64 | FieldFormat::F64 => 8,
            FieldFormat::Str(len) => len,
        }
    }
}

/// One named column of a part's measurement shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementField {
    pub name: &'static str,
    pub format: FieldFormat,
}

pub const fn field(name: &'static str, format: FieldFormat) -> MeasurementField {
    MeasurementField { name, format }
}

/// A typed scalar inside a measurement row.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for MeasurementValue {
    fn from(value: bool) -> Self { MeasurementValue::Bool(value) }
}
impl From<i64> for MeasurementValue {
    fn from(value: i64) -> Self { MeasurementValue::Int(value) }
}
impl From<i32> for MeasurementValue {
    fn from(value: i32) -> Self { MeasurementValue::Int(i64::from(value)) }
}
impl From<u32> for MeasurementValue {
    fn from(value: u32) -> Self { MeasurementValue::Int(i64::from(value)) }
}
impl From<f32> for MeasurementValue {
    fn from(value: f32) -> Self { MeasurementValue::Float(f64::from(value)) }
}
impl From<f64> for MeasurementValue {
    fn from(value: f64) -> Self { MeasurementValue::Float(value) }
}
impl From<&str> for MeasurementValue {
    fn from(value: &str) -> Self { MeasurementValue::Text(value.to_owned()) }
}
impl From<String> for MeasurementValue {
    fn from(value: String) -> Self { MeasurementValue::Text(value) }
}

pub type MeasurementRow = Vec<MeasurementValue>;

/// Failure of a single part call. The scheduler logs it and retries the
/// part on its next eligible tick.
#[derive(Debug)]
pub enum PartError {
    /// Required input (sensor sample, link) is not available yet.
    NotReady(String),
    /// The hardware behind the part misbehaved.
    Device(String),
    /// Anything else.
    Internal(String),
}

impl fmt::Display for PartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartError::NotReady(msg) => write!(f, "not ready: {msg}"),
            PartError::Device(msg) => write!(f, "device error: {msg}"),
            PartError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PartError {}

/// Identity and scheduling bookkeeping shared by every part.
#[derive(Debug, Clone)]
pub struct PartMeta {
    id: Uuid,
    name: String,
    parent: Option<Uuid>,
    virtual_part: bool,
    enabled: bool,
    min_update_period: TimeDelta,
    min_measurement_period: TimeDelta,
    dependencies: Vec<Uuid>,
    last_update: Option<DateTime<Utc>>,
    last_measurement: Option<DateTime<Utc>>,
}

impl PartMeta {
    pub const DEFAULT_UPDATE_PERIOD: TimeDelta = TimeDelta::milliseconds(100);

    pub fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            parent: None,
            virtual_part: false,
            enabled: true,
            min_update_period: Self::DEFAULT_UPDATE_PERIOD,
            min_measurement_period: Self::DEFAULT_UPDATE_PERIOD,
            dependencies: Vec::new(),
            last_update: None,
            last_measurement: None,
        }
    }

    /// Marks the part as software-only (no physical counterpart).
    pub fn virtual_part(mut self) -> Self {
        self.virtual_part = true;
        self
    }

    pub fn with_parent(mut self, parent: Uuid) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_periods(mut self, update: TimeDelta, measurement: TimeDelta) -> Self {
        self.min_update_period = update;
        self.min_measurement_period = measurement;
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[Uuid]) -> Self {
        self.dependencies = dependencies.to_vec();
        self
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn parent(&self) -> Option<Uuid> { self.parent }
    pub fn is_virtual(&self) -> bool { self.virtual_part }
    pub fn is_enabled(&self) -> bool { self.enabled }
    pub fn dependencies(&self) -> &[Uuid] { &self.dependencies }
    pub fn min_update_period(&self) -> TimeDelta { self.min_update_period }
    pub fn min_measurement_period(&self) -> TimeDelta { self.min_measurement_period }
    pub fn last_update(&self) -> Option<DateTime<Utc>> { self.last_update }
    pub fn last_measurement(&self) -> Option<DateTime<Utc>> { self.last_measurement }

    pub fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }

    pub(crate) fn set_last_update(&mut self, now: DateTime<Utc>) { self.last_update = Some(now); }

    pub(crate) fn set_last_measurement(&mut self, now: DateTime<Utc>) {
        self.last_measurement = Some(now);
    }

    pub fn update_due(&self, now: DateTime<Utc>) -> bool {
        self.last_update.is_none_or(|last| now - last >= self.min_update_period)
    }

    pub fn measurement_due(&self, now: DateTime<Utc>) -> bool {
        self.last_measurement.is_none_or(|last| now - last >= self.min_measurement_period)
    }

    /// Resolves `Control.Enable` / `Control.Disable`. Returns `true` if the
    /// command was one of them and has been completed.
    pub fn apply_toggle(&mut self, command: &mut Command, now: DateTime<Utc>) -> bool {
        match command.kind() {
            CommandKind::Enable => {
                self.enabled = true;
                command.succeed(now);
                true
            }
            CommandKind::Disable => {
                self.enabled = false;
                command.succeed(now);
                true
            }
            _ => false,
        }
    }
}

/// Schedulable unit of the rocket: sensor, actuator, analyzer, director or
/// sink.
///
/// Parts are only ever touched by the control loop, one at a time and in
/// dependency order. Anything shared with I/O tasks lives behind `Arc`s the
/// part owns.
pub trait Part: Send {
    fn meta(&self) -> &PartMeta;
    fn meta_mut(&mut self) -> &mut PartMeta;

    /// Type tag reported in the vessel descriptor.
    fn part_type(&self) -> &'static str;

    /// Command kinds this part resolves. Queried once when the executor is
    /// built.
    fn accepted_commands(&self) -> &'static [CommandKind] { &[] }

    /// Advances the part by one tick. `commands` are the commands routed to
    /// this part, the returned ones are routed by their own target.
    ///
    /// # Errors
    /// Returns a [`PartError`] if the tick could not be completed. The
    /// executor logs it and retries on the next eligible tick.
    fn update(
        &mut self,
        commands: &mut [Command],
        now: DateTime<Utc>,
        iteration: u64,
    ) -> Result<Vec<Command>, PartError>;

    fn measurement_shape(&self) -> &'static [MeasurementField] { &[] }

    /// Rows gathered since the previous collection.
    ///
    /// # Errors
    /// Returns a [`PartError`] if the part could not sample its source.
    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        Ok(Vec::new())
    }

    /// Releases per-tick scratch state.
    fn flush(&mut self) {}

    /// Called once a command this part emitted reached a terminal state.
    fn on_command_finished(&mut self, _command: &Command) {}

    /// Sinks expose the buffer the executor feeds every tick's measurements into.
    fn measurement_buffer(&self) -> Option<Arc<MeasurementBuffer>> { None }
}
