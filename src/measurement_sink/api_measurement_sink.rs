use super::binary_batch::{drop_rate, encode_batch};
use super::MeasurementBuffer;
use crate::command::{Command, CommandKind};
use crate::http_handler::ResponseError;
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, Part, PartError, PartMeta, field};
use crate::{event, warn};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Transport for encoded telemetry batches.
#[async_trait]
pub trait TelemetryUplink: Send + Sync {
    async fn send(&self, payload: Vec<u8>) -> Result<(), ResponseError>;
}

/// Outcome of the latest flush cycle, reported as the sink's own measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinkStatus {
    pub send_success: bool,
    pub last_send_duration: Duration,
    pub drop_rate: f64,
}

/// State shared between the sink part and its in-flight send task.
pub struct SinkCore {
    buffer: Arc<MeasurementBuffer>,
    uplink: Arc<dyn TelemetryUplink>,
    status: Mutex<SinkStatus>,
    new_status: Mutex<Option<SinkStatus>>,
}

impl SinkCore {
    pub fn new(buffer: Arc<MeasurementBuffer>, uplink: Arc<dyn TelemetryUplink>) -> Self {
        let initial = SinkStatus { send_success: true, last_send_duration: Duration::ZERO, drop_rate: 1.0 };
        Self { buffer, uplink, status: Mutex::new(initial), new_status: Mutex::new(None) }
    }

    pub fn status(&self) -> SinkStatus {
        *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn take_new_status(&self) -> Option<SinkStatus> {
        self.new_status.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take()
    }

    /// Drains the buffer, thins it according to the previous send duration
    /// and transmits it. Transport failures only feed the drop rate.
    pub async fn flush_cycle(&self) {
        let ticks = self.buffer.swap();
        let rate = drop_rate(self.status().last_send_duration, ApiMeasurementSink::TARGET_SEND_PERIOD);
        if ticks.is_empty() {
            return;
        }
        let payload = encode_batch(&ticks, rate);
        if payload.is_empty() {
            return;
        }

        let start = Instant::now();
        let result = tokio::time::timeout(ApiMeasurementSink::SEND_TIMEOUT, self.uplink.send(payload)).await;
        let (send_success, last_send_duration) = match result {
            Ok(Ok(())) => (true, start.elapsed()),
            Ok(Err(e)) => {
                warn!("Sending measurements failed: {e}");
                (false, ApiMeasurementSink::SEND_TIMEOUT)
            }
            Err(_) => {
                warn!("Sending measurements timed out after {:?}", ApiMeasurementSink::SEND_TIMEOUT);
                (false, ApiMeasurementSink::SEND_TIMEOUT)
            }
        };
        event!("Telemetry batch sent in {last_send_duration:?} at drop rate {rate:.2}");
        let status = SinkStatus { send_success, last_send_duration, drop_rate: rate };
        *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = status;
        *self.new_status.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(status);
    }
}

/// Sink part that forwards all measurements to the flight server.
pub struct ApiMeasurementSink {
    meta: PartMeta,
    core: Arc<SinkCore>,
    send_task: Option<JoinHandle<()>>,
}

impl ApiMeasurementSink {
    pub const TARGET_SEND_PERIOD: Duration = Duration::from_millis(500);
    pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

    const SHAPE: [MeasurementField; 3] = [
        field("send_success", FieldFormat::Bool),
        field("send_duration", FieldFormat::F32),
        field("drop_rate", FieldFormat::F32),
    ];

    pub fn new(meta: PartMeta, uplink: Arc<dyn TelemetryUplink>) -> Self {
        let period = TimeDelta::milliseconds(500);
        Self {
            meta: meta.virtual_part().with_periods(period, period),
            core: Arc::new(SinkCore::new(Arc::new(MeasurementBuffer::new()), uplink)),
            send_task: None,
        }
    }

    pub fn core(&self) -> Arc<SinkCore> { Arc::clone(&self.core) }
}

impl Part for ApiMeasurementSink {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { "Measurement Sink" }

    fn accepted_commands(&self) -> &'static [CommandKind] { &[CommandKind::Enable, CommandKind::Disable] }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        for c in commands.iter_mut() {
            self.meta.apply_toggle(c, now);
        }
        if !self.meta.is_enabled() {
            // keep memory bounded while nothing is sent
            self.core.buffer.swap();
            return Ok(Vec::new());
        }
        if self.send_task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(Vec::new());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PartError::NotReady(format!("no async runtime: {e}")))?;
        let core = Arc::clone(&self.core);
        self.send_task = Some(runtime.spawn(async move { core.flush_cycle().await }));
        Ok(Vec::new())
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &Self::SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        Ok(self
            .core
            .take_new_status()
            .map(|s| {
                vec![vec![
                    s.send_success.into(),
                    s.last_send_duration.as_secs_f64().into(),
                    s.drop_rate.into(),
                ]]
            })
            .unwrap_or_default())
    }

    fn measurement_buffer(&self) -> Option<Arc<MeasurementBuffer>> { Some(Arc::clone(&self.core.buffer)) }
}
