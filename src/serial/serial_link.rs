use super::completion::LinkFailure;
use super::hdlc::{FrameCodec, HdlcCodec};
use super::serial_adapter::SerialAdapter;
use super::serial_command::SerialCommandTracker;
use crate::command::{Command, CommandKind};
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, Part, PartError, PartMeta, field};
use crate::{error, info, warn};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialPortType, StopBits};

/// Part owning the physical connection to the microcontroller.
///
/// While disconnected it rescans for a port every
/// [`SerialLink::PORT_SCAN_PERIOD`] and spawns the link task on the first
/// one found. Its update also drives the adapter's sweep and keep-alive.
pub struct SerialLink {
    meta: PartMeta,
    adapter: Arc<SerialAdapter>,
    port_path: Option<String>,
    baud: u32,
    link_task: Option<JoinHandle<()>>,
    last_scan: Option<DateTime<Utc>>,
    tracker: SerialCommandTracker,
}

impl SerialLink {
    pub const PART_ID: u8 = 0;
    pub const RESET_COMMAND: u8 = 0;
    pub const PORT_SCAN_PERIOD: TimeDelta = TimeDelta::milliseconds(2500);

    const SHAPE: [MeasurementField; 2] =
        [field("connected", FieldFormat::Bool), field("outstanding", FieldFormat::U32)];

    pub fn new(meta: PartMeta, adapter: Arc<SerialAdapter>, port_path: Option<String>, baud: u32) -> Self {
        Self {
            meta: meta.with_periods(TimeDelta::milliseconds(50), TimeDelta::seconds(1)),
            adapter,
            port_path,
            baud,
            link_task: None,
            last_scan: None,
            tracker: SerialCommandTracker::new(),
        }
    }

    pub fn adapter(&self) -> Arc<SerialAdapter> { Arc::clone(&self.adapter) }

    fn find_port(&self) -> Option<String> {
        if let Some(path) = &self.port_path {
            return Some(path.clone());
        }
        match tokio_serial::available_ports() {
            Ok(ports) => ports
                .into_iter()
                .find(|p| matches!(p.port_type, SerialPortType::UsbPort(_)))
                .map(|p| p.port_name),
            Err(e) => {
                warn!("Listing serial ports failed: {e}");
                None
            }
        }
    }

    fn maybe_connect(&mut self, now: DateTime<Utc>) -> Result<(), PartError> {
        if self.link_task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }
        if self.last_scan.is_some_and(|last| now - last < Self::PORT_SCAN_PERIOD) {
            return Ok(());
        }
        self.last_scan = Some(now);
        let Some(path) = self.find_port() else { return Ok(()) };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PartError::NotReady(format!("no async runtime: {e}")))?;
        info!("Opening serial port {path} at {} baud.", self.baud);
        let adapter = Arc::clone(&self.adapter);
        let baud = self.baud;
        self.link_task = Some(runtime.spawn(async move { run_link(adapter, path, baud).await }));
        Ok(())
    }
}

impl Part for SerialLink {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { "Arduino Serial" }

    fn accepted_commands(&self) -> &'static [CommandKind] {
        &[CommandKind::Enable, CommandKind::Disable, CommandKind::Reset]
    }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        for c in commands.iter_mut() {
            if self.meta.apply_toggle(c, now) {
                continue;
            }
            if c.kind() == CommandKind::Reset {
                self.tracker.drive(c, &self.adapter, Self::PART_ID, Self::RESET_COMMAND, now);
            }
        }
        self.adapter.periodic_update(now);
        if self.meta.is_enabled() && !self.adapter.is_connected() {
            self.maybe_connect(now)?;
        }
        Ok(Vec::new())
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &Self::SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        let outstanding = u32::try_from(self.adapter.outstanding()).unwrap_or(u32::MAX);
        Ok(vec![vec![self.adapter.is_connected().into(), outstanding.into()]])
    }
}

async fn run_link(adapter: Arc<SerialAdapter>, path: String, baud: u32) {
    let port = tokio_serial::new(&path, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async();
    let port = match port {
        Ok(port) => port,
        Err(e) => {
            warn!("Opening serial port {path} failed: {e}");
            return;
        }
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    adapter.attach(tx);
    let reason = drive_link(&adapter, port, &mut rx, HdlcCodec::new()).await;
    adapter.detach(reason);
}

/// Single owner of the byte stream: writes queued packets as frames and
/// feeds inbound frames to the adapter until the stream fails.
pub(crate) async fn drive_link<S, C>(
    adapter: &SerialAdapter,
    mut stream: S,
    outbound: &mut UnboundedReceiver<Vec<u8>>,
    mut codec: C,
) -> LinkFailure
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: FrameCodec,
{
    let mut buf = [0u8; 256];
    loop {
        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    warn!("Serial port closed.");
                    return LinkFailure::LostConnection;
                }
                Ok(n) => {
                    for frame in codec.feed(&buf[..n]) {
                        match frame {
                            Ok(payload) => {
                                if let Err(e) = adapter.on_frame(&payload, Utc::now()) {
                                    error!("Protocol violation on serial link: {e}");
                                    return LinkFailure::LostConnection;
                                }
                            }
                            Err(e) => warn!("Dropping serial frame: {e}"),
                        }
                    }
                }
                Err(e) => {
                    warn!("Reading serial port failed: {e}");
                    return LinkFailure::LostConnection;
                }
            },
            packet = outbound.recv() => {
                let Some(packet) = packet else { return LinkFailure::LostConnection };
                if let Err(e) = stream.write_all(&codec.encode(&packet)).await {
                    warn!("Writing serial port failed: {e}");
                    return LinkFailure::LostConnection;
                }
            }
        }
    }
}
