use super::completion::{CompletionHandle, CompletionResolver, HandleState, LinkFailure, completion_pair};
use super::packets::{CommandPacket, InboundPacket, PacketError, ResultCode, SensorDataPacket};
use crate::{event, info, warn};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::mpsc::UnboundedSender;

/// Receives sensor samples for one data part id, with their arrival time.
pub type DataCallback = Box<dyn Fn(&SensorDataPacket, DateTime<Utc>) + Send + Sync>;

struct Outstanding {
    part_id: u8,
    command_id: u8,
    resolver: CompletionResolver,
}

/// Request/response correlation in two generations. Everything still in
/// `previous` when the next sweep comes around has timed out.
struct Correlation {
    next_index: u8,
    current: HashMap<u8, Outstanding>,
    previous: HashMap<u8, Outstanding>,
    last_sweep: Option<DateTime<Utc>>,
    last_keep_alive: Option<DateTime<Utc>>,
    keep_alive: Option<CompletionHandle>,
}

impl Correlation {
    fn take_index(&mut self) -> u8 {
        let index = self.next_index;
        self.next_index = if index + 1 >= SerialAdapter::INDEX_MODULUS { 0 } else { index + 1 };
        index
    }

    fn remove(&mut self, index: u8) -> Option<Outstanding> {
        self.current.remove(&index).or_else(|| self.previous.remove(&index))
    }
}

/// Translates between typed part commands and the microcontroller's binary
/// protocol.
///
/// The adapter never touches the port itself. Outgoing packets go through a
/// channel to the single link task that owns the port, and that task feeds
/// every deframed inbound payload into [`SerialAdapter::on_frame`].
pub struct SerialAdapter {
    correlation: Mutex<Correlation>,
    outbound: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    data_callbacks: RwLock<HashMap<u8, DataCallback>>,
    connected: AtomicBool,
}

impl Default for SerialAdapter {
    fn default() -> Self { Self::new() }
}

impl SerialAdapter {
    /// Outstanding handles survive one to two of these before failing.
    pub const FUTURE_TIMEOUT: TimeDelta = TimeDelta::milliseconds(1500);
    pub const KEEP_ALIVE_INTERVAL: TimeDelta = TimeDelta::seconds(1);
    /// Message indices run from 0 to 254.
    pub const INDEX_MODULUS: u8 = 255;
    const KEEP_ALIVE_PART: u8 = 0;
    const KEEP_ALIVE_COMMAND: u8 = 1;

    pub fn new() -> Self {
        Self {
            correlation: Mutex::new(Correlation {
                next_index: 0,
                current: HashMap::new(),
                previous: HashMap::new(),
                last_sweep: None,
                last_keep_alive: None,
                keep_alive: None,
            }),
            outbound: Mutex::new(None),
            data_callbacks: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(false),
        }
    }

    fn lock_correlation(&self) -> MutexGuard<'_, Correlation> {
        self.correlation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outbound(&self) -> MutexGuard<'_, Option<UnboundedSender<Vec<u8>>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }

    /// Number of command packets still waiting for an answer.
    pub fn outstanding(&self) -> usize {
        let corr = self.lock_correlation();
        corr.current.len() + corr.previous.len()
    }

    /// Routes outgoing packets to a freshly opened link.
    pub fn attach(&self, outbound: UnboundedSender<Vec<u8>>) {
        *self.lock_outbound() = Some(outbound);
        self.connected.store(true, Ordering::Release);
        info!("Serial link attached.");
    }

    /// Tears the link down and fails every outstanding handle of both
    /// generations with `reason`.
    pub fn detach(&self, reason: LinkFailure) {
        self.lock_outbound().take();
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        let orphaned: Vec<Outstanding> = {
            let mut corr = self.lock_correlation();
            let mut all: Vec<Outstanding> = corr.current.drain().map(|(_, o)| o).collect();
            all.extend(corr.previous.drain().map(|(_, o)| o));
            all
        };
        if was_connected {
            warn!("Serial link detached ({reason}), failing {} outstanding commands.", orphaned.len());
        }
        for o in orphaned {
            o.resolver.fail(reason);
        }
    }

    /// Registers the decoder for sensor-data packets of `part_id`.
    pub fn register_data_callback(&self, part_id: u8, callback: DataCallback) {
        self.data_callbacks.write().unwrap_or_else(PoisonError::into_inner).insert(part_id, callback);
    }

    /// Sends one command packet and returns the handle its answer resolves.
    ///
    /// Never blocks. Without a link, or if the packet cannot be encoded, the
    /// returned handle is already failed.
    pub fn send_command(&self, part_id: u8, command_id: u8, payload: u8) -> CompletionHandle {
        let mut corr = self.lock_correlation();
        let index = corr.take_index();
        let packet = CommandPacket { part_id, index, command_id, payload };
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Refusing to send command packet: {e}");
                return CompletionHandle::failed(LinkFailure::Dropped);
            }
        };
        let outbound = self.lock_outbound();
        let Some(tx) = outbound.as_ref() else {
            return CompletionHandle::failed(LinkFailure::NotConnected);
        };
        if let Some(stale) = corr.remove(index) {
            event!("Message index {index} reused while part {} still waited.", stale.part_id);
            stale.resolver.fail(LinkFailure::Superseded);
        }
        if tx.send(bytes.to_vec()).is_err() {
            return CompletionHandle::failed(LinkFailure::LostConnection);
        }
        let (resolver, handle) = completion_pair();
        corr.current.insert(index, Outstanding { part_id, command_id, resolver });
        event!("Sent command {command_id} to part {part_id} as message {index}.");
        handle
    }

    /// Handles one deframed inbound payload.
    ///
    /// # Errors
    /// Only a command-class frame without response flag is reported, the
    /// read loop treats it as fatal. Other malformed packets are logged.
    pub fn on_frame(&self, payload: &[u8], now: DateTime<Utc>) -> Result<(), PacketError> {
        match InboundPacket::decode(payload) {
            Ok(InboundPacket::Response(resp)) => {
                let outstanding = self.lock_correlation().remove(resp.index);
                match outstanding {
                    Some(o) => {
                        if o.part_id != resp.part_id || o.command_id != resp.command_id {
                            warn!(
                                "Response {} echoes part {} command {} but part {} command {} was sent.",
                                resp.index, resp.part_id, resp.command_id, o.part_id, o.command_id
                            );
                        }
                        o.resolver.resolve(resp.result);
                    }
                    None => event!("Ignoring response for unknown message index {}.", resp.index),
                }
                Ok(())
            }
            Ok(InboundPacket::SensorData(data)) => {
                let callbacks = self.data_callbacks.read().unwrap_or_else(PoisonError::into_inner);
                match callbacks.get(&data.part_id) {
                    Some(cb) => cb(&data, now),
                    None => event!("No decoder for sensor data of part {}.", data.part_id),
                }
                Ok(())
            }
            Err(e @ PacketError::RequestFlag(_)) => Err(e),
            Err(e) => {
                warn!("Dropping malformed packet {payload:02x?}: {e}");
                Ok(())
            }
        }
    }

    /// Runs the generational timeout sweep and the keep-alive. Called from
    /// the link part's update.
    pub fn periodic_update(&self, now: DateTime<Utc>) {
        let (expired, keep_alive_due) = {
            let mut corr = self.lock_correlation();
            let expired: Vec<Outstanding> = match corr.last_sweep {
                None => {
                    corr.last_sweep = Some(now);
                    Vec::new()
                }
                Some(last) if now - last >= Self::FUTURE_TIMEOUT => {
                    corr.last_sweep = Some(now);
                    let current = std::mem::take(&mut corr.current);
                    std::mem::replace(&mut corr.previous, current).into_values().collect()
                }
                Some(_) => Vec::new(),
            };

            let keep_alive_state = corr.keep_alive.as_mut().map(CompletionHandle::poll);
            match keep_alive_state {
                None | Some(HandleState::Pending) => {}
                Some(HandleState::Resolved(ResultCode::Success)) => corr.keep_alive = None,
                Some(HandleState::Resolved(code)) => {
                    warn!("Keep-alive rejected by arduino: {code}");
                    corr.keep_alive = None;
                }
                Some(HandleState::Failed(reason)) => {
                    warn!("Keep-alive failed: {reason}");
                    corr.keep_alive = None;
                }
            }
            let due = corr.last_keep_alive.is_none_or(|last| now - last >= Self::KEEP_ALIVE_INTERVAL);
            if due && self.is_connected() {
                corr.last_keep_alive = Some(now);
            }
            (expired, due && self.is_connected())
        };

        for o in expired {
            event!("Command {} to part {} timed out.", o.command_id, o.part_id);
            o.resolver.fail(LinkFailure::Timeout);
        }
        if keep_alive_due {
            let handle = self.send_command(Self::KEEP_ALIVE_PART, Self::KEEP_ALIVE_COMMAND, 0);
            self.lock_correlation().keep_alive = Some(handle);
        }
    }
}
