use super::completion::{CompletionHandle, HandleState};
use super::packets::ResultCode;
use super::serial_adapter::SerialAdapter;
use crate::command::{Command, CommandState};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Drives the commands of one actuator through the serial protocol.
///
/// Only the most recently sent command is tracked. A processing command
/// that is not the tracked one gets failed, so one actuator never runs
/// two operations at once.
#[derive(Debug, Default)]
pub struct SerialCommandTracker {
    last_command: Option<Uuid>,
    handle: Option<CompletionHandle>,
}

impl SerialCommandTracker {
    pub const SUPERSEDED: &'static str = "Another command was sent, this command will no longer be processed";

    pub fn new() -> Self { Self::default() }

    pub fn last_command(&self) -> Option<Uuid> { self.last_command }

    /// Sends fresh commands as `command_id` to `part_id` and settles
    /// processing ones once their completion handle resolved.
    pub fn drive(
        &mut self,
        command: &mut Command,
        adapter: &SerialAdapter,
        part_id: u8,
        command_id: u8,
        now: DateTime<Utc>,
    ) {
        if command.is_fresh() {
            self.handle = Some(adapter.send_command(part_id, command_id, 0));
            self.last_command = Some(command.id());
            command.start_processing();
        } else if command.state() == CommandState::Processing && self.last_command != Some(command.id()) {
            command.fail(Self::SUPERSEDED, now);
            return;
        }
        if command.state() != CommandState::Processing {
            return;
        }
        let Some(handle) = self.handle.as_mut() else {
            command.fail("No transmission pending for this command", now);
            return;
        };
        match handle.poll() {
            HandleState::Pending => {}
            HandleState::Resolved(ResultCode::Success) => {
                command.succeed(now);
            }
            HandleState::Resolved(code) => {
                command.fail(code.to_string(), now);
            }
            HandleState::Failed(reason) => {
                command.fail(reason.to_string(), now);
            }
        }
        if command.is_terminal() {
            self.handle = None;
        }
    }
}
