use crate::command::{Command, CommandKind, CommandState};
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, Part, PartError, PartMeta, field};
use crate::serial::{SerialAdapter, SerialCommandTracker};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Actuators wired to the microcontroller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorKind {
    /// Parachute servo, device part 1.
    Parachute,
    /// Motor igniter, device part 2.
    Igniter,
}

impl ActuatorKind {
    fn device_part(self) -> u8 {
        match self {
            ActuatorKind::Parachute => 1,
            ActuatorKind::Igniter => 2,
        }
    }

    fn command_id(self, kind: CommandKind) -> Option<u8> {
        match (self, kind) {
            (ActuatorKind::Parachute, CommandKind::Close) | (ActuatorKind::Igniter, CommandKind::Ignite) => Some(0),
            (ActuatorKind::Parachute, CommandKind::Open) => Some(1),
            _ => None,
        }
    }

    fn accepted(self) -> &'static [CommandKind] {
        match self {
            ActuatorKind::Parachute => {
                &[CommandKind::Enable, CommandKind::Disable, CommandKind::Open, CommandKind::Close]
            }
            ActuatorKind::Igniter => &[CommandKind::Enable, CommandKind::Disable, CommandKind::Ignite],
        }
    }

    fn part_type(self) -> &'static str {
        match self {
            ActuatorKind::Parachute => "Servo",
            ActuatorKind::Igniter => "Igniter",
        }
    }
}

/// Servo or igniter driven through [`SerialAdapter`] command packets.
pub struct SerialActuator {
    meta: PartMeta,
    kind: ActuatorKind,
    adapter: Arc<SerialAdapter>,
    tracker: SerialCommandTracker,
    last_confirmed: Option<CommandKind>,
}

impl SerialActuator {
    const SHAPE: [MeasurementField; 1] = [field("state", FieldFormat::Str(16))];

    pub fn new(meta: PartMeta, kind: ActuatorKind, adapter: Arc<SerialAdapter>) -> Self {
        Self { meta, kind, adapter, tracker: SerialCommandTracker::new(), last_confirmed: None }
    }

    fn state_label(&self) -> &'static str {
        match self.last_confirmed {
            Some(CommandKind::Open) => "open",
            Some(CommandKind::Close) => "closed",
            Some(CommandKind::Ignite) => "ignited",
            _ => "unknown",
        }
    }
}

impl Part for SerialActuator {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { self.kind.part_type() }
    fn accepted_commands(&self) -> &'static [CommandKind] { self.kind.accepted() }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        for c in commands.iter_mut() {
            if self.meta.apply_toggle(c, now) {
                continue;
            }
            let Some(command_id) = self.kind.command_id(c.kind()) else {
                c.fail(format!("{} does not support {}", self.kind.part_type(), c.kind()), now);
                continue;
            };
            if c.is_fresh() && !self.meta.is_enabled() {
                c.fail("Part is disabled", now);
                continue;
            }
            self.tracker.drive(c, &self.adapter, self.kind.device_part(), command_id, now);
            if c.state() == CommandState::Success {
                self.last_confirmed = Some(c.kind());
            }
        }
        Ok(Vec::new())
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &Self::SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        Ok(vec![vec![self.state_label().into()]])
    }
}
