use crate::command::{Command, CommandKind, CommandState};
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, Part, PartError, PartMeta, field};
use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

struct Trigger {
    command: Uuid,
    kind: CommandKind,
    sent: DateTime<Utc>,
    outcome: Option<CommandState>,
}

impl Trigger {
    fn send(kind: CommandKind, part: Uuid, now: DateTime<Utc>, out: &mut Vec<Command>) -> Self {
        let command = Command::for_part(kind, part, now);
        let trigger = Self { command: command.id(), kind, sent: now, outcome: None };
        out.push(command);
        trigger
    }

    fn rearm_due(&self, now: DateTime<Utc>, period: TimeDelta) -> bool {
        self.outcome.is_some() && now - self.sent > period
    }
}

/// Bench test part cycling the actuators on a fixed cadence.
///
/// Fires the igniter every [`PeriodicTester::IGNITE_PERIOD`] and toggles the
/// parachute servo every [`PeriodicTester::PARACHUTE_PERIOD`], each only once
/// the previous command of its channel finished. Built disabled,
/// `Control.Enable` starts it.
pub struct PeriodicTester {
    meta: PartMeta,
    igniter: Uuid,
    parachute: Uuid,
    ignite: Option<Trigger>,
    deploy: Option<Trigger>,
    ignite_result: Option<bool>,
    deploy_result: Option<bool>,
}

impl PeriodicTester {
    pub const IGNITE_PERIOD: TimeDelta = TimeDelta::seconds(3);
    pub const PARACHUTE_PERIOD: TimeDelta = TimeDelta::seconds(4);

    /// `1` success, `0` failure, `-1` nothing finished since the last row.
    const SHAPE: [MeasurementField; 2] =
        [field("igniter_success", FieldFormat::I8), field("parachute_success", FieldFormat::I8)];

    pub fn new(meta: PartMeta, igniter: Uuid, parachute: Uuid) -> Self {
        let mut meta = meta.virtual_part();
        meta.set_enabled(false);
        Self { meta, igniter, parachute, ignite: None, deploy: None, ignite_result: None, deploy_result: None }
    }
}

fn outcome_value(result: Option<bool>) -> i32 {
    match result {
        Some(true) => 1,
        Some(false) => 0,
        None => -1,
    }
}

impl Part for PeriodicTester {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { "Tester" }
    fn accepted_commands(&self) -> &'static [CommandKind] { &[CommandKind::Enable, CommandKind::Disable] }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        for c in commands.iter_mut() {
            self.meta.apply_toggle(c, now);
        }
        let mut emitted = Vec::new();
        if !self.meta.is_enabled() {
            return Ok(emitted);
        }

        if self.ignite.as_ref().is_none_or(|t| t.rearm_due(now, Self::IGNITE_PERIOD)) {
            if let Some(state) = self.ignite.as_ref().and_then(|t| t.outcome) {
                self.ignite_result = Some(state == CommandState::Success);
            }
            self.ignite = Some(Trigger::send(CommandKind::Ignite, self.igniter, now, &mut emitted));
        }
        if self.deploy.as_ref().is_none_or(|t| t.rearm_due(now, Self::PARACHUTE_PERIOD)) {
            let kind = match &self.deploy {
                Some(t) if t.kind == CommandKind::Close => CommandKind::Open,
                _ => CommandKind::Close,
            };
            if let Some(state) = self.deploy.as_ref().and_then(|t| t.outcome) {
                self.deploy_result = Some(state == CommandState::Success);
            }
            self.deploy = Some(Trigger::send(kind, self.parachute, now, &mut emitted));
        }
        Ok(emitted)
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &Self::SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        let row = vec![
            outcome_value(self.ignite_result.take()).into(),
            outcome_value(self.deploy_result.take()).into(),
        ];
        Ok(vec![row])
    }

    fn on_command_finished(&mut self, command: &Command) {
        for trigger in [self.ignite.as_mut(), self.deploy.as_mut()].into_iter().flatten() {
            if trigger.command == command.id() {
                trigger.outcome = Some(command.state());
            }
        }
    }
}
