use super::DirectorState;
use crate::command::{Command, CommandKind, CommandState};
use crate::config::FlightConfig;
use crate::devices::AttitudeReading;
use crate::rocket::{FieldFormat, MeasurementField, MeasurementRow, Part, PartError, PartMeta, field};
use crate::serial::SerialAdapter;
use crate::{info, warn};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Parts the director commands, or whose state it reads.
#[derive(Debug, Clone, Copy)]
pub struct DirectorLinks {
    pub accelerometer: Uuid,
    pub gyroscope: Uuid,
    pub orientation: Uuid,
    pub inertial_frame: Uuid,
    pub igniter: Uuid,
    pub parachute: Uuid,
    pub serial_link: Uuid,
    pub attitude_smartphone: Uuid,
    pub attitude_external: Uuid,
}

impl DirectorLinks {
    fn all(&self) -> [Uuid; 9] {
        [
            self.serial_link,
            self.accelerometer,
            self.gyroscope,
            self.orientation,
            self.inertial_frame,
            self.igniter,
            self.parachute,
            self.attitude_smartphone,
            self.attitude_external,
        ]
    }

    /// Sensors calibrated in the first, concurrent calibration stage.
    fn base_sensors(&self) -> [Uuid; 3] { [self.accelerometer, self.gyroscope, self.orientation] }
}

struct CalibrationRun {
    command: Uuid,
    sensors: HashMap<Uuid, CommandState>,
    inertial: Option<(Uuid, CommandState)>,
}

#[derive(Clone, Copy)]
struct CountdownRun {
    command: Uuid,
    started: DateTime<Utc>,
}

enum CalibrationStep {
    Wait,
    Emit(Command),
    Fail(&'static str),
    Done,
}

/// Sequences calibration, arming, countdown, ignition and parachute deploy.
///
/// Sub-commands are emitted like any other command. Their outcome comes back
/// through [`Part::on_command_finished`], so the director only ever holds
/// command ids and last known states.
pub struct FlightDirector {
    meta: PartMeta,
    links: DirectorLinks,
    adapter: Arc<SerialAdapter>,
    external_attitude: watch::Receiver<AttitudeReading>,
    smartphone_attitude: watch::Receiver<AttitudeReading>,
    countdown_length: TimeDelta,
    deploy_delay: TimeDelta,
    state: DirectorState,
    calibrated: bool,
    calibration: Option<CalibrationRun>,
    countdown: Option<CountdownRun>,
    countdown_remaining: Option<TimeDelta>,
    launch_time: Option<DateTime<Utc>>,
    parachute_countdown: Option<TimeDelta>,
    deploy: Option<(Uuid, CommandState)>,
}

impl FlightDirector {
    pub const CALIBRATION_TIMEOUT: TimeDelta = TimeDelta::seconds(30);
    pub const ATTITUDE_MAX_AGE: TimeDelta = TimeDelta::seconds(3);

    const SHAPE: [MeasurementField; 4] = [
        field("state", FieldFormat::Str(16)),
        field("calibrated", FieldFormat::Bool),
        field("countdown", FieldFormat::F32),
        field("parachute_countdown", FieldFormat::F32),
    ];

    pub fn new(
        meta: PartMeta,
        links: DirectorLinks,
        adapter: Arc<SerialAdapter>,
        external_attitude: watch::Receiver<AttitudeReading>,
        smartphone_attitude: watch::Receiver<AttitudeReading>,
        config: &FlightConfig,
    ) -> Self {
        Self {
            meta: meta
                .virtual_part()
                .with_periods(TimeDelta::milliseconds(10), TimeDelta::milliseconds(100))
                .with_dependencies(&links.all()),
            links,
            adapter,
            external_attitude,
            smartphone_attitude,
            countdown_length: to_delta(config.countdown),
            deploy_delay: to_delta(config.deploy_delay),
            state: DirectorState::Idle,
            calibrated: false,
            calibration: None,
            countdown: None,
            countdown_remaining: None,
            launch_time: None,
            parachute_countdown: None,
            deploy: None,
        }
    }

    pub fn state(&self) -> DirectorState { self.state }
    pub fn is_calibrated(&self) -> bool { self.calibrated }
    pub fn launch_time(&self) -> Option<DateTime<Utc>> { self.launch_time }
    pub fn parachute_countdown(&self) -> Option<TimeDelta> { self.parachute_countdown }

    fn set_state(&mut self, state: DirectorState) {
        if self.state != state {
            info!("Flight director {} -> {}.", <&str>::from(self.state), <&str>::from(state));
            self.state = state;
        }
    }

    fn run_calibrate(&mut self, c: &mut Command, now: DateTime<Utc>, out: &mut Vec<Command>) {
        if c.is_fresh() {
            if !self.state.admits(CommandKind::Calibrate) {
                c.fail("Can only calibrate in idle mode", now);
                return;
            }
            if self.calibration.is_some() {
                c.fail("Already calibrating", now);
                return;
            }
            info!("Starting calibration.");
            c.start_processing();
            let subs: Vec<Command> = self
                .links
                .base_sensors()
                .into_iter()
                .map(|id| Command::for_part(CommandKind::Calibrate, id, now))
                .collect();
            let sensors = subs.iter().map(|s| (s.id(), s.state())).collect();
            self.calibration = Some(CalibrationRun { command: c.id(), sensors, inertial: None });
            out.extend(subs);
            return;
        }
        if c.state() != CommandState::Processing {
            return;
        }

        let step = match self.calibration.as_mut().filter(|run| run.command == c.id()) {
            None => CalibrationStep::Fail("Calibration was superseded"),
            Some(run) if run.sensors.values().any(|s| *s == CommandState::Failed) => {
                CalibrationStep::Fail("Failure to calibrate one of the parts")
            }
            Some(run) if run.sensors.values().all(|s| *s == CommandState::Success) => match run.inertial {
                None => {
                    let sub = Command::for_part(CommandKind::Calibrate, self.links.inertial_frame, now);
                    run.inertial = Some((sub.id(), sub.state()));
                    CalibrationStep::Emit(sub)
                }
                Some((_, CommandState::Failed)) => CalibrationStep::Fail("Failure to calibrate inertial frame"),
                Some((_, CommandState::Success)) => CalibrationStep::Done,
                Some(_) => CalibrationStep::Wait,
            },
            Some(_) => CalibrationStep::Wait,
        };

        match step {
            CalibrationStep::Emit(sub) => out.push(sub),
            CalibrationStep::Fail(reason) => {
                c.fail(reason, now);
            }
            CalibrationStep::Done => {
                self.calibrated = true;
                info!("Calibration complete.");
                c.succeed(now);
            }
            CalibrationStep::Wait => {}
        }
        if !c.is_terminal() && now - c.create_time() >= Self::CALIBRATION_TIMEOUT {
            c.fail("Calibration timeout", now);
        }
        if c.is_terminal() && self.calibration.as_ref().is_some_and(|run| run.command == c.id()) {
            self.calibration = None;
        }
    }

    fn run_arm(&mut self, c: &mut Command, now: DateTime<Utc>) {
        if !c.is_fresh() {
            return;
        }
        let refusal = if !self.state.admits(CommandKind::Arm) {
            Some("Can only arm director if previously in idle")
        } else if !self.calibrated {
            Some("Sensors not yet calibrated")
        } else if !self.adapter.is_connected() {
            Some("Arduino not connected")
        } else if !self.external_attitude.borrow().is_fresh(now, Self::ATTITUDE_MAX_AGE) {
            Some("No recent attitude data from external sensor")
        } else if !self.smartphone_attitude.borrow().is_fresh(now, Self::ATTITUDE_MAX_AGE) {
            Some("No recent attitude data from smartphone")
        } else {
            None
        };
        match refusal {
            Some(reason) => {
                c.fail(reason, now);
            }
            None => {
                c.succeed(now);
                self.set_state(DirectorState::Armed);
            }
        }
    }

    fn run_countdown(&mut self, c: &mut Command, now: DateTime<Utc>, out: &mut Vec<Command>) {
        if c.is_fresh() {
            if !self.state.admits(CommandKind::StartCountdown) {
                c.fail("Can only start countdown if armed", now);
                return;
            }
            c.start_processing();
            self.countdown = Some(CountdownRun { command: c.id(), started: now });
            self.countdown_remaining = Some(self.countdown_length);
            self.set_state(DirectorState::Countdown);
            return;
        }
        if c.state() != CommandState::Processing {
            return;
        }
        let Some(run) = self.countdown.filter(|run| run.command == c.id()) else {
            c.fail("Countdown was superseded", now);
            return;
        };
        if self.state != DirectorState::Countdown {
            self.countdown = None;
            c.fail("Countdown aborted", now);
            return;
        }

        let remaining = self.countdown_length - (now - run.started);
        self.countdown_remaining = Some(remaining.max(TimeDelta::zero()));
        if remaining > TimeDelta::zero() {
            return;
        }
        self.countdown = None;
        c.succeed(now);
        self.set_state(DirectorState::Flight);
        self.launch_time = Some(now);
        self.deploy = None;
        info!("Ignition.");
        out.push(Command::for_part(CommandKind::Ignite, self.links.igniter, now));
    }

    fn run_abort(&mut self, c: &mut Command, now: DateTime<Utc>, out: &mut Vec<Command>) {
        if c.is_terminal() {
            return;
        }
        warn!("Abort requested in state {}.", <&str>::from(self.state));
        c.succeed(now);
        self.set_state(DirectorState::Idle);
        self.countdown_remaining = None;
        self.launch_time = None;
        self.parachute_countdown = None;
        out.push(self.deploy_command(now));
    }

    fn auto_deploy(&mut self, now: DateTime<Utc>, out: &mut Vec<Command>) {
        let Some(launch) = self.launch_time else { return };
        let remaining = self.deploy_delay - (now - launch);
        self.parachute_countdown = Some(remaining.max(TimeDelta::zero()));

        let external = *self.external_attitude.borrow();
        let nose_down = external.pointing_up == -1 && external.is_fresh(now, Self::ATTITUDE_MAX_AGE);
        if remaining > TimeDelta::zero() && !nose_down {
            return;
        }
        if self.deploy.is_some_and(|(_, state)| state != CommandState::Failed) {
            return;
        }
        if nose_down {
            info!("Deploying parachute, rocket is pointing down.");
        } else {
            info!("Deploying parachute, deploy delay elapsed.");
        }
        out.push(self.deploy_command(now));
    }

    fn deploy_command(&mut self, now: DateTime<Utc>) -> Command {
        let open = Command::for_part(CommandKind::Open, self.links.parachute, now);
        self.deploy = Some((open.id(), open.state()));
        open
    }
}

fn to_delta(duration: Duration) -> TimeDelta { TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX) }

fn seconds(delta: Option<TimeDelta>) -> f64 {
    delta.map_or(0.0, |d| d.num_milliseconds() as f64 / 1000.0)
}

impl Part for FlightDirector {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { "FlightDirector" }

    fn accepted_commands(&self) -> &'static [CommandKind] {
        &[
            CommandKind::Enable,
            CommandKind::Disable,
            CommandKind::Calibrate,
            CommandKind::Arm,
            CommandKind::StartCountdown,
            CommandKind::Abort,
        ]
    }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        let mut emitted = Vec::new();
        for c in commands.iter_mut() {
            if self.meta.apply_toggle(c, now) {
                continue;
            }
            match c.kind() {
                CommandKind::Calibrate => self.run_calibrate(c, now, &mut emitted),
                CommandKind::Arm => self.run_arm(c, now),
                CommandKind::StartCountdown => self.run_countdown(c, now, &mut emitted),
                CommandKind::Abort => self.run_abort(c, now, &mut emitted),
                other => {
                    c.fail(format!("Flight director does not handle {other}"), now);
                }
            }
        }
        if self.state == DirectorState::Flight {
            self.auto_deploy(now, &mut emitted);
        }
        Ok(emitted)
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &Self::SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        Ok(vec![vec![
            <&str>::from(self.state).into(),
            self.calibrated.into(),
            seconds(self.countdown_remaining).into(),
            seconds(self.parachute_countdown).into(),
        ]])
    }

    fn on_command_finished(&mut self, command: &Command) {
        let (id, state) = (command.id(), command.state());
        if let Some(run) = self.calibration.as_mut() {
            if let Some(s) = run.sensors.get_mut(&id) {
                *s = state;
            }
            if let Some((sub, s)) = run.inertial.as_mut() {
                if *sub == id {
                    *s = state;
                }
            }
        }
        if let Some((deploy, s)) = self.deploy.as_mut() {
            if *deploy == id {
                *s = state;
                if state == CommandState::Failed {
                    warn!("Parachute deploy failed: {}", command.response_message().unwrap_or("no reason given"));
                }
            }
        }
    }
}
