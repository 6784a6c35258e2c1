use super::*;
use crate::command::{Command, CommandKind, CommandState, LockedCommandBuffer};
use crate::http_handler::{FlightServer, ResponseError};
use crate::measurement_sink::MeasurementBuffer;
use crate::rocket::{
    FieldFormat, FlightDescriptor, MeasurementField, MeasurementRow, MeasurementValue, Part, PartError,
    PartIndex, PartMeta, Rocket, VesselDescriptor, field,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

static SHAPE: [MeasurementField; 2] = [field("a", FieldFormat::F32), field("b", FieldFormat::F32)];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Complete,
    Ignore,
    Hold,
    Panic,
}

type Journal = Arc<Mutex<Vec<String>>>;

struct Scripted {
    meta: PartMeta,
    behaviour: Behaviour,
    journal: Journal,
    emit: Vec<(CommandKind, Uuid)>,
    rows: Vec<MeasurementRow>,
    sink: Option<Arc<MeasurementBuffer>>,
}

impl Scripted {
    fn new(name: &str, journal: &Journal) -> Self {
        Self {
            meta: PartMeta::new(Uuid::new_v4(), name),
            behaviour: Behaviour::Complete,
            journal: Arc::clone(journal),
            emit: Vec::new(),
            rows: Vec::new(),
            sink: None,
        }
    }

    fn depends_on(mut self, ids: &[Uuid]) -> Self {
        self.meta = self.meta.with_dependencies(ids);
        self
    }

    fn period(mut self, ms: i64) -> Self {
        self.meta = self.meta.with_periods(TimeDelta::milliseconds(ms), TimeDelta::milliseconds(ms));
        self
    }

    fn behaving(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }
}

impl Part for Scripted {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { "Scripted" }
    fn accepted_commands(&self) -> &'static [CommandKind] { &[CommandKind::Reset, CommandKind::Calibrate] }

    fn update(&mut self, commands: &mut [Command], now: DateTime<Utc>, _iteration: u64) -> Result<Vec<Command>, PartError> {
        self.journal.lock().unwrap().push(format!("update {}", self.meta.name()));
        match self.behaviour {
            Behaviour::Panic => panic!("{} exploded", self.meta.name()),
            Behaviour::Ignore => {}
            Behaviour::Hold => {
                for c in commands.iter_mut() {
                    c.start_processing();
                }
            }
            Behaviour::Complete => {
                for c in commands.iter_mut() {
                    c.succeed(now);
                }
            }
        }
        Ok(std::mem::take(&mut self.emit).into_iter().map(|(kind, to)| Command::for_part(kind, to, now)).collect())
    }

    fn measurement_shape(&self) -> &'static [MeasurementField] { &SHAPE }

    fn collect_measurements(&mut self, _now: DateTime<Utc>) -> Result<Vec<MeasurementRow>, PartError> {
        Ok(std::mem::take(&mut self.rows))
    }

    fn on_command_finished(&mut self, command: &Command) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{} saw {}", self.meta.name(), <&str>::from(command.state())));
    }

    fn measurement_buffer(&self) -> Option<Arc<MeasurementBuffer>> { self.sink.clone() }
}

struct Fixture {
    executor: FlightExecutor,
    commands: Arc<LockedCommandBuffer>,
    reports: Arc<LockedCommandBuffer>,
}

fn fixture(parts: Vec<Scripted>) -> Fixture {
    let mut rocket = Rocket::new(Uuid::new_v4(), "Test", 0);
    for part in parts {
        rocket.add_part(Box::new(part)).unwrap();
    }
    let commands = Arc::new(LockedCommandBuffer::new());
    let reports = Arc::new(LockedCommandBuffer::new());
    let executor = FlightExecutor::new(rocket, Arc::clone(&commands), Arc::clone(&reports), Duration::from_millis(10));
    Fixture { executor, commands, reports }
}

fn t(ms: i64) -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + TimeDelta::milliseconds(ms) }

fn journal() -> Journal { Arc::new(Mutex::new(Vec::new())) }

fn entries(journal: &Journal) -> Vec<String> { std::mem::take(&mut *journal.lock().unwrap()) }

#[test]
fn test_dependencies_update_first() {
    let j = journal();
    let a = Scripted::new("a", &j);
    let b = Scripted::new("b", &j).depends_on(&[a.meta.id()]);
    let c = Scripted::new("c", &j).depends_on(&[b.meta.id(), a.meta.id()]);
    let mut f = fixture(vec![a, b, c]);
    f.executor.run_tick(t(0), 0);
    assert_eq!(entries(&j), vec!["update a", "update b", "update c"]);
    assert_eq!(f.executor.execution_order(), &[0, 1, 2]);
}

#[test]
fn test_commands_wake_parts_that_are_not_due() {
    let j = journal();
    let slow = Scripted::new("slow", &j).period(1000);
    let id = slow.meta.id();
    let mut f = fixture(vec![slow]);
    f.executor.run_tick(t(0), 0);
    f.executor.run_tick(t(100), 1);
    assert_eq!(entries(&j).len(), 1);

    f.commands.push(Command::for_part(CommandKind::Reset, id, t(150)));
    f.executor.run_tick(t(200), 2);
    assert_eq!(entries(&j), vec!["update slow"]);
    let reports = f.reports.swap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].state(), CommandState::Success);
}

#[test]
fn test_unfinished_commands_are_requeued() {
    let j = journal();
    let holder = Scripted::new("holder", &j).behaving(Behaviour::Hold);
    let id = holder.meta.id();
    let mut f = fixture(vec![holder]);
    let c = Command::for_part(CommandKind::Calibrate, id, t(0));
    let cid = c.id();
    f.commands.push(c);
    for i in 0..3 {
        f.executor.run_tick(t(i * 100), i.unsigned_abs());
        assert!(f.reports.is_empty());
        let pending = f.commands.swap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), cid);
        assert_eq!(pending[0].state(), CommandState::Processing);
        f.commands.extend(pending);
    }
}

#[test]
fn test_ignored_commands_are_failed() {
    let j = journal();
    let lazy = Scripted::new("lazy", &j).behaving(Behaviour::Ignore);
    let id = lazy.meta.id();
    let mut f = fixture(vec![lazy]);
    let mut c = Command::for_part(CommandKind::Reset, id, t(0));
    c.mark_received(t(0));
    f.commands.push(c);
    f.executor.run_tick(t(0), 0);
    let reports = f.reports.swap();
    assert_eq!(reports[0].state(), CommandState::Failed);
    assert_eq!(reports[0].response_message(), Some("Part did not process the command for an unknown reason"));
    assert!(f.commands.is_empty());
}

#[test]
fn test_routing_failures_are_reported() {
    let j = journal();
    let part = Scripted::new("part", &j);
    let id = part.meta.id();
    let mut f = fixture(vec![part]);
    f.commands.extend([
        Command::new(CommandKind::Reset, None, t(0)),
        Command::for_part(CommandKind::Reset, Uuid::new_v4(), t(0)),
        Command::for_part(CommandKind::Ignite, id, t(0)),
        Command::for_part(CommandKind::Unknown, id, t(0)),
    ]);
    f.executor.run_tick(t(0), 0);
    let reports = f.reports.swap();
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|c| c.state() == CommandState::Failed));
    assert_eq!(reports[0].response_message(), Some("Command has no target part"));
    assert!(reports[2].response_message().is_some_and(|m| m.contains("does not accept")));
}

#[test]
fn test_faulty_part_does_not_stop_the_tick() {
    let j = journal();
    let bad = Scripted::new("bad", &j).behaving(Behaviour::Panic);
    let bad_id = bad.meta.id();
    let good = Scripted::new("good", &j);
    let mut f = fixture(vec![bad, good]);
    f.commands.push(Command::for_part(CommandKind::Reset, bad_id, t(0)));
    f.executor.run_tick(t(0), 0);
    f.executor.run_tick(t(200), 1);
    let log = entries(&j);
    assert_eq!(log.iter().filter(|e| *e == "update good").count(), 2);
    assert_eq!(log.iter().filter(|e| *e == "update bad").count(), 2);
    // the command survives for a retry once the part recovers
    assert_eq!(f.commands.len(), 1);
    assert!(f.reports.is_empty());
}

#[test]
fn test_cascades_and_issuer_notification() {
    let j = journal();
    let sensor = Scripted::new("sensor", &j);
    let sensor_id = sensor.meta.id();
    let mut director = Scripted::new("director", &j).depends_on(&[sensor_id]);
    director.emit.push((CommandKind::Calibrate, sensor_id));
    let director_id = director.meta.id();
    let mut first = Scripted::new("first", &j);
    first.emit.push((CommandKind::Reset, director_id));
    let mut f = fixture(vec![first, sensor, director]);

    f.executor.run_tick(t(0), 0);
    // forward: handled by the director this tick. backward: waits for the next one
    let reports = f.reports.swap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind(), CommandKind::Reset);
    let waiting = f.commands.swap();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].state(), CommandState::New);
    assert_eq!(waiting[0].part_id(), Some(sensor_id));
    f.commands.extend(waiting);
    entries(&j);

    f.executor.run_tick(t(10), 1);
    assert!(entries(&j).contains(&String::from("director saw success")));
    assert_eq!(f.reports.len(), 1);
}

#[test]
fn test_measurements_reach_sinks() {
    let j = journal();
    let buffer = Arc::new(MeasurementBuffer::new());
    let mut sink = Scripted::new("sink", &j);
    sink.sink = Some(Arc::clone(&buffer));
    let mut sensor = Scripted::new("sensor", &j).period(0);
    sensor.rows = vec![
        vec![MeasurementValue::Float(1.0), MeasurementValue::Float(2.0)],
        vec![MeasurementValue::Float(1.0); 3],
        vec![MeasurementValue::Float(3.0)],
    ];
    let mut f = fixture(vec![sink, sensor]);
    f.executor.run_tick(t(0), 0);

    let ticks = buffer.swap();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].len(), 1);
    let measured = &ticks[0][0];
    assert_eq!(measured.part, 1);
    assert_eq!(measured.rows.len(), 2);
    assert_eq!((measured.start, measured.end), (t(0), t(0)));

    f.executor.run_tick(t(50), 1);
    assert!(buffer.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_frame_pacing() {
    let j = journal();
    let part = Scripted::new("part", &j).period(0);
    let f = fixture(vec![part]);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(f.executor.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(95)).await;
    cancel.cancel();
    handle.await.unwrap();
    let ticks = entries(&j).len();
    assert!((9..=11).contains(&ticks), "{ticks} ticks");
}

#[derive(Default)]
struct RecordingServer {
    batches: Mutex<Vec<Vec<Command>>>,
}

#[async_trait]
impl FlightServer for RecordingServer {
    async fn register_vessel(&self, _vessel: &VesselDescriptor) -> Result<(Uuid, u32), ResponseError> {
        Err(ResponseError::Unknown)
    }

    async fn create_flight(&self, _flight: &FlightDescriptor) -> Result<Uuid, ResponseError> {
        Err(ResponseError::Unknown)
    }

    async fn report_command_responses(&self, _flight_id: Uuid, commands: &[Command]) -> Result<(), ResponseError> {
        self.batches.lock().unwrap().push(commands.to_vec());
        Ok(())
    }

    async fn report_flight_data_binary(&self, _flight_id: Uuid, _payload: Vec<u8>) -> Result<(), ResponseError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_reporter_drains_queue() {
    let server = Arc::new(RecordingServer::default());
    let reports = Arc::new(LockedCommandBuffer::new());
    let reporter = CommandReporter::new(server.clone(), Uuid::new_v4(), Arc::clone(&reports));
    assert_eq!(reporter.report_once().await, 0);

    let mut done = Command::for_part(CommandKind::Reset, Uuid::new_v4(), t(0));
    done.succeed(t(1));
    reports.push(done);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(reporter.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(600)).await;
    cancel.cancel();
    handle.await.unwrap();
    assert!(reports.is_empty());
    assert_eq!(server.batches.lock().unwrap().len(), 1);
}

struct SilentUplink;

#[async_trait]
impl crate::measurement_sink::TelemetryUplink for SilentUplink {
    async fn send(&self, _payload: Vec<u8>) -> Result<(), ResponseError> { Ok(()) }
}

/// The assembled Spatula on a simulated bench: the smartphone IMU reports
/// the rocket standing still, the orientation board reports `orientation`
/// and the microcontroller acknowledges every command packet.
struct Bench {
    executor: FlightExecutor,
    commands: Arc<LockedCommandBuffer>,
    reports: Arc<LockedCommandBuffer>,
    adapter: Arc<crate::serial::SerialAdapter>,
    imu: crate::devices::ImuInputs,
    link: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
    telemetry: Arc<MeasurementBuffer>,
    director: PartIndex,
    director_id: Uuid,
    orientation: [f32; 4],
    finished: Vec<Command>,
    director_state: String,
    now: i64,
    iteration: u64,
}

const BENCH_STEP_MS: i64 = 20;

fn bench(config: &crate::config::FlightConfig) -> Bench {
    let spatula = crate::rocket::spatula::make_spatula(config, Arc::new(SilentUplink)).unwrap();
    let (director, director_id) = spatula
        .rocket
        .parts()
        .find(|(_, part)| part.part_type() == "FlightDirector")
        .map(|(index, part)| (index, part.meta().id()))
        .unwrap();
    let telemetry = spatula.rocket.parts().find_map(|(_, part)| part.measurement_buffer()).unwrap();
    let (outbound, link) = tokio::sync::mpsc::unbounded_channel();
    spatula.adapter.attach(outbound);

    let commands = Arc::new(LockedCommandBuffer::new());
    let reports = Arc::new(LockedCommandBuffer::new());
    let executor =
        FlightExecutor::new(spatula.rocket, Arc::clone(&commands), Arc::clone(&reports), Duration::from_millis(10));
    Bench {
        executor,
        commands,
        reports,
        adapter: spatula.adapter,
        imu: spatula.imu,
        link,
        telemetry,
        director,
        director_id,
        orientation: [1.0, 0.0, 0.0, 0.0],
        finished: Vec::new(),
        director_state: String::new(),
        now: 0,
        iteration: 0,
    }
}

impl Bench {
    fn step(&mut self) {
        let now = t(self.now);
        self.imu.publish_acceleration(nalgebra::Vector3::new(0.0, 0.0, 9.81), now);
        self.imu.publish_rotation(nalgebra::Vector3::zeros(), now);
        let payload = self.orientation.iter().flat_map(|v| v.to_le_bytes()).collect();
        let frame = crate::serial::SensorDataPacket {
            part_id: crate::devices::OrientationSensor::DATA_PART,
            sensor_type: 0,
            payload,
        };
        self.adapter.on_frame(&frame.encode().unwrap(), now).unwrap();

        self.executor.run_tick(now, self.iteration);

        while let Ok(packet) = self.link.try_recv() {
            let ack = [packet[0] | 0x40, packet[1], packet[2] & 0xF0];
            self.adapter.on_frame(&ack, now).unwrap();
        }
        self.finished.extend(self.reports.swap());
        for tick in self.telemetry.swap() {
            for measured in tick.iter().filter(|m| m.part == self.director) {
                if let Some(MeasurementValue::Text(state)) = measured.rows.last().and_then(|row| row.first()) {
                    self.director_state.clone_from(state);
                }
            }
        }
        self.now += BENCH_STEP_MS;
        self.iteration += 1;
    }

    fn run_for(&mut self, ms: i64) {
        let until = self.now + ms;
        while self.now < until {
            self.step();
        }
    }

    fn order(&mut self, kind: CommandKind) -> Uuid {
        let command = Command::for_part(kind, self.director_id, t(self.now));
        let id = command.id();
        self.commands.push(command);
        id
    }

    fn outcome(&self, id: Uuid) -> Option<CommandState> {
        self.finished.iter().find(|c| c.id() == id).map(Command::state)
    }

    fn finished_of(&self, kind: CommandKind) -> Vec<&Command> {
        self.finished.iter().filter(|c| c.kind() == kind).collect()
    }

    fn calibrate_and_arm(&mut self) {
        let calibrate = self.order(CommandKind::Calibrate);
        self.run_for(1500);
        assert_eq!(self.outcome(calibrate), Some(CommandState::Success));
        let arm = self.order(CommandKind::Arm);
        self.run_for(200);
        assert_eq!(self.outcome(arm), Some(CommandState::Success));
    }
}

#[tokio::test]
async fn test_spatula_calibrates_and_arms() {
    let mut b = bench(&crate::config::FlightConfig::default());
    b.run_for(200);
    assert_eq!(b.director_state, "Idle");

    let early_arm = b.order(CommandKind::Arm);
    b.run_for(100);
    assert_eq!(b.outcome(early_arm), Some(CommandState::Failed));

    let calibrate = b.order(CommandKind::Calibrate);
    b.run_for(900);
    assert_eq!(b.outcome(calibrate), None);
    b.run_for(600);
    assert_eq!(b.outcome(calibrate), Some(CommandState::Success));
    // director plus accelerometer, gyroscope, orientation and inertial frame
    let calibrations = b.finished_of(CommandKind::Calibrate);
    assert_eq!(calibrations.len(), 5);
    assert!(calibrations.iter().all(|c| c.state() == CommandState::Success));

    let arm = b.order(CommandKind::Arm);
    b.run_for(200);
    assert_eq!(b.outcome(arm), Some(CommandState::Success));
    assert_eq!(b.director_state, "Armed");
}

#[tokio::test]
async fn test_spatula_launches_and_deploys_when_nose_down() {
    let config = crate::config::FlightConfig {
        countdown: Duration::from_secs(2),
        deploy_delay: Duration::from_secs(30),
        ..crate::config::FlightConfig::default()
    };
    let mut b = bench(&config);
    b.calibrate_and_arm();

    let countdown = b.order(CommandKind::StartCountdown);
    b.run_for(1000);
    assert_eq!(b.director_state, "Countdown");
    assert!(b.finished_of(CommandKind::Ignite).is_empty());
    b.run_for(1500);
    assert_eq!(b.outcome(countdown), Some(CommandState::Success));
    let ignitions = b.finished_of(CommandKind::Ignite);
    assert_eq!(ignitions.len(), 1);
    assert_eq!(ignitions[0].state(), CommandState::Success);
    assert_eq!(b.director_state, "Flight");

    b.run_for(1000);
    assert!(b.finished_of(CommandKind::Open).is_empty());

    // rolled over by half a turn about x, the nose now points at the ground
    b.orientation = [0.0, 1.0, 0.0, 0.0];
    b.run_for(500);
    let deploys = b.finished_of(CommandKind::Open);
    assert_eq!(deploys.len(), 1);
    assert_eq!(deploys[0].state(), CommandState::Success);
    b.run_for(500);
    assert_eq!(b.finished_of(CommandKind::Open).len(), 1);
}

#[tokio::test]
async fn test_spatula_deploys_after_delay() {
    let config = crate::config::FlightConfig {
        countdown: Duration::from_secs(1),
        deploy_delay: Duration::from_secs(3),
        ..crate::config::FlightConfig::default()
    };
    let mut b = bench(&config);
    b.calibrate_and_arm();
    b.order(CommandKind::StartCountdown);
    b.run_for(1500);
    assert_eq!(b.director_state, "Flight");

    b.run_for(2000);
    assert!(b.finished_of(CommandKind::Open).is_empty());
    b.run_for(1000);
    let deploys = b.finished_of(CommandKind::Open);
    assert_eq!(deploys.len(), 1);
    assert_eq!(deploys[0].state(), CommandState::Success);
}
