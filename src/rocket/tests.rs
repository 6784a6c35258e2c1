use super::*;
use crate::command::{Command, CommandKind};
use chrono::{DateTime, TimeZone, Utc};
use rand::{Rng, rng};
use uuid::Uuid;

struct Dummy {
    meta: PartMeta,
}

impl Dummy {
    fn boxed(id: Uuid, deps: &[Uuid]) -> Box<dyn Part> {
        Box::new(Dummy { meta: PartMeta::new(id, "dummy").with_dependencies(deps) })
    }
}

impl Part for Dummy {
    fn meta(&self) -> &PartMeta { &self.meta }
    fn meta_mut(&mut self) -> &mut PartMeta { &mut self.meta }
    fn part_type(&self) -> &'static str { "Dummy" }
    fn accepted_commands(&self) -> &'static [CommandKind] {
        &[CommandKind::Enable, CommandKind::Disable]
    }
    fn update(
        &mut self,
        _commands: &mut [Command],
        _now: DateTime<Utc>,
        _iteration: u64,
    ) -> Result<Vec<Command>, PartError> {
        Ok(Vec::new())
    }
    fn measurement_shape(&self) -> &'static [MeasurementField] {
        const SHAPE: [MeasurementField; 2] =
            [field("altitude", FieldFormat::F32), field("label", FieldFormat::Str(16))];
        &SHAPE
    }
}

#[test]
fn test_indices_are_dense_and_ordered() {
    let mut rocket = Rocket::new(Uuid::new_v4(), "test", 1);
    let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    for (i, id) in ids.iter().enumerate() {
        let idx = rocket.add_part(Dummy::boxed(*id, &ids[..i])).unwrap();
        assert_eq!(idx, i);
    }
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(rocket.index_of(*id), Some(i));
    }
    assert_eq!(rocket.dependency_graph()[4], vec![0, 1, 2, 3]);
}

#[test]
fn test_rejects_bad_registrations() {
    let mut rocket = Rocket::new(Uuid::new_v4(), "test", 1);
    let a = Uuid::new_v4();
    rocket.add_part(Dummy::boxed(a, &[])).unwrap();
    assert_eq!(rocket.add_part(Dummy::boxed(a, &[])).unwrap_err(), RocketError::DuplicatePart(a));

    let b = Uuid::new_v4();
    let ghost = Uuid::new_v4();
    assert_eq!(
        rocket.add_part(Dummy::boxed(b, &[ghost])).unwrap_err(),
        RocketError::UnknownDependency { part: b, dependency: ghost }
    );
    assert_eq!(rocket.len(), 1);
}

#[test]
fn test_part_limit() {
    let mut rocket = Rocket::new(Uuid::new_v4(), "test", 1);
    for _ in 0..Rocket::MAX_PARTS {
        rocket.add_part(Dummy::boxed(Uuid::new_v4(), &[])).unwrap();
    }
    assert_eq!(
        rocket.add_part(Dummy::boxed(Uuid::new_v4(), &[])).unwrap_err(),
        RocketError::TooManyParts
    );
}

#[test]
fn test_dependencies_come_first_on_random_graphs() {
    let mut rng = rng();
    for _ in 0..200 {
        let n = rng.random_range(1..40);
        // random ranks, an edge may only point at a lower rank
        let mut ranks: Vec<usize> = (0..n).collect();
        for i in (1..n).rev() {
            ranks.swap(i, rng.random_range(0..=i));
        }
        let deps: Vec<Vec<usize>> = (0..n)
            .map(|i| (0..n).filter(|&j| ranks[j] < ranks[i] && rng.random_bool(0.2)).collect())
            .collect();

        let order = topological_order(&deps);
        assert_eq!(order.len(), n);
        let mut pos = vec![usize::MAX; n];
        for (p, &node) in order.iter().enumerate() {
            assert_eq!(pos[node], usize::MAX, "node {node} scheduled twice");
            pos[node] = p;
        }
        for (node, node_deps) in deps.iter().enumerate() {
            for &d in node_deps {
                assert!(pos[d] < pos[node], "{d} must run before {node}");
            }
        }
    }
}

#[test]
fn test_vessel_and_flight_descriptors() {
    let mut rocket = Rocket::new(Uuid::new_v4(), "Spatula", 3);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    rocket.add_part(Dummy::boxed(a, &[])).unwrap();
    rocket.add_part(Dummy::boxed(b, &[a])).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap();

    let (vessel, flight) = rocket.to_vessel_and_flight(now);
    assert_eq!(vessel.parts.len(), 2);
    assert_eq!(vessel.version, 3);
    assert_eq!(flight.measured_part_ids, vec![a, b]);
    assert_eq!(flight.measured_parts[&a][1].format, "16s");
    let enable = &flight.available_commands["Control.Enable"];
    assert_eq!(enable.supporting_parts, vec![a, b]);

    let json = serde_json::to_value(&vessel).unwrap();
    assert_eq!(json["parts"][0]["virtual"], false);
    assert_eq!(json["_id"], serde_json::json!(rocket.id()));
}

struct NullUplink;

#[async_trait::async_trait]
impl crate::measurement_sink::TelemetryUplink for NullUplink {
    async fn send(&self, _payload: Vec<u8>) -> Result<(), crate::http_handler::ResponseError> { Ok(()) }
}

#[test]
fn test_spatula_layout() {
    let config = crate::config::FlightConfig::default();
    let spatula = spatula::make_spatula(&config, std::sync::Arc::new(NullUplink)).unwrap();
    let rocket = &spatula.rocket;
    assert_eq!(rocket.len(), 13);
    assert_eq!(rocket.name(), "Spatula");

    let director = rocket.index_of(uuid::uuid!("37155a2c-c51d-41b7-9dae-67d640d8c284")).unwrap();
    assert_eq!(director, 11);
    assert_eq!(rocket.part(director).part_type(), "FlightDirector");

    let order = topological_order(rocket.dependency_graph());
    let slot = |idx: PartIndex| order.iter().position(|&o| o == idx).unwrap();
    for (idx, deps) in rocket.dependency_graph().iter().enumerate() {
        for &dep in deps {
            assert!(slot(dep) < slot(idx));
        }
    }
    assert!(!spatula.adapter.is_connected());

    let tester = rocket.index_of(uuid::uuid!("4f4534de-3a53-44ae-ada5-b7a0b0636e13")).unwrap();
    assert_eq!(rocket.part(tester).part_type(), "Tester");
    assert!(!rocket.part(tester).meta().is_enabled());

    let bench = crate::config::FlightConfig { hardware_test: true, ..crate::config::FlightConfig::default() };
    let bench_spatula = spatula::make_spatula(&bench, std::sync::Arc::new(NullUplink)).unwrap();
    assert!(bench_spatula.rocket.part(tester).meta().is_enabled());
}
