use super::Rocket;
use crate::command::CommandKind;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Registration document describing the vessel and its parts.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VesselDescriptor {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "_version")]
    pub version: u32,
    pub name: String,
    pub parts: Vec<VesselPartDescriptor>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VesselPartDescriptor {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub part_type: String,
    #[serde(rename = "virtual")]
    pub virtual_part: bool,
    pub parent: Option<Uuid>,
}

/// Column of a part's measurement shape as the server sees it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FlightMeasurementDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub format: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub supporting_parts: Vec<Uuid>,
}

/// Flight creation document. `measured_part_ids` is ordered by part index,
/// which is how telemetry batches refer to parts.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FlightDescriptor {
    #[serde(rename = "_vessel_id")]
    pub vessel_id: Uuid,
    #[serde(rename = "_vessel_version")]
    pub vessel_version: u32,
    pub name: String,
    pub start: DateTime<Utc>,
    pub measured_parts: BTreeMap<Uuid, Vec<FlightMeasurementDescriptor>>,
    pub measured_part_ids: Vec<Uuid>,
    pub available_commands: BTreeMap<String, CommandInfo>,
}

impl Rocket {
    /// Builds the registration payloads for this rocket.
    pub fn to_vessel_and_flight(&self, now: DateTime<Utc>) -> (VesselDescriptor, FlightDescriptor) {
        let parts = self
            .parts()
            .map(|(_, p)| VesselPartDescriptor {
                id: p.meta().id(),
                name: p.meta().name().to_owned(),
                part_type: p.part_type().to_owned(),
                virtual_part: p.meta().is_virtual(),
                parent: p.meta().parent(),
            })
            .collect();
        let vessel =
            VesselDescriptor { id: self.id(), version: self.version(), name: self.name().to_owned(), parts };

        let measured_parts = self
            .parts()
            .map(|(_, p)| {
                let shape = p
                    .measurement_shape()
                    .iter()
                    .map(|f| FlightMeasurementDescriptor {
                        name: f.name.to_owned(),
                        format: f.format.descriptor(),
                    })
                    .collect();
                (p.meta().id(), shape)
            })
            .collect();
        let available_commands = self
            .parts()
            .flat_map(|(_, p)| p.accepted_commands().iter().map(move |k| (*k, p.meta().id())))
            .filter(|(k, _)| *k != CommandKind::Unknown)
            .into_group_map()
            .into_iter()
            .map(|(kind, supporting_parts)| (kind.to_string(), CommandInfo { supporting_parts }))
            .collect();

        let flight = FlightDescriptor {
            vessel_id: self.id(),
            vessel_version: self.version(),
            name: format!("Flight at {}", now.to_rfc3339()),
            start: now,
            measured_parts,
            measured_part_ids: self.parts().map(|(_, p)| p.meta().id()).collect(),
            available_commands,
        };
        (vessel, flight)
    }
}
