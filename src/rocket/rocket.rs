use super::part::{Part, PartIndex};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Error raised while assembling the part graph.
#[derive(Debug, PartialEq, Eq)]
pub enum RocketError {
    DuplicatePart(Uuid),
    UnknownDependency { part: Uuid, dependency: Uuid },
    TooManyParts,
}

impl fmt::Display for RocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RocketError::DuplicatePart(id) => write!(f, "part {id} registered twice"),
            RocketError::UnknownDependency { part, dependency } => {
                write!(f, "part {part} depends on unregistered part {dependency}")
            }
            RocketError::TooManyParts => {
                write!(f, "more than {} parts registered", Rocket::MAX_PARTS)
            }
        }
    }
}

impl std::error::Error for RocketError {}

/// Append-only arena of parts.
///
/// Indices are dense, start at 0 and follow registration order. Dependencies
/// have to be registered before their dependents, so they are stored as
/// arena indices and the graph can never form a cycle.
pub struct Rocket {
    id: Uuid,
    name: String,
    version: u32,
    parts: Vec<Box<dyn Part>>,
    by_uuid: HashMap<Uuid, PartIndex>,
    dependencies: Vec<Vec<PartIndex>>,
}

impl Rocket {
    /// Telemetry batches address parts with a single byte.
    pub const MAX_PARTS: usize = 256;

    pub fn new(id: Uuid, name: &str, version: u32) -> Self {
        Self {
            id,
            name: name.to_owned(),
            version,
            parts: Vec::new(),
            by_uuid: HashMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Registers a part and returns its index.
    ///
    /// # Errors
    /// Fails on duplicate UUIDs, unregistered dependencies, or once
    /// [`Rocket::MAX_PARTS`] parts exist.
    pub fn add_part(&mut self, part: Box<dyn Part>) -> Result<PartIndex, RocketError> {
        let id = part.meta().id();
        if self.by_uuid.contains_key(&id) {
            return Err(RocketError::DuplicatePart(id));
        }
        if self.parts.len() >= Self::MAX_PARTS {
            return Err(RocketError::TooManyParts);
        }
        let deps = part
            .meta()
            .dependencies()
            .iter()
            .map(|dep| {
                self.by_uuid
                    .get(dep)
                    .copied()
                    .ok_or(RocketError::UnknownDependency { part: id, dependency: *dep })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let index = self.parts.len();
        self.parts.push(part);
        self.by_uuid.insert(id, index);
        self.dependencies.push(deps);
        Ok(index)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn version(&self) -> u32 { self.version }
    pub fn len(&self) -> usize { self.parts.len() }
    pub fn is_empty(&self) -> bool { self.parts.is_empty() }

    pub fn index_of(&self, id: Uuid) -> Option<PartIndex> { self.by_uuid.get(&id).copied() }

    pub fn part(&self, index: PartIndex) -> &dyn Part { self.parts[index].as_ref() }

    pub fn part_mut(&mut self, index: PartIndex) -> &mut dyn Part { self.parts[index].as_mut() }

    pub fn parts(&self) -> impl Iterator<Item = (PartIndex, &dyn Part)> {
        self.parts.iter().enumerate().map(|(i, p)| (i, p.as_ref()))
    }

    /// Direct dependencies of every part, by index.
    pub fn dependency_graph(&self) -> &[Vec<PartIndex>] { &self.dependencies }
}
