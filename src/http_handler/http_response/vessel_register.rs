use super::response_common::SerdeJSONBodyHTTPResponseType;
use uuid::Uuid;

/// The registered vessel as stored by the server.
#[derive(serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VesselRegisterResponse {
    #[serde(rename = "_id")]
    id: Uuid,
    /// Bumped by the server whenever the part list changed.
    #[serde(rename = "_version")]
    version: u32,
}

impl VesselRegisterResponse {
    pub(crate) fn id(&self) -> Uuid { self.id }
    pub(crate) fn version(&self) -> u32 { self.version }
}

impl SerdeJSONBodyHTTPResponseType for VesselRegisterResponse {}
