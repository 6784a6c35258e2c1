use super::response_common::SerdeJSONBodyHTTPResponseType;
use uuid::Uuid;

#[derive(serde::Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct FlightCreateResponse {
    #[serde(rename = "_id")]
    id: Uuid,
    #[serde(default)]
    name: String,
}

impl FlightCreateResponse {
    pub(crate) fn id(&self) -> Uuid { self.id }
    pub(crate) fn name(&self) -> &str { &self.name }
}

impl SerdeJSONBodyHTTPResponseType for FlightCreateResponse {}
