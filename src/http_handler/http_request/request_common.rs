use super::super::http_response::response_common::HTTPResponseType;

/// HTTP verbs used by the flight-management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HTTPRequestMethod {
    Get,
    Post,
    Put,
}

pub(crate) trait HTTPRequestType {
    /// Type of the expected response.
    type Response: HTTPResponseType;
    /// Path below the base URL, starting with `/`.
    fn endpoint(&self) -> String;
    /// The corresponding HTTP Request Method.
    fn request_method(&self) -> HTTPRequestMethod;
}

pub(crate) trait JSONBodyHTTPRequestType: HTTPRequestType {
    /// The type of the json body.
    type Body: serde::Serialize + ?Sized;
    /// Returns the serializable object.
    fn body(&self) -> &Self::Body;
}

pub(crate) trait BinaryBodyHTTPRequestType: HTTPRequestType {
    fn into_body(self) -> Vec<u8>;
}
