use std::fmt;

/// Decodes the body of a successful response.
pub(crate) trait HTTPResponseType: Sized {
    fn parse(body: &[u8]) -> Result<Self, ResponseError>;
}

/// Marker for responses that are plain `serde` JSON documents.
pub(crate) trait SerdeJSONBodyHTTPResponseType {}

impl<T> HTTPResponseType for T
where
    T: SerdeJSONBodyHTTPResponseType,
    for<'de> T: serde::Deserialize<'de>,
{
    fn parse(body: &[u8]) -> Result<Self, ResponseError> { Ok(serde_json::from_slice(body)?) }
}

/// Response of endpoints that only acknowledge, the body is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NoBodyResponse;

impl HTTPResponseType for NoBodyResponse {
    fn parse(_body: &[u8]) -> Result<Self, ResponseError> { Ok(NoBodyResponse) }
}

/// Maps a non-2xx status onto a [`ResponseError`].
pub(crate) async fn unwrap_return_code(
    response: reqwest::Response,
) -> Result<reqwest::Response, ResponseError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status.is_server_error() {
        Err(ResponseError::InternalServer)
    } else if status.is_client_error() {
        Err(ResponseError::BadRequest(response.text().await.unwrap_or_default()))
    } else {
        Err(ResponseError::Unknown)
    }
}

#[derive(Debug)]
pub enum ResponseError {
    InternalServer,
    /// Client error, carrying the server's explanation.
    BadRequest(String),
    NoConnection,
    Timeout,
    /// The body did not match the expected document.
    Malformed(String),
    Unknown,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseError::InternalServer => write!(f, "internal server error"),
            ResponseError::BadRequest(detail) => write!(f, "bad request: {detail}"),
            ResponseError::NoConnection => write!(f, "no connection to server"),
            ResponseError::Timeout => write!(f, "request timed out"),
            ResponseError::Malformed(detail) => write!(f, "malformed response: {detail}"),
            ResponseError::Unknown => write!(f, "unknown error"),
        }
    }
}

impl std::error::Error for ResponseError {}

impl From<reqwest::Error> for ResponseError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            ResponseError::Timeout
        } else if value.is_connect() {
            ResponseError::NoConnection
        } else if value.is_request() || value.is_builder() {
            ResponseError::BadRequest(value.to_string())
        } else if value.is_decode() || value.is_body() {
            ResponseError::Malformed(value.to_string())
        } else {
            ResponseError::Unknown
        }
    }
}

impl From<serde_json::Error> for ResponseError {
    fn from(value: serde_json::Error) -> Self { ResponseError::Malformed(value.to_string()) }
}
