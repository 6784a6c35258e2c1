use super::http_request::request_common::{
    BinaryBodyHTTPRequestType, HTTPRequestMethod, HTTPRequestType, JSONBodyHTTPRequestType,
};
use super::http_response::response_common::{HTTPResponseType, ResponseError, unwrap_return_code};
use std::time::Duration;

/// A thin wrapper around `reqwest::Client` bound to the flight-management
/// server's base URL.
///
/// Plain requests carry [`HTTPClient::REQUEST_TIMEOUT`]. The command stream
/// is long-lived, so the timeout is set per request and not on the client.
#[derive(Debug, Clone)]
pub(crate) struct HTTPClient {
    /// The underlying `reqwest::Client` used to perform HTTP requests.
    client: reqwest::Client,
    /// Base URL for the API, prepended to all endpoint paths.
    base_url: String,
}

impl HTTPClient {
    pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Constructs a new `HTTPClient` for `base_url`.
    ///
    /// # Errors
    /// Fails if the TLS backend or resolver cannot be initialised.
    pub(crate) fn new(base_url: &str) -> Result<HTTPClient, ResponseError> {
        Ok(HTTPClient {
            client: reqwest::Client::builder().build()?,
            base_url: String::from(base_url.trim_end_matches('/')),
        })
    }

    pub(super) fn client(&self) -> &reqwest::Client { &self.client }

    /// Returns the base URL that the client was initialized with.
    pub(crate) fn url(&self) -> &str { self.base_url.as_str() }

    fn compose(&self, method: HTTPRequestMethod, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{endpoint}", self.base_url);
        match method {
            HTTPRequestMethod::Get => self.client.get(url),
            HTTPRequestMethod::Post => self.client.post(url),
            HTTPRequestMethod::Put => self.client.put(url),
        }
    }

    /// Sends `request` with its JSON body and parses the answer.
    pub(crate) async fn send_json<T: JSONBodyHTTPRequestType>(
        &self,
        request: &T,
    ) -> Result<T::Response, ResponseError> {
        let response = self
            .compose(request.request_method(), &request.endpoint())
            .timeout(Self::REQUEST_TIMEOUT)
            .json(request.body())
            .send()
            .await?;
        let bytes = unwrap_return_code(response).await?.bytes().await?;
        T::Response::parse(&bytes)
    }

    /// Sends `request` as `application/octet-stream`. No client side timeout
    /// is applied, callers bound the whole exchange themselves.
    pub(crate) async fn send_binary<T: BinaryBodyHTTPRequestType>(
        &self,
        request: T,
    ) -> Result<T::Response, ResponseError> {
        let builder = self
            .compose(request.request_method(), &request.endpoint())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream");
        let response = builder.body(request.into_body()).send().await?;
        let bytes = unwrap_return_code(response).await?.bytes().await?;
        T::Response::parse(&bytes)
    }
}
