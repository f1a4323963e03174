use http::header::CONTENT_TYPE;
use http::{Method, Request};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;
use url::form_urlencoded;

use crate::config::{IdentityEndpoint, IdentitySelector};
use crate::http_client::HttpClient;
use crate::token::AccessToken;

/// API version of the instance metadata identity endpoint.
pub const IMDS_API_VERSION: &str = "2018-02-01";
/// The identity endpoints only answer requests carrying this header.
const METADATA_HEADER: &str = "Metadata";

#[derive(Error, Debug)]
pub enum AuthenticateError {
    #[error("unable to build request: `{0}`")]
    RequestError(String),
    #[error("unable to deserialize token: `{0}`")]
    DeserializeError(String),
    #[error("identity endpoint error: Status code: `{0}`, Reason: `{1}`")]
    HttpResponseError(u16, String),
    #[error("http transport error: `{0}`")]
    HttpTransportError(String),
}

pub trait Authenticator {
    fn authenticate(
        &self,
        req: TokenRetrievalRequest,
    ) -> Result<TokenRetrievalResponse, AuthenticateError>;
}

/// The Authenticator is responsible for obtaining a token from the managed identity endpoint.
pub struct HttpAuthenticator<C> {
    /// HTTP client
    http_client: C,
    /// Managed identity endpoint
    endpoint: IdentityEndpoint,
}

impl<C> HttpAuthenticator<C> {
    pub fn new(http_client: C, endpoint: IdentityEndpoint) -> Self {
        Self {
            http_client,
            endpoint,
        }
    }

    /// The VM extension takes the parameters as a form encoded POST, while the instance
    /// metadata service wants a GET with the very same parameters in the query string.
    fn build_request(&self, req: &TokenRetrievalRequest) -> Result<Request<Vec<u8>>, AuthenticateError> {
        let mut params = form_urlencoded::Serializer::new(String::new());
        if matches!(self.endpoint, IdentityEndpoint::InstanceMetadata) {
            params.append_pair("api-version", IMDS_API_VERSION);
        }
        params.append_pair("resource", &req.resource);
        if let Some((name, value)) = req.selector.as_param() {
            params.append_pair(name, value);
        }
        let params = params.finish();

        let uri = self.endpoint.token_uri();
        let builder = Request::builder().header(METADATA_HEADER, "true");
        let request = match self.endpoint {
            IdentityEndpoint::InstanceMetadata => builder
                .method(Method::GET)
                .uri(format!("{uri}?{params}"))
                .body(Vec::new()),
            IdentityEndpoint::Local { .. } | IdentityEndpoint::Custom(_) => builder
                .method(Method::POST)
                .uri(uri)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(params.into_bytes()),
        };

        request.map_err(|e| AuthenticateError::RequestError(e.to_string()))
    }
}

impl<C> Authenticator for HttpAuthenticator<C>
where
    C: HttpClient,
{
    /// Requests a token for `req.resource` and decodes the endpoint `Response`.
    fn authenticate(
        &self,
        req: TokenRetrievalRequest,
    ) -> Result<TokenRetrievalResponse, AuthenticateError> {
        debug!(selector = %req.selector, endpoint = ?self.endpoint, "requesting managed identity token");
        let request = self.build_request(&req)?;

        let response = self
            .http_client
            .send(request)
            .map_err(|e| AuthenticateError::HttpTransportError(e.to_string()))?;

        let body = String::from_utf8(response.body().clone()).map_err(|e| {
            AuthenticateError::DeserializeError(format!("invalid utf8 response: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(AuthenticateError::HttpResponseError(
                response.status().as_u16(),
                body,
            ));
        }

        serde_json::from_str(body.as_str())
            .map_err(|e| AuthenticateError::DeserializeError(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenRetrievalRequest {
    /// Audience of the requested token.
    pub resource: String,
    pub selector: IdentitySelector,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenRetrievalResponse {
    pub access_token: AccessToken,
    pub token_type: String,
    /// Expiration of the access token as seconds since the epoch.
    #[serde(deserialize_with = "seconds_from_str_or_number")]
    pub expires_on: u64,
    /// The lifetime in seconds of the access token.
    #[serde(
        default,
        deserialize_with = "optional_seconds_from_str_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

/// Identity endpoints send numeric fields as JSON strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(u64),
    Text(String),
}

impl Seconds {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            Seconds::Number(n) => Ok(n),
            Seconds::Text(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

fn seconds_from_str_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Seconds::deserialize(deserializer)?.into_u64()
}

fn optional_seconds_from_str_or_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Seconds>::deserialize(deserializer)?
        .map(Seconds::into_u64)
        .transpose()
}
