use std::thread;
use std::time::Duration;

use http::{
    HeaderValue, Method, Request, Response, StatusCode, Uri,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::{environment::AzureEnvironment, http_client::HttpClient, token::Token};

use super::{
    GenericResource, ResourceClient, ResourceDescriptor,
    error::ResourceClientError,
    long_running::{OperationState, OperationStatus, PollTarget, PollingPolicy},
};

/// Lets the resource manager correlate requests in its own logs.
const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Implementation of the ResourceClient trait for a generic HTTP client, talking to the
/// resource manager of the given environment.
pub struct HttpResourceClient<C>
where
    C: HttpClient,
{
    http_client: C,
    subscription_id: String,
    resource_manager_endpoint: Uri,
    polling: PollingPolicy,
}

impl<C> HttpResourceClient<C>
where
    C: HttpClient,
{
    pub fn new(http_client: C, subscription_id: String, environment: &AzureEnvironment) -> Self {
        Self {
            http_client,
            subscription_id,
            resource_manager_endpoint: environment.resource_manager_endpoint(),
            polling: PollingPolicy::default(),
        }
    }

    pub fn with_polling(self, polling: PollingPolicy) -> Self {
        Self { polling, ..self }
    }

    fn resource_uri(&self, descriptor: &ResourceDescriptor) -> Result<Uri, ResourceClientError> {
        let mut url = Url::parse(&self.resource_manager_endpoint.to_string())
            .map_err(|e| ResourceClientError::Encoder(format!("invalid resource manager url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| {
                ResourceClientError::Encoder("resource manager url cannot be a base".to_string())
            })?
            .pop_if_empty()
            .push("subscriptions")
            .push(&self.subscription_id)
            .extend(descriptor.path_segments());
        url.query_pairs_mut()
            .append_pair("api-version", &descriptor.api_version);

        url.as_str()
            .parse::<Uri>()
            .map_err(|e| ResourceClientError::Encoder(format!("invalid resource url: {e}")))
    }

    fn build_request(
        method: Method,
        uri: &Uri,
        token: &Token,
        json_body: Option<Vec<u8>>,
    ) -> Result<Request<Vec<u8>>, ResourceClientError> {
        let mut bearer_token_header = HeaderValue::from_str(&token.authorization_value())
            .map_err(|_| {
                ResourceClientError::Encoder(
                    "invalid HTTP header value set for Authorization".to_string(),
                )
            })?;
        bearer_token_header.set_sensitive(true);

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, bearer_token_header)
            .header(ACCEPT, "application/json")
            .header(CLIENT_REQUEST_ID_HEADER, Uuid::now_v7().to_string());
        if json_body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }

        builder
            .body(json_body.unwrap_or_default())
            .map_err(|e| ResourceClientError::Encoder(format!("Failed to build request: {e}")))
    }

    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, ResourceClientError> {
        self.http_client
            .send(request)
            .map_err(|e| ResourceClientError::Transport(e.to_string()))
    }

    fn get(&self, token: &Token, uri: &Uri) -> Result<Response<Vec<u8>>, ResourceClientError> {
        let response = self.send(Self::build_request(Method::GET, uri, token, None)?)?;
        if !response.status().is_success() {
            return Err(ResourceClientError::from_response(
                response.status().as_u16(),
                response.body(),
            ));
        }
        Ok(response)
    }

    /// Polls `target` until the operation is over. Returns the final answer when the
    /// operation was tracked through its `Location`, since that answer may hold the result.
    fn wait_for_completion(
        &self,
        token: &Token,
        target: PollTarget,
        first_delay: Duration,
    ) -> Result<Option<Response<Vec<u8>>>, ResourceClientError> {
        let mut delay = first_delay;
        for poll in 1..=self.polling.max_polls {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            debug!(poll, uri = %target.uri(), "polling long running operation");
            let response = self.get(token, target.uri())?;

            match &target {
                PollTarget::AsyncOperation(_) => {
                    let operation: OperationStatus = serde_json::from_slice(response.body())
                        .map_err(|e| {
                            ResourceClientError::Decoder(format!(
                                "Failed to decode operation status: {e}. Response body: {}",
                                String::from_utf8_lossy(response.body())
                            ))
                        })?;
                    if operation.state()? == OperationState::Succeeded {
                        return Ok(None);
                    }
                }
                PollTarget::Location(_) => {
                    if response.status() != StatusCode::ACCEPTED {
                        return Ok(Some(response));
                    }
                }
            }

            delay = self.polling.delay(response.headers());
        }

        Err(ResourceClientError::PollingExhausted(self.polling.max_polls))
    }

    /// Waits for the operation started by `response` if it is a long running one.
    fn complete(
        &self,
        token: &Token,
        response: Response<Vec<u8>>,
    ) -> Result<Option<Response<Vec<u8>>>, ResourceClientError> {
        if !matches!(response.status(), StatusCode::CREATED | StatusCode::ACCEPTED) {
            return Ok(Some(response));
        }
        match PollTarget::from_headers(response.headers())? {
            Some(target) => {
                let delay = self.polling.delay(response.headers());
                self.wait_for_completion(token, target, delay)
            }
            None => Ok(Some(response)),
        }
    }
}

fn decode_resource(body: &[u8]) -> Result<GenericResource, ResourceClientError> {
    serde_json::from_slice(body).map_err(|e| {
        ResourceClientError::Decoder(format!(
            "Failed to decode JSON response for resource: {e}. Response body: {}",
            String::from_utf8_lossy(body)
        ))
    })
}

impl<C> ResourceClient for HttpResourceClient<C>
where
    C: HttpClient,
{
    fn create_or_update(
        &self,
        token: &Token,
        descriptor: &ResourceDescriptor,
        resource: &GenericResource,
    ) -> Result<GenericResource, ResourceClientError> {
        let uri = self.resource_uri(descriptor)?;
        let json_body = serde_json::to_vec(resource)
            .map_err(|e| ResourceClientError::Encoder(format!("Failed to encode JSON: {e}")))?;

        info!(%descriptor, "creating or updating resource");
        let response = self.send(Self::build_request(
            Method::PUT,
            &uri,
            token,
            Some(json_body),
        )?)?;
        if !response.status().is_success() {
            return Err(ResourceClientError::from_response(
                response.status().as_u16(),
                response.body(),
            ));
        }

        // Without a usable body the resource is read back once the operation is over.
        let response = match self.complete(token, response)? {
            Some(done) if !done.body().is_empty() => done,
            _ => self.get(token, &uri)?,
        };

        decode_resource(response.body())
    }

    fn delete(
        &self,
        token: &Token,
        descriptor: &ResourceDescriptor,
    ) -> Result<(), ResourceClientError> {
        let uri = self.resource_uri(descriptor)?;

        info!(%descriptor, "deleting resource");
        let response = self.send(Self::build_request(Method::DELETE, &uri, token, None)?)?;
        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
                self.complete(token, response)?;
                Ok(())
            }
            status => Err(ResourceClientError::from_response(
                status.as_u16(),
                response.body(),
            )),
        }
    }
}
