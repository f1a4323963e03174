use std::fs;
use std::path::Path;

use crate::http::config::{CaBundle, HttpConfig, ProxyConfig};
use crate::http_client::{HttpClient as ArmHttpClient, HttpClientError as ArmHttpClientError};
use http::{Request, Response};
use reqwest::blocking::{Client, Response as BlockingResponse};
use reqwest::tls::TlsInfo;
use reqwest::{Certificate, NoProxy, Proxy};
use tracing::debug;

/// Blocking reqwest client shared by the identity and resource manager calls. Only the
/// resource manager traffic goes through the configured proxy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a reqwest blocking client according to the provided configuration.
    pub fn new(config: HttpConfig) -> Result<Self, HttpBuildError> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_native_certs(true)
            .timeout(config.timeout)
            .connect_timeout(config.conn_timeout);

        builder = configure_proxy(builder, config.proxy.as_ref())?;

        let client = builder
            .build()
            .map_err(|err| HttpBuildError::ClientBuilder(err.to_string()))?;

        Ok(Self { client })
    }

    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpResponseError> {
        debug!(method = %request.method(), uri = %request.uri(), "sending request");
        let req = self
            .client
            .request(request.method().clone(), request.uri().to_string().as_str())
            .headers(request.headers().clone())
            .body(request.body().to_vec());

        let res = req
            .send()
            .map_err(|err| HttpResponseError::TransportError(err.to_string()))?;

        try_build_response(res)
    }
}

fn configure_proxy(
    builder: reqwest::blocking::ClientBuilder,
    proxy_config: Option<&ProxyConfig>,
) -> Result<reqwest::blocking::ClientBuilder, HttpBuildError> {
    let Some(proxy_config) = proxy_config else {
        // The proxy variables were already resolved into the config.
        return Ok(builder.no_proxy());
    };
    let proxy = Proxy::all(proxy_config.url().to_string())
        .map_err(|err| HttpBuildError::InvalidProxy(err.to_string()))?
        .no_proxy(NoProxy::from_string(&proxy_config.bypass_list()));
    debug!(proxy = %proxy_config.url(), bypass = %proxy_config.bypass_list(), "using proxy");

    let mut builder = builder.proxy(proxy);
    for certificate in ca_certificates(proxy_config.ca_bundle())? {
        builder = builder.add_root_certificate(certificate);
    }
    Ok(builder)
}

/// Reads the extra root certificates: the bundle file plus every `.pem` file inside the bundle
/// directory.
fn ca_certificates(ca_bundle: &CaBundle) -> Result<Vec<Certificate>, HttpBuildError> {
    let mut certificates = Vec::new();

    if let Some(file) = &ca_bundle.file {
        certificates.extend(read_pem_bundle(file)?);
    }

    if let Some(dir) = &ca_bundle.dir {
        let entries = fs::read_dir(dir).map_err(|err| {
            HttpBuildError::CertificateBundle(dir.display().to_string(), err.to_string())
        })?;
        for entry in entries {
            let path = entry
                .map_err(|err| {
                    HttpBuildError::CertificateBundle(dir.display().to_string(), err.to_string())
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "pem") {
                certificates.extend(read_pem_bundle(&path)?);
            }
        }
    }

    Ok(certificates)
}

fn read_pem_bundle(path: &Path) -> Result<Vec<Certificate>, HttpBuildError> {
    let pem = fs::read(path).map_err(|err| {
        HttpBuildError::CertificateBundle(path.display().to_string(), err.to_string())
    })?;
    Certificate::from_pem_bundle(&pem)
        .map_err(|err| HttpBuildError::CertificateBundle(path.display().to_string(), err.to_string()))
}

/// Helper to build a [Response<Vec<u8>>] from a reqwest's blocking response.
/// Status, version, headers and body are kept: long running operations are driven by headers.
fn try_build_response(res: BlockingResponse) -> Result<Response<Vec<u8>>, HttpResponseError> {
    let status = res.status();
    let version = res.version();
    let headers = res.headers().clone();

    let tls_info = res.extensions().get::<TlsInfo>().cloned();

    let body: Vec<u8> = res
        .bytes()
        .map_err(|err| HttpResponseError::ReadingResponse(err.to_string()))?
        .into();

    let mut response_builder = Response::builder().status(status).version(version);
    if let Some(response_headers) = response_builder.headers_mut() {
        response_headers.extend(headers);
    }

    let response_builder = if let Some(tls_info) = tls_info {
        response_builder.extension(tls_info)
    } else {
        response_builder
    };

    response_builder
        .body(body)
        .map_err(|err| HttpResponseError::BuildingResponse(err.to_string()))
}

impl ArmHttpClient for HttpClient {
    fn send(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, ArmHttpClientError> {
        let response = self.send(req)?;

        Ok(response)
    }
}

impl From<HttpResponseError> for ArmHttpClientError {
    fn from(err: HttpResponseError) -> Self {
        match err {
            HttpResponseError::TransportError(msg) => ArmHttpClientError::TransportError(msg),
            HttpResponseError::BuildingResponse(msg) | HttpResponseError::ReadingResponse(msg) => {
                ArmHttpClientError::InvalidResponse(msg)
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HttpBuildError {
    #[error("could not build the http client: {0}")]
    ClientBuilder(String),
    #[error("invalid proxy configuration: {0}")]
    InvalidProxy(String),
    #[error("could not load certificates from `{0}`: {1}")]
    CertificateBundle(String, String),
}

#[derive(thiserror::Error, Debug)]
enum HttpResponseError {
    #[error("could read response body: {0}")]
    ReadingResponse(String),
    #[error("could build response: {0}")]
    BuildingResponse(String),
    #[error("http transport error: `{0}`")]
    TransportError(String),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use http::header::{CONTENT_TYPE, LOCATION};
    use httpmock::{Method::PUT, MockServer};

    use super::*;

    fn client(timeout: Duration) -> HttpClient {
        HttpClient::new(HttpConfig::new(timeout, timeout)).unwrap()
    }

    #[test]
    fn forwards_method_headers_and_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/resource")
                .header("content-type", "application/json")
                .body(r#"{"location":"westus"}"#);
            then.status(202)
                .header("location", "http://localhost/operation/1")
                .body("accepted");
        });

        let request = Request::put(server.url("/resource"))
            .header(CONTENT_TYPE, "application/json")
            .body(br#"{"location":"westus"}"#.to_vec())
            .unwrap();

        let response = ArmHttpClient::send(&client(Duration::from_secs(1)), request).unwrap();

        assert_eq!(response.status(), 202);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "http://localhost/operation/1"
        );
        assert_eq!(response.body(), b"accepted");
        mock.assert();
    }

    #[test]
    fn timeout_is_a_transport_error() {
        let timeout = Duration::from_millis(50);
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT).path("/slow");
            then.status(200)
                .delay(timeout.saturating_add(Duration::from_millis(100)));
        });

        let request = Request::put(server.url("/slow")).body(Vec::new()).unwrap();
        let error = ArmHttpClient::send(&client(timeout), request).unwrap_err();

        assert_matches!(error, ArmHttpClientError::TransportError(_));
        mock.assert();
    }

    #[test]
    fn unreadable_ca_bundle_fails_the_build() {
        let proxy = ProxyConfig::new("http://localhost:3128")
            .unwrap()
            .with_ca_bundle(CaBundle {
                file: Some("/this/path/does/not/exist.pem".into()),
                dir: None,
            });

        let error = HttpClient::new(
            HttpConfig::new(Duration::from_secs(1), Duration::from_secs(1)).with_proxy(proxy),
        )
        .unwrap_err();

        assert_matches!(error, HttpBuildError::CertificateBundle(path, _) => {
            assert_eq!(path, "/this/path/does/not/exist.pem");
        });
    }

    #[test]
    fn loopback_requests_skip_an_unreachable_proxy() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT).path("/resource");
            then.status(200);
        });
        // Nothing listens on the discard port.
        let proxy = ProxyConfig::new("http://127.0.0.1:9").unwrap();
        let client = HttpClient::new(
            HttpConfig::new(Duration::from_secs(1), Duration::from_secs(1)).with_proxy(proxy),
        )
        .unwrap();

        let request = Request::put(server.url("/resource")).body(Vec::new()).unwrap();
        let response = ArmHttpClient::send(&client, request).unwrap();

        assert_eq!(response.status(), 200);
        mock.assert();
    }

    #[test]
    fn other_hosts_go_through_the_proxy() {
        let proxy_server = MockServer::start();
        let mock = proxy_server.mock(|when, then| {
            when.method(PUT).path("/resource");
            then.status(200).body("via proxy");
        });
        let proxy = ProxyConfig::new(&proxy_server.base_url()).unwrap();
        let client = HttpClient::new(
            HttpConfig::new(Duration::from_secs(1), Duration::from_secs(1)).with_proxy(proxy),
        )
        .unwrap();

        // The host does not resolve, only the proxy can answer.
        let request = Request::put("http://management.example.invalid/resource")
            .body(Vec::new())
            .unwrap();
        let response = ArmHttpClient::send(&client, request).unwrap();

        assert_eq!(response.body(), b"via proxy");
        mock.assert();
    }
}
