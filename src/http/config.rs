//! Timeouts and proxy settings of the reqwest client.

use std::env::{self, VarError};
use std::path::PathBuf;
use std::time::Duration;

use http::Uri;

/// Requests to the identity endpoint and the resource manager are short. Anything slower
/// than this is considered a transport failure.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HTTP_CONN_TIMEOUT: Duration = Duration::from_secs(5);

/// Hosts serving managed identity tokens. They are only reachable from the machine itself, so
/// they are never sent through a proxy.
pub const IDENTITY_ENDPOINT_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "::1", "169.254.169.254"];

const PROXY_ENV_NAMES: [&str; 4] = ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"];
const NO_PROXY_ENV_NAMES: [&str; 2] = ["NO_PROXY", "no_proxy"];

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub(crate) timeout: Duration,
    pub(crate) conn_timeout: Duration,
    /// `None` connects directly, whatever the process environment says.
    pub(crate) proxy: Option<ProxyConfig>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_TIMEOUT, DEFAULT_HTTP_CONN_TIMEOUT)
    }
}

impl HttpConfig {
    pub fn new(timeout: Duration, conn_timeout: Duration) -> Self {
        Self {
            timeout,
            conn_timeout,
            proxy: None,
        }
    }

    pub fn with_proxy(self, proxy: ProxyConfig) -> Self {
        Self {
            proxy: Some(proxy),
            ..self
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("invalid proxy url `{0}`: `{1}`")]
    InvalidUrl(String, String),
    #[error("a proxy CA bundle was given but no proxy url is configured")]
    CaBundleWithoutProxy,
}

/// Extra root certificates, in PEM format, trusted when talking through the proxy.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct CaBundle {
    pub file: Option<PathBuf>,
    /// Every `.pem` file inside is read.
    pub dir: Option<PathBuf>,
}

impl CaBundle {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.dir.is_none()
    }
}

/// Forward proxy for the resource manager traffic.
///
/// The identity endpoint hosts are always part of the bypass list, `NO_PROXY` entries are
/// added on top of them.
#[derive(Debug, PartialEq, Clone)]
pub struct ProxyConfig {
    url: Uri,
    bypass: Vec<String>,
    ca_bundle: CaBundle,
}

impl ProxyConfig {
    pub fn new(url: &str) -> Result<Self, ProxyError> {
        let uri = url
            .parse::<Uri>()
            .map_err(|err| ProxyError::InvalidUrl(url.to_string(), err.to_string()))?;
        if uri.host().is_none() {
            return Err(ProxyError::InvalidUrl(
                url.to_string(),
                "missing host".to_string(),
            ));
        }
        Ok(Self {
            url: uri,
            bypass: IDENTITY_ENDPOINT_HOSTS.map(String::from).to_vec(),
            ca_bundle: CaBundle::default(),
        })
    }

    /// Adds hosts reached without the proxy. Blank and repeated entries are skipped.
    pub fn with_bypass<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for host in hosts {
            let host = host.as_ref().trim();
            if !host.is_empty() && !self.bypass.iter().any(|known| known == host) {
                self.bypass.push(host.to_string());
            }
        }
        self
    }

    pub fn with_ca_bundle(self, ca_bundle: CaBundle) -> Self {
        Self { ca_bundle, ..self }
    }

    pub fn url(&self) -> &Uri {
        &self.url
    }

    pub fn ca_bundle(&self) -> &CaBundle {
        &self.ca_bundle
    }

    /// The bypass hosts in the comma separated `NO_PROXY` format.
    pub fn bypass_list(&self) -> String {
        self.bypass.join(",")
    }

    /// Proxy at `url` or, when it is not given, at the first of `HTTPS_PROXY` and `HTTP_PROXY`
    /// set in the environment. `Ok(None)` means no proxy at all.
    pub fn resolve(url: Option<&str>) -> Result<Option<Self>, ProxyError> {
        Self::resolve_with(url, env::var)
    }

    pub(crate) fn resolve_with<F>(url: Option<&str>, env_var: F) -> Result<Option<Self>, ProxyError>
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        let set = |name| env_var(name).ok().filter(|value| !value.trim().is_empty());

        let Some(url) = url
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .or_else(|| PROXY_ENV_NAMES.into_iter().find_map(set))
        else {
            return Ok(None);
        };

        let no_proxy: Vec<String> = NO_PROXY_ENV_NAMES
            .into_iter()
            .filter_map(set)
            .flat_map(|value| value.split(',').map(str::to_string).collect::<Vec<_>>())
            .collect();

        Ok(Some(Self::new(&url)?.with_bypass(no_proxy)))
    }
}
