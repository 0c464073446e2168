//! Upstream registry client.
//!
//! The [`Upstream`] trait abstracts over how the proxy talks to real
//! registries. [`HttpUpstream`] is the reqwest-backed implementation that
//! attaches the bearer token configured for each registry host.

use async_trait::async_trait;
use tandem_core::NpmConfig;
use url::Url;

use crate::error::{RegistryError, Result};

/// Media type of abbreviated ("corgi") packuments.
pub const INSTALL_V1: &str = "application/vnd.npm.install-v1+json";

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Abstract upstream registry.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// GET `url`, sending `accept` as the `Accept` header when given.
    ///
    /// Non-success statuses are returned, not turned into errors, so the
    /// proxy can forward them.
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<UpstreamResponse>;
}

/// Upstream access over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    npm: NpmConfig,
}

impl HttpUpstream {
    pub fn new(npm: NpmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tandem/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Upstream {
                url: npm.default_registry().to_string(),
                detail: e.to_string(),
            })?;
        Ok(HttpUpstream { client, npm })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<UpstreamResponse> {
        let parsed = Url::parse(url).map_err(|e| RegistryError::InvalidRegistry {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        let upstream_error = |e: reqwest::Error| RegistryError::Upstream {
            url: url.to_string(),
            detail: e.to_string(),
        };

        let mut request = self.client.get(parsed.clone());
        if let Some(accept) = accept {
            request = request.header(reqwest::header::ACCEPT, accept);
        }
        if let Some(token) = self.npm.token_for_url(&parsed) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(upstream_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await.map_err(upstream_error)?.to_vec();
        tracing::debug!("GET {url} -> {status}");
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_token_and_accept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/left-pad"))
            .and(header("authorization", "Bearer s3cret"))
            .and(header("accept", INSTALL_V1))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let host = Url::parse(&server.uri()).unwrap();
        let npmrc = format!(
            "//{}:{}/:_authToken=s3cret\n",
            host.host_str().unwrap(),
            host.port().unwrap()
        );
        let upstream = HttpUpstream::new(NpmConfig::parse_with(&npmrc, |_| None)).unwrap();
        let response = upstream
            .get(&format!("{}/left-pad", server.uri()), Some(INSTALL_V1))
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.body, b"{}");
    }

    #[tokio::test]
    async fn error_statuses_are_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(NpmConfig::default()).unwrap();
        let response = upstream
            .get(&format!("{}/nope", server.uri()), None)
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert_eq!(response.body, b"not found");
    }

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let upstream = HttpUpstream::new(NpmConfig::default()).unwrap();
        assert!(matches!(
            upstream.get("::not a url::", None).await,
            Err(RegistryError::InvalidRegistry { .. })
        ));
    }
}
