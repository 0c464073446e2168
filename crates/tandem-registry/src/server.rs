//! The local registry proxy.
//!
//! Serves the part of the npm registry protocol that `npm install` needs:
//!
//! - `GET /{package}`, `GET /{org}/{package}`: packuments. Local modules get
//!   a synthesized single-version document, everything else is fetched
//!   from the upstream registry with tarball URLs rewritten to come back
//!   here.
//! - `GET /tarballs/{package}`, `GET /tarballs/{org}/{package}`: tarballs.
//!   Local modules are packed on demand; upstream tarballs are served from
//!   the cache or fetched and cached.
//!
//! Upstream error statuses are forwarded with their body so npm's own retry
//! logic applies. Local failures answer 500.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tandem_core::{ModuleName, PackageManifest, Workspace};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::cache::TarballCache;
use crate::client::{Upstream, UpstreamResponse};
use crate::error::{RegistryError, Result};
use crate::packager::Packager;
use crate::packument::{
    is_forwardable_header, is_packument_type, local_packument, negotiate, rewrite_tarball_urls,
};
use crate::paths::{local_tarball_url, registry_metadata_url};

/// Everything a request handler needs.
pub struct Proxy {
    workspace: Arc<Workspace>,
    packager: Packager,
    cache: TarballCache,
    upstream: Arc<dyn Upstream>,
}

impl Proxy {
    pub fn new(
        workspace: Arc<Workspace>,
        packager: Packager,
        cache: TarballCache,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Proxy {
            workspace,
            packager,
            cache,
            upstream,
        }
    }

    /// Bind `127.0.0.1:port` (0 picks a free port) and serve in the
    /// background until [`ProxyServer::stop`].
    pub async fn start(self, port: u16) -> Result<ProxyServer> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        let address = listener.local_addr()?;
        let url = format!("http://{address}");

        let state = Arc::new(ProxyState {
            proxy: self,
            url: url.clone(),
        });
        let router = router(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!("registry proxy failed: {e}");
            }
        });

        tracing::info!("registry proxy listening on {url}");
        Ok(ProxyServer {
            url,
            shutdown: Some(shutdown_tx),
            handle,
        })
    }
}

/// A running proxy.
pub struct ProxyServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ProxyServer {
    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!("registry proxy task ended abnormally: {e}");
        }
        tracing::debug!("registry proxy on {} stopped", self.url);
    }
}

struct ProxyState {
    proxy: Proxy,
    url: String,
}

type SharedState = Arc<ProxyState>;

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/tarballs/{package}", get(tarball))
        .route("/tarballs/{org}/{package}", get(scoped_tarball))
        .route("/{package}", get(metadata))
        .route("/{org}/{package}", get(scoped_metadata))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct TarballQuery {
    #[serde(default)]
    url: Option<String>,
}

async fn metadata(
    State(state): State<SharedState>,
    UrlPath(package): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    serve_metadata(&state, &package, &headers).await
}

async fn scoped_metadata(
    State(state): State<SharedState>,
    UrlPath((org, package)): UrlPath<(String, String)>,
    headers: HeaderMap,
) -> Response {
    serve_metadata(&state, &format!("{org}/{package}"), &headers).await
}

async fn tarball(
    State(state): State<SharedState>,
    UrlPath(package): UrlPath<String>,
    Query(query): Query<TarballQuery>,
) -> Response {
    serve_tarball(&state, &package, query).await
}

async fn scoped_tarball(
    State(state): State<SharedState>,
    UrlPath((org, package)): UrlPath<(String, String)>,
    Query(query): Query<TarballQuery>,
) -> Response {
    serve_tarball(&state, &format!("{org}/{package}"), query).await
}

async fn serve_metadata(state: &ProxyState, name: &str, headers: &HeaderMap) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    let result = match state.proxy.workspace.module(name) {
        Some(module) => local_metadata(state, module.name(), module.path(), accept),
        None => upstream_metadata(state, name, accept).await,
    };
    result.unwrap_or_else(|e| internal_error(name, e))
}

fn local_metadata(
    state: &ProxyState,
    name: &ModuleName,
    path: &Path,
    accept: Option<&str>,
) -> Result<Response> {
    let manifest = PackageManifest::load(path)?;
    let version = manifest.require_version(path)?;
    let tarball_url = local_tarball_url(&state.url, name);
    let doc = local_packument(name, version, &manifest, &tarball_url);
    tracing::debug!("serving local packument {name}@{version}");
    json_response(StatusCode::OK, negotiate(accept), serde_json::to_vec(&doc)?)
}

async fn upstream_metadata(state: &ProxyState, name: &str, accept: Option<&str>) -> Result<Response> {
    let npm = state.proxy.workspace.npm();
    let registry = match ModuleName::parse(name) {
        Ok(parsed) => npm.registry_for(&parsed),
        Err(_) => npm.default_registry(),
    };
    let url = registry_metadata_url(registry, name);
    let response = state.proxy.upstream.get(&url, accept).await?;
    if !response.is_success() {
        tracing::debug!("upstream {url} answered {}", response.status);
        return forward(response);
    }

    if !is_packument_type(response.header("content-type")) {
        tracing::debug!("upstream {url} answered with a non-JSON body; passing it through");
        return forward(response);
    }

    let mut doc: serde_json::Value = serde_json::from_slice(&response.body)?;
    rewrite_tarball_urls(&mut doc, &state.url, name);
    let body = serde_json::to_vec(&doc)?;
    forward(UpstreamResponse { body, ..response })
}

async fn serve_tarball(state: &ProxyState, name: &str, query: TarballQuery) -> Response {
    let result = match (query.url, state.proxy.workspace.module(name)) {
        (Some(url), _) => upstream_tarball(state, &url).await,
        (None, Some(module)) => match state.proxy.packager.pack(module).await {
            Ok(packed) => stream_file(&packed.tarball).await,
            Err(e) => Err(e),
        },
        (None, None) => Ok((
            StatusCode::NOT_FOUND,
            format!("no local module named '{name}'"),
        )
            .into_response()),
    };
    result.unwrap_or_else(|e| internal_error(name, e))
}

async fn upstream_tarball(state: &ProxyState, url: &str) -> Result<Response> {
    if let Some(path) = state.proxy.cache.get(url) {
        tracing::debug!("tarball cache hit for {url}");
        return stream_file(&path).await;
    }
    let response = state.proxy.upstream.get(url, None).await?;
    if response.status != 200 {
        return forward(response);
    }
    let path = state.proxy.cache.store(url, &response.body)?;
    stream_file(&path).await
}

async fn stream_file(path: &Path) -> Result<Response> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| RegistryError::Io(std::io::Error::other(e)))
}

fn json_response(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Result<Response> {
    let mut response = (status, body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    Ok(response)
}

/// Relay an upstream response, dropping headers that no longer apply.
fn forward(response: UpstreamResponse) -> Result<Response> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        if is_forwardable_header(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
        .body(Body::from(response.body))
        .map_err(|e| RegistryError::Io(std::io::Error::other(e)))
}

fn internal_error(name: &str, err: RegistryError) -> Response {
    tracing::error!("request for {name} failed: {err}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("tandem: {err}")).into_response()
}
