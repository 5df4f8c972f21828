// adaptive transport for every upstream request the resolver makes
//
// the upstream bans datacenter ips pretty aggressively so requests go direct first, then through
// the configured PROXY, then through two endpoints of the pool. whatever worked last is cached so
// the next request skips straight to it
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::iter;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mockall::automock;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::proxy_pool_services::DynProxyPool;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

pub type DynHttpExecutor = Arc<dyn HttpExecutor + Send + Sync>;
pub type DynTransportClient = Arc<TransportClient>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMethod {
    Direct,
    EnvProxy(String),
    PoolProxy(String),
}

impl TransportMethod {
    pub fn proxy_endpoint(&self) -> Option<&str> {
        match self {
            Self::Direct => None,
            Self::EnvProxy(endpoint) | Self::PoolProxy(endpoint) => Some(endpoint),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::EnvProxy(_) => "env_proxy",
            Self::PoolProxy(_) => "pool_proxy",
        }
    }
}

impl fmt::Display for TransportMethod {
    // endpoints carry credentials, never print them raw
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.proxy_endpoint() {
            Some(endpoint) => write!(f, "{} ({})", self.label(), redact_endpoint(endpoint)),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// strips userinfo and paths off a proxy endpoint so it can be logged
pub fn redact_endpoint(endpoint: &str) -> String {
    match url::Url::parse(endpoint) {
        Ok(url) => format!(
            "{}://{}:{}",
            url.scheme(),
            url.host_str().unwrap_or("?"),
            url.port_or_known_default().unwrap_or(0)
        ),
        Err(_) => "<unparseable proxy>".to_string(),
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("access denied by upstream ({status}) for {url}")]
    AccessDenied { status: StatusCode, url: String },

    #[error("upstream returned {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("unusable proxy endpoint {endpoint}: {reason}")]
    InvalidProxy { endpoint: String, reason: String },

    #[error("no transport route available")]
    NoRoute,
}

impl TransportError {
    /// blocked-ip style failures, the only ones worth retrying through a proxy
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// the route itself is unusable. a plain status means upstream was reached through it
    pub fn is_route_failure(&self) -> bool {
        matches!(
            self,
            Self::AccessDenied { .. } | Self::Network { .. } | Self::InvalidProxy { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl UpstreamRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// url after redirects
    pub final_url: String,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, final_url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            final_url: final_url.into(),
            body: body.into(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// single request over a single route, no fallback logic in here
#[automock]
#[async_trait]
pub trait HttpExecutor {
    async fn execute(
        &self,
        method: &TransportMethod,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, TransportError>;
}

/// reqwest backed executor, one client per route so connection pools are kept per proxy
pub struct ReqwestExecutor {
    direct: reqwest::Client,
    proxied: Mutex<HashMap<String, reqwest::Client>>,
}

impl ReqwestExecutor {
    pub fn new() -> Result<Self, TransportError> {
        let direct = Self::client_builder()
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Network {
                url: "<client>".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    // the upstream rotates through self signed and expired certs, validation is off for every
    // client this builds
    fn client_builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(5))
    }

    fn client_for(&self, method: &TransportMethod) -> Result<reqwest::Client, TransportError> {
        let Some(endpoint) = method.proxy_endpoint() else {
            return Ok(self.direct.clone());
        };

        let mut proxied = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = proxied.get(endpoint) {
            return Ok(client.clone());
        }

        let invalid = |reason: String| TransportError::InvalidProxy {
            endpoint: redact_endpoint(endpoint),
            reason,
        };
        let proxy = reqwest::Proxy::all(endpoint).map_err(|e| invalid(e.to_string()))?;
        let client = Self::client_builder()
            .proxy(proxy)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        proxied.insert(endpoint.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(
        &self,
        method: &TransportMethod,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, TransportError> {
        let client = self.client_for(method)?;

        let mut builder = client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let network = |e: reqwest::Error| TransportError::Network {
            url: request.url.clone(),
            reason: if e.is_timeout() {
                format!("timed out after {:?}", request.timeout)
            } else {
                e.to_string()
            },
        };

        let response = builder.send().await.map_err(network)?;
        let status = response.status();
        let final_url = response.url().to_string();
        let body = response.bytes().await.map_err(network)?;

        Ok(UpstreamResponse {
            status,
            final_url,
            body,
        })
    }
}

/// process wide transport cache, injected so tests can look at it and reset it
#[derive(Debug, Default)]
pub struct TransportState {
    cached: Mutex<Option<TransportMethod>>,
    env_proxy_suppressed: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportSnapshot {
    pub method: Option<String>,
    pub endpoint: Option<String>,
    pub env_proxy_suppressed: bool,
}

impl TransportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_method(&self) -> Option<TransportMethod> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remember(&self, method: TransportMethod) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(method);
    }

    /// clears the cache, but only if it still holds `method`. another request may have
    /// already replaced it with something that works
    pub fn forget(&self, method: &TransportMethod) -> bool {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if cached.as_ref() == Some(method) {
            *cached = None;
            true
        } else {
            false
        }
    }

    pub fn suppress_env_proxy(&self) {
        self.env_proxy_suppressed.store(true, Ordering::Relaxed);
    }

    pub fn env_proxy_suppressed(&self) -> bool {
        self.env_proxy_suppressed.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.env_proxy_suppressed.store(false, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        let cached = self.cached_method();
        TransportSnapshot {
            method: cached.as_ref().map(|m| m.label().to_string()),
            endpoint: cached
                .as_ref()
                .and_then(|m| m.proxy_endpoint())
                .map(redact_endpoint),
            env_proxy_suppressed: self.env_proxy_suppressed(),
        }
    }
}

/// runs `attempt` over the candidates in order and returns the first one that works
///
/// `on_failure` sees every failed candidate and can stop the ladder early. the error is `None`
/// only when there were no candidates at all
pub async fn first_success<C, T, E, I, F, Fut, H>(
    candidates: I,
    mut attempt: F,
    mut on_failure: H,
) -> Result<(C, T), Option<E>>
where
    C: Clone,
    I: IntoIterator<Item = C>,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnMut(&C, &E) -> ControlFlow<()>,
{
    let mut last_error = None;

    for candidate in candidates {
        match attempt(candidate.clone()).await {
            Ok(value) => return Ok((candidate, value)),
            Err(err) => {
                let flow = on_failure(&candidate, &err);
                last_error = Some(err);
                if flow.is_break() {
                    break;
                }
            }
        }
    }

    Err(last_error)
}

/// maps a raw response onto the transport error classes
pub fn classify(response: UpstreamResponse, url: &str) -> Result<UpstreamResponse, TransportError> {
    let status = response.status;
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::FORBIDDEN || status == StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS {
        return Err(TransportError::AccessDenied {
            status,
            url: url.to_string(),
        });
    }

    Err(TransportError::Status {
        status,
        url: url.to_string(),
    })
}

pub struct TransportClient {
    executor: DynHttpExecutor,
    state: Arc<TransportState>,
    pool: DynProxyPool,
    env_proxy: Option<String>,
}

impl TransportClient {
    pub fn new(
        executor: DynHttpExecutor,
        state: Arc<TransportState>,
        pool: DynProxyPool,
        env_proxy: Option<String>,
    ) -> Self {
        let env_proxy = env_proxy
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Self {
            executor,
            state,
            pool,
            env_proxy,
        }
    }

    pub fn state(&self) -> &Arc<TransportState> {
        &self.state
    }

    pub fn pool(&self) -> &DynProxyPool {
        &self.pool
    }

    /// fetch with the cached method, falling back to full discovery if it stops working
    pub async fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        if let Some(method) = self.state.cached_method() {
            match self.attempt(method.clone(), request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        "cached transport {} failed for {}: {}, rediscovering",
                        method, request.url, e
                    );
                    self.state.forget(&method);
                }
            }
        }

        self.discover(request).await
    }

    pub async fn fetch_bytes(&self, request: &UpstreamRequest) -> Result<Bytes, TransportError> {
        self.fetch(request).await.map(|r| r.body)
    }

    /// one shot over whatever is cached (direct if nothing is), used for key fetches which
    /// happen on every rotation and should stay quiet and fast
    pub async fn fetch_pinned_bytes(
        &self,
        request: &UpstreamRequest,
    ) -> Result<Bytes, TransportError> {
        let method = self
            .state
            .cached_method()
            .unwrap_or(TransportMethod::Direct);
        debug!("pinned fetch via {}: {}", method, request.url);

        match self.attempt(method.clone(), request).await {
            Ok(response) => Ok(response.body),
            Err(e) => {
                debug!("pinned fetch via {} failed: {}", method, e);
                self.state.forget(&method);
                Err(e)
            }
        }
    }

    async fn attempt(
        &self,
        method: TransportMethod,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, TransportError> {
        let response = self.executor.execute(&method, request).await?;
        classify(response, &request.url)
    }

    fn usable_env_proxy(&self) -> Option<TransportMethod> {
        if self.state.env_proxy_suppressed() {
            return None;
        }
        self.env_proxy.clone().map(TransportMethod::EnvProxy)
    }

    async fn discover(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        // lazy so the pool cursor only moves when the ladder actually gets that far
        let candidates = iter::once(TransportMethod::Direct)
            .chain(iter::once_with(move || self.usable_env_proxy()).flatten())
            .chain(
                iter::once_with(move || self.pool.next_pair())
                    .flatten()
                    .map(TransportMethod::PoolProxy),
            );

        let outcome = first_success(
            candidates,
            move |method| self.attempt(method, request),
            move |method, err| match method {
                TransportMethod::Direct if !err.is_access_denied() => ControlFlow::Break(()),
                TransportMethod::Direct => {
                    info!("direct request blocked ({}), trying proxies", err);
                    ControlFlow::Continue(())
                }
                // the proxy works, the resource is what's missing
                _ if !err.is_route_failure() => {
                    debug!("{} reached upstream but got {}", method, err);
                    ControlFlow::Break(())
                }
                TransportMethod::EnvProxy(_) => {
                    warn!("{} failed ({}), disabling it for this process", method, err);
                    self.state.suppress_env_proxy();
                    ControlFlow::Continue(())
                }
                TransportMethod::PoolProxy(_) => {
                    warn!("{} failed: {}", method, err);
                    ControlFlow::Continue(())
                }
            },
        )
        .await;

        match outcome {
            Ok((method, response)) => {
                if method == TransportMethod::Direct {
                    debug!("direct transport ok for {}", request.url);
                } else {
                    info!("transport {} works, caching it", method);
                }
                self.state.remember(method);
                Ok(response)
            }
            Err(err) => Err(err.unwrap_or(TransportError::NoRoute)),
        }
    }
}
