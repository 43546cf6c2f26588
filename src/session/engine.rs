//! The session: configuration state plus the request execution pipeline.
//!
//! Execution order for one call:
//!
//! 1. reject a request without URL
//! 2. snapshot configuration under the lock
//! 3. resolve the URL against the base URL
//! 4. derive the deadline from the session timeout if the caller set none
//! 5. middleware chain (first registered outermost) around the retry
//!    executor around the raw transport call

use super::builder::SessionRequest;
use super::config::{CallConfig, SessionConfig};
use super::defaults::SessionFactory;
use super::recycle::{ObjectPool, Pooled};
use crate::base::callcontext::CallContext;
use crate::base::neterror::NetError;
use crate::cookies::CookieJar;
use crate::dns::FallbackResolver;
use crate::http::headers::{basic_auth, bearer_auth, merge_headers, parse_header};
use crate::http::middleware::{Endpoint, Middleware, Next};
use crate::http::retry::{self, RetryPolicy};
use crate::http::{HttpResponse, Request, RequestUrl};
use crate::transport::{Protocol, ProxySettings, Transport, TransportPool, TransportSettings};
use crate::urlutil;
use http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use http::{HeaderMap, Method};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

static CALL_CONFIGS: ObjectPool<CallConfig> = ObjectPool::new(256);

struct SessionState {
    config: SessionConfig,
    transport: Option<Arc<Transport>>,
    last_config_error: Option<NetError>,
}

/// A long-lived HTTP client owning one pooled transport handle.
///
/// Mutators take `&self`, lock, apply one change and return `&Self` for
/// chaining. Each mutator is atomic; a chain of them is not. Calls snapshot
/// the configuration when they start and never observe later changes.
pub struct Session {
    state: Mutex<SessionState>,
    pool: Arc<TransportPool>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Session")
            .field("config", &state.config)
            .field("transport", &state.transport.as_ref().map(|t| t.id()))
            .finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session in the process-wide default protocol mode, on the global
    /// transport pool.
    pub fn new() -> Self {
        SessionFactory::from_default().create()
    }

    /// A session with an explicit protocol mode and transport pool.
    pub fn with_pool(protocol: Protocol, pool: Arc<TransportPool>) -> Self {
        let transport = pool.acquire(protocol);
        let config = SessionConfig { http2: protocol.is_http2(), ..Default::default() };
        transport.configure(config.transport.clone());
        Self {
            state: Mutex::new(SessionState {
                config,
                transport: Some(transport),
                last_config_error: None,
            }),
            pool,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn config_error(state: &mut SessionState, err: NetError) {
        warn!(error = %err, "ignoring invalid session configuration");
        state.last_config_error = Some(err);
    }

    // ---- Configuration -------------------------------------------------

    /// Base URL for relative request URLs. Validated at call time.
    pub fn with_base_url(&self, base: &str) -> &Self {
        let mut state = self.lock();
        state.config.base_url = Some(base.to_string()).filter(|b| !b.is_empty());
        self
    }

    /// Per-call budget, applied only when the caller's context has no
    /// deadline. `Duration::ZERO` removes it.
    pub fn with_timeout(&self, timeout: Duration) -> &Self {
        let mut state = self.lock();
        state.config.timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Set a default header, replacing a previous default of the same name.
    pub fn with_header(&self, name: &str, value: &str) -> &Self {
        let mut state = self.lock();
        match parse_header(name, value) {
            Ok((name, value)) => {
                state.config.headers.insert(name, value);
            }
            Err(e) => Self::config_error(&mut state, e),
        }
        self
    }

    /// Set several default headers.
    pub fn with_headers<I, K, V>(&self, headers: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut state = self.lock();
        for (name, value) in headers {
            match parse_header(name.as_ref(), value.as_ref()) {
                Ok((name, value)) => {
                    state.config.headers.insert(name, value);
                }
                Err(e) => Self::config_error(&mut state, e),
            }
        }
        self
    }

    /// Default `Authorization: Basic` header.
    pub fn with_basic_auth(&self, user: &str, pass: &str) -> &Self {
        let mut state = self.lock();
        state.config.headers.insert(AUTHORIZATION, basic_auth(user, pass));
        self
    }

    /// Default `Authorization: Bearer` header.
    pub fn with_bearer_token(&self, token: &str) -> &Self {
        let mut state = self.lock();
        match bearer_auth(token) {
            Ok(value) => {
                state.config.headers.insert(AUTHORIZATION, value);
            }
            Err(e) => Self::config_error(&mut state, e),
        }
        self
    }

    /// Route calls through a proxy (`http://`, `socks5://`, `socks5h://`).
    ///
    /// An empty string removes the proxy. A malformed URL also leaves the
    /// session without a proxy; the error is logged and kept in
    /// [`last_config_error`](Self::last_config_error).
    pub fn with_proxy(&self, proxy_url: &str) -> &Self {
        let mut state = self.lock();
        if proxy_url.is_empty() {
            state.config.proxy = None;
            return self;
        }
        match ProxySettings::parse(proxy_url) {
            Ok(proxy) => state.config.proxy = Some(proxy),
            Err(e) => {
                state.config.proxy = None;
                Self::config_error(&mut state, e);
            }
        }
        self
    }

    /// Resolve names through these DNS servers, tried in order.
    ///
    /// An empty list restores system resolution. An invalid entry leaves
    /// system resolution in place and is reported like a bad proxy.
    pub fn with_dns<I, S>(&self, servers: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let servers: Vec<String> = servers.into_iter().map(|s| s.as_ref().to_string()).collect();
        let mut state = self.lock();
        if servers.is_empty() {
            state.config.dns = None;
            return self;
        }
        match FallbackResolver::new(&servers) {
            Ok(resolver) => state.config.dns = Some(resolver),
            Err(e) => {
                state.config.dns = None;
                Self::config_error(&mut state, e);
            }
        }
        self
    }

    /// Switch protocol mode. A change swaps the transport handle for one
    /// from the other free-list; the same mode is a no-op.
    pub fn with_http2(&self, enabled: bool) -> &Self {
        let mut state = self.lock();
        if state.config.http2 == enabled {
            return self;
        }
        state.config.http2 = enabled;
        if let Some(old) = state.transport.take() {
            self.pool.release(old);
            let transport = self.pool.acquire(Protocol::from_http2(enabled));
            transport.configure(state.config.transport.clone());
            debug!(transport = transport.id(), http2 = enabled, "session switched protocol");
            state.transport = Some(transport);
        }
        self
    }

    pub fn with_keep_alive(&self, enabled: bool) -> &Self {
        self.update_transport(|t| t.keep_alive = enabled)
    }

    pub fn with_max_idle_conns(&self, max: usize) -> &Self {
        self.update_transport(|t| t.max_idle_conns = max)
    }

    pub fn with_idle_timeout(&self, timeout: Duration) -> &Self {
        self.update_transport(|t| t.idle_timeout = timeout)
    }

    /// Budget for each TCP connect attempt.
    pub fn with_connect_timeout(&self, timeout: Duration) -> &Self {
        self.update_transport(|t| t.connect_timeout = timeout)
    }

    fn update_transport(&self, apply: impl FnOnce(&mut TransportSettings)) -> &Self {
        let mut state = self.lock();
        apply(&mut state.config.transport);
        if let Some(transport) = &state.transport {
            transport.configure(state.config.transport.clone());
        }
        self
    }

    /// Send and store cookies through `jar`.
    pub fn with_cookie_jar(&self, jar: Arc<dyn CookieJar>) -> &Self {
        let mut state = self.lock();
        state.config.cookie_jar = Some(jar);
        self
    }

    /// Retry calls under `policy`. Without a policy every call is a single
    /// attempt.
    pub fn with_retry(&self, policy: RetryPolicy) -> &Self {
        let mut state = self.lock();
        state.config.retry = Some(policy);
        self
    }

    /// Append a middleware. The first registered runs outermost.
    pub fn with_middleware<M: Middleware + 'static>(&self, middleware: M) -> &Self {
        let mut state = self.lock();
        state.config.middleware.push(Arc::new(middleware));
        self
    }

    /// Reset configuration to construction defaults, in place.
    ///
    /// The transport handle is replaced with a fresh HTTP/1 handle; call
    /// [`with_http2`](Self::with_http2) afterwards to opt back in.
    pub fn clear(&self) -> &Self {
        let mut state = self.lock();
        state.config = SessionConfig::default();
        state.last_config_error = None;
        self.pool.release(state.transport.take());
        let transport = self.pool.acquire(Protocol::Http1);
        transport.configure(state.config.transport.clone());
        state.transport = Some(transport);
        self
    }

    /// Return the transport handle to its pool. Later calls fail with
    /// [`NetError::SessionClosed`]. Closing twice is a no-op.
    pub fn close(&self) {
        let transport = self.lock().transport.take();
        if let Some(t) = &transport {
            debug!(transport = t.id(), "session closed");
        }
        self.pool.release(transport);
    }

    /// An independent session with copied configuration and its own
    /// transport handle in the same mode.
    pub fn clone_session(&self) -> Session {
        let (config, last_config_error) = {
            let state = self.lock();
            (state.config.clone(), state.last_config_error.clone())
        };
        let transport = self.pool.acquire(Protocol::from_http2(config.http2));
        transport.configure(config.transport.clone());
        Session {
            state: Mutex::new(SessionState { config, transport: Some(transport), last_config_error }),
            pool: Arc::clone(&self.pool),
        }
    }

    // ---- Accessors -----------------------------------------------------

    pub fn config(&self) -> SessionConfig {
        self.lock().config.clone()
    }

    pub fn base_url(&self) -> Option<String> {
        self.lock().config.base_url.clone()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.lock().config.timeout
    }

    /// Copy of the default headers.
    pub fn headers(&self) -> HeaderMap {
        self.lock().config.headers.clone()
    }

    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        self.lock().config.retry.clone()
    }

    pub fn middleware_count(&self) -> usize {
        self.lock().config.middleware.len()
    }

    pub fn is_http2(&self) -> bool {
        self.lock().config.http2
    }

    pub fn is_closed(&self) -> bool {
        self.lock().transport.is_none()
    }

    pub fn proxy(&self) -> Option<ProxySettings> {
        self.lock().config.proxy.clone()
    }

    pub fn dns_servers(&self) -> Vec<SocketAddr> {
        self.lock().config.dns.as_ref().map(FallbackResolver::servers).unwrap_or_default()
    }

    pub fn transport_settings(&self) -> TransportSettings {
        self.lock().config.transport.clone()
    }

    /// Identity of the current transport handle, `None` once closed.
    pub fn transport_id(&self) -> Option<u64> {
        self.lock().transport.as_ref().map(|t| t.id())
    }

    /// The most recent configuration value that was rejected.
    pub fn last_config_error(&self) -> Option<NetError> {
        self.lock().last_config_error.clone()
    }

    // ---- Execution -----------------------------------------------------

    /// Execute `req` under the request's own context.
    pub async fn execute(&self, req: Request) -> Result<HttpResponse, NetError> {
        let ctx = req.context().clone();
        self.execute_with_context(&ctx, req).await
    }

    /// Execute `req` under `ctx`.
    pub async fn execute_with_context(
        &self,
        ctx: &CallContext,
        mut req: Request,
    ) -> Result<HttpResponse, NetError> {
        let target = req.url().cloned().ok_or(NetError::MissingUrl)?;
        let snapshot = self.snapshot()?;

        let url = resolve_url(snapshot.base_url.as_deref(), &target)?;
        let ctx = match (ctx.deadline(), snapshot.timeout) {
            (None, Some(timeout)) => ctx.with_timeout(timeout),
            _ => ctx.clone(),
        };
        req.set_resolved_url(url.clone());
        req.set_context(ctx.clone());
        debug!(method = %req.method(), url = %url, "executing request");

        let snap: &CallConfig = &snapshot;
        let url_ref = &url;
        // Middleware may have swapped the context; honor what arrives here.
        let endpoint: &Endpoint<'_> = &move |req: Request| {
            Box::pin(async move {
                let ctx = req.context().clone();
                retry::execute(snap.retry.as_ref(), &ctx, |_| round_trip(snap, &ctx, &req, url_ref))
                    .await
            })
        };

        Next::new(&snap.middleware, endpoint).run(req).await
    }

    fn snapshot(&self) -> Result<Pooled<'static, CallConfig>, NetError> {
        let mut snapshot = CALL_CONFIGS.acquire();
        let state = self.lock();
        let transport = state.transport.as_ref().ok_or(NetError::SessionClosed)?;
        snapshot.fill(&state.config, transport);
        Ok(snapshot)
    }

    // ---- Request helpers -----------------------------------------------

    /// Start a request with any method.
    pub fn request(&self, method: Method, url: &str) -> SessionRequest<'_> {
        SessionRequest::new(self, method, url)
    }

    pub fn get(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: &str) -> SessionRequest<'_> {
        self.request(Method::HEAD, url)
    }

    /// GET `url` and decode the JSON response.
    #[cfg(feature = "json")]
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, NetError> {
        self.get(url).send().await?.json()
    }

    /// POST `body` as JSON and decode the JSON response.
    #[cfg(feature = "json")]
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, NetError>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        self.post(url).json(body).send().await?.json()
    }

    /// PUT `body` as JSON and decode the JSON response.
    #[cfg(feature = "json")]
    pub async fn put_json<B, T>(&self, url: &str, body: &B) -> Result<T, NetError>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        self.put(url).json(body).send().await?.json()
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        self.clone_session()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        self.pool.release(state.transport.take());
    }
}

/// Resolve the request target against the session base URL.
fn resolve_url(base: Option<&str>, target: &RequestUrl) -> Result<Url, NetError> {
    let base = match base {
        Some(raw) => {
            let invalid =
                |reason: String| NetError::InvalidBaseUrl { url: raw.to_string(), reason };
            let parsed = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
            if parsed.cannot_be_a_base() {
                return Err(invalid("cannot be a base".to_string()));
            }
            Some(parsed)
        }
        None => None,
    };

    match (target, base) {
        (RequestUrl::Absolute(url), _) => Ok(url.clone()),
        (RequestUrl::Relative(raw), Some(base)) => urlutil::resolve(&base, raw),
        (RequestUrl::Relative(raw), None) => {
            Err(NetError::RelativeUrlWithoutBase { url: raw.clone() })
        }
    }
}

/// One attempt on the wire.
async fn round_trip(
    snap: &CallConfig,
    ctx: &CallContext,
    req: &Request,
    url: &Url,
) -> Result<HttpResponse, NetError> {
    let transport = snap.transport.as_ref().ok_or(NetError::SessionClosed)?;

    let mut headers = merge_headers(&snap.headers, req.headers());
    if let Some(cookies) = snap.cookie_jar.as_ref().and_then(|jar| jar.cookies(url)) {
        headers.append(COOKIE, cookies);
    }

    let mut http_req = http::Request::new(req.body().for_attempt()?);
    *http_req.method_mut() = req.method().clone();
    *http_req.uri_mut() = url
        .as_str()
        .parse()
        .map_err(|e: http::uri::InvalidUri| NetError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    *http_req.headers_mut() = headers;

    let resp = ctx.run(transport.round_trip(http_req, url, &snap.route)).await?;

    if let Some(jar) = &snap.cookie_jar {
        jar.set_cookies(url, &mut resp.headers().get_all(SET_COOKIE).iter());
    }
    Ok(HttpResponse::from_parts(resp, url.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::with_pool(Protocol::Http1, Arc::new(TransportPool::new()))
    }

    #[test]
    fn test_resolve_url() {
        let rel = RequestUrl::parse("/foo").unwrap();
        assert_eq!(resolve_url(Some("https://host"), &rel).unwrap().as_str(), "https://host/foo");

        let abs = RequestUrl::parse("http://other/x").unwrap();
        assert_eq!(resolve_url(Some("https://host"), &abs).unwrap().as_str(), "http://other/x");
        assert_eq!(resolve_url(None, &abs).unwrap().as_str(), "http://other/x");

        assert!(matches!(
            resolve_url(None, &rel),
            Err(NetError::RelativeUrlWithoutBase { .. })
        ));
        assert!(matches!(
            resolve_url(Some("::bad::"), &rel),
            Err(NetError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            resolve_url(Some("mailto:a@b"), &rel),
            Err(NetError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_mutators_chain() {
        let s = session();
        s.with_base_url("https://host")
            .with_timeout(Duration::from_secs(5))
            .with_header("X-A", "1")
            .with_bearer_token("t")
            .with_keep_alive(false)
            .with_max_idle_conns(7)
            .with_idle_timeout(Duration::from_secs(9))
            .with_retry(RetryPolicy::default())
            .clear()
            .with_header("X-B", "2")
            .with_http2(true);

        assert!(s.base_url().is_none());
        assert_eq!(s.headers().get("x-b").unwrap(), "2");
        assert!(s.is_http2());
    }

    #[test]
    fn test_auth_overwrites() {
        let s = session();
        s.with_basic_auth("u", "p").with_bearer_token("tok");
        let headers = s.headers();
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
    }

    #[test]
    fn test_malformed_proxy_is_swallowed() {
        let s = session();
        s.with_proxy("http://good.example:3128");
        assert!(s.proxy().is_some());

        s.with_proxy("::not a proxy::");
        assert!(s.proxy().is_none());
        assert!(matches!(s.last_config_error(), Some(NetError::InvalidProxy { .. })));
    }

    #[test]
    fn test_transport_settings_reach_handle() {
        let pool = Arc::new(TransportPool::new());
        let s = Session::with_pool(Protocol::Http1, Arc::clone(&pool));
        s.with_max_idle_conns(3).with_keep_alive(false);
        let settings = s.transport_settings();
        assert_eq!(settings.max_idle_conns, 3);
        assert!(!settings.keep_alive);
    }

    #[test]
    fn test_http2_toggle_swaps_handle() {
        let pool = Arc::new(TransportPool::new());
        let s = Session::with_pool(Protocol::Http1, Arc::clone(&pool));
        let first = s.transport_id();

        s.with_http2(false);
        assert_eq!(s.transport_id(), first);

        s.with_http2(true);
        assert_ne!(s.transport_id(), first);
        assert_eq!(pool.free_count(Protocol::Http1), 1);
    }

    #[test]
    fn test_close_and_drop_release_once() {
        let pool = Arc::new(TransportPool::new());
        let s = Session::with_pool(Protocol::Http2, Arc::clone(&pool));
        s.close();
        s.close();
        assert!(s.is_closed());
        assert_eq!(pool.free_count(Protocol::Http2), 1);
        drop(s);
        assert_eq!(pool.free_count(Protocol::Http2), 1);

        let s = Session::with_pool(Protocol::Http1, Arc::clone(&pool));
        drop(s);
        assert_eq!(pool.free_count(Protocol::Http1), 1);
    }

    #[tokio::test]
    async fn test_missing_url_and_closed() {
        let s = session();
        let err = s.execute(Request::default()).await.unwrap_err();
        assert!(matches!(err, NetError::MissingUrl));

        s.close();
        let req = Request::builder(Method::GET, "http://127.0.0.1:9/").build().unwrap();
        assert!(matches!(s.execute(req).await, Err(NetError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_lazy_base_url_error() {
        let s = session();
        s.with_base_url("::bad::");
        let req = Request::builder(Method::GET, "/foo").build().unwrap();
        assert!(matches!(s.execute(req).await, Err(NetError::InvalidBaseUrl { .. })));
    }
}
