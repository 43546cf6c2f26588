use super::recycle::Reset;
use crate::cookies::CookieJar;
use crate::dns::FallbackResolver;
use crate::http::{Middleware, RetryPolicy};
use crate::transport::{ProxySettings, Route, Transport, TransportSettings};
use http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;

/// Mutable configuration of a [`Session`](super::Session).
///
/// `Default` is the construction state that `clear()` returns to.
#[derive(Clone, Default)]
pub struct SessionConfig {
    /// Base for relative request URLs. Parsed at call time.
    pub base_url: Option<String>,
    /// Per-call budget, used only when the caller's context has no deadline.
    pub timeout: Option<Duration>,
    /// Default headers, merged under request headers.
    pub headers: HeaderMap,
    pub proxy: Option<ProxySettings>,
    pub dns: Option<FallbackResolver>,
    /// Protocol mode of the session's transport handle.
    pub http2: bool,
    pub transport: TransportSettings,
    pub cookie_jar: Option<Arc<dyn CookieJar>>,
    pub retry: Option<RetryPolicy>,
    /// Registration order; the first is outermost.
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("proxy", &self.proxy.as_ref().map(|p| p.label()))
            .field("dns", &self.dns)
            .field("http2", &self.http2)
            .field("transport", &self.transport)
            .field("cookie_jar", &self.cookie_jar.is_some())
            .field("retry", &self.retry)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Snapshot of everything one call needs, taken under the session lock.
#[derive(Default)]
pub(crate) struct CallConfig {
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub headers: HeaderMap,
    pub route: Route,
    pub cookie_jar: Option<Arc<dyn CookieJar>>,
    pub retry: Option<RetryPolicy>,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub transport: Option<Arc<Transport>>,
}

impl CallConfig {
    pub fn fill(&mut self, config: &SessionConfig, transport: &Arc<Transport>) {
        self.base_url.clone_from(&config.base_url);
        self.timeout = config.timeout;
        self.headers.clone_from(&config.headers);
        self.route = Route { proxy: config.proxy.clone(), dns: config.dns.clone() };
        self.cookie_jar.clone_from(&config.cookie_jar);
        self.retry.clone_from(&config.retry);
        self.middleware.extend(config.middleware.iter().cloned());
        self.transport = Some(Arc::clone(transport));
    }
}

impl Reset for CallConfig {
    fn reset(&mut self) {
        self.base_url = None;
        self.timeout = None;
        self.headers.clear();
        self.route = Route::default();
        self.cookie_jar = None;
        self.retry = None;
        self.middleware.clear();
        self.transport = None;
    }
}
