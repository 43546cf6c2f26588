//! The pooled transport handle.
//!
//! A [`Transport`] owns the reusable connection machinery for one protocol
//! mode: an idle-connection cache plus the tuning knobs that govern it. Handles
//! are checked out of a [`TransportPool`](super::TransportPool) by a session
//! and returned to the free-list matching [`Transport::protocol`].

use super::connectjob::{ConnectJob, Route};
use crate::base::neterror::NetError;
use bytes::Bytes;
use dashmap::DashMap;
use http::header::{CONNECTION, HOST};
use http::{HeaderValue, Request, Response, Uri, Version};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::BodyExt;
use hyper::client::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Request body type accepted by the transport.
pub type TransportBody = UnsyncBoxBody<Bytes, std::io::Error>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Protocol mode a handle is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// HTTP/1.1 only.
    Http1,
    /// Offers `h2` through ALPN on TLS, falls back to HTTP/1.1.
    Http2,
}

impl Protocol {
    pub fn from_http2(enabled: bool) -> Self {
        if enabled {
            Protocol::Http2
        } else {
            Protocol::Http1
        }
    }

    pub fn is_http2(self) -> bool {
        self == Protocol::Http2
    }
}

/// Connection tuning for a transport handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    /// Reuse connections between calls.
    pub keep_alive: bool,
    /// Cap on idle connections kept across all hosts.
    pub max_idle_conns: usize,
    /// Idle connections older than this are discarded.
    pub idle_timeout: Duration,
    /// Budget for each TCP connect attempt.
    pub connect_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            keep_alive: true,
            max_idle_conns: 100,
            idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Identifies a connection group (scheme, host, port, route).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConnKey {
    scheme: String,
    host: String,
    port: u16,
    route: String,
}

impl ConnKey {
    fn new(url: &Url, route: &Route) -> Option<Self> {
        Some(ConnKey {
            scheme: url.scheme().to_string(),
            host: url.host_str()?.to_string(),
            port: url.port_or_known_default()?,
            route: route.label(),
        })
    }
}

enum PooledConn {
    H1(http1::SendRequest<TransportBody>),
    H2(http2::SendRequest<TransportBody>),
}

impl PooledConn {
    fn is_closed(&self) -> bool {
        match self {
            PooledConn::H1(s) => s.is_closed(),
            PooledConn::H2(s) => s.is_closed(),
        }
    }

    async fn send(
        &mut self,
        req: Request<TransportBody>,
    ) -> Result<Response<hyper::body::Incoming>, NetError> {
        match self {
            PooledConn::H1(s) => Ok(s.send_request(req).await?),
            PooledConn::H2(s) => Ok(s.send_request(req).await?),
        }
    }
}

struct IdleConn {
    conn: PooledConn,
    idle_since: Instant,
}

/// A reusable, protocol-mode-tagged transport.
pub struct Transport {
    id: u64,
    protocol: Protocol,
    settings: RwLock<TransportSettings>,
    idle: DashMap<ConnKey, VecDeque<IdleConn>>,
    idle_count: AtomicUsize,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .field("settings", &self.settings())
            .field("idle_count", &self.idle_connection_count())
            .finish()
    }
}

impl Transport {
    pub(crate) fn new(protocol: Protocol) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            protocol,
            settings: RwLock::new(TransportSettings::default()),
            idle: DashMap::new(),
            idle_count: AtomicUsize::new(0),
        }
    }

    /// Process-unique identity of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The mode this handle was built for. Fixed for the handle's lifetime.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn settings(&self) -> TransportSettings {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn configure(&self, settings: TransportSettings) {
        let keep_alive = settings.keep_alive;
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        if !keep_alive {
            self.close_idle_connections();
        }
    }

    /// Restore construction defaults before the handle re-enters a pool.
    pub(crate) fn reset(&self) {
        self.configure(TransportSettings::default());
        self.prune_idle();
    }

    /// Number of cached idle connections.
    pub fn idle_connection_count(&self) -> usize {
        self.idle_count.load(Ordering::Relaxed)
    }

    /// Drop every cached idle connection.
    pub fn close_idle_connections(&self) {
        // Count what is actually removed; a concurrent checkin may land
        // between entries and must keep its own increment.
        let mut removed = 0;
        self.idle.retain(|_, queue| {
            removed += queue.len();
            false
        });
        if removed > 0 {
            self.idle_count.fetch_sub(removed, Ordering::Relaxed);
        }
    }

    /// Remove expired or closed idle connections.
    pub(crate) fn prune_idle(&self) {
        let timeout = self.settings().idle_timeout;
        let mut removed = 0;
        self.idle.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|idle| idle.idle_since.elapsed() < timeout && !idle.conn.is_closed());
            removed += before - queue.len();
            !queue.is_empty()
        });
        if removed > 0 {
            self.idle_count.fetch_sub(removed, Ordering::Relaxed);
            debug!(transport = self.id, removed, "pruned idle connections");
        }
    }

    /// Send one request and buffer the whole response.
    ///
    /// An HTTP/1 connection goes back to the idle cache only after its
    /// response body has been read to the end.
    pub(crate) async fn round_trip(
        &self,
        req: Request<TransportBody>,
        url: &Url,
        route: &Route,
    ) -> Result<Response<Bytes>, NetError> {
        let settings = self.settings();
        let key = ConnKey::new(url, route).ok_or_else(|| NetError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;

        let mut conn = match self.checkout(&key, &settings).await {
            Some(conn) => {
                debug!(transport = self.id, host = %key.host, port = key.port, "reusing idle connection");
                conn
            }
            None => self.connect(url, route, &settings).await?,
        };

        let req = prepare_request(req, url, &conn, settings.keep_alive)?;
        let resp = conn.send(req).await?;
        let (parts, body) = resp.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| NetError::BodyReadFailed(e.to_string()))?
            .to_bytes();

        let server_closes = parts
            .headers
            .get(CONNECTION)
            .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"close"));
        if !server_closes {
            self.checkin(key, conn, &settings);
        }

        Ok(Response::from_parts(parts, body))
    }

    async fn checkout(&self, key: &ConnKey, settings: &TransportSettings) -> Option<PooledConn> {
        if !settings.keep_alive {
            return None;
        }
        loop {
            let idle = {
                let mut queue = self.idle.get_mut(key)?;
                // A live HTTP/2 connection is shared, not taken.
                if let Some(IdleConn { conn: PooledConn::H2(sender), idle_since }) = queue.front() {
                    if !sender.is_closed() && idle_since.elapsed() < settings.idle_timeout {
                        return Some(PooledConn::H2(sender.clone()));
                    }
                }
                let idle = queue.pop_front()?;
                self.idle_count.fetch_sub(1, Ordering::Relaxed);
                idle
            };

            if idle.idle_since.elapsed() >= settings.idle_timeout {
                continue;
            }
            if let PooledConn::H1(mut sender) = idle.conn {
                if !sender.is_closed() && sender.ready().await.is_ok() {
                    return Some(PooledConn::H1(sender));
                }
            }
        }
    }

    fn checkin(&self, key: ConnKey, conn: PooledConn, settings: &TransportSettings) {
        if !settings.keep_alive || conn.is_closed() {
            return;
        }
        let mut queue = self.idle.entry(key).or_default();
        if let PooledConn::H2(_) = conn {
            if let Some(front) = queue.front_mut() {
                if matches!(&front.conn, PooledConn::H2(s) if !s.is_closed()) {
                    front.idle_since = Instant::now();
                    return;
                }
            }
        }
        if self.idle_count.load(Ordering::Relaxed) >= settings.max_idle_conns {
            debug!(transport = self.id, max = settings.max_idle_conns, "idle cache full, closing connection");
            return;
        }
        self.idle_count.fetch_add(1, Ordering::Relaxed);
        match conn {
            PooledConn::H2(_) => queue.push_front(IdleConn { conn, idle_since: Instant::now() }),
            PooledConn::H1(_) => queue.push_back(IdleConn { conn, idle_since: Instant::now() }),
        }
    }

    async fn connect(
        &self,
        url: &Url,
        route: &Route,
        settings: &TransportSettings,
    ) -> Result<PooledConn, NetError> {
        let connected =
            ConnectJob::new(url, route, self.protocol, settings.connect_timeout).connect().await?;
        let io = TokioIo::new(connected.socket);

        if connected.h2 {
            let (sender, conn) = http2::handshake(TokioExecutor::new(), io).await?;
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "HTTP/2 connection closed with error");
                }
            });
            debug!(transport = self.id, url = %url, "new HTTP/2 connection");
            Ok(PooledConn::H2(sender))
        } else {
            let (sender, conn) = http1::handshake(io).await?;
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "HTTP/1 connection closed with error");
                }
            });
            debug!(transport = self.id, url = %url, "new HTTP/1 connection");
            Ok(PooledConn::H1(sender))
        }
    }
}

/// Set the request target form and version for the connection's protocol.
fn prepare_request(
    req: Request<TransportBody>,
    url: &Url,
    conn: &PooledConn,
    keep_alive: bool,
) -> Result<Request<TransportBody>, NetError> {
    let invalid = |reason: String| NetError::InvalidUrl { url: url.to_string(), reason };
    let (mut parts, body) = req.into_parts();

    match conn {
        PooledConn::H1(_) => {
            let origin = &url[url::Position::BeforePath..url::Position::AfterQuery];
            parts.uri = origin.parse::<Uri>().map_err(|e| invalid(e.to_string()))?;
            parts.version = Version::HTTP_11;
            if !parts.headers.contains_key(HOST) {
                let host = match (url.host_str(), url.port()) {
                    (Some(h), Some(p)) => format!("{h}:{p}"),
                    (Some(h), None) => h.to_string(),
                    (None, _) => return Err(invalid("missing host".to_string())),
                };
                let value = HeaderValue::from_str(&host)
                    .map_err(|_| NetError::InvalidHeader { name: HOST.to_string() })?;
                parts.headers.insert(HOST, value);
            }
            if !keep_alive {
                parts.headers.insert(CONNECTION, HeaderValue::from_static("close"));
            }
        }
        PooledConn::H2(_) => {
            parts.uri = url.as_str().parse::<Uri>().map_err(|e| invalid(e.to_string()))?;
            parts.version = Version::HTTP_2;
            parts.headers.remove(HOST);
            parts.headers.remove(CONNECTION);
        }
    }

    Ok(Request::from_parts(parts, body))
}
