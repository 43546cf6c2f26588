use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error type used for sources that come from pluggable collaborators.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error, Clone)]
pub enum NetError {
    // Configuration Errors
    #[error("Invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("Invalid proxy URL {url:?}: {reason}")]
    InvalidProxy { url: String, reason: String },
    #[error("Invalid DNS server {server:?}")]
    InvalidDnsServer { server: String },

    // Build Errors
    #[error("Request has no URL")]
    MissingUrl,
    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Relative URL {url:?} requires a session base URL")]
    RelativeUrlWithoutBase { url: String },
    #[error("Unsupported URL scheme {0:?}")]
    UnknownUrlScheme(String),
    #[error("Invalid HTTP method {0:?}")]
    InvalidMethod(String),
    #[error("Invalid header {name:?}")]
    InvalidHeader { name: String },

    // Transport Errors
    #[error("Failed to resolve {host} (tried DNS servers: {}): {reason}", servers.join(", "))]
    NameNotResolved {
        host: String,
        servers: Vec<String>,
        reason: String,
    },
    #[error("Name not resolved for {domain}: {source}")]
    NameNotResolvedFor {
        domain: String,
        source: Arc<std::io::Error>,
    },
    #[error("Failed to connect to {host}:{port} (tried: {}): {reason}", format_addrs(tried))]
    ConnectFailed {
        host: String,
        port: u16,
        tried: Vec<SocketAddr>,
        reason: String,
    },
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Proxy connection to {proxy} failed: {reason}")]
    ProxyConnectionFailed { proxy: String, reason: String },
    #[error("Proxy tunnel rejected with status {status}")]
    TunnelConnectionFailed { status: u16 },
    #[error("SSL protocol error: {0}")]
    SslProtocolError(String),
    #[error("HTTP protocol error: {source}")]
    Http { source: Arc<hyper::Error> },
    #[error("Failed to read response body: {0}")]
    BodyReadFailed(String),

    // Context Errors
    #[error("Request cancelled")]
    Cancelled,
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    // Codec Errors
    #[error("Failed to encode request payload: {source}")]
    Encode { source: BoxError },
    #[error("Failed to decode response payload: {source}")]
    Decode { source: BoxError },
    #[error("Response body is not valid UTF-8")]
    InvalidUtf8,

    // Body Errors
    #[error("Request body stream was already consumed and cannot be replayed")]
    BodyNotReplayable,

    // Lifecycle Errors
    #[error("Session used after close")]
    SessionClosed,
}

fn format_addrs(addrs: &[SocketAddr]) -> String {
    addrs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl NetError {
    /// DNS failure with domain context.
    pub fn dns_failed(domain: &str, source: std::io::Error) -> Self {
        NetError::NameNotResolvedFor {
            domain: domain.to_string(),
            source: Arc::new(source),
        }
    }

    pub fn encode<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        NetError::Encode {
            source: Arc::new(source),
        }
    }

    pub fn decode<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        NetError::Decode {
            source: Arc::new(source),
        }
    }

    /// True if the call's context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NetError::Cancelled)
    }

    /// True if a deadline or connect timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::DeadlineExceeded | NetError::ConnectionTimedOut)
    }

    /// True for cancellation and deadline errors raised by a [`CallContext`].
    ///
    /// [`CallContext`]: crate::base::callcontext::CallContext
    pub fn is_context_error(&self) -> bool {
        matches!(self, NetError::Cancelled | NetError::DeadlineExceeded)
    }

    /// True if the payload could not be encoded or decoded.
    pub fn is_codec(&self) -> bool {
        matches!(
            self,
            NetError::Encode { .. } | NetError::Decode { .. } | NetError::InvalidUtf8
        )
    }

    /// True for failures that happened while talking to the network.
    ///
    /// This is what the default retry predicate retries on.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            NetError::NameNotResolved { .. }
                | NetError::NameNotResolvedFor { .. }
                | NetError::ConnectFailed { .. }
                | NetError::ConnectionClosed
                | NetError::ConnectionTimedOut
                | NetError::ProxyConnectionFailed { .. }
                | NetError::TunnelConnectionFailed { .. }
                | NetError::SslProtocolError(_)
                | NetError::Http { .. }
                | NetError::BodyReadFailed(_)
                | NetError::Cancelled
                | NetError::DeadlineExceeded
        )
    }
}

impl From<hyper::Error> for NetError {
    fn from(source: hyper::Error) -> Self {
        NetError::Http {
            source: Arc::new(source),
        }
    }
}
