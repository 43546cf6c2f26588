//! # netsession
//!
//! A session-oriented HTTP client execution engine.
//!
//! `netsession` runs logical requests through a configurable [`Session`]:
//! the target is resolved against a base URL, session defaults are applied,
//! the call passes through an ordered middleware chain and a retry executor
//! with exponential backoff, and a buffered [`HttpResponse`] comes back.
//!
//! ## Features
//!
//! - **Pooled transports**: HTTP/1 and HTTP/2 free-lists of transport handles,
//!   each owning an idle-connection cache
//! - **Middleware**: first registered runs outermost, may short-circuit
//! - **Retry**: bounded attempts, capped exponential backoff, optional jitter,
//!   caller-supplied predicate
//! - **Cancellation**: every network wait and backoff sleep honors the
//!   [`CallContext`] deadline and cancellation
//! - **Network path**: HTTP CONNECT and SOCKS5 proxies, custom DNS servers
//!   tried in order, TLS via BoringSSL with ALPN
//! - **Cookies**: pluggable [`CookieJar`](cookies::CookieJar) with an
//!   in-memory implementation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use netsession::{RetryPolicy, Session};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), netsession::NetError> {
//!     let session = Session::new();
//!     session
//!         .with_base_url("https://httpbin.org")
//!         .with_timeout(Duration::from_secs(10))
//!         .with_retry(RetryPolicy::default().retry_server_errors());
//!
//!     let resp = session.get("/get").send().await?;
//!     println!("Status: {}", resp.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error taxonomy and call context
//! - [`dns`] - System and custom-server name resolution
//! - [`transport`] - Transport handles, pools, connection setup
//! - [`http`] - Requests, responses, middleware and retry
//! - [`cookies`] - Cookie jar trait and in-memory jar
//! - [`session`] - Sessions, process-wide defaults, object pools

pub mod base;
#[cfg(feature = "json")]
pub mod codec;
pub mod cookies;
pub mod dns;
pub mod http;
pub mod session;
pub mod transport;
pub mod urlutil;

pub use base::callcontext::{CallContext, Canceller};
pub use base::neterror::NetError;
pub use http::{
    HttpResponse, Middleware, Next, Request, RequestBody, RequestBuilder, RetryPolicy,
};
pub use session::{Session, SessionFactory, SessionPool, SessionRequest};
pub use transport::{Protocol, TransportPool};
