//! Sessions: configuration, execution and recycling.
//!
//! A [`Session`] owns one transport handle checked out of a
//! [`TransportPool`](crate::transport::TransportPool) together with default
//! request behavior (base URL, headers, timeout, proxy, DNS, cookies, retry
//! policy, middleware).
//!
//! # Example
//!
//! ```rust,ignore
//! use netsession::{RetryPolicy, Session};
//! use std::time::Duration;
//!
//! let session = Session::new();
//! session
//!     .with_base_url("https://api.example.com")
//!     .with_timeout(Duration::from_secs(10))
//!     .with_header("Accept", "application/json")
//!     .with_retry(RetryPolicy::default());
//!
//! let resp = session.get("/users").query("page", "2").send().await?;
//! println!("{}", resp.status());
//! ```

pub mod builder;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod recycle;

pub use builder::SessionRequest;
pub use config::SessionConfig;
pub use defaults::{
    default_session, http2_default, set_http2_default, Http2DefaultGuard, SessionFactory,
};
pub use engine::Session;
pub use recycle::{ObjectPool, Pooled, Reset, SessionPool};
