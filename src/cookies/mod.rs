//! Cookie storage for sessions.
//!
//! A session configured with a [`CookieJar`] sends the jar's matching
//! cookies on every call and stores every `Set-Cookie` it receives.
//!
//! ```rust,ignore
//! use netsession::cookies::MemoryCookieJar;
//! use std::sync::Arc;
//!
//! let jar = Arc::new(MemoryCookieJar::new());
//! session.with_cookie_jar(jar.clone());
//! session.get("https://example.com/login").send().await?;
//! println!("{} cookies stored", jar.total_cookie_count());
//! ```

pub mod jar;

pub use jar::{CookieJar, MemoryCookieJar, StoredCookie};
