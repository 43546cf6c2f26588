//! DNS Resolution Module
//!
//! Provides pluggable DNS resolution with support for:
//! - System resolver (getaddrinfo via thread pool)
//! - Custom name servers tried in order until one answers
//!
//! # Architecture
//!
//! The `Resolve` trait is the core abstraction that lets the connect path
//! use either resolver interchangeably. A session installs a
//! [`FallbackResolver`] when configured with explicit DNS servers and uses
//! [`GaiResolver`] otherwise.
//!
//! # Example
//!
//! ```rust,ignore
//! use netsession::dns::{FallbackResolver, Name, Resolve};
//!
//! let resolver = FallbackResolver::new(["10.0.0.2:53", "1.1.1.1"])?;
//! let addrs = resolver.resolve(Name::new("example.com")).await?;
//! for addr in addrs {
//!     println!("Resolved: {}", addr);
//! }
//! ```

mod fallback;
mod gai;
mod resolve;

pub use fallback::FallbackResolver;
pub use gai::{GaiResolver, SocketAddrs};
pub use resolve::{lookup, Addrs, Name, Resolve, Resolving};
