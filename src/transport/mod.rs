//! Pooled transport machinery.
//!
//! - [`Transport`]: a mode-tagged handle owning an idle-connection cache
//! - [`TransportPool`]: HTTP/1 and HTTP/2 free-lists of handles
//! - [`ConnectJob`]: DNS, TCP, proxy tunnel and TLS for a new connection

pub mod connectjob;
pub mod handle;
pub mod pool;
pub mod proxy;
pub mod stream;

pub use connectjob::{ConnectJob, Route};
pub use handle::{Protocol, Transport, TransportBody, TransportSettings};
pub use pool::TransportPool;
pub use proxy::{ProxySettings, ProxyType};
pub use stream::SocketType;
